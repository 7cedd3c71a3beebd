//! Physical schema representation types.
//!
//! These types describe columns and indexes as the database sees them. They
//! are produced by the type mapper (from logical fields) and by live-schema
//! providers (from introspection), and consumed by every SQL builder.

use serde::{Deserialize, Serialize};

/// Physical column types of the target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// 64-bit integer storage.
    Integer,
    /// Big integer (same storage as `Integer`, kept for fidelity).
    BigInt,
    /// Floating point.
    Real,
    /// Fixed-point decimal; honors precision.
    Decimal,
    /// Bounded text; honors length.
    Varchar,
    /// Unbounded text.
    Text,
    /// Binary large object.
    Blob,
    /// Calendar date.
    Date,
    /// Time of day.
    Time,
    /// Date and time.
    DateTime,
    /// JSON document stored as text.
    Json,
}

/// Storage class a column value ends up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affinity {
    /// Integer affinity.
    Integer,
    /// Real affinity.
    Real,
    /// Numeric affinity.
    Numeric,
    /// Text affinity.
    Text,
    /// Blob affinity.
    Blob,
}

impl Affinity {
    /// Relative width used to decide whether a conversion narrows data.
    /// Text and blob can hold anything the numeric classes can.
    fn rank(self) -> u8 {
        match self {
            Self::Integer => 0,
            Self::Numeric => 1,
            Self::Real => 2,
            Self::Text => 3,
            Self::Blob => 4,
        }
    }

    /// Returns true if converting from `self` to `to` can lose data.
    #[must_use]
    pub fn narrows_to(self, to: Self) -> bool {
        to.rank() < self.rank()
    }

    /// Keyword used in `CAST(... AS ...)`.
    #[must_use]
    pub fn cast_name(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Numeric => "NUMERIC",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }
}

/// Default scale used for decimals declared without precision.
pub const DEFAULT_DECIMAL_SCALE: u32 = 9;

/// Total digits of rendered decimals.
pub const DECIMAL_DIGITS: u32 = 21;

impl ColumnType {
    /// Base SQL type name, without length or precision.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Decimal => "DECIMAL",
            Self::Varchar => "VARCHAR",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime => "DATETIME",
            Self::Json => "JSON",
        }
    }

    /// Storage affinity of this type.
    #[must_use]
    pub fn affinity(&self) -> Affinity {
        match self {
            Self::Integer | Self::BigInt => Affinity::Integer,
            Self::Real => Affinity::Real,
            Self::Decimal => Affinity::Numeric,
            Self::Varchar | Self::Text | Self::Date | Self::Time | Self::DateTime | Self::Json => {
                Affinity::Text
            }
            Self::Blob => Affinity::Blob,
        }
    }

    /// Whether a length parameter is meaningful for this type.
    #[must_use]
    pub fn supports_length(&self) -> bool {
        matches!(self, Self::Varchar)
    }

    /// Whether a precision parameter is meaningful for this type.
    #[must_use]
    pub fn supports_precision(&self) -> bool {
        matches!(self, Self::Decimal)
    }

    /// Whether a column of this type may be a primary key.
    #[must_use]
    pub fn can_be_primary_key(&self) -> bool {
        matches!(self, Self::Integer | Self::BigInt | Self::Varchar)
    }

    /// Whether a column of this type may carry a UNIQUE constraint.
    #[must_use]
    pub fn can_be_unique(&self) -> bool {
        !matches!(self, Self::Text | Self::Blob | Self::Json)
    }

    /// Whether a column of this type may be indexed.
    #[must_use]
    pub fn can_be_indexed(&self) -> bool {
        !matches!(self, Self::Blob | Self::Json)
    }

    /// Parses a declared column type as reported by introspection.
    ///
    /// Returns the type plus any length and precision found in the
    /// declaration. Unrecognized declarations fall back to the engine's
    /// affinity rules.
    #[must_use]
    pub fn parse(declared: &str) -> (Self, Option<u32>, Option<u32>) {
        let upper = declared.trim().to_ascii_uppercase();
        let (base, args) = match upper.find('(') {
            Some(open) => {
                let close = upper.rfind(')').unwrap_or(upper.len());
                let inner = upper.get(open + 1..close).unwrap_or("");
                let args: Vec<u32> = inner
                    .split(',')
                    .filter_map(|a| a.trim().parse().ok())
                    .collect();
                (upper[..open].trim().to_string(), args)
            }
            None => (upper.clone(), Vec::new()),
        };

        let ty = match base.as_str() {
            "INTEGER" | "INT" | "SMALLINT" | "TINYINT" | "MEDIUMINT" => Self::Integer,
            "BIGINT" => Self::BigInt,
            "REAL" | "DOUBLE" | "DOUBLE PRECISION" | "FLOAT" => Self::Real,
            "DECIMAL" | "NUMERIC" => Self::Decimal,
            "VARCHAR" | "CHARACTER VARYING" | "NVARCHAR" | "CHAR" | "CHARACTER" => Self::Varchar,
            "TEXT" | "CLOB" | "LONGTEXT" | "MEDIUMTEXT" => Self::Text,
            "BLOB" | "" => Self::Blob,
            "DATE" => Self::Date,
            "TIME" => Self::Time,
            "DATETIME" | "TIMESTAMP" => Self::DateTime,
            "JSON" => Self::Json,
            other if other.contains("INT") => Self::Integer,
            other if other.contains("CHAR") || other.contains("CLOB") || other.contains("TEXT") => {
                Self::Text
            }
            other if other.contains("BLOB") => Self::Blob,
            other if other.contains("REAL") || other.contains("FLOA") || other.contains("DOUB") => {
                Self::Real
            }
            _ => Self::Decimal,
        };

        let length = if ty.supports_length() {
            args.first().copied()
        } else {
            None
        };
        let precision = if ty.supports_precision() {
            args.get(1).copied().or_else(|| args.first().map(|_| 0))
        } else {
            None
        };
        (ty, length, precision)
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DefaultValue {
    /// Boolean default, stored as 1/0.
    Bool(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Raw SQL expression (e.g. `CURRENT_TIMESTAMP`).
    Expression {
        /// Expression text, emitted verbatim.
        expr: String,
    },
}

impl DefaultValue {
    /// Returns the SQL literal for this default.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression { expr } => expr.clone(),
        }
    }

    /// Parses a default as reported by introspection (SQL literal text).
    ///
    /// `NULL` yields `None`, quoted strings are unescaped, numbers become
    /// numeric defaults and anything else is kept as an expression.
    #[must_use]
    pub fn parse_sql(literal: &str) -> Option<Self> {
        let trimmed = literal.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("NULL") {
            return None;
        }
        if trimmed.len() >= 2 && trimmed.starts_with('\'') && trimmed.ends_with('\'') {
            let inner = &trimmed[1..trimmed.len() - 1];
            return Some(Self::String(inner.replace("''", "'")));
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Some(Self::Integer(i));
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Some(Self::Float(f));
        }
        Some(Self::Expression {
            expr: trimmed.to_string(),
        })
    }
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    /// No action.
    #[default]
    NoAction,
    /// Restrict.
    Restrict,
    /// Cascade the delete/update to referencing rows.
    Cascade,
    /// Set the referencing column to NULL.
    SetNull,
    /// Set the referencing column to its default.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Reference from a column to a row of another table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// ON DELETE action; the constraint builder's default when `None`.
    pub on_delete: Option<ForeignKeyAction>,
    /// ON UPDATE action; the constraint builder's default when `None`.
    pub on_update: Option<ForeignKeyAction>,
}

impl ForeignKeyRef {
    /// Creates a reference to `table(column)` with default actions.
    #[must_use]
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete: None,
            on_update: None,
        }
    }
}

/// A fully resolved column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// Physical type.
    pub column_type: ColumnType,
    /// Length, only set when the type supports it.
    pub length: Option<u32>,
    /// Decimal scale, only set when the type supports it.
    pub precision: Option<u32>,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Default value, `None` for no DEFAULT clause.
    pub default: Option<DefaultValue>,
    /// Whether this column is (part of) the primary key.
    pub primary_key: bool,
    /// Whether this column auto-increments.
    pub auto_increment: bool,
    /// Whether this column carries a UNIQUE constraint.
    pub unique: bool,
    /// Collation name.
    pub collation: Option<String>,
    /// CHECK expression derived from the field, if any.
    pub check: Option<String>,
    /// Foreign key reference.
    pub foreign_key: Option<ForeignKeyRef>,
}

impl ColumnDefinition {
    /// Creates a nullable column with no constraints.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            precision: None,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
            collation: None,
            check: None,
            foreign_key: None,
        }
    }

    /// Sets the column as NOT NULL.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Sets the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Sets the column to auto-increment.
    #[must_use]
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Sets the length, dropped if the type does not support it.
    #[must_use]
    pub fn length(mut self, length: u32) -> Self {
        self.length = self.column_type.supports_length().then_some(length);
        self
    }

    /// Sets the precision, dropped if the type does not support it.
    #[must_use]
    pub fn precision(mut self, precision: u32) -> Self {
        self.precision = self.column_type.supports_precision().then_some(precision);
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn default(mut self, value: DefaultValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Sets a foreign key reference.
    #[must_use]
    pub fn references(mut self, fk: ForeignKeyRef) -> Self {
        self.foreign_key = Some(fk);
        self
    }

    /// Full SQL type including length or precision.
    #[must_use]
    pub fn sql_type(&self) -> String {
        match (self.column_type, self.length, self.precision) {
            (ColumnType::Varchar, Some(len), _) => format!("VARCHAR({len})"),
            (ColumnType::Decimal, _, precision) => format!(
                "DECIMAL({DECIMAL_DIGITS},{})",
                precision.unwrap_or(DEFAULT_DECIMAL_SCALE)
            ),
            (ty, _, _) => ty.name().to_string(),
        }
    }

    /// Returns true if converting values of this column into `target` can
    /// lose data: a narrower affinity, or a shorter length or precision.
    #[must_use]
    pub fn narrows_to(&self, target: &Self) -> bool {
        let shrinks = |from: Option<u32>, to: Option<u32>| matches!((from, to), (Some(f), Some(t)) if t < f);
        self.column_type
            .affinity()
            .narrows_to(target.column_type.affinity())
            || shrinks(self.length, target.length)
            || shrinks(self.precision, target.precision)
    }

    /// Builds a column definition from introspected column metadata.
    #[must_use]
    pub fn from_live(info: &ColumnInfo) -> Self {
        let (column_type, length, precision) = ColumnType::parse(&info.column_type);
        Self {
            name: info.name.clone(),
            column_type,
            length,
            precision,
            nullable: info.nullable && !info.primary_key,
            default: info.default.as_deref().and_then(DefaultValue::parse_sql),
            primary_key: info.primary_key,
            auto_increment: info.auto_increment,
            unique: info.unique,
            collation: info.collation.clone(),
            check: None,
            foreign_key: info.foreign_key.clone(),
        }
    }
}

/// Sort direction of an indexed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending (default).
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// Returns the SQL keyword.
    #[must_use]
    pub fn to_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A column inside an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexColumn {
    /// Column name.
    pub name: String,
    /// Sort direction.
    #[serde(default)]
    pub order: SortOrder,
}

impl IndexColumn {
    /// Creates an ascending index column.
    #[must_use]
    pub fn asc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Asc,
        }
    }

    /// Creates a descending index column.
    #[must_use]
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Desc,
        }
    }
}

/// Index structure hint. The target engine only builds b-trees, the kind is
/// carried for inspection and comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// B-tree index.
    Btree,
    /// Hash index.
    Hash,
    /// Full-text index.
    Fulltext,
}

/// A fully resolved index definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Table the index belongs to.
    pub table: String,
    /// Indexed columns in order.
    pub columns: Vec<IndexColumn>,
    /// Whether this is a unique index.
    pub unique: bool,
    /// Index structure hint.
    pub kind: Option<IndexKind>,
    /// Partial index predicate (WHERE clause body).
    pub predicate: Option<String>,
}

impl IndexDefinition {
    /// Names of the indexed columns.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Builds an index definition from introspected metadata.
    #[must_use]
    pub fn from_live(table: &str, info: &IndexInfo) -> Self {
        Self {
            name: info.name.clone(),
            table: table.to_string(),
            columns: info.columns.clone(),
            unique: info.unique,
            kind: None,
            predicate: info.predicate.clone(),
        }
    }
}

/// Column metadata reported by a live-schema provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type (e.g. `VARCHAR(140)`).
    pub column_type: String,
    /// Whether NULL is allowed.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Default as SQL literal text.
    #[serde(default)]
    pub default: Option<String>,
    /// Whether the column is part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Whether the column auto-increments.
    #[serde(default)]
    pub auto_increment: bool,
    /// Whether the column has a UNIQUE constraint.
    #[serde(default)]
    pub unique: bool,
    /// Collation name.
    #[serde(default)]
    pub collation: Option<String>,
    /// Foreign key reference.
    #[serde(default)]
    pub foreign_key: Option<ForeignKeyRef>,
}

fn default_true() -> bool {
    true
}

/// Index metadata reported by a live-schema provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    /// Index name.
    pub name: String,
    /// Indexed columns in order.
    pub columns: Vec<IndexColumn>,
    /// Whether the index is unique.
    #[serde(default)]
    pub unique: bool,
    /// Partial index predicate.
    #[serde(default)]
    pub predicate: Option<String>,
    /// Whether the engine created this index implicitly (UNIQUE or
    /// PRIMARY KEY constraints).
    #[serde(default)]
    pub implicit: bool,
}

/// Columns and indexes of one live table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveTable {
    /// Table name.
    pub table: String,
    /// Columns in declaration order.
    pub columns: Vec<ColumnInfo>,
    /// Indexes.
    #[serde(default)]
    pub indexes: Vec<IndexInfo>,
    /// CHECK expressions declared in the table definition.
    #[serde(default)]
    pub checks: Vec<String>,
}
