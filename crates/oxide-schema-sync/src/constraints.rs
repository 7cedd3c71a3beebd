//! Column and table constraint generation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{GenerateError, Result};
use crate::field::{Field, FieldType};
use crate::formatter::SqlFormatter;
use crate::schema::{ColumnDefinition, ColumnType, ForeignKeyAction, ForeignKeyRef};
use crate::type_mapper::TypeMapper;

/// Default foreign key actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintOptions {
    /// ON DELETE action for references that do not specify one.
    pub on_delete: ForeignKeyAction,
    /// ON UPDATE action for references that do not specify one.
    pub on_update: ForeignKeyAction,
}

impl Default for ConstraintOptions {
    fn default() -> Self {
        Self {
            on_delete: ForeignKeyAction::SetNull,
            on_update: ForeignKeyAction::Cascade,
        }
    }
}

/// Column-level constraint fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnConstraints {
    /// Inline `PRIMARY KEY`.
    pub primary_key: bool,
    /// `AUTOINCREMENT` after the inline primary key.
    pub auto_increment: bool,
    /// `NOT NULL`.
    pub not_null: bool,
    /// `UNIQUE`.
    pub unique: bool,
    /// Rendered DEFAULT literal.
    pub default: Option<String>,
    /// `COLLATE` name.
    pub collation: Option<String>,
    /// CHECK expressions, combined with AND.
    pub checks: Vec<String>,
    /// Inline `REFERENCES` clause, only used where table-level foreign keys
    /// cannot be declared (ADD COLUMN).
    pub references: Option<ForeignKeyRef>,
}

/// Returns true if two CHECK expressions are the same up to case,
/// whitespace and identifier quoting.
#[must_use]
pub fn same_check(a: &str, b: &str) -> bool {
    let key = |expr: &str| -> String {
        expr.chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '`' | '"' | '[' | ']'))
            .flat_map(char::to_lowercase)
            .collect()
    };
    key(a) == key(b)
}

/// Builds constraint fragments for columns and tables.
#[derive(Debug, Clone, Default)]
pub struct ConstraintBuilder {
    formatter: SqlFormatter,
    options: ConstraintOptions,
}

impl ConstraintBuilder {
    /// Creates a builder.
    #[must_use]
    pub fn new(formatter: SqlFormatter, options: ConstraintOptions) -> Self {
        Self { formatter, options }
    }

    /// Returns the default foreign key actions.
    #[must_use]
    pub fn options(&self) -> &ConstraintOptions {
        &self.options
    }

    /// Builds the constraints a field asks for.
    pub fn build_column_constraints(&self, field: &Field) -> Result<ColumnConstraints> {
        Ok(ColumnConstraints {
            primary_key: field.primary_key,
            auto_increment: field.auto_increment,
            not_null: field.required,
            unique: field.unique,
            default: self.formatter.format_default(field.default.as_ref()),
            collation: None,
            checks: self.check_expression(field)?.into_iter().collect(),
            references: None,
        })
    }

    /// Derives the CHECK expression implied by a field, if any.
    ///
    /// Check fields are constrained to 0/1, selects to their declared
    /// options and numeric fields to their declared bounds.
    pub fn check_expression(&self, field: &Field) -> Result<Option<String>> {
        let col = self.formatter.quote_identifier(&field.name);
        let mut parts = Vec::new();

        match field.field_type {
            FieldType::Check => parts.push(format!("{col} IN (0, 1)")),
            FieldType::Select => {
                let options = field.select_options();
                if !options.is_empty() {
                    let literals: Vec<String> = options
                        .iter()
                        .map(|o| self.formatter.string_literal(o))
                        .collect();
                    parts.push(format!("{col} IN ({})", literals.join(", ")));
                }
            }
            _ => {}
        }

        if let (Some(min), Some(max)) = (field.min_value, field.max_value) {
            if min > max {
                return Err(GenerateError::constraint(
                    &field.name,
                    format!("lower bound {min} exceeds upper bound {max}"),
                ));
            }
        }
        if let Some(min) = field.min_value {
            parts.push(format!("{col} >= {min}"));
        }
        if let Some(max) = field.max_value {
            parts.push(format!("{col} <= {max}"));
        }

        Ok((!parts.is_empty()).then(|| parts.join(" AND ")))
    }

    /// Maps a field and attaches its CHECK expression, validating the
    /// result against the column type's capabilities.
    pub fn resolve_column(&self, mapper: &TypeMapper, field: &Field) -> Result<ColumnDefinition> {
        let mut column = mapper.map(field)?;
        column.check = self.check_expression(field)?;
        self.validate_column(&column)?;
        Ok(column)
    }

    /// Checks that a column's flags are supported by its type.
    pub fn validate_column(&self, column: &ColumnDefinition) -> Result<()> {
        let ty = column.column_type;
        if column.unique && !ty.can_be_unique() {
            return Err(GenerateError::constraint(
                &column.name,
                format!("{} columns cannot be UNIQUE", ty.name()),
            ));
        }
        if column.primary_key && !ty.can_be_primary_key() {
            return Err(GenerateError::constraint(
                &column.name,
                format!("{} columns cannot be a primary key", ty.name()),
            ));
        }
        if column.auto_increment
            && !(column.primary_key && matches!(ty, ColumnType::Integer | ColumnType::BigInt))
        {
            return Err(GenerateError::constraint(
                &column.name,
                "AUTOINCREMENT requires an integer primary key",
            ));
        }
        if let Some(check) = &column.check {
            if check.trim().is_empty() {
                return Err(GenerateError::constraint(&column.name, "empty CHECK expression"));
            }
        }
        if let Some(fk) = &column.foreign_key {
            self.validate_reference(&column.name, fk)?;
        }
        Ok(())
    }

    fn validate_reference(&self, column: &str, fk: &ForeignKeyRef) -> Result<()> {
        if fk.table.trim().is_empty() {
            return Err(GenerateError::constraint(column, "referenced table name is empty"));
        }
        if fk.column.trim().is_empty() {
            return Err(GenerateError::constraint(column, "referenced column name is empty"));
        }
        Ok(())
    }

    /// Builds the constraints of an already resolved column.
    ///
    /// `inline_primary_key` says whether the primary key is declared on the
    /// column (single-column keys) or at table level (composite keys).
    pub fn column_constraints(
        &self,
        column: &ColumnDefinition,
        inline_primary_key: bool,
    ) -> Result<ColumnConstraints> {
        self.validate_column(column)?;
        let primary_key = column.primary_key && inline_primary_key;
        Ok(ColumnConstraints {
            primary_key,
            auto_increment: primary_key && column.auto_increment,
            not_null: !column.nullable && !primary_key,
            unique: column.unique && !primary_key,
            default: self.formatter.format_default(column.default.as_ref()),
            collation: column.collation.clone(),
            checks: column.check.iter().cloned().collect(),
            references: None,
        })
    }

    /// Renders one column definition.
    pub fn build_column_definition(
        &self,
        column: &ColumnDefinition,
        constraints: &ColumnConstraints,
    ) -> Result<String> {
        let mut parts = vec![
            self.formatter.quote_identifier(&column.name),
            column.sql_type(),
        ];

        if constraints.primary_key {
            parts.push("PRIMARY KEY".to_string());
            if constraints.auto_increment {
                parts.push("AUTOINCREMENT".to_string());
            }
        }
        if constraints.not_null {
            parts.push("NOT NULL".to_string());
        }
        if constraints.unique {
            parts.push("UNIQUE".to_string());
        }
        if let Some(default) = &constraints.default {
            parts.push(format!("DEFAULT {default}"));
        }
        if let Some(collation) = &constraints.collation {
            parts.push(format!("COLLATE {collation}"));
        }
        if !constraints.checks.is_empty() {
            if constraints.checks.iter().any(|c| c.trim().is_empty()) {
                return Err(GenerateError::constraint(&column.name, "empty CHECK expression"));
            }
            parts.push(format!("CHECK ({})", constraints.checks.join(" AND ")));
        }
        if let Some(fk) = &constraints.references {
            self.validate_reference(&column.name, fk)?;
            parts.push(format!("REFERENCES {}", self.reference_clause(fk)));
        }

        Ok(parts.join(" "))
    }

    /// Builds table-level constraints: a composite primary key when two or
    /// more columns form the key, and one FOREIGN KEY per reference.
    pub fn build_table_constraints(&self, columns: &[ColumnDefinition]) -> Result<Vec<String>> {
        let mut out = Vec::new();

        let pk: Vec<&str> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        if pk.len() >= 2 {
            out.push(format!("PRIMARY KEY ({})", self.formatter.quote_list(pk)));
        }

        for column in columns {
            if let Some(fk) = &column.foreign_key {
                self.validate_reference(&column.name, fk)?;
                out.push(format!(
                    "FOREIGN KEY ({}) REFERENCES {}",
                    self.formatter.quote_identifier(&column.name),
                    self.reference_clause(fk)
                ));
            }
        }

        Ok(out)
    }

    /// Builds every line inside `CREATE TABLE t ( ... )`.
    pub fn build_table_body(&self, table: &str, columns: &[ColumnDefinition]) -> Result<Vec<String>> {
        if columns.is_empty() {
            return Err(GenerateError::TableNameConflict {
                table: table.to_string(),
                message: "table has no columns".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for column in columns {
            if !seen.insert(column.name.as_str()) {
                return Err(GenerateError::ColumnNameConflict {
                    table: table.to_string(),
                    column: column.name.clone(),
                    message: "duplicate column".to_string(),
                });
            }
        }

        let inline_pk = columns.iter().filter(|c| c.primary_key).count() == 1;
        let mut lines = Vec::with_capacity(columns.len());
        for column in columns {
            let constraints = self.column_constraints(column, inline_pk)?;
            lines.push(self.build_column_definition(column, &constraints)?);
        }
        lines.extend(self.build_table_constraints(columns)?);
        Ok(lines)
    }

    fn reference_clause(&self, fk: &ForeignKeyRef) -> String {
        format!(
            "{} ({}) ON DELETE {} ON UPDATE {}",
            self.formatter.quote_identifier(&fk.table),
            self.formatter.quote_identifier(&fk.column),
            fk.on_delete.unwrap_or(self.options.on_delete).to_sql(),
            fk.on_update.unwrap_or(self.options.on_update).to_sql()
        )
    }
}
