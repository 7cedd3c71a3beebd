//! Structured differences between a logical schema and a live table.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::constraints::{same_check, ConstraintBuilder};
use crate::error::CompareError;
use crate::field::{Field, LogicalSchema};
use crate::formatter::SqlFormatter;
use crate::index::IndexBuilder;
use crate::rebuild::TableState;
use crate::schema::{ColumnDefinition, ColumnType, DefaultValue, IndexDefinition, LiveTable};
use crate::type_mapper::TypeMapper;

/// A `{from, to}` pair of one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change<T> {
    /// Live value.
    pub from: T,
    /// Target value.
    pub to: T,
}

impl<T: PartialEq> Change<T> {
    fn between(from: T, to: T) -> Option<Self> {
        (from != to).then_some(Self { from, to })
    }
}

/// Attribute differences of one column. Unchanged attributes are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeChanges {
    /// Physical type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<Change<ColumnType>>,
    /// Length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<Change<Option<u32>>>,
    /// Required flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Change<bool>>,
    /// Unique flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique: Option<Change<bool>>,
    /// Default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Change<Option<DefaultValue>>>,
    /// Decimal precision.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<Change<Option<u32>>>,
    /// Nullable flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<Change<bool>>,
}

impl AttributeChanges {
    /// Compares a live column with its target definition.
    #[must_use]
    pub fn between(current: &ColumnDefinition, target: &ColumnDefinition) -> Self {
        let ty = target.column_type;
        let rendered = |d: &Option<DefaultValue>| d.as_ref().map(DefaultValue::to_sql);
        Self {
            column_type: Change::between(current.column_type, target.column_type),
            length: if ty.supports_length() {
                Change::between(current.length, target.length)
            } else {
                None
            },
            required: Change::between(!current.nullable, !target.nullable),
            unique: Change::between(current.unique, target.unique),
            default: (rendered(&current.default) != rendered(&target.default)).then(|| Change {
                from: current.default.clone(),
                to: target.default.clone(),
            }),
            precision: if ty.supports_precision() {
                Change::between(current.precision, target.precision)
            } else {
                None
            },
            nullable: Change::between(current.nullable, target.nullable),
        }
    }

    /// Returns true if no attribute differs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.column_type.is_none()
            && self.length.is_none()
            && self.required.is_none()
            && self.unique.is_none()
            && self.default.is_none()
            && self.precision.is_none()
            && self.nullable.is_none()
    }
}

/// An added or removed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnChange {
    /// Column name.
    pub fieldname: String,
    /// Full column definition.
    pub column: ColumnDefinition,
    /// True for removals.
    pub destructive: bool,
    /// Originating field, for additions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<Field>,
}

/// A column whose attributes differ.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// Column name.
    pub fieldname: String,
    /// Differing attributes.
    pub changes: AttributeChanges,
    /// Set whenever the type changes.
    pub requires_data_migration: bool,
    /// Set when the change can lose data.
    pub destructive: bool,
    /// Target definition.
    pub column: ColumnDefinition,
    /// Live definition.
    pub original: ColumnDefinition,
    /// Originating field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<Field>,
}

/// An added or removed index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexChange {
    /// Index name.
    pub name: String,
    /// Full index definition.
    pub index: IndexDefinition,
    /// Whether the change can lose data.
    pub destructive: bool,
}

/// A renamed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRename {
    /// Live name.
    pub from: String,
    /// Target name.
    pub to: String,
    /// Target definition, carrying the new name.
    pub column: ColumnDefinition,
}

/// Differences between a logical schema and its live table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaDiff {
    /// Logical schema name.
    pub schema: String,
    /// Live table name.
    pub table_name: String,
    /// Columns only in the logical schema.
    pub added_columns: Vec<ColumnChange>,
    /// Columns only in the live table.
    pub removed_columns: Vec<ColumnChange>,
    /// Columns in both with differing attributes.
    pub modified_columns: Vec<FieldChange>,
    /// Indexes only in the logical schema.
    pub added_indexes: Vec<IndexChange>,
    /// Indexes only in the live table.
    pub removed_indexes: Vec<IndexChange>,
    /// Columns renamed through `renamed_from`.
    pub renamed_columns: Vec<ColumnRename>,
    /// Live columns and indexes the diff was computed against.
    pub current: TableState,
}

impl SchemaDiff {
    /// Creates an empty diff for a table.
    #[must_use]
    pub fn new(schema: impl Into<String>, table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        Self {
            schema: schema.into(),
            current: TableState::new(table_name.clone(), Vec::new(), Vec::new()),
            table_name,
            ..Self::default()
        }
    }

    /// Returns true if every bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.removed_columns.is_empty()
            && self.modified_columns.is_empty()
            && self.added_indexes.is_empty()
            && self.removed_indexes.is_empty()
            && self.renamed_columns.is_empty()
    }

    /// Returns true if any change can lose data.
    #[must_use]
    pub fn has_destructive_changes(&self) -> bool {
        self.removed_columns.iter().any(|c| c.destructive)
            || self.modified_columns.iter().any(|c| c.destructive)
            || self.removed_indexes.iter().any(|c| c.destructive)
    }

    /// Number of changes across all buckets.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.added_columns.len()
            + self.removed_columns.len()
            + self.modified_columns.len()
            + self.added_indexes.len()
            + self.removed_indexes.len()
            + self.renamed_columns.len()
    }
}

fn same_index_shape(a: &IndexDefinition, b: &IndexDefinition) -> bool {
    a.columns == b.columns
        && a.unique == b.unique
        && a.predicate.as_deref().map(str::trim) == b.predicate.as_deref().map(str::trim)
}

/// Computes [`SchemaDiff`]s. Pure and synchronous.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiffer {
    formatter: SqlFormatter,
    mapper: TypeMapper,
    constraints: ConstraintBuilder,
    indexes: IndexBuilder,
}

impl SchemaDiffer {
    /// Creates a differ.
    #[must_use]
    pub fn new(
        formatter: SqlFormatter,
        mapper: TypeMapper,
        constraints: ConstraintBuilder,
        indexes: IndexBuilder,
    ) -> Self {
        Self {
            formatter,
            mapper,
            constraints,
            indexes,
        }
    }

    /// Table name a logical schema resolves to.
    #[must_use]
    pub fn table_name(&self, schema: &LogicalSchema) -> String {
        self.formatter.table_name(schema)
    }

    /// Checks a logical schema for internal consistency.
    pub fn validate(&self, schema: &LogicalSchema) -> Result<(), CompareError> {
        let invalid = |message: String| CompareError::SchemaValidation {
            schema: schema.name.clone(),
            message,
        };
        if schema.name.trim().is_empty() {
            return Err(invalid("schema name is empty".to_string()));
        }
        let mut seen = HashSet::new();
        for field in schema.data_fields() {
            if field.name.trim().is_empty() {
                return Err(invalid("field name is empty".to_string()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(invalid(format!("duplicate field `{}`", field.name)));
            }
        }
        if seen.is_empty() {
            return Err(invalid("schema has no data fields".to_string()));
        }
        Ok(())
    }

    /// Diffs a logical schema against its live table.
    pub fn diff(&self, schema: &LogicalSchema, live: &LiveTable) -> Result<SchemaDiff, CompareError> {
        self.validate(schema)?;
        let table = self.table_name(schema);
        if live.columns.is_empty() {
            return Err(CompareError::TableNotFound {
                schema: schema.name.clone(),
                table,
            });
        }

        let mut current = TableState::from_live(live);
        let mut diff = SchemaDiff::new(&schema.name, &table);

        let mut targets = Vec::new();
        for field in schema.data_fields() {
            let column = self
                .constraints
                .resolve_column(&self.mapper, field)
                .map_err(|source| CompareError::FieldComparison {
                    schema: schema.name.clone(),
                    field: field.name.clone(),
                    source,
                })?;
            targets.push((field, column));
        }

        let live_columns: HashMap<&str, &ColumnDefinition> =
            current.columns.iter().map(|c| (c.name.as_str(), c)).collect();
        let target_names: HashSet<&str> = targets.iter().map(|(f, _)| f.name.as_str()).collect();

        let mut renamed_sources = HashSet::new();
        for (field, column) in &targets {
            if live_columns.contains_key(field.name.as_str()) {
                continue;
            }
            let source = field
                .renamed_from
                .as_deref()
                .filter(|old| live_columns.contains_key(old) && !target_names.contains(old));
            match source {
                Some(old) => {
                    renamed_sources.insert(old);
                    diff.renamed_columns.push(ColumnRename {
                        from: old.to_string(),
                        to: field.name.clone(),
                        column: column.clone(),
                    });
                }
                None => diff.added_columns.push(ColumnChange {
                    fieldname: field.name.clone(),
                    column: column.clone(),
                    destructive: false,
                    field: Some((*field).clone()),
                }),
            }
        }

        let mut unchanged = Vec::new();
        for (field, column) in &targets {
            let Some(original) = live_columns.get(field.name.as_str()) else {
                continue;
            };
            let changes = AttributeChanges::between(original, column);
            if changes.is_empty() {
                unchanged.push(column.clone());
                continue;
            }
            diff.modified_columns.push(FieldChange {
                fieldname: field.name.clone(),
                requires_data_migration: changes.column_type.is_some(),
                destructive: original.narrows_to(column),
                changes,
                column: column.clone(),
                original: (*original).clone(),
                field: Some((*field).clone()),
            });
        }

        for column in &current.columns {
            let name = column.name.as_str();
            if !target_names.contains(name) && !renamed_sources.contains(name) {
                diff.removed_columns.push(ColumnChange {
                    fieldname: column.name.clone(),
                    column: column.clone(),
                    destructive: true,
                    field: None,
                });
            }
        }

        current.adopt(&unchanged);
        current.checks.retain(|live| {
            !targets
                .iter()
                .filter_map(|(_, column)| column.check.as_deref())
                .any(|check| same_check(check, live))
        });

        self.diff_indexes(schema, &table, &current, &mut diff)?;
        diff.current = current;
        Ok(diff)
    }

    fn diff_indexes(
        &self,
        schema: &LogicalSchema,
        table: &str,
        current: &TableState,
        diff: &mut SchemaDiff,
    ) -> Result<(), CompareError> {
        let mut wanted = Vec::with_capacity(schema.indexes.len());
        for spec in &schema.indexes {
            let index = self
                .indexes
                .build_index_definition(table, spec)
                .map_err(|source| CompareError::IndexComparison {
                    schema: schema.name.clone(),
                    index: spec.name.clone().unwrap_or_default(),
                    source,
                })?;
            wanted.push(index);
        }

        let live: HashMap<&str, &IndexDefinition> =
            current.indexes.iter().map(|i| (i.name.as_str(), i)).collect();
        let wanted_by_name: HashMap<&str, &IndexDefinition> =
            wanted.iter().map(|i| (i.name.as_str(), i)).collect();

        for index in &current.indexes {
            let keep = wanted_by_name
                .get(index.name.as_str())
                .is_some_and(|w| same_index_shape(w, index));
            if !keep {
                diff.removed_indexes.push(IndexChange {
                    name: index.name.clone(),
                    index: index.clone(),
                    destructive: false,
                });
            }
        }
        for index in &wanted {
            let exists = live
                .get(index.name.as_str())
                .is_some_and(|l| same_index_shape(l, index));
            if !exists {
                diff.added_indexes.push(IndexChange {
                    name: index.name.clone(),
                    index: index.clone(),
                    destructive: false,
                });
            }
        }
        Ok(())
    }
}
