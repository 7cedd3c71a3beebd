//! Migration SQL generation.
//!
//! [`SqlGenerator`] turns a [`SchemaDiff`] into forward statements, derives
//! the rollback once over the complete forward list and collects warnings,
//! destructiveness and a coarse time estimate.
//!
//! Buckets are processed in a fixed order so every step sees the table as
//! the previous steps left it:
//!
//! 1. removed indexes
//! 2. added columns
//! 3. removed columns (rebuild)
//! 4. modified columns (rebuild)
//! 5. renamed columns (rebuild)
//! 6. added indexes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::diff::SchemaDiff;
use crate::dialect::{MigrationDialect, SqliteDialect};
use crate::error::{GenerateError, Result};
use crate::field::Field;
use crate::rebuild::{CopyStrategy, TableRebuild, TableRebuildStrategy, TableRebuilder, TableState};
use crate::rollback::{RollbackGenerator, RollbackMode, SkippedStatement};
use crate::statement::{SqlStatement, StatementAction};

/// How foreign keys are treated when a table is rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyMode {
    /// Rebuilt tables lose their foreign keys.
    Drop,
    /// Rebuilt tables keep their foreign keys.
    #[default]
    Preserve,
    /// Like `Preserve`, and the rebuilt table's references are re-checked.
    Recreate,
}

/// Execution hints recorded with a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Copy strategy of table rebuilds.
    pub copy_strategy: CopyStrategy,
    /// Rows per copy batch.
    pub batch_size: usize,
    /// Foreign key handling during rebuilds.
    pub foreign_keys: ForeignKeyMode,
    /// Rollback derivation mode.
    pub rollback_mode: RollbackMode,
    /// Whether row counts are verified after each copy.
    pub verify_row_count: bool,
}

/// Metadata of a generated migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationMetadata {
    /// Unique id.
    pub id: String,
    /// Migration name.
    pub name: String,
    /// Generator version.
    pub version: String,
    /// Generation time.
    pub timestamp: DateTime<Utc>,
    /// The diff the migration was generated from.
    pub diff: SchemaDiff,
    /// Execution hints.
    pub execution: ExecutionOptions,
    /// Queries to run after the forward statements; each returns a single
    /// truthy value when the migration preserved the data it should have.
    #[serde(default)]
    pub verification_queries: Vec<String>,
    /// Forward statements without a real rollback entry.
    #[serde(default)]
    pub skipped_rollback: Vec<SkippedStatement>,
}

/// A complete migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSql {
    /// Forward statements in execution order.
    pub forward: Vec<SqlStatement>,
    /// Rollback statements in execution order.
    pub rollback: Vec<SqlStatement>,
    /// Whether any forward statement can lose data.
    pub destructive: bool,
    /// Human-readable warnings.
    pub warnings: Vec<String>,
    /// Estimated execution time in seconds.
    pub estimated_time: f64,
    /// Metadata.
    pub metadata: MigrationMetadata,
}

impl MigrationSql {
    /// Returns true if the migration has nothing to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Forward SQL as one script.
    #[must_use]
    pub fn forward_script(&self) -> String {
        script(&self.forward)
    }

    /// Rollback SQL as one script.
    #[must_use]
    pub fn rollback_script(&self) -> String {
        script(&self.rollback)
    }
}

fn script(statements: &[SqlStatement]) -> String {
    statements
        .iter()
        .map(|s| format!("{};", s.sql.trim_end_matches(';')))
        .collect::<Vec<_>>()
        .join("\n")
}

fn migration_id(timestamp: &DateTime<Utc>) -> String {
    format!(
        "{}_{:08x}",
        timestamp.format("%Y%m%d%H%M%S"),
        rand::random::<u32>()
    )
}

/// Accumulates forward statements while tracking the table's shape.
struct Plan {
    state: TableState,
    forward: Vec<SqlStatement>,
    warnings: Vec<String>,
    verification: Vec<String>,
}

impl Plan {
    fn absorb(&mut self, rebuild: TableRebuild, field: Option<&Field>) {
        self.forward.extend(
            rebuild
                .statements
                .into_iter()
                .map(|s| s.with_field(field.cloned())),
        );
        self.warnings.extend(rebuild.warnings);
        self.verification.extend(rebuild.verification);
        self.state = rebuild.state;
    }
}

/// Generates migrations from schema diffs.
#[derive(Debug, Clone)]
pub struct SqlGenerator<D = SqliteDialect> {
    dialect: D,
    rebuilder: TableRebuilder<D>,
    rollback: RollbackGenerator<D>,
    foreign_keys: ForeignKeyMode,
}

impl Default for SqlGenerator {
    fn default() -> Self {
        Self::new(
            SqliteDialect::new(),
            TableRebuildStrategy::default(),
            RollbackMode::default(),
            ForeignKeyMode::default(),
        )
    }
}

impl<D: MigrationDialect + Clone> SqlGenerator<D> {
    /// Creates a generator. The foreign key mode overrides the strategy's
    /// `preserve_foreign_keys`.
    #[must_use]
    pub fn new(
        dialect: D,
        mut strategy: TableRebuildStrategy,
        rollback_mode: RollbackMode,
        foreign_keys: ForeignKeyMode,
    ) -> Self {
        strategy.preserve_foreign_keys = foreign_keys != ForeignKeyMode::Drop;
        Self {
            rebuilder: TableRebuilder::new(dialect.clone(), strategy),
            rollback: RollbackGenerator::new(dialect.clone(), rollback_mode),
            dialect,
            foreign_keys,
        }
    }
}

impl<D: MigrationDialect> SqlGenerator<D> {
    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the table rebuilder.
    #[must_use]
    pub fn rebuilder(&self) -> &TableRebuilder<D> {
        &self.rebuilder
    }

    /// Returns the execution hints recorded with every migration.
    #[must_use]
    pub fn execution_options(&self) -> ExecutionOptions {
        let strategy = self.rebuilder.strategy();
        ExecutionOptions {
            copy_strategy: strategy.copy_strategy,
            batch_size: strategy.batch_size,
            foreign_keys: self.foreign_keys,
            rollback_mode: self.rollback.mode(),
            verify_row_count: strategy.verify_row_count,
        }
    }

    /// Generates forward and rollback SQL for a diff.
    pub fn generate_migration_sql(&self, diff: &SchemaDiff, name: &str) -> Result<MigrationSql> {
        let table = diff.table_name.as_str();
        let mut state = diff.current.clone();
        if state.table.is_empty() {
            state.table = table.to_string();
        }
        let mut plan = Plan {
            state,
            forward: Vec::new(),
            warnings: Vec::new(),
            verification: Vec::new(),
        };

        if !diff.is_empty() {
            debug!(table = %table, changes = diff.change_count(), "generating migration");
            self.drop_indexes(diff, &mut plan)?;
            self.add_columns(diff, &mut plan)?;
            self.drop_columns(diff, &mut plan)?;
            self.modify_columns(diff, &mut plan)?;
            self.rename_columns(diff, &mut plan)?;
            self.create_indexes(diff, &mut plan)?;
            let has_references = plan.state.columns.iter().any(|c| c.foreign_key.is_some());
            if self.foreign_keys == ForeignKeyMode::Recreate && has_references {
                let literal = self.dialect.formatter().string_literal(table);
                plan.verification.push(format!(
                    "SELECT COUNT(*) = 0 FROM pragma_foreign_key_check({literal})"
                ));
            }
        }

        let rollback = self.rollback.plan(&plan.forward)?;
        for skipped in &rollback.skipped {
            plan.warnings.push(format!(
                "Statement {} has no rollback: {}",
                skipped.position + 1,
                skipped.reason
            ));
        }

        let destructive = plan.forward.iter().any(|s| s.destructive);
        let estimated_time = plan.forward.iter().map(|s| s.kind.estimated_seconds()).sum();
        let timestamp = Utc::now();
        let migration = MigrationSql {
            destructive,
            estimated_time,
            warnings: plan.warnings,
            rollback: rollback.statements,
            metadata: MigrationMetadata {
                id: migration_id(&timestamp),
                name: name.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                timestamp,
                diff: diff.clone(),
                execution: self.execution_options(),
                verification_queries: plan.verification,
                skipped_rollback: rollback.skipped,
            },
            forward: plan.forward,
        };

        if migration.destructive {
            warn!(table = %table, migration = %name, "migration contains destructive changes");
        }
        info!(
            table = %table,
            migration = %name,
            forward = migration.forward.len(),
            rollback = migration.rollback.len(),
            "generated migration"
        );
        Ok(migration)
    }

    fn drop_indexes(&self, diff: &SchemaDiff, plan: &mut Plan) -> Result<()> {
        for change in &diff.removed_indexes {
            let stmt = self.dialect.statement(
                StatementAction::DropIndex {
                    name: change.name.clone(),
                    table: plan.state.table.clone(),
                    definition: Some(change.index.clone()),
                },
                Some(format!("Drop index `{}`", change.name)),
            )?;
            plan.forward.push(stmt.destructive(change.destructive));
            plan.state.indexes.retain(|i| i.name != change.name);
        }
        Ok(())
    }

    fn add_columns(&self, diff: &SchemaDiff, plan: &mut Plan) -> Result<()> {
        for change in &diff.added_columns {
            let column = &change.column;
            if plan.state.has_column(&column.name) {
                return Err(GenerateError::ColumnNameConflict {
                    table: plan.state.table.clone(),
                    column: column.name.clone(),
                    message: "column already exists".to_string(),
                });
            }
            if !column.nullable && column.default.is_none() {
                plan.warnings.push(format!(
                    "Column `{}` is added as NOT NULL without a default; existing rows of `{}` cannot satisfy it",
                    column.name, plan.state.table
                ));
            }
            let stmt = self.dialect.statement(
                StatementAction::AddColumn {
                    table: plan.state.table.clone(),
                    column: column.clone(),
                },
                Some(format!("Add column `{}`", column.name)),
            )?;
            plan.forward.push(stmt.with_field(change.field.clone()));
            plan.state.columns.push(column.clone());
        }
        Ok(())
    }

    fn drop_columns(&self, diff: &SchemaDiff, plan: &mut Plan) -> Result<()> {
        for change in &diff.removed_columns {
            let rebuild = self
                .rebuilder
                .rebuild_drop_column(&plan.state, &change.fieldname)?;
            plan.warnings.push(format!(
                "Dropping column `{}` from `{}` causes data loss",
                change.fieldname, plan.state.table
            ));
            plan.absorb(rebuild, change.field.as_ref());
        }
        Ok(())
    }

    fn modify_columns(&self, diff: &SchemaDiff, plan: &mut Plan) -> Result<()> {
        for change in &diff.modified_columns {
            let rebuild = self
                .rebuilder
                .rebuild_modify_column(&plan.state, &change.column)?;
            if let Some(ty) = &change.changes.column_type {
                plan.warnings.push(format!(
                    "Type conversion of column `{}` from {} to {}",
                    change.fieldname,
                    ty.from.name(),
                    ty.to.name()
                ));
            }
            if change.requires_data_migration {
                plan.warnings.push(format!(
                    "Column `{}` requires data migration; verify converted values",
                    change.fieldname
                ));
            }
            if change.destructive {
                plan.warnings.push(format!(
                    "Narrowing column `{}` may truncate or lose data",
                    change.fieldname
                ));
            }
            plan.absorb(rebuild, change.field.as_ref());
        }
        Ok(())
    }

    fn rename_columns(&self, diff: &SchemaDiff, plan: &mut Plan) -> Result<()> {
        for rename in &diff.renamed_columns {
            let rebuild =
                self.rebuilder
                    .rebuild_rename_column(&plan.state, &rename.from, &rename.column)?;
            plan.absorb(rebuild, None);
        }
        Ok(())
    }

    fn create_indexes(&self, diff: &SchemaDiff, plan: &mut Plan) -> Result<()> {
        for change in &diff.added_indexes {
            if let Some(missing) = change
                .index
                .column_names()
                .find(|c| !plan.state.has_column(c))
            {
                return Err(GenerateError::InvalidIndex {
                    table: plan.state.table.clone(),
                    index: change.name.clone(),
                    message: format!("column `{missing}` does not exist"),
                });
            }
            let stmt = self.dialect.statement(
                StatementAction::CreateIndex {
                    index: change.index.clone(),
                },
                Some(format!("Create index `{}`", change.name)),
            )?;
            plan.forward.push(stmt);
            plan.state.indexes.push(change.index.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{AttributeChanges, ColumnChange, ColumnRename, FieldChange, IndexChange};
    use crate::schema::{ColumnDefinition, ColumnType, IndexColumn, IndexDefinition};
    use crate::statement::StatementKind;

    fn state() -> TableState {
        TableState::new(
            "tabEmployee",
            vec![
                ColumnDefinition::new("name", ColumnType::Varchar)
                    .length(140)
                    .primary_key(),
                ColumnDefinition::new("age", ColumnType::Integer),
                ColumnDefinition::new("legacy_note", ColumnType::Text),
            ],
            vec![],
        )
    }

    fn diff() -> SchemaDiff {
        let mut diff = SchemaDiff::new("Employee", "tabEmployee");
        diff.current = state();
        diff
    }

    #[test]
    fn test_empty_diff() {
        let migration = SqlGenerator::default()
            .generate_migration_sql(&diff(), "noop")
            .unwrap();
        assert!(migration.is_empty());
        assert!(migration.rollback.is_empty());
        assert!(!migration.destructive);
        assert!(migration.warnings.is_empty());
        assert_eq!(migration.estimated_time, 0.0);
    }

    #[test]
    fn test_add_column_rolls_back_to_drop() {
        let mut diff = diff();
        diff.added_columns.push(ColumnChange {
            fieldname: "badge_id".into(),
            column: ColumnDefinition::new("badge_id", ColumnType::Varchar)
                .length(20)
                .not_null()
                .unique()
                .default(crate::schema::DefaultValue::String(String::new())),
            destructive: false,
            field: None,
        });
        let migration = SqlGenerator::default()
            .generate_migration_sql(&diff, "add_badge")
            .unwrap();
        assert_eq!(migration.forward.len(), 1);
        assert_eq!(migration.rollback.len(), 1);
        assert_eq!(
            migration.rollback[0].sql,
            "ALTER TABLE `tabEmployee` DROP COLUMN `badge_id`"
        );
        assert_eq!(migration.estimated_time, 2.0);
        assert!(!migration.destructive);
    }

    #[test]
    fn test_adding_existing_column_conflicts() {
        let mut diff = diff();
        diff.added_columns.push(ColumnChange {
            fieldname: "age".into(),
            column: ColumnDefinition::new("age", ColumnType::Integer),
            destructive: false,
            field: None,
        });
        let err = SqlGenerator::default()
            .generate_migration_sql(&diff, "dup")
            .unwrap_err();
        assert_eq!(err.code(), "COLUMN_NAME_CONFLICT");
    }

    #[test]
    fn test_drop_then_rename_share_table_state() {
        let mut diff = diff();
        diff.removed_columns.push(ColumnChange {
            fieldname: "legacy_note".into(),
            column: ColumnDefinition::new("legacy_note", ColumnType::Text),
            destructive: true,
            field: None,
        });
        diff.renamed_columns.push(ColumnRename {
            from: "age".into(),
            to: "years".into(),
            column: ColumnDefinition::new("years", ColumnType::Integer),
        });
        let migration = SqlGenerator::default()
            .generate_migration_sql(&diff, "reshape")
            .unwrap();

        assert_eq!(migration.forward.len(), 8);
        let second_copy = &migration.forward[5].sql;
        assert!(second_copy.contains("`age` AS `years`"));
        assert!(!second_copy.contains("legacy_note"));
        assert!(migration.destructive);
        assert!(migration
            .warnings
            .iter()
            .any(|w| w.contains("legacy_note") && w.contains("data loss")));
        assert_eq!(migration.rollback.len(), 8);
        assert!(migration.metadata.skipped_rollback.is_empty());
    }

    #[test]
    fn test_modify_warns_about_conversion() {
        let mut diff = diff();
        let original = ColumnDefinition::new("age", ColumnType::Integer);
        let column = ColumnDefinition::new("age", ColumnType::Text);
        diff.modified_columns.push(FieldChange {
            fieldname: "age".into(),
            changes: AttributeChanges::between(&original, &column),
            requires_data_migration: true,
            destructive: false,
            column,
            original,
            field: None,
        });
        let migration = SqlGenerator::default()
            .generate_migration_sql(&diff, "age_text")
            .unwrap();
        assert!(migration.forward[1].sql.contains("CAST(`age` AS TEXT)"));
        assert!(migration
            .warnings
            .iter()
            .any(|w| w.contains("Type conversion") && w.contains("INTEGER")));
        assert!(migration.warnings.iter().any(|w| w.contains("data migration")));
        assert!(!migration.destructive);
    }

    #[test]
    fn test_indexes_dropped_first_and_created_last() {
        let mut diff = diff();
        let old = IndexDefinition {
            name: "idx_age".into(),
            table: "tabEmployee".into(),
            columns: vec![IndexColumn::asc("age")],
            unique: false,
            kind: None,
            predicate: None,
        };
        diff.current.indexes.push(old.clone());
        diff.removed_indexes.push(IndexChange {
            name: "idx_age".into(),
            index: old,
            destructive: false,
        });
        let new = IndexDefinition {
            name: "idx_years".into(),
            table: "tabEmployee".into(),
            columns: vec![IndexColumn::asc("years")],
            unique: false,
            kind: None,
            predicate: None,
        };
        diff.added_indexes.push(IndexChange {
            name: "idx_years".into(),
            index: new,
            destructive: false,
        });
        diff.renamed_columns.push(ColumnRename {
            from: "age".into(),
            to: "years".into(),
            column: ColumnDefinition::new("years", ColumnType::Integer),
        });
        let migration = SqlGenerator::default()
            .generate_migration_sql(&diff, "reindex")
            .unwrap();
        let kinds: Vec<StatementKind> = migration.forward.iter().map(|s| s.kind).collect();
        assert_eq!(kinds.first(), Some(&StatementKind::DropIndex));
        assert_eq!(kinds.last(), Some(&StatementKind::CreateIndex));
        assert_eq!(kinds.len(), 6);
    }

    #[test]
    fn test_index_on_unknown_column_is_rejected() {
        let mut diff = diff();
        diff.added_indexes.push(IndexChange {
            name: "idx_ghost".into(),
            index: IndexDefinition {
                name: "idx_ghost".into(),
                table: "tabEmployee".into(),
                columns: vec![IndexColumn::asc("ghost")],
                unique: false,
                kind: None,
                predicate: None,
            },
            destructive: false,
        });
        let err = SqlGenerator::default()
            .generate_migration_sql(&diff, "ghost")
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INDEX");
    }

    #[test]
    fn test_metadata() {
        let generator = SqlGenerator::new(
            SqliteDialect::new(),
            TableRebuildStrategy {
                verify_row_count: true,
                ..TableRebuildStrategy::default()
            },
            RollbackMode::Strict,
            ForeignKeyMode::Drop,
        );
        let mut diff = diff();
        diff.removed_columns.push(ColumnChange {
            fieldname: "legacy_note".into(),
            column: ColumnDefinition::new("legacy_note", ColumnType::Text),
            destructive: true,
            field: None,
        });
        let migration = generator.generate_migration_sql(&diff, "cleanup").unwrap();
        let meta = &migration.metadata;
        assert_eq!(meta.name, "cleanup");
        assert_eq!(meta.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(meta.execution.rollback_mode, RollbackMode::Strict);
        assert_eq!(meta.execution.foreign_keys, ForeignKeyMode::Drop);
        assert_eq!(meta.verification_queries.len(), 1);
        assert_eq!(meta.diff, diff);
        assert!(!generator.rebuilder().strategy().preserve_foreign_keys);

        let json = serde_json::to_value(&migration).unwrap();
        assert_eq!(json["forward"][0]["type"], "create_table");
        assert!(migration.forward_script().ends_with(';'));
    }
}
