//! Table rebuild emulation of column changes.
//!
//! SQLite cannot drop, retype or rename a column in place. Each of those
//! changes becomes a rebuild:
//!
//! 1. `CREATE TABLE <temp>` with the target column list
//! 2. `INSERT INTO <temp> (...) SELECT ... FROM <table>`
//! 3. `DROP INDEX` for every index of the table (when preserving indexes)
//! 4. `DROP TABLE <table>`
//! 5. `ALTER TABLE <temp> RENAME TO <table>`
//! 6. `CREATE INDEX` for every index that survives the change
//!
//! Steps 3 and 6 are skipped for tables without indexes, so a plain
//! rebuild is exactly four statements.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dialect::{MigrationDialect, SqliteDialect};
use crate::error::{GenerateError, Result};
use crate::schema::{Affinity, ColumnDefinition, IndexDefinition, LiveTable};
use crate::statement::{ColumnCopy, SqlStatement, StatementAction};

/// Execution hint for the data copy. It does not change the emitted SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyStrategy {
    /// Copy in chunks of `batch_size` rows.
    #[default]
    Batch,
    /// Copy with a single statement.
    Single,
    /// Stream rows through a cursor.
    Cursor,
}

/// How table rebuilds are performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableRebuildStrategy {
    /// Build into a temp table and copy data. When disabled the table is
    /// dropped and recreated empty.
    pub use_temp_table: bool,
    /// Temp table name pattern; `{table}` and `{timestamp}` are replaced.
    pub temp_table_pattern: String,
    /// Copy execution hint.
    pub copy_strategy: CopyStrategy,
    /// Rows per batch for [`CopyStrategy::Batch`].
    pub batch_size: usize,
    /// Drop the original and rename the temp table into place.
    pub drop_original: bool,
    /// Produce a row-count verification query.
    pub verify_row_count: bool,
    /// Recreate the table's indexes after the swap.
    pub preserve_indexes: bool,
    /// Keep foreign key references in the rebuilt table.
    pub preserve_foreign_keys: bool,
    /// Ask for triggers to be carried over.
    pub preserve_triggers: bool,
}

impl Default for TableRebuildStrategy {
    fn default() -> Self {
        Self {
            use_temp_table: true,
            temp_table_pattern: "{table}_temp_{timestamp}".to_string(),
            copy_strategy: CopyStrategy::Batch,
            batch_size: 1000,
            drop_original: true,
            verify_row_count: false,
            preserve_indexes: true,
            preserve_foreign_keys: true,
            preserve_triggers: false,
        }
    }
}

/// Columns and indexes of a table as known at one point of a migration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableState {
    /// Table name.
    pub table: String,
    /// Columns in order.
    pub columns: Vec<ColumnDefinition>,
    /// Indexes.
    pub indexes: Vec<IndexDefinition>,
    /// Live CHECK expressions no column definition restates.
    #[serde(default)]
    pub checks: Vec<String>,
    /// Live UNIQUE constraints spanning several columns.
    #[serde(default)]
    pub unique_constraints: Vec<Vec<String>>,
}

impl TableState {
    /// Creates a state.
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        columns: Vec<ColumnDefinition>,
        indexes: Vec<IndexDefinition>,
    ) -> Self {
        Self {
            table: table.into(),
            columns,
            indexes,
            checks: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    /// Builds the state of an introspected table. Implicit indexes are not
    /// kept as indexes; the multi-column UNIQUE constraints behind them are
    /// recorded in `unique_constraints`.
    #[must_use]
    pub fn from_live(live: &LiveTable) -> Self {
        let key: Vec<&str> = live
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();
        let unique_constraints = live
            .indexes
            .iter()
            .filter(|i| i.implicit && i.unique && i.columns.len() > 1)
            .map(|i| i.columns.iter().map(|c| c.name.clone()).collect::<Vec<_>>())
            .filter(|names| !names.iter().all(|n| key.contains(&n.as_str())))
            .collect();
        Self {
            table: live.table.clone(),
            columns: live.columns.iter().map(ColumnDefinition::from_live).collect(),
            indexes: live
                .indexes
                .iter()
                .filter(|i| !i.implicit)
                .map(|i| IndexDefinition::from_live(&live.table, i))
                .collect(),
            checks: live.checks.clone(),
            unique_constraints,
        }
    }

    /// Replaces live columns with their resolved target definitions.
    ///
    /// Primary key and auto-increment flags stay as introspected; a
    /// reference or collation only the live column knows is kept.
    pub fn adopt(&mut self, targets: &[ColumnDefinition]) {
        for column in &mut self.columns {
            let Some(target) = targets.iter().find(|t| t.name == column.name) else {
                continue;
            };
            let mut adopted = target.clone();
            adopted.primary_key = column.primary_key;
            adopted.auto_increment = column.auto_increment;
            if adopted.foreign_key.is_none() {
                adopted.foreign_key = column.foreign_key.take();
            }
            if adopted.collation.is_none() {
                adopted.collation = column.collation.take();
            }
            *column = adopted;
        }
    }

    /// Returns a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns true if a column of that name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }
}

/// Statements and bookkeeping produced by one rebuild.
#[derive(Debug, Clone)]
pub struct TableRebuild {
    /// Statements in execution order.
    pub statements: Vec<SqlStatement>,
    /// Temp table name, if one is used.
    pub temp_table: Option<String>,
    /// Row-count verification query, to run between the copy and the drop.
    pub verification: Option<String>,
    /// Warnings about data or objects the rebuild cannot carry over.
    pub warnings: Vec<String>,
    /// Table state after the rebuild.
    pub state: TableState,
}

enum Change<'a> {
    Drop(&'a str),
    Modify(&'a ColumnDefinition),
    Rename {
        from: &'a str,
        target: &'a ColumnDefinition,
    },
}

impl Change<'_> {
    fn column(&self) -> &str {
        match self {
            Self::Drop(name) => name,
            Self::Modify(target) => &target.name,
            Self::Rename { from, .. } => from,
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Self::Drop(_) => "drop",
            Self::Modify(_) => "modify",
            Self::Rename { .. } => "rename",
        }
    }
}

/// Returns the type a value must be cast to when moving between the two
/// columns, or `None` when no conversion applies.
#[must_use]
pub fn conversion_cast(from: &ColumnDefinition, to: &ColumnDefinition) -> Option<String> {
    use Affinity::{Integer, Numeric, Real, Text};

    let pair = (from.column_type.affinity(), to.column_type.affinity());
    match pair {
        (Integer, Text)
        | (Text, Integer)
        | (Real, Integer)
        | (Integer, Real)
        | (Real, Text)
        | (Text, Real)
        | (Numeric, Text)
        | (Text, Numeric)
        | (Numeric, Integer)
        | (Integer, Numeric)
        | (Numeric, Real)
        | (Real, Numeric) => Some(to.sql_type()),
        _ => None,
    }
}

/// Emits rebuild sequences for column changes.
#[derive(Debug, Clone, Default)]
pub struct TableRebuilder<D = SqliteDialect> {
    dialect: D,
    strategy: TableRebuildStrategy,
}

impl<D: MigrationDialect> TableRebuilder<D> {
    /// Creates a rebuilder.
    #[must_use]
    pub fn new(dialect: D, strategy: TableRebuildStrategy) -> Self {
        Self { dialect, strategy }
    }

    /// Returns the strategy.
    #[must_use]
    pub fn strategy(&self) -> &TableRebuildStrategy {
        &self.strategy
    }

    /// Generates a temp table name from the pattern, the current time and a
    /// random suffix.
    #[must_use]
    pub fn temp_table_name(&self, table: &str) -> String {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let suffix = rand::random::<u32>() & 0x00ff_ffff;
        let base = self
            .strategy
            .temp_table_pattern
            .replace("{table}", table)
            .replace("{timestamp}", &timestamp);
        format!("{base}_{suffix:06x}")
    }

    /// Rebuilds the table without `column`.
    pub fn rebuild_drop_column(&self, state: &TableState, column: &str) -> Result<TableRebuild> {
        self.rebuild(state, &Change::Drop(column))
    }

    /// Rebuilds the table with the column named like `target` replaced by
    /// `target`.
    pub fn rebuild_modify_column(
        &self,
        state: &TableState,
        target: &ColumnDefinition,
    ) -> Result<TableRebuild> {
        self.rebuild(state, &Change::Modify(target))
    }

    /// Rebuilds the table with column `from` replaced by `target`, which
    /// carries the new name.
    pub fn rebuild_rename_column(
        &self,
        state: &TableState,
        from: &str,
        target: &ColumnDefinition,
    ) -> Result<TableRebuild> {
        self.rebuild(state, &Change::Rename { from, target })
    }

    fn invalid(&self, table: &str, message: impl Into<String>) -> GenerateError {
        GenerateError::InvalidRebuild {
            table: table.to_string(),
            message: message.into(),
        }
    }

    fn validate(&self, state: &TableState, change: &Change<'_>) -> Result<()> {
        let table = state.table.as_str();
        if table.trim().is_empty() {
            return Err(self.invalid(table, "table name is empty"));
        }
        let column = change.column();
        if column.trim().is_empty() {
            return Err(self.invalid(table, "column name is empty"));
        }
        if !state.has_column(column) {
            return Err(self.invalid(table, format!("column `{column}` does not exist")));
        }
        match change {
            Change::Drop(_) if state.columns.len() == 1 => {
                Err(self.invalid(table, format!("cannot drop `{column}`, the only column")))
            }
            Change::Rename { from, target } => {
                if target.name.trim().is_empty() {
                    return Err(self.invalid(table, "column name is empty"));
                }
                if target.name != *from && state.has_column(&target.name) {
                    return Err(GenerateError::ColumnNameConflict {
                        table: table.to_string(),
                        column: target.name.clone(),
                        message: format!("cannot rename `{from}`, the column already exists"),
                    });
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Target columns and the copy mapping filling them.
    fn plan_columns(
        &self,
        state: &TableState,
        change: &Change<'_>,
        warnings: &mut Vec<String>,
    ) -> (Vec<ColumnDefinition>, Vec<ColumnCopy>) {
        let mut columns = Vec::with_capacity(state.columns.len());
        let mut copies = Vec::with_capacity(state.columns.len());

        for current in &state.columns {
            let target = match change {
                Change::Drop(name) if current.name == *name => continue,
                Change::Modify(target) if current.name == target.name => *target,
                Change::Rename { from, target } if current.name == *from => *target,
                _ => {
                    columns.push(current.clone());
                    copies.push(ColumnCopy::same(&current.name));
                    continue;
                }
            };

            let mut copy = ColumnCopy::renamed(&current.name, &target.name);
            copy.cast = conversion_cast(current, target);
            copy.reverse_cast = conversion_cast(target, current);
            if current.nullable && !target.nullable {
                match target.default.as_ref() {
                    Some(default) => copy.fallback = Some(default.to_sql()),
                    None => warnings.push(format!(
                        "Column `{}` becomes NOT NULL without a default; existing NULL values in `{}` will make the copy fail",
                        target.name, state.table
                    )),
                }
            }
            columns.push(target.clone());
            copies.push(copy);
        }

        if !self.strategy.preserve_foreign_keys {
            for column in &mut columns {
                if let Some(fk) = column.foreign_key.take() {
                    warnings.push(format!(
                        "Foreign key `{}` -> `{}` is not carried over by the rebuild of `{}`",
                        column.name, fk.table, state.table
                    ));
                }
            }
        }

        (columns, copies)
    }

    /// Indexes that survive the change, rewritten for renamed columns.
    fn surviving_indexes(
        &self,
        state: &TableState,
        change: &Change<'_>,
        columns: &[ColumnDefinition],
        warnings: &mut Vec<String>,
    ) -> Vec<IndexDefinition> {
        let mut out = Vec::new();
        for index in &state.indexes {
            let mut index = index.clone();
            match change {
                Change::Drop(name) if index.column_names().any(|c| c == *name) => {
                    warnings.push(format!(
                        "Index `{}` is removed together with column `{name}`",
                        index.name
                    ));
                    continue;
                }
                Change::Rename { from, target } => {
                    for col in &mut index.columns {
                        if col.name == *from {
                            col.name.clone_from(&target.name);
                        }
                    }
                }
                _ => {}
            }
            let unindexable = index.column_names().find(|name| {
                columns
                    .iter()
                    .any(|c| c.name == *name && !c.column_type.can_be_indexed())
            });
            if let Some(name) = unindexable {
                warnings.push(format!(
                    "Index `{}` is not recreated, column `{name}` can no longer be indexed",
                    index.name
                ));
                continue;
            }
            out.push(index);
        }
        out
    }

    fn rebuild(&self, state: &TableState, change: &Change<'_>) -> Result<TableRebuild> {
        self.validate(state, change)?;
        let table = state.table.as_str();
        let column = change.column();

        let mut warnings = Vec::new();
        let (columns, copies) = self.plan_columns(state, change, &mut warnings);
        let indexes = self.surviving_indexes(state, change, &columns, &mut warnings);

        let destructive = match change {
            Change::Drop(_) => true,
            Change::Modify(target) => state
                .column(column)
                .is_some_and(|current| current.narrows_to(target)),
            Change::Rename { .. } => false,
        };

        for check in &state.checks {
            warnings.push(format!(
                "CHECK ({check}) on `{table}` is not carried over by the rebuild"
            ));
        }
        for names in &state.unique_constraints {
            warnings.push(format!(
                "UNIQUE ({}) on `{table}` is not carried over by the rebuild",
                names.join(", ")
            ));
        }
        if self.strategy.preserve_triggers {
            warnings.push(format!(
                "Triggers on `{table}` are not carried over by the rebuild and must be recreated"
            ));
        }
        if !self.strategy.preserve_indexes && !state.indexes.is_empty() {
            warnings.push(format!(
                "Indexes of `{table}` are not recreated after the rebuild"
            ));
        }

        let mut statements = Vec::new();
        let mut temp_table = None;
        let mut verification = None;
        let final_indexes = if self.strategy.preserve_indexes {
            indexes.clone()
        } else {
            Vec::new()
        };

        if self.strategy.use_temp_table {
            let temp = self.temp_table_name(table);
            debug!(table = %table, column = %column, temp = %temp, change = change.verb(), "rebuilding table");

            statements.push(self.dialect.statement(
                StatementAction::CreateTable {
                    table: temp.clone(),
                    columns: columns.clone(),
                },
                Some(format!("Rebuild `{table}` to {} column `{column}`", change.verb())),
            )?);
            statements.push(self.dialect.statement(
                StatementAction::CopyRows {
                    from_table: table.to_string(),
                    to_table: temp.clone(),
                    columns: copies,
                },
                Some(format!("Copy rows of `{table}`")),
            )?);

            if self.strategy.verify_row_count {
                let f = self.dialect.formatter();
                verification = Some(format!(
                    "SELECT (SELECT COUNT(*) FROM {}) = (SELECT COUNT(*) FROM {}) AS row_count_matches",
                    f.quote_identifier(table),
                    f.quote_identifier(&temp)
                ));
            }

            if self.strategy.drop_original {
                if self.strategy.preserve_indexes {
                    statements.extend(self.drop_indexes(state)?);
                }
                statements.push(
                    self.dialect
                        .statement(
                            StatementAction::DropTable {
                                table: table.to_string(),
                                columns: Some(state.columns.clone()),
                            },
                            Some(format!("Replace `{table}` with the rebuilt table")),
                        )?
                        .destructive(destructive),
                );
                statements.push(self.dialect.statement(
                    StatementAction::RenameTable {
                        from: temp.clone(),
                        to: table.to_string(),
                    },
                    None,
                )?);
                statements.extend(self.create_indexes(&final_indexes)?);
            } else {
                warnings.push(format!(
                    "Original table `{table}` is kept; the new layout lives in `{temp}`"
                ));
            }
            temp_table = Some(temp);
        } else {
            warn!(table = %table, column = %column, "rebuilding without temp table, data is not preserved");
            warnings.push(format!(
                "Table `{table}` is recreated without copying data; all rows are lost"
            ));
            if self.strategy.preserve_indexes {
                statements.extend(self.drop_indexes(state)?);
            }
            statements.push(self.dialect.statement(
                StatementAction::DropTable {
                    table: table.to_string(),
                    columns: Some(state.columns.clone()),
                },
                None,
            )?);
            statements.push(self.dialect.statement(
                StatementAction::CreateTable {
                    table: table.to_string(),
                    columns: columns.clone(),
                },
                None,
            )?);
            statements.extend(self.create_indexes(&final_indexes)?);
        }

        let state = if temp_table.is_some() && !self.strategy.drop_original {
            state.clone()
        } else {
            TableState::new(table, columns, final_indexes)
        };

        Ok(TableRebuild {
            statements,
            temp_table,
            verification,
            warnings,
            state,
        })
    }

    fn drop_indexes(&self, state: &TableState) -> Result<Vec<SqlStatement>> {
        state
            .indexes
            .iter()
            .map(|index| {
                self.dialect.statement(
                    StatementAction::DropIndex {
                        name: index.name.clone(),
                        table: index.table.clone(),
                        definition: Some(index.clone()),
                    },
                    None,
                )
            })
            .collect()
    }

    fn create_indexes(&self, indexes: &[IndexDefinition]) -> Result<Vec<SqlStatement>> {
        indexes
            .iter()
            .map(|index| {
                self.dialect
                    .statement(StatementAction::CreateIndex { index: index.clone() }, None)
            })
            .collect()
    }
}
