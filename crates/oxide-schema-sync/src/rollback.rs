//! Rollback derivation.
//!
//! The inverse of a forward list is built by walking it backwards and
//! inverting each statement's [`StatementAction`]. SQL text is never parsed.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dialect::{MigrationDialect, SqliteDialect};
use crate::error::{GenerateError, Result};
use crate::statement::{RowSnapshot, SqlStatement, StatementAction, StatementKind};

/// What to do with statements that cannot be inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackMode {
    /// Skip them and report them in [`RollbackPlan::skipped`].
    #[default]
    Lenient,
    /// Fail with [`GenerateError::RollbackUnavailable`].
    Strict,
}

/// A forward statement without a rollback entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStatement {
    /// Position in the forward list.
    pub position: usize,
    /// Why no inverse was produced.
    pub reason: String,
}

/// Rollback statements plus what could not be inverted.
#[derive(Debug, Clone, Default)]
pub struct RollbackPlan {
    /// Rollback statements in execution order.
    pub statements: Vec<SqlStatement>,
    /// Forward statements that produced no entry or only a placeholder.
    pub skipped: Vec<SkippedStatement>,
}

enum Inverse {
    Action(StatementAction),
    Placeholder(SqlStatement, String),
}

/// Derives rollback statements.
#[derive(Debug, Clone, Default)]
pub struct RollbackGenerator<D = SqliteDialect> {
    dialect: D,
    mode: RollbackMode,
}

impl<D: MigrationDialect> RollbackGenerator<D> {
    /// Creates a generator.
    #[must_use]
    pub fn new(dialect: D, mode: RollbackMode) -> Self {
        Self { dialect, mode }
    }

    /// Returns the mode.
    #[must_use]
    pub fn mode(&self) -> RollbackMode {
        self.mode
    }

    /// Returns the rollback statements for a forward list.
    pub fn generate_rollback_migration(&self, forward: &[SqlStatement]) -> Result<Vec<SqlStatement>> {
        Ok(self.plan(forward)?.statements)
    }

    /// Returns the rollback statements together with the forward entries
    /// that could not be inverted.
    pub fn plan(&self, forward: &[SqlStatement]) -> Result<RollbackPlan> {
        let mut plan = RollbackPlan::default();

        for (position, stmt) in forward.iter().enumerate().rev() {
            match self.invert(stmt) {
                Ok(Inverse::Action(action)) => {
                    let comment = stmt.comment.as_ref().map(|c| format!("Revert: {c}"));
                    let inverse = self
                        .dialect
                        .statement(action, comment)?
                        .with_field(stmt.field.clone());
                    plan.statements.push(inverse);
                }
                Ok(Inverse::Placeholder(inverse, reason)) => {
                    warn!(position, reason = %reason, "rollback entry is a placeholder");
                    plan.statements.push(inverse);
                    plan.skipped.push(SkippedStatement { position, reason });
                }
                Err(reason) => {
                    if self.mode == RollbackMode::Strict {
                        return Err(GenerateError::RollbackUnavailable { position, reason });
                    }
                    warn!(position, reason = %reason, "no rollback entry for statement");
                    plan.skipped.push(SkippedStatement { position, reason });
                }
            }
        }

        debug!(
            forward = forward.len(),
            rollback = plan.statements.len(),
            skipped = plan.skipped.len(),
            "rollback generated"
        );
        Ok(plan)
    }

    fn invert(&self, stmt: &SqlStatement) -> std::result::Result<Inverse, String> {
        if stmt.is_blank() {
            return Err("statement has no SQL text".to_string());
        }
        let action = stmt
            .action
            .as_ref()
            .ok_or_else(|| "statement carries no structured action".to_string())?;

        let inverse = match action {
            StatementAction::CreateTable { table, columns } => StatementAction::DropTable {
                table: table.clone(),
                columns: Some(columns.clone()),
            },

            StatementAction::DropTable { table, columns } => match columns {
                Some(columns) => StatementAction::CreateTable {
                    table: table.clone(),
                    columns: columns.clone(),
                },
                None => return self.missing_table_definition(table),
            },

            StatementAction::RenameTable { from, to } => StatementAction::RenameTable {
                from: to.clone(),
                to: from.clone(),
            },

            StatementAction::AddColumn { table, column } => StatementAction::DropColumn {
                table: table.clone(),
                column: column.name.clone(),
                definition: Some(column.clone()),
            },

            StatementAction::DropColumn {
                table,
                column,
                definition,
            } => StatementAction::AddColumn {
                table: table.clone(),
                column: definition
                    .clone()
                    .ok_or_else(|| format!("definition of dropped column `{column}` is unknown"))?,
            },

            StatementAction::CreateIndex { index } => StatementAction::DropIndex {
                name: index.name.clone(),
                table: index.table.clone(),
                definition: Some(index.clone()),
            },

            StatementAction::DropIndex {
                name, definition, ..
            } => StatementAction::CreateIndex {
                index: definition
                    .clone()
                    .ok_or_else(|| format!("definition of dropped index `{name}` is unknown"))?,
            },

            StatementAction::CopyRows {
                from_table,
                to_table,
                columns,
            } => StatementAction::CopyRows {
                from_table: to_table.clone(),
                to_table: from_table.clone(),
                columns: columns.iter().map(|c| c.reversed()).collect(),
            },

            StatementAction::InsertRows {
                table,
                columns,
                rows,
            } => {
                let key = columns
                    .first()
                    .ok_or_else(|| "insert has no columns".to_string())?;
                let keys: Vec<&str> = rows
                    .iter()
                    .filter_map(|r| r.first().map(String::as_str))
                    .collect();
                StatementAction::DeleteRows {
                    table: table.clone(),
                    predicate: Some(format!(
                        "{} IN ({})",
                        self.dialect.formatter().quote_identifier(key),
                        keys.join(", ")
                    )),
                    snapshot: Some(RowSnapshot {
                        columns: columns.clone(),
                        rows: rows.clone(),
                    }),
                }
            }

            StatementAction::DeleteRows {
                table, snapshot, ..
            } => {
                let snapshot = snapshot
                    .as_ref()
                    .ok_or_else(|| format!("deleted rows of `{table}` were not captured"))?;
                StatementAction::InsertRows {
                    table: table.clone(),
                    columns: snapshot.columns.clone(),
                    rows: snapshot.rows.clone(),
                }
            }

            StatementAction::UpdateRows {
                table,
                assignments,
                previous,
                predicate,
            } => StatementAction::UpdateRows {
                table: table.clone(),
                assignments: previous
                    .clone()
                    .ok_or_else(|| format!("previous values of the update on `{table}` are unknown"))?,
                previous: Some(assignments.clone()),
                predicate: predicate.clone(),
            },
        };
        Ok(Inverse::Action(inverse))
    }

    fn missing_table_definition(&self, table: &str) -> std::result::Result<Inverse, String> {
        let reason = format!("definition of dropped table `{table}` is unknown");
        if self.mode == RollbackMode::Strict {
            return Err(reason);
        }
        let formatter = self.dialect.formatter();
        let sql = format!(
            "CREATE TABLE {} (/* schema not available */)",
            formatter.quote_identifier(table)
        );
        let mut placeholder = SqlStatement::raw(formatter.finish(&sql, None), StatementKind::CreateTable);
        placeholder.table = Some(table.to_string());
        Ok(Inverse::Placeholder(placeholder, reason))
    }
}
