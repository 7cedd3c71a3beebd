//! SQLite dialect.
//!
//! SQLite cannot retype, rename or (portably) drop a column in place, so
//! those changes go through the table rebuilder. Everything else renders
//! straight from the action.

use crate::constraints::{ConstraintBuilder, ConstraintOptions};
use crate::error::{GenerateError, Result};
use crate::formatter::{FormatterOptions, SqlFormatter};
use crate::index::IndexBuilder;
use crate::schema::ColumnDefinition;
use crate::statement::{Assignment, ColumnCopy, StatementAction};

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect {
    formatter: SqlFormatter,
    constraints: ConstraintBuilder,
    indexes: IndexBuilder,
}

impl SqliteDialect {
    /// Creates a dialect with default formatting and constraint options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a dialect with explicit options.
    #[must_use]
    pub fn with_options(formatter: FormatterOptions, constraints: ConstraintOptions) -> Self {
        let formatter = SqlFormatter::new(formatter);
        Self {
            constraints: ConstraintBuilder::new(formatter.clone(), constraints),
            indexes: IndexBuilder::new(formatter.clone()),
            formatter,
        }
    }

    /// Returns the constraint builder.
    #[must_use]
    pub fn constraints(&self) -> &ConstraintBuilder {
        &self.constraints
    }

    /// Returns the index builder.
    #[must_use]
    pub fn indexes(&self) -> &IndexBuilder {
        &self.indexes
    }

    fn q(&self, name: &str) -> String {
        self.formatter.quote_identifier(name)
    }

    fn create_table_sql(&self, table: &str, columns: &[ColumnDefinition]) -> Result<String> {
        let body = self.constraints.build_table_body(table, columns)?;
        let sql = if self.formatter.options().pretty {
            format!("CREATE TABLE {} (\n    {}\n)", self.q(table), body.join(",\n    "))
        } else {
            format!("CREATE TABLE {} ({})", self.q(table), body.join(", "))
        };
        Ok(sql)
    }

    fn add_column_sql(&self, table: &str, column: &ColumnDefinition) -> Result<String> {
        let mut constraints = self.constraints.column_constraints(column, true)?;
        // ADD COLUMN cannot declare table-level constraints.
        constraints.references = column.foreign_key.clone();
        Ok(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.q(table),
            self.constraints.build_column_definition(column, &constraints)?
        ))
    }

    /// Renders the SELECT expression that fills one target column.
    #[must_use]
    pub fn copy_expression(&self, copy: &ColumnCopy) -> String {
        let source = self.q(&copy.source);
        let mut expr = match &copy.cast {
            Some(ty) => format!("CAST({source} AS {ty})"),
            None => source,
        };
        if let Some(fallback) = &copy.fallback {
            expr = format!("COALESCE({expr}, {fallback})");
        }
        if copy.source != copy.target || copy.cast.is_some() || copy.fallback.is_some() {
            expr = format!("{expr} AS {}", self.q(&copy.target));
        }
        expr
    }

    fn copy_rows_sql(&self, from: &str, to: &str, columns: &[ColumnCopy]) -> Result<String> {
        if columns.is_empty() {
            return Err(GenerateError::InvalidRebuild {
                table: to.to_string(),
                message: "no columns to copy".to_string(),
            });
        }
        let targets = self.formatter.quote_list(columns.iter().map(|c| c.target.as_str()));
        let exprs: Vec<String> = columns.iter().map(|c| self.copy_expression(c)).collect();
        Ok(format!(
            "INSERT INTO {} ({targets}) SELECT {} FROM {}",
            self.q(to),
            exprs.join(", "),
            self.q(from)
        ))
    }

    fn insert_rows_sql(&self, table: &str, columns: &[String], rows: &[Vec<String>]) -> Result<String> {
        let conflict = |message: String| GenerateError::ColumnNameConflict {
            table: table.to_string(),
            column: String::new(),
            message,
        };
        if columns.is_empty() || rows.is_empty() {
            return Err(conflict("insert needs at least one column and one row".to_string()));
        }
        if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(conflict(format!(
                "row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        let values: Vec<String> = rows.iter().map(|r| format!("({})", r.join(", "))).collect();
        Ok(format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.q(table),
            self.formatter.quote_list(columns.iter().map(String::as_str)),
            values.join(", ")
        ))
    }

    fn update_rows_sql(
        &self,
        table: &str,
        assignments: &[Assignment],
        predicate: Option<&str>,
    ) -> Result<String> {
        if assignments.is_empty() {
            return Err(GenerateError::ColumnNameConflict {
                table: table.to_string(),
                column: String::new(),
                message: "update has no assignments".to_string(),
            });
        }
        let set: Vec<String> = assignments
            .iter()
            .map(|a| format!("{} = {}", self.q(&a.column), a.value))
            .collect();
        let mut sql = format!("UPDATE {} SET {}", self.q(table), set.join(", "));
        push_where(&mut sql, predicate);
        Ok(sql)
    }
}

fn push_where(sql: &mut String, predicate: Option<&str>) {
    if let Some(p) = predicate.map(str::trim).filter(|p| !p.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(p);
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn formatter(&self) -> &SqlFormatter {
        &self.formatter
    }

    fn render(&self, action: &StatementAction) -> Result<String> {
        match action {
            StatementAction::CreateTable { table, columns } => self.create_table_sql(table, columns),

            StatementAction::DropTable { table, .. } => Ok(format!("DROP TABLE {}", self.q(table))),

            StatementAction::RenameTable { from, to } => Ok(format!(
                "ALTER TABLE {} RENAME TO {}",
                self.q(from),
                self.q(to)
            )),

            StatementAction::AddColumn { table, column } => self.add_column_sql(table, column),

            StatementAction::DropColumn { table, column, .. } => Ok(format!(
                "ALTER TABLE {} DROP COLUMN {}",
                self.q(table),
                self.q(column)
            )),

            StatementAction::CreateIndex { index } => {
                Ok(self.indexes.build_create_index_statement(index))
            }

            StatementAction::DropIndex { name, .. } => {
                Ok(self.indexes.build_drop_index_statement(name))
            }

            StatementAction::CopyRows {
                from_table,
                to_table,
                columns,
            } => self.copy_rows_sql(from_table, to_table, columns),

            StatementAction::InsertRows {
                table,
                columns,
                rows,
            } => self.insert_rows_sql(table, columns, rows),

            StatementAction::DeleteRows {
                table, predicate, ..
            } => {
                let mut sql = format!("DELETE FROM {}", self.q(table));
                push_where(&mut sql, predicate.as_deref());
                Ok(sql)
            }

            StatementAction::UpdateRows {
                table,
                assignments,
                predicate,
                ..
            } => self.update_rows_sql(table, assignments, predicate.as_deref()),
        }
    }

    fn supports_drop_column(&self) -> bool {
        // DROP COLUMN refuses indexed, unique and key columns.
        false
    }

    fn supports_alter_column(&self) -> bool {
        false
    }

    fn supports_rename_column(&self) -> bool {
        false
    }
}
