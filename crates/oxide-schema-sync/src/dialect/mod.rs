//! Database dialect implementations.
//!
//! A dialect renders [`StatementAction`]s into SQL text and states which
//! column operations the engine can perform in place.

mod sqlite;

pub use sqlite::SqliteDialect;

use crate::error::Result;
use crate::formatter::SqlFormatter;
use crate::statement::{SqlStatement, StatementAction};

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the formatter used for identifiers, literals and layout.
    fn formatter(&self) -> &SqlFormatter;

    /// Renders the SQL text of an action, without comment or wrapping.
    fn render(&self, action: &StatementAction) -> Result<String>;

    /// Returns whether the engine can drop a column in place.
    fn supports_drop_column(&self) -> bool;

    /// Returns whether the engine can change a column's type in place.
    fn supports_alter_column(&self) -> bool;

    /// Returns whether the engine can rename a column in place.
    fn supports_rename_column(&self) -> bool;

    /// Renders an action into a finished statement, applying the comment
    /// and pretty-printing options of the formatter.
    fn statement(&self, action: StatementAction, comment: Option<String>) -> Result<SqlStatement> {
        let sql = self.render(&action)?;
        let sql = self.formatter().finish(&sql, comment.as_deref());
        Ok(SqlStatement::from_action(sql, action, comment))
    }
}
