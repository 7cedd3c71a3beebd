//! Generated SQL statements and the structured actions behind them.
//!
//! Every statement produced by this crate keeps the [`StatementAction`] it
//! was rendered from. Rollback is derived from that structure, never from
//! the SQL text.

use serde::{Deserialize, Serialize};

use crate::field::Field;
use crate::schema::{ColumnDefinition, IndexDefinition};

/// Statement category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// `CREATE TABLE`.
    CreateTable,
    /// `DROP TABLE`.
    DropTable,
    /// `ALTER TABLE`.
    AlterTable,
    /// `CREATE INDEX`.
    CreateIndex,
    /// `DROP INDEX`.
    DropIndex,
    /// `INSERT`.
    Insert,
    /// `UPDATE`.
    Update,
    /// `DELETE`.
    Delete,
}

impl StatementKind {
    /// Rough execution cost in seconds used for migration estimates.
    #[must_use]
    pub fn estimated_seconds(&self) -> f64 {
        match self {
            Self::CreateTable => 1.0,
            Self::DropTable => 0.5,
            Self::AlterTable => 2.0,
            Self::CreateIndex => 0.5,
            Self::DropIndex => 0.2,
            Self::Insert => 1.0,
            Self::Update => 1.0,
            Self::Delete => 0.5,
        }
    }
}

/// How one target column is filled during a table-to-table copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCopy {
    /// Column in the source table.
    pub source: String,
    /// Column in the target table.
    pub target: String,
    /// Type to cast the source value to, if the type changes.
    pub cast: Option<String>,
    /// Type to cast back to when copying in the other direction.
    pub reverse_cast: Option<String>,
    /// Literal substituted for NULL source values.
    pub fallback: Option<String>,
}

impl ColumnCopy {
    /// Copies a column unchanged.
    #[must_use]
    pub fn same(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            target: name,
            cast: None,
            reverse_cast: None,
            fallback: None,
        }
    }

    /// Copies a column into a column of another name.
    #[must_use]
    pub fn renamed(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            cast: None,
            reverse_cast: None,
            fallback: None,
        }
    }

    /// Returns the copy in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            source: self.target.clone(),
            target: self.source.clone(),
            cast: self.reverse_cast.clone(),
            reverse_cast: self.cast.clone(),
            fallback: None,
        }
    }
}

/// One column assignment of an UPDATE.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Column name.
    pub column: String,
    /// SQL literal or expression.
    pub value: String,
}

/// The structured meaning of a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StatementAction {
    /// Create a table from column definitions.
    CreateTable {
        /// Table name.
        table: String,
        /// Columns.
        columns: Vec<ColumnDefinition>,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
        /// Definition of the dropped table, needed to recreate it.
        columns: Option<Vec<ColumnDefinition>>,
    },
    /// Rename a table.
    RenameTable {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// Add a column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column definition.
        column: ColumnDefinition,
    },
    /// Drop a column.
    DropColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Definition of the dropped column, needed to re-add it.
        definition: Option<ColumnDefinition>,
    },
    /// Create an index.
    CreateIndex {
        /// Index definition.
        index: IndexDefinition,
    },
    /// Drop an index.
    DropIndex {
        /// Index name.
        name: String,
        /// Table the index belonged to.
        table: String,
        /// Definition of the dropped index, needed to recreate it.
        definition: Option<IndexDefinition>,
    },
    /// `INSERT INTO to SELECT ... FROM from`.
    CopyRows {
        /// Source table.
        from_table: String,
        /// Target table.
        to_table: String,
        /// Column mapping in target order.
        columns: Vec<ColumnCopy>,
    },
    /// `INSERT INTO table (...) VALUES ...` with literal rows.
    InsertRows {
        /// Table name.
        table: String,
        /// Column names; the first one identifies rows.
        columns: Vec<String>,
        /// Rendered SQL literals, one vector per row.
        rows: Vec<Vec<String>>,
    },
    /// `DELETE FROM table [WHERE predicate]`.
    DeleteRows {
        /// Table name.
        table: String,
        /// Row filter.
        predicate: Option<String>,
        /// Snapshot of the deleted rows, needed to reinsert them.
        snapshot: Option<RowSnapshot>,
    },
    /// `UPDATE table SET ... [WHERE predicate]`.
    UpdateRows {
        /// Table name.
        table: String,
        /// New values.
        assignments: Vec<Assignment>,
        /// Values before the update, needed to revert it.
        previous: Option<Vec<Assignment>>,
        /// Row filter.
        predicate: Option<String>,
    },
}

/// Literal rows captured before a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowSnapshot {
    /// Column names.
    pub columns: Vec<String>,
    /// Rendered SQL literals, one vector per row.
    pub rows: Vec<Vec<String>>,
}

impl StatementAction {
    /// Statement category of this action.
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        match self {
            Self::CreateTable { .. } => StatementKind::CreateTable,
            Self::DropTable { .. } => StatementKind::DropTable,
            Self::RenameTable { .. } | Self::AddColumn { .. } | Self::DropColumn { .. } => {
                StatementKind::AlterTable
            }
            Self::CreateIndex { .. } => StatementKind::CreateIndex,
            Self::DropIndex { .. } => StatementKind::DropIndex,
            Self::CopyRows { .. } | Self::InsertRows { .. } => StatementKind::Insert,
            Self::DeleteRows { .. } => StatementKind::Delete,
            Self::UpdateRows { .. } => StatementKind::Update,
        }
    }

    /// Whether the action can discard data on its own.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::DropTable { .. } | Self::DropColumn { .. } | Self::DeleteRows { .. }
        )
    }

    /// Table the action applies to.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::DropTable { table, .. }
            | Self::AddColumn { table, .. }
            | Self::DropColumn { table, .. }
            | Self::DropIndex { table, .. }
            | Self::InsertRows { table, .. }
            | Self::DeleteRows { table, .. }
            | Self::UpdateRows { table, .. } => table,
            Self::RenameTable { from, .. } => from,
            Self::CreateIndex { index } => &index.table,
            Self::CopyRows { to_table, .. } => to_table,
        }
    }

    /// Column the action applies to, if it targets a single column.
    #[must_use]
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::AddColumn { column, .. } => Some(&column.name),
            Self::DropColumn { column, .. } => Some(column),
            _ => None,
        }
    }
}

/// A rendered SQL statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlStatement {
    /// SQL text.
    pub sql: String,
    /// Statement category.
    #[serde(rename = "type")]
    pub kind: StatementKind,
    /// Whether executing this statement can discard data.
    pub destructive: bool,
    /// Table reference.
    pub table: Option<String>,
    /// Column reference.
    pub column: Option<String>,
    /// Human comment.
    pub comment: Option<String>,
    /// Field definition the statement originates from.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub field: Option<Field>,
    /// Structured action; `None` for statements built from raw SQL.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<StatementAction>,
}

impl SqlStatement {
    /// Creates a statement from rendered SQL and its action.
    #[must_use]
    pub fn from_action(sql: String, action: StatementAction, comment: Option<String>) -> Self {
        Self {
            sql,
            kind: action.kind(),
            destructive: action.is_destructive(),
            table: Some(action.table().to_string()),
            column: action.column().map(str::to_string),
            comment,
            field: None,
            action: Some(action),
        }
    }

    /// Creates an unstructured statement. It cannot be inverted.
    #[must_use]
    pub fn raw(sql: impl Into<String>, kind: StatementKind) -> Self {
        Self {
            sql: sql.into(),
            kind,
            destructive: false,
            table: None,
            column: None,
            comment: None,
            field: None,
            action: None,
        }
    }

    /// Overrides the destructive flag.
    #[must_use]
    pub fn destructive(mut self, destructive: bool) -> Self {
        self.destructive = destructive;
        self
    }

    /// Attaches the originating field definition.
    #[must_use]
    pub fn with_field(mut self, field: Option<Field>) -> Self {
        self.field = field;
        self
    }

    /// Returns true if the statement text is blank.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.sql.trim().is_empty()
    }
}
