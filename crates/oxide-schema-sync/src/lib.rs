//! Reversible schema migrations for SQLite-class engines.
//!
//! `oxide-schema-sync` compares a declarative table definition with the live
//! database and produces a self-contained migration plan: forward SQL, the
//! rollback SQL that reverts it, warnings about data risk and a coarse time
//! estimate. Nothing is executed.
//!
//! SQLite cannot drop, retype or rename a column in place, so those changes
//! are emulated with a table rebuild (create temp, copy, drop, rename).
//! Every statement carries a structured [`statement::StatementAction`], and
//! the rollback is derived from those actions rather than from SQL text.
//!
//! # Architecture
//!
//! - **Type mapper** - logical field types to physical column types
//! - **Constraint builder** - NOT NULL, UNIQUE, DEFAULT, CHECK and foreign keys
//! - **Index builder** - index names, definitions and CREATE/DROP INDEX
//! - **Formatter** - quoting, naming strategy, literals, pretty printing
//! - **Table rebuilder** - the rebuild sequence for unsupported column changes
//! - **Comparison engine** - async diff of logical and live schema, with a
//!   single-flight cache
//! - **Rollback generator** - the inverse of a forward statement list
//! - **SQL generator** - turns a diff into a complete [`generator::MigrationSql`]
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oxide_schema_sync::prelude::*;
//!
//! let provider = Arc::new(
//!     StaticSchemaProvider::new()
//!         .with_schema(
//!             LogicalSchema::new("Employee").field(
//!                 Field::new("badge_id", FieldType::Data).length(20).required().unique(),
//!             ),
//!         )
//!         .with_table(live_employee_table),
//! );
//! let engine = SchemaComparisonEngine::new(provider.clone(), provider, Arc::new(SchemaCache::new()));
//! let diff = engine.compare_schema("Employee", &CompareOptions::default()).await?;
//!
//! let migration = SqlGenerator::default().generate_migration_sql(&diff, "add_badge_id")?;
//! println!("{}", migration.forward_script());
//! println!("{}", migration.rollback_script());
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Generate a migration from a schema document
//! oxide-schema-sync generate --input schemas.json --schema Employee
//!
//! # Print the diff only
//! oxide-schema-sync diff --input schemas.json --schema Employee
//!
//! # Introspect a live SQLite table
//! oxide-schema-sync inspect --database sqlite:app.db --table tabEmployee
//! ```

pub mod compare;
pub mod config;
pub mod constraints;
pub mod dialect;
pub mod diff;
pub mod error;
pub mod field;
pub mod formatter;
pub mod generator;
pub mod index;
pub mod provider;
pub mod rebuild;
pub mod rollback;
pub mod schema;
pub mod statement;
pub mod type_mapper;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::compare::{BatchComparison, CompareOptions, SchemaCache, SchemaComparisonEngine};
    pub use crate::config::{ConfigError, GeneratorConfig};
    pub use crate::constraints::{ConstraintBuilder, ConstraintOptions};
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::diff::{
        AttributeChanges, ColumnChange, ColumnRename, FieldChange, IndexChange, SchemaDiff,
        SchemaDiffer,
    };
    pub use crate::error::{CompareError, GenerateError, Result};
    pub use crate::field::{Field, FieldType, IndexColumnSpec, IndexSpec, LogicalSchema};
    pub use crate::formatter::{FormatterOptions, NamingStrategy, SqlFormatter};
    pub use crate::generator::{ForeignKeyMode, MigrationMetadata, MigrationSql, SqlGenerator};
    pub use crate::index::IndexBuilder;
    pub use crate::provider::{
        LiveSchemaProvider, SchemaProvider, SqliteIntrospector, StaticSchemaProvider,
    };
    pub use crate::rebuild::{CopyStrategy, TableRebuildStrategy, TableRebuilder, TableState};
    pub use crate::rollback::{RollbackGenerator, RollbackMode};
    pub use crate::schema::{
        ColumnDefinition, ColumnInfo, ColumnType, DefaultValue, ForeignKeyAction, ForeignKeyRef,
        IndexColumn, IndexDefinition, IndexInfo, LiveTable, SortOrder,
    };
    pub use crate::statement::{SqlStatement, StatementAction, StatementKind};
    pub use crate::type_mapper::TypeMapper;
}
