#![allow(dead_code)]

use std::sync::Arc;

use oxide_schema_sync::prelude::*;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

pub fn column(name: &str, ty: &str) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        column_type: ty.to_string(),
        nullable: true,
        default: None,
        primary_key: false,
        auto_increment: false,
        unique: false,
        collation: None,
        foreign_key: None,
    }
}

pub fn key_column(name: &str, ty: &str) -> ColumnInfo {
    ColumnInfo {
        nullable: false,
        primary_key: true,
        ..column(name, ty)
    }
}

/// Live `tabEmployee` with a key, two data columns and a legacy note.
pub fn employee_table() -> LiveTable {
    LiveTable {
        table: "tabEmployee".to_string(),
        columns: vec![
            key_column("name", "VARCHAR(140)"),
            column("employee_name", "VARCHAR(140)"),
            column("age", "INTEGER"),
            column("legacy_note", "TEXT"),
        ],
        indexes: vec![],
        checks: vec![],
    }
}

/// Logical `Employee` matching [`employee_table`].
pub fn employee_schema() -> LogicalSchema {
    LogicalSchema::new("Employee")
        .field(Field::new("name", FieldType::Data).primary_key())
        .field(Field::new("employee_name", FieldType::Data))
        .field(Field::new("age", FieldType::Int))
        .field(Field::new("legacy_note", FieldType::Text))
}

/// Logical `Employee` with one field replaced or removed.
pub fn employee_schema_with(name: &str, replacement: Option<Field>) -> LogicalSchema {
    let mut schema = employee_schema();
    schema.fields.retain(|f| f.name != name);
    if let Some(field) = replacement {
        schema.fields.push(field);
    }
    schema
}

pub fn provider(schema: LogicalSchema, table: LiveTable) -> Arc<StaticSchemaProvider> {
    Arc::new(StaticSchemaProvider::new().with_schema(schema).with_table(table))
}

pub fn engine(provider: &Arc<StaticSchemaProvider>) -> SchemaComparisonEngine {
    SchemaComparisonEngine::new(
        provider.clone(),
        provider.clone(),
        Arc::new(SchemaCache::new()),
    )
}

/// Compares `Employee` against the given live table and generates its
/// migration.
pub async fn migrate(schema: LogicalSchema, table: LiveTable) -> MigrationSql {
    let provider = provider(schema, table);
    let diff = engine(&provider)
        .compare_schema("Employee", &CompareOptions::default())
        .await
        .unwrap_or_else(|e| panic!("comparison failed: {e}"));
    SqlGenerator::default()
        .generate_migration_sql(&diff, "test")
        .unwrap_or_else(|e| panic!("generation failed: {e}"))
}

pub async fn memory_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to open in-memory database")
}

pub async fn execute_all(pool: &SqlitePool, statements: &[SqlStatement]) {
    for stmt in statements {
        sqlx::query(&stmt.sql)
            .execute(pool)
            .await
            .unwrap_or_else(|e| panic!("Failed to execute: {}\nError: {e}", stmt.sql));
    }
}
