//! Runs generated forward and rollback SQL against an in-memory SQLite
//! database introspected with `SqliteIntrospector`.

mod common;

use std::sync::Arc;

use common::*;
use oxide_schema_sync::prelude::*;
use sqlx::sqlite::SqlitePool;

async fn setup() -> SqlitePool {
    let pool = memory_pool().await;
    for sql in [
        "CREATE TABLE `tabEmployee` (`name` VARCHAR(140) PRIMARY KEY, `old_name` VARCHAR(140), `age` INTEGER, `legacy_note` TEXT)",
        "CREATE INDEX `idx_age` ON `tabEmployee` (`age`)",
        "INSERT INTO `tabEmployee` VALUES ('EMP-1', 'Ada', 36, 'x'), ('EMP-2', 'Grace', 45, NULL)",
    ] {
        sqlx::query(sql).execute(&pool).await.unwrap();
    }
    pool
}

fn base_schema() -> LogicalSchema {
    LogicalSchema::new("Employee")
        .field(Field::new("name", FieldType::Data).primary_key())
        .field(Field::new("old_name", FieldType::Data))
        .field(Field::new("age", FieldType::Int))
        .field(Field::new("legacy_note", FieldType::Text))
        .index(IndexSpec::on(&["age"]).named("idx_age"))
}

async fn generate(pool: &SqlitePool, schema: LogicalSchema) -> MigrationSql {
    let schemas = Arc::new(StaticSchemaProvider::new().with_schema(schema));
    let live = Arc::new(SqliteIntrospector::new(pool.clone()));
    let engine = SchemaComparisonEngine::new(schemas, live, Arc::new(SchemaCache::new()));
    let diff = engine
        .compare_schema("Employee", &CompareOptions::uncached())
        .await
        .unwrap();
    SqlGenerator::default()
        .generate_migration_sql(&diff, "roundtrip")
        .unwrap()
}

async fn column_names(pool: &SqlitePool) -> Vec<String> {
    SqliteIntrospector::new(pool.clone())
        .get_columns("tabEmployee")
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect()
}

async fn names(pool: &SqlitePool, column: &str) -> Vec<String> {
    let sql = format!("SELECT `{column}` FROM `tabEmployee` ORDER BY `name`");
    let rows: Vec<(String,)> = sqlx::query_as(&sql).fetch_all(pool).await.unwrap();
    rows.into_iter().map(|(v,)| v).collect()
}

#[tokio::test]
async fn test_introspected_table_matches_schema() {
    let pool = setup().await;
    let migration = generate(&pool, base_schema()).await;
    assert!(migration.is_empty(), "{:?}", migration.forward);
}

#[tokio::test]
async fn test_rename_applies_and_reverts() {
    let pool = setup().await;
    let mut schema = base_schema();
    schema.fields.retain(|f| f.name != "old_name");
    let schema = schema.field(Field::new("new_name", FieldType::Data).renamed_from("old_name"));

    let migration = generate(&pool, schema.clone()).await;
    execute_all(&pool, &migration.forward).await;
    assert_eq!(
        column_names(&pool).await,
        vec!["name", "new_name", "age", "legacy_note"]
    );
    assert_eq!(names(&pool, "new_name").await, vec!["Ada", "Grace"]);

    let indexes = SqliteIntrospector::new(pool.clone())
        .get_indexes("tabEmployee")
        .await
        .unwrap();
    assert!(indexes.iter().any(|i| i.name == "idx_age"));

    // The database now matches the target schema.
    assert!(generate(&pool, schema).await.is_empty());

    execute_all(&pool, &migration.rollback).await;
    assert_eq!(
        column_names(&pool).await,
        vec!["name", "old_name", "age", "legacy_note"]
    );
    assert_eq!(names(&pool, "old_name").await, vec!["Ada", "Grace"]);
    assert!(generate(&pool, base_schema()).await.is_empty());
}

#[tokio::test]
async fn test_drop_column_keeps_rows() {
    let pool = setup().await;
    let mut schema = base_schema();
    schema.fields.retain(|f| f.name != "legacy_note");

    let migration = generate(&pool, schema).await;
    assert!(migration.destructive);
    execute_all(&pool, &migration.forward).await;
    assert_eq!(column_names(&pool).await, vec!["name", "old_name", "age"]);
    assert_eq!(names(&pool, "old_name").await, vec!["Ada", "Grace"]);

    execute_all(&pool, &migration.rollback).await;
    assert_eq!(
        column_names(&pool).await,
        vec!["name", "old_name", "age", "legacy_note"]
    );
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM `tabEmployee`")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn test_type_change_converts_values() {
    let pool = setup().await;
    let mut schema = base_schema();
    for field in &mut schema.fields {
        if field.name == "age" {
            field.field_type = FieldType::Text;
        }
    }

    let migration = generate(&pool, schema).await;
    execute_all(&pool, &migration.forward).await;
    let types: Vec<(String,)> =
        sqlx::query_as("SELECT typeof(`age`) FROM `tabEmployee` ORDER BY `name`")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert!(types.iter().all(|(t,)| t == "text"));

    execute_all(&pool, &migration.rollback).await;
    let types: Vec<(String,)> =
        sqlx::query_as("SELECT typeof(`age`) FROM `tabEmployee` ORDER BY `name`")
            .fetch_all(&pool)
            .await
            .unwrap();
    assert!(types.iter().all(|(t,)| t == "integer"));
}

async fn accepts(pool: &SqlitePool, sql: &str) -> bool {
    sqlx::query(sql).execute(pool).await.is_ok()
}

#[tokio::test]
async fn test_rebuild_keeps_check_of_untouched_column() {
    let pool = memory_pool().await;
    sqlx::query(
        "CREATE TABLE `tabFlag` (`name` VARCHAR(140) PRIMARY KEY, `enabled` INTEGER CHECK (enabled IN (0,1)), `legacy_note` TEXT)",
    )
    .execute(&pool)
    .await
    .unwrap();
    let schema = LogicalSchema::new("Flag")
        .field(Field::new("name", FieldType::Data).primary_key())
        .field(Field::new("enabled", FieldType::Check));

    let schemas = Arc::new(StaticSchemaProvider::new().with_schema(schema));
    let live = Arc::new(SqliteIntrospector::new(pool.clone()));
    let engine = SchemaComparisonEngine::new(schemas, live, Arc::new(SchemaCache::new()));
    let diff = engine
        .compare_schema("Flag", &CompareOptions::uncached())
        .await
        .unwrap();
    let migration = SqlGenerator::default()
        .generate_migration_sql(&diff, "drop_note")
        .unwrap();
    assert!(
        !migration.warnings.iter().any(|w| w.contains("CHECK")),
        "{:?}",
        migration.warnings
    );

    execute_all(&pool, &migration.forward).await;
    assert!(accepts(&pool, "INSERT INTO `tabFlag` VALUES ('a', 1)").await);
    assert!(!accepts(&pool, "INSERT INTO `tabFlag` VALUES ('b', 7)").await);

    execute_all(&pool, &migration.rollback).await;
    assert!(!accepts(&pool, "INSERT INTO `tabFlag` VALUES ('c', 7, NULL)").await);
    assert!(accepts(&pool, "INSERT INTO `tabFlag` VALUES ('c', 0, NULL)").await);
}

#[tokio::test]
async fn test_rebuild_warns_about_constraints_only_the_table_has() {
    let pool = memory_pool().await;
    sqlx::query(
        "CREATE TABLE `tabPair` (`name` VARCHAR(140) PRIMARY KEY, `qty` INTEGER CHECK (qty > 0), `a` TEXT, `b` TEXT, `legacy_note` TEXT, UNIQUE (`a`, `b`))",
    )
    .execute(&pool)
    .await
    .unwrap();
    let schema = LogicalSchema::new("Pair")
        .field(Field::new("name", FieldType::Data).primary_key())
        .field(Field::new("qty", FieldType::Int))
        .field(Field::new("a", FieldType::Text))
        .field(Field::new("b", FieldType::Text));

    let schemas = Arc::new(StaticSchemaProvider::new().with_schema(schema));
    let live = Arc::new(SqliteIntrospector::new(pool.clone()));
    let engine = SchemaComparisonEngine::new(schemas, live, Arc::new(SchemaCache::new()));
    let diff = engine
        .compare_schema("Pair", &CompareOptions::uncached())
        .await
        .unwrap();
    assert_eq!(diff.current.checks, vec!["qty > 0"]);
    assert_eq!(diff.current.unique_constraints, vec![vec!["a", "b"]]);

    let migration = SqlGenerator::default()
        .generate_migration_sql(&diff, "drop_note")
        .unwrap();
    assert!(migration
        .warnings
        .iter()
        .any(|w| w.contains("CHECK (qty > 0)") && w.contains("tabPair")));
    assert!(migration.warnings.iter().any(|w| w.contains("UNIQUE (a, b)")));
}
