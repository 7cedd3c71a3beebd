//! End-to-end scenarios: logical schema and live table in, migration out.

mod common;

use std::time::Duration;

use common::*;
use oxide_schema_sync::prelude::*;

fn inverse_kind(kind: StatementKind) -> StatementKind {
    match kind {
        StatementKind::CreateTable => StatementKind::DropTable,
        StatementKind::DropTable => StatementKind::CreateTable,
        StatementKind::CreateIndex => StatementKind::DropIndex,
        StatementKind::DropIndex => StatementKind::CreateIndex,
        StatementKind::Insert => StatementKind::Insert,
        StatementKind::Delete => StatementKind::Insert,
        other => other,
    }
}

#[tokio::test]
async fn test_unchanged_schema_generates_nothing() {
    let migration = migrate(employee_schema(), employee_table()).await;
    assert!(migration.forward.is_empty());
    assert!(migration.rollback.is_empty());
    assert!(!migration.destructive);
    assert!(migration.warnings.is_empty());
}

#[tokio::test]
async fn test_add_required_unique_column() {
    let schema = employee_schema().field(
        Field::new("badge_id", FieldType::Data)
            .length(20)
            .required()
            .unique(),
    );
    let migration = migrate(schema, employee_table()).await;

    assert_eq!(migration.forward.len(), 1);
    let add = &migration.forward[0].sql;
    assert!(add.starts_with("ALTER TABLE `tabEmployee` ADD COLUMN `badge_id` VARCHAR(20)"));
    assert!(add.contains("NOT NULL"));
    assert!(add.contains("UNIQUE"));

    assert_eq!(migration.rollback.len(), 1);
    assert_eq!(
        migration.rollback[0].sql,
        "ALTER TABLE `tabEmployee` DROP COLUMN `badge_id`"
    );
    assert_eq!(migration.rollback[0].column.as_deref(), Some("badge_id"));
    assert!(migration.forward[0].field.is_some());
}

#[tokio::test]
async fn test_remove_column_is_destructive() {
    let migration = migrate(employee_schema_with("legacy_note", None), employee_table()).await;

    assert!(migration.destructive);
    assert!(migration
        .warnings
        .iter()
        .any(|w| w.contains("legacy_note") && w.contains("data loss")));

    let copy = migration
        .forward
        .iter()
        .find(|s| s.kind == StatementKind::Insert)
        .unwrap();
    assert!(!copy.sql.contains("`legacy_note`"));
    for kept in ["`name`", "`employee_name`", "`age`"] {
        assert!(copy.sql.contains(kept), "copy is missing {kept}: {}", copy.sql);
    }
}

#[tokio::test]
async fn test_rename_column_rebuilds_in_four_statements() {
    let mut table = employee_table();
    table.columns[1].name = "old_name".to_string();
    let schema = employee_schema_with(
        "employee_name",
        Some(Field::new("new_name", FieldType::Data).renamed_from("old_name")),
    );
    let migration = migrate(schema, table).await;

    let kinds: Vec<StatementKind> = migration.forward.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StatementKind::CreateTable,
            StatementKind::Insert,
            StatementKind::DropTable,
            StatementKind::AlterTable,
        ]
    );
    assert!(migration.forward[1].sql.contains("`old_name` AS `new_name`"));
    assert!(!migration.destructive);
    assert_eq!(migration.metadata.diff.renamed_columns.len(), 1);
}

#[tokio::test]
async fn test_type_change_casts_values() {
    let schema = employee_schema_with("age", Some(Field::new("age", FieldType::Text)));
    let migration = migrate(schema, employee_table()).await;

    let copy = migration
        .forward
        .iter()
        .find(|s| s.kind == StatementKind::Insert)
        .unwrap();
    assert!(copy.sql.contains("CAST(`age` AS TEXT)"));
    assert!(migration
        .warnings
        .iter()
        .any(|w| w.contains("Type conversion") && w.contains("age")));

    let diff = &migration.metadata.diff;
    assert_eq!(diff.modified_columns.len(), 1);
    assert!(diff.modified_columns[0].requires_data_migration);
}

#[tokio::test]
async fn test_cached_comparison_introspects_once() {
    let provider = provider(employee_schema(), employee_table());
    let engine = engine(&provider);
    let options = CompareOptions::default();

    let first = engine.compare_schema("Employee", &options).await.unwrap();
    let second = engine.compare_schema("Employee", &options).await.unwrap();

    assert!(first.is_empty() && second.is_empty());
    assert_eq!(provider.column_calls(), 1);
    assert_eq!(provider.index_calls(), 1);
}

#[tokio::test]
async fn test_rollback_is_reverse_of_forward() {
    let mut table = employee_table();
    table.indexes.push(IndexInfo {
        name: "idx_age".to_string(),
        columns: vec![IndexColumn::asc("age")],
        unique: false,
        predicate: None,
        implicit: false,
    });
    let schema = employee_schema_with("legacy_note", None)
        .field(Field::new("badge_id", FieldType::Data))
        .index(IndexSpec::on(&["age"]).named("idx_age"))
        .index(IndexSpec::on(&["badge_id"]));
    let migration = migrate(schema, table).await;

    assert_eq!(migration.forward.len(), migration.rollback.len());
    let forward: Vec<StatementKind> = migration.forward.iter().map(|s| s.kind).collect();
    let expected: Vec<StatementKind> = forward.iter().rev().map(|k| inverse_kind(*k)).collect();
    let rollback: Vec<StatementKind> = migration.rollback.iter().map(|s| s.kind).collect();
    assert_eq!(rollback, expected);
    assert!(migration.metadata.skipped_rollback.is_empty());
}

#[tokio::test]
async fn test_batch_comparison_reports_partial_failure() {
    let provider = provider(employee_schema(), employee_table());
    let engine = engine(&provider);
    let batch = engine
        .batch_compare_schemas(&["Employee".to_string(), "Customer".to_string()])
        .await;

    assert_eq!(batch.success_count, 1);
    assert_eq!(batch.failure_count, 1);
    assert!(matches!(
        batch.errors.get("Customer"),
        Some(CompareError::SchemaNotFound(_))
    ));
}

#[tokio::test]
async fn test_slow_introspection_times_out() {
    let provider = std::sync::Arc::new(
        StaticSchemaProvider::new()
            .with_schema(employee_schema())
            .with_table(employee_table())
            .with_delay(Duration::from_millis(250)),
    );
    let engine = engine(&provider);
    let options = CompareOptions::default().timeout(Some(Duration::from_millis(5)));
    let err = engine.compare_schema("Employee", &options).await.unwrap_err();
    assert!(matches!(err, CompareError::Timeout { .. }));
}

#[test]
fn test_index_names_fit_identifier_limit() {
    let builder = IndexBuilder::default();
    let table = "tabEmployee";
    let columns = [
        "a_really_long_column_name_number_one",
        "another_quite_long_column_name_two",
    ];
    for unique in [false, true] {
        let name = builder.generate_index_name(table, &columns, unique);
        assert!(name.len() <= 63);
        let prefix = if unique { "uidx_tabEmployee_" } else { "idx_tabEmployee_" };
        assert!(name.starts_with(prefix), "{name}");
    }
}

#[test]
fn test_default_formatting() {
    let formatter = SqlFormatter::default();
    assert_eq!(formatter.format_default(None), None);
    assert_eq!(
        formatter.format_default(Some(&DefaultValue::Integer(0))).as_deref(),
        Some("0")
    );
    assert_eq!(
        formatter.format_default(Some(&DefaultValue::Bool(true))).as_deref(),
        Some("1")
    );
    assert_eq!(
        formatter.format_default(Some(&DefaultValue::Bool(false))).as_deref(),
        Some("0")
    );
    assert_eq!(
        formatter
            .format_default(Some(&DefaultValue::String("O'Reilly".to_string())))
            .as_deref(),
        Some("'O''Reilly'")
    );
}
