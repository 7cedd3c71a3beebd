//! Schema providers.
//!
//! The comparison engine reads logical schemas through [`SchemaProvider`]
//! and live tables through [`LiveSchemaProvider`]. Two implementations ship
//! with the crate: [`StaticSchemaProvider`] keeps everything in memory and
//! [`SqliteIntrospector`] reads a live SQLite database.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::error::CompareError;
use crate::field::LogicalSchema;
use crate::schema::{
    ColumnInfo, ColumnType, ForeignKeyAction, ForeignKeyRef, IndexColumn, IndexInfo, LiveTable,
    SortOrder,
};

/// Supplies logical schemas by name.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Loads the logical schema called `name`.
    async fn load_schema(&self, name: &str) -> Result<LogicalSchema, CompareError>;
}

/// Supplies the live columns and indexes of a table.
///
/// An unknown table yields an empty column list.
#[async_trait]
pub trait LiveSchemaProvider: Send + Sync {
    /// Returns the columns of `table` in declaration order.
    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, CompareError>;

    /// Returns the indexes of `table`.
    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, CompareError>;

    /// Returns the CHECK expressions declared on `table`.
    async fn get_checks(&self, _table: &str) -> Result<Vec<String>, CompareError> {
        Ok(Vec::new())
    }
}

#[derive(Debug, Default, Deserialize)]
struct StaticDocument {
    #[serde(default)]
    schemas: Vec<LogicalSchema>,
    #[serde(default)]
    tables: Vec<LiveTable>,
}

/// In-memory provider for both logical schemas and live tables.
///
/// Counts live-schema calls, which makes cache behaviour observable.
#[derive(Debug, Default)]
pub struct StaticSchemaProvider {
    schemas: HashMap<String, LogicalSchema>,
    tables: HashMap<String, LiveTable>,
    delay: Option<Duration>,
    column_calls: AtomicUsize,
    index_calls: AtomicUsize,
}

impl StaticSchemaProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a logical schema.
    #[must_use]
    pub fn with_schema(mut self, schema: LogicalSchema) -> Self {
        self.schemas.insert(schema.name.clone(), schema);
        self
    }

    /// Adds a live table.
    #[must_use]
    pub fn with_table(mut self, table: LiveTable) -> Self {
        self.tables.insert(table.table.clone(), table);
        self
    }

    /// Delays every live-schema call.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Parses `{"schemas": [...], "tables": [...]}`.
    pub fn from_json(json: &str) -> Result<Self, CompareError> {
        let doc: StaticDocument = serde_json::from_str(json)
            .map_err(|e| CompareError::Provider(format!("invalid schema document: {e}")))?;
        Ok(doc
            .schemas
            .into_iter()
            .fold(Self::new(), Self::with_schema)
            .merge_tables(doc.tables))
    }

    /// Reads a JSON document from a file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CompareError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CompareError::Provider(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    fn merge_tables(self, tables: Vec<LiveTable>) -> Self {
        tables.into_iter().fold(self, Self::with_table)
    }

    /// Names of the logical schemas, sorted.
    #[must_use]
    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of `get_columns` calls so far.
    #[must_use]
    pub fn column_calls(&self) -> usize {
        self.column_calls.load(Ordering::SeqCst)
    }

    /// Number of `get_indexes` calls so far.
    #[must_use]
    pub fn index_calls(&self) -> usize {
        self.index_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn load_schema(&self, name: &str) -> Result<LogicalSchema, CompareError> {
        self.schemas
            .get(name)
            .cloned()
            .ok_or_else(|| CompareError::SchemaNotFound(name.to_string()))
    }
}

#[async_trait]
impl LiveSchemaProvider for StaticSchemaProvider {
    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, CompareError> {
        self.column_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self
            .tables
            .get(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, CompareError> {
        self.index_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        Ok(self
            .tables
            .get(table)
            .map(|t| t.indexes.clone())
            .unwrap_or_default())
    }

    async fn get_checks(&self, table: &str) -> Result<Vec<String>, CompareError> {
        self.pause().await;
        Ok(self
            .tables
            .get(table)
            .map(|t| t.checks.clone())
            .unwrap_or_default())
    }
}

static PARTIAL_WHERE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\bWHERE\b(.+)$").expect("Invalid partial index regex"));

static AUTOINCREMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAUTOINCREMENT\b").expect("Invalid autoincrement regex"));

static CHECK_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCHECK\s*\(").expect("Invalid check regex"));

/// Extracts the expressions of every `CHECK (...)` clause in a table
/// definition.
fn check_clauses(sql: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut from = 0;
    while let Some(open) = CHECK_OPEN.find_at(sql, from) {
        let start = open.end();
        let mut depth = 1usize;
        let mut quote = None;
        let mut end = None;
        for (i, ch) in sql[start..].char_indices() {
            match (quote, ch) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"' | '`') => quote = Some(ch),
                (None, '(') => depth += 1,
                (None, ')') => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(start + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let Some(end) = end else { break };
        out.push(sql[start..end].trim().to_string());
        from = end + 1;
    }
    out
}

fn parse_action(action: &str) -> Option<ForeignKeyAction> {
    match action.to_ascii_uppercase().as_str() {
        "CASCADE" => Some(ForeignKeyAction::Cascade),
        "SET NULL" => Some(ForeignKeyAction::SetNull),
        "SET DEFAULT" => Some(ForeignKeyAction::SetDefault),
        "RESTRICT" => Some(ForeignKeyAction::Restrict),
        "NO ACTION" => Some(ForeignKeyAction::NoAction),
        _ => None,
    }
}

/// Reads live tables from a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteIntrospector {
    pool: SqlitePool,
}

impl SqliteIntrospector {
    /// Creates an introspector over a pool.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns the pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Lists user tables.
    pub async fn list_tables(&self) -> Result<Vec<String>, CompareError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Loads columns, indexes and CHECK constraints of one table.
    pub async fn live_table(&self, table: &str) -> Result<LiveTable, CompareError> {
        let (columns, indexes, checks) = tokio::try_join!(
            self.get_columns(table),
            self.get_indexes(table),
            self.get_checks(table)
        )?;
        Ok(LiveTable {
            table: table.to_string(),
            columns,
            indexes,
            checks,
        })
    }

    async fn object_sql(&self, kind: &str, name: &str) -> Result<Option<String>, CompareError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT sql FROM sqlite_master WHERE type = ? AND name = ?")
                .bind(kind)
                .bind(name)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.and_then(|(sql,)| sql))
    }

    async fn foreign_keys(&self, table: &str) -> Result<HashMap<String, ForeignKeyRef>, CompareError> {
        let rows: Vec<(String, String, Option<String>, String, String)> = sqlx::query_as(
            r#"SELECT "from", "table", "to", on_update, on_delete FROM pragma_foreign_key_list(?) ORDER BY id, seq"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::new();
        for (from, target, to, on_update, on_delete) in rows {
            out.insert(
                from,
                ForeignKeyRef {
                    table: target,
                    column: to.unwrap_or_else(|| "rowid".to_string()),
                    on_delete: parse_action(&on_delete),
                    on_update: parse_action(&on_update),
                },
            );
        }
        Ok(out)
    }

    async fn index_columns(&self, index: &str) -> Result<Vec<IndexColumn>, CompareError> {
        let rows: Vec<(Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, "desc" FROM pragma_index_xinfo(?) WHERE "key" = 1 ORDER BY seqno"#,
        )
        .bind(index)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(name, desc)| {
                name.map(|name| IndexColumn {
                    name,
                    order: if desc == 0 { SortOrder::Asc } else { SortOrder::Desc },
                })
            })
            .collect())
    }
}

#[async_trait]
impl LiveSchemaProvider for SqliteIntrospector {
    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>, CompareError> {
        let rows: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
            r#"SELECT name, type, "notnull", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let create_sql = self.object_sql("table", table).await?.unwrap_or_default();
        let autoincrement = AUTOINCREMENT.is_match(&create_sql);
        let mut foreign_keys = self.foreign_keys(table).await?;

        let unique_columns: Vec<String> = self
            .get_indexes(table)
            .await?
            .into_iter()
            .filter(|i| i.unique && i.implicit && i.columns.len() == 1)
            .filter_map(|i| i.columns.into_iter().next().map(|c| c.name))
            .collect();

        let columns = rows
            .into_iter()
            .map(|(name, declared, not_null, default, pk)| {
                let integer_key =
                    pk > 0 && ColumnType::parse(&declared).0 == ColumnType::Integer;
                ColumnInfo {
                    unique: pk == 0 && unique_columns.contains(&name),
                    foreign_key: foreign_keys.remove(&name),
                    column_type: declared,
                    nullable: not_null == 0 && pk == 0,
                    default,
                    primary_key: pk > 0,
                    auto_increment: integer_key && autoincrement,
                    collation: None,
                    name,
                }
            })
            .collect::<Vec<_>>();
        debug!(table = %table, columns = columns.len(), "introspected columns");
        Ok(columns)
    }

    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, CompareError> {
        let rows: Vec<(String, i64, String)> =
            sqlx::query_as(r#"SELECT name, "unique", origin FROM pragma_index_list(?) ORDER BY seq"#)
                .bind(table)
                .fetch_all(&self.pool)
                .await?;

        let mut indexes = Vec::with_capacity(rows.len());
        for (name, unique, origin) in rows {
            let columns = self.index_columns(&name).await?;
            let predicate = match self.object_sql("index", &name).await? {
                Some(sql) => PARTIAL_WHERE
                    .captures(&sql)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|p| !p.is_empty()),
                None => None,
            };
            indexes.push(IndexInfo {
                name,
                columns,
                unique: unique != 0,
                predicate,
                implicit: origin != "c",
            });
        }
        Ok(indexes)
    }

    async fn get_checks(&self, table: &str) -> Result<Vec<String>, CompareError> {
        let sql = self.object_sql("table", table).await?.unwrap_or_default();
        Ok(check_clauses(&sql))
    }
}
