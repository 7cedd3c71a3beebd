//! Asynchronous schema comparison.
//!
//! [`SchemaComparisonEngine`] loads a logical schema and the live table it
//! maps to, then hands both to the [`SchemaDiffer`]. Live introspection goes
//! through an explicit [`SchemaCache`] shared by every engine that holds it.
//! Concurrent comparisons of the same name share one introspection; distinct
//! names run independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::diff::{SchemaDiff, SchemaDiffer};
use crate::error::CompareError;
use crate::provider::{LiveSchemaProvider, SchemaProvider};
use crate::schema::LiveTable;

/// Default budget for live introspection of one table.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call comparison options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Whether to read and fill the live-schema cache.
    pub use_cache: bool,
    /// Budget for live introspection. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }
}

impl CompareOptions {
    /// Options that bypass the cache.
    #[must_use]
    pub fn uncached() -> Self {
        Self {
            use_cache: false,
            ..Self::default()
        }
    }

    /// Sets the introspection budget.
    #[must_use]
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct CacheSlot {
    cell: OnceCell<LiveTable>,
    created: Instant,
}

impl CacheSlot {
    fn new() -> Self {
        Self {
            cell: OnceCell::new(),
            created: Instant::now(),
        }
    }
}

/// Live-schema cache keyed by logical schema name.
///
/// Each key owns a single-flight slot: the first caller introspects, later
/// callers await the same result. A failed introspection leaves the slot
/// empty so the next caller retries.
#[derive(Debug, Default)]
pub struct SchemaCache {
    slots: Mutex<HashMap<String, Arc<CacheSlot>>>,
    ttl: Option<Duration>,
}

impl SchemaCache {
    /// Creates a cache whose entries live until cleared.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache whose entries expire after `ttl`.
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            slots: Mutex::default(),
            ttl: Some(ttl),
        }
    }

    fn slot(&self, name: &str) -> Arc<CacheSlot> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match (slots.get(name), self.ttl) {
            (Some(slot), Some(ttl)) => slot.cell.initialized() && slot.created.elapsed() >= ttl,
            (Some(_), None) => false,
            (None, _) => true,
        };
        if expired {
            slots.insert(name.to_string(), Arc::new(CacheSlot::new()));
        }
        Arc::clone(&slots[name])
    }

    /// Number of names with a cached live table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|s| s.cell.initialized())
            .count()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops the entry for one name.
    pub fn invalidate(&self, name: &str) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Outcome of [`SchemaComparisonEngine::batch_compare_schemas`].
#[derive(Debug, Default)]
pub struct BatchComparison {
    /// Diffs of the names that compared successfully.
    pub results: BTreeMap<String, SchemaDiff>,
    /// Number of successful comparisons.
    pub success_count: usize,
    /// Number of failed comparisons.
    pub failure_count: usize,
    /// Errors of the names that failed.
    pub errors: BTreeMap<String, CompareError>,
    /// Wall-clock time of the whole batch.
    pub total_time: Duration,
}

/// Compares logical schemas against live tables.
#[derive(Clone)]
pub struct SchemaComparisonEngine {
    schemas: Arc<dyn SchemaProvider>,
    live: Arc<dyn LiveSchemaProvider>,
    cache: Arc<SchemaCache>,
    differ: SchemaDiffer,
}

impl SchemaComparisonEngine {
    /// Creates an engine with the default differ.
    pub fn new(
        schemas: Arc<dyn SchemaProvider>,
        live: Arc<dyn LiveSchemaProvider>,
        cache: Arc<SchemaCache>,
    ) -> Self {
        Self {
            schemas,
            live,
            cache,
            differ: SchemaDiffer::default(),
        }
    }

    /// Replaces the differ.
    #[must_use]
    pub fn with_differ(mut self, differ: SchemaDiffer) -> Self {
        self.differ = differ;
        self
    }

    /// Returns the shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<SchemaCache> {
        &self.cache
    }

    /// Compares one logical schema against its live table.
    pub async fn compare_schema(
        &self,
        name: &str,
        options: &CompareOptions,
    ) -> Result<SchemaDiff, CompareError> {
        let schema = self.schemas.load_schema(name).await?;
        self.differ.validate(&schema)?;
        let table = self.differ.table_name(&schema);

        let live = if options.use_cache {
            let slot = self.cache.slot(name);
            slot.cell
                .get_or_try_init(|| self.introspect(name, &table, options.timeout))
                .await?
                .clone()
        } else {
            self.introspect(name, &table, options.timeout).await?
        };

        let diff = self.differ.diff(&schema, &live)?;
        debug!(schema = %name, table = %table, changes = diff.change_count(), "compared schema");
        Ok(diff)
    }

    /// Compares several schemas concurrently with default options.
    ///
    /// A failure affects only its own name.
    pub async fn batch_compare_schemas(&self, names: &[String]) -> BatchComparison {
        self.batch_compare_with(names, &CompareOptions::default()).await
    }

    /// Compares several schemas concurrently.
    pub async fn batch_compare_with(
        &self,
        names: &[String],
        options: &CompareOptions,
    ) -> BatchComparison {
        let start = Instant::now();
        let outcomes = join_all(names.iter().map(|name| async move {
            (name.clone(), self.compare_schema(name, options).await)
        }))
        .await;

        let mut batch = BatchComparison::default();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(diff) => {
                    batch.success_count += 1;
                    batch.results.insert(name, diff);
                }
                Err(err) => {
                    warn!(schema = %name, code = err.code(), error = %err, "schema comparison failed");
                    batch.failure_count += 1;
                    batch.errors.insert(name, err);
                }
            }
        }
        batch.total_time = start.elapsed();
        info!(
            succeeded = batch.success_count,
            failed = batch.failure_count,
            elapsed_ms = u64::try_from(batch.total_time.as_millis()).unwrap_or(u64::MAX),
            "batch comparison finished"
        );
        batch
    }

    /// Clears the live-schema cache.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    async fn introspect(
        &self,
        name: &str,
        table: &str,
        timeout: Option<Duration>,
    ) -> Result<LiveTable, CompareError> {
        debug!(schema = %name, table = %table, "introspecting live table");
        let load = async {
            let (columns, indexes, checks) = tokio::try_join!(
                self.live.get_columns(table),
                self.live.get_indexes(table),
                self.live.get_checks(table)
            )?;
            Ok::<_, CompareError>(LiveTable {
                table: table.to_string(),
                columns,
                indexes,
                checks,
            })
        };
        match timeout {
            Some(budget) => tokio::time::timeout(budget, load)
                .await
                .map_err(|_| CompareError::Timeout {
                    schema: name.to_string(),
                    millis: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                })?,
            None => load.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, FieldType, LogicalSchema};
    use crate::provider::StaticSchemaProvider;
    use crate::schema::ColumnInfo;

    fn column(name: &str, ty: &str) -> ColumnInfo {
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

    fn provider() -> StaticSchemaProvider {
        StaticSchemaProvider::new()
            .with_schema(
                LogicalSchema::new("Employee")
                    .field(Field::new("employee_name", FieldType::Data))
                    .field(Field::new("age", FieldType::Int)),
            )
            .with_table(LiveTable {
                table: "tabEmployee".to_string(),
                columns: vec![column("employee_name", "VARCHAR(140)"), column("age", "INTEGER")],
                indexes: vec![],
                checks: vec![],
            })
    }

    fn engine(provider: Arc<StaticSchemaProvider>, cache: SchemaCache) -> SchemaComparisonEngine {
        SchemaComparisonEngine::new(provider.clone(), provider, Arc::new(cache))
    }

    #[tokio::test]
    async fn test_unchanged_schema_has_empty_diff() {
        let provider = Arc::new(provider());
        let engine = engine(provider, SchemaCache::new());
        let diff = engine
            .compare_schema("Employee", &CompareOptions::default())
            .await
            .unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.table_name, "tabEmployee");
    }

    #[tokio::test]
    async fn test_cache_skips_second_introspection() {
        let provider = Arc::new(provider());
        let engine = engine(provider.clone(), SchemaCache::new());
        let options = CompareOptions::default();
        engine.compare_schema("Employee", &options).await.unwrap();
        engine.compare_schema("Employee", &options).await.unwrap();
        assert_eq!(provider.column_calls(), 1);
        assert_eq!(engine.cache().len(), 1);

        engine.clear_cache();
        assert!(engine.cache().is_empty());
        engine.compare_schema("Employee", &options).await.unwrap();
        assert_eq!(provider.column_calls(), 2);
    }

    #[tokio::test]
    async fn test_uncached_always_introspects() {
        let provider = Arc::new(provider());
        let engine = engine(provider.clone(), SchemaCache::new());
        let options = CompareOptions::uncached();
        engine.compare_schema("Employee", &options).await.unwrap();
        engine.compare_schema("Employee", &options).await.unwrap();
        assert_eq!(provider.column_calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_introspection() {
        let provider = Arc::new(provider().with_delay(Duration::from_millis(50)));
        let engine = engine(provider.clone(), SchemaCache::new());
        let options = CompareOptions::default();
        let (a, b, c) = tokio::join!(
            engine.compare_schema("Employee", &options),
            engine.compare_schema("Employee", &options),
            engine.compare_schema("Employee", &options),
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(provider.column_calls(), 1);
        assert_eq!(provider.index_calls(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_reloaded() {
        let provider = Arc::new(provider());
        let engine = engine(provider.clone(), SchemaCache::with_ttl(Duration::ZERO));
        let options = CompareOptions::default();
        engine.compare_schema("Employee", &options).await.unwrap();
        engine.compare_schema("Employee", &options).await.unwrap();
        assert_eq!(provider.column_calls(), 2);
    }

    #[test]
    fn test_invalidate_one_name() {
        let cache = SchemaCache::new();
        let slot = cache.slot("Employee");
        slot.cell.set(LiveTable::default()).unwrap();
        assert_eq!(cache.len(), 1);
        cache.invalidate("Employee");
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let provider = Arc::new(provider().with_delay(Duration::from_millis(200)));
        let engine = engine(provider, SchemaCache::new());
        let options = CompareOptions::default().timeout(Some(Duration::from_millis(10)));
        let err = engine.compare_schema("Employee", &options).await.unwrap_err();
        assert_eq!(err.code(), "TIMEOUT");
        assert_eq!(err.schema(), Some("Employee"));
        assert!(matches!(err, CompareError::Timeout { millis: 10, .. }));
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_missing_table() {
        let provider = Arc::new(
            StaticSchemaProvider::new()
                .with_schema(LogicalSchema::new("Ghost").field(Field::new("title", FieldType::Data))),
        );
        let engine = engine(provider, SchemaCache::new());
        let err = engine
            .compare_schema("Ghost", &CompareOptions::default())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CompareError::TableNotFound {
                schema: "Ghost".to_string(),
                table: "tabGhost".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_batch_reports_partial_failure() {
        let provider = Arc::new(provider());
        let engine = engine(provider, SchemaCache::new());
        let batch = engine
            .batch_compare_schemas(&["Employee".to_string(), "Missing".to_string()])
            .await;
        assert_eq!(batch.success_count, 1);
        assert_eq!(batch.failure_count, 1);
        assert!(batch.results.contains_key("Employee"));
        assert_eq!(batch.errors["Missing"].code(), "SCHEMA_NOT_FOUND");
    }
}
