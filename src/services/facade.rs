// Data Access Facade
//
// Single entry point for reads and writes: renders SQL through the
// QueryBuilder, runs it on the configured driver, serves repeated selects
// from the cache, and keeps counters and an error log as it goes.

use crate::config::Config;
use crate::error::DataError;
use crate::models::{CacheEntry, Column, Filter, QueryOutput, QueryRequest, RowData};
use crate::services::counters::{Counters, OperationKind};
use crate::services::database::{create_adapter, DatabaseAdapter, DatabaseType, RowSet};
use crate::services::error_log::ErrorLog;
use crate::services::query_builder::{QueryBuilder, Statement};
use crate::services::query_cache::{generate_key, CacheBackend, MemoryCache};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Component name recorded on every error log entry the facade writes
pub const COMPONENT: &str = "DataAccessFacade";

pub struct DataAccessFacade {
    adapter: Box<dyn DatabaseAdapter>,
    cache: Option<Arc<dyn CacheBackend>>,
    counters: Counters,
    errors: ErrorLog,
    last_row_count: u64,
    in_batch: bool,
}

impl DataAccessFacade {
    pub fn new(adapter: Box<dyn DatabaseAdapter>, cache: Option<Arc<dyn CacheBackend>>) -> Self {
        Self {
            adapter,
            cache,
            counters: Counters::default(),
            errors: ErrorLog::new(),
            last_row_count: 0,
            in_batch: false,
        }
    }

    /// Facade over `adapter` caching in an in-process `MemoryCache`
    pub fn with_cache(adapter: Box<dyn DatabaseAdapter>, cache: MemoryCache) -> Self {
        Self::new(adapter, Some(Arc::new(cache)))
    }

    /// Open the configured database and attach the in-process cache when enabled
    pub async fn connect(config: &Config) -> Result<Self, DataError> {
        let db_type = DatabaseType::from_str(&config.database.database_type)?;
        let adapter = create_adapter(db_type, &config.database.url).await?;

        let cache: Option<Arc<dyn CacheBackend>> =
            if config.cache.enabled && config.cache.max_entries > 0 {
                Some(Arc::new(MemoryCache::new(
                    config.cache.max_entries,
                    config.cache.default_ttl_secs,
                )))
            } else {
                None
            };

        tracing::info!(
            database_type = db_type.as_str(),
            cache_enabled = cache.is_some(),
            "Data access facade ready"
        );
        Ok(Self::new(adapter, cache))
    }

    /// Run a select, serving it from the cache when the request carries a TTL
    pub async fn select(&mut self, request: &QueryRequest) -> Result<QueryOutput, DataError> {
        match self.run_select(request).await {
            Ok(output) => Ok(output),
            Err(e) => Err(self.fail("select", e)),
        }
    }

    async fn run_select(&mut self, request: &QueryRequest) -> Result<QueryOutput, DataError> {
        let statement = QueryBuilder::select(request)?;
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "select");

        let cache_slot = self.cache_slot(&statement, request);
        if let Some((cache, key)) = &cache_slot {
            if let Some(entry) = Self::cache_lookup(cache.as_ref(), key).await {
                self.counters.increment(OperationKind::CacheHit);
                self.last_row_count = entry.row_count;
                return Ok(entry.result);
            }
        }

        let rows = self
            .adapter
            .execute_query(&statement.sql, &statement.params)
            .await?;
        self.counters.increment(OperationKind::Select);

        let entry = CacheEntry {
            row_count: rows.row_count() as u64,
            result: Self::shape(&rows, request),
        };
        if let Some((cache, key)) = &cache_slot {
            let ttl = Duration::from_secs(request.cache_ttl_secs);
            Self::cache_store(cache.as_ref(), key, &entry, ttl).await;
        }

        self.last_row_count = entry.row_count;
        Ok(entry.result)
    }

    /// Cache and key for a select, or `None` when the select is not cached
    fn cache_slot(
        &self,
        statement: &Statement,
        request: &QueryRequest,
    ) -> Option<(Arc<dyn CacheBackend>, String)> {
        if request.cache_ttl_secs == 0 {
            return None;
        }
        let cache = self.cache.clone()?;
        match generate_key(statement, request) {
            Ok(key) => Some((cache, key)),
            Err(e) => {
                tracing::warn!("Skipping cache, fingerprint failed: {}", e);
                None
            }
        }
    }

    async fn cache_lookup(cache: &dyn CacheBackend, key: &str) -> Option<CacheEntry> {
        match cache.get(key).await {
            Ok(Some(bytes)) => match CacheEntry::decode(&bytes) {
                Ok(entry) => {
                    tracing::debug!(key, "Cache hit");
                    Some(entry)
                }
                Err(e) => {
                    tracing::warn!(key, "Discarding undecodable cache entry: {}", e);
                    None
                }
            },
            Ok(None) => {
                tracing::debug!(key, "Cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key, "Cache lookup failed, reading from the database: {}", e);
                None
            }
        }
    }

    async fn cache_store(cache: &dyn CacheBackend, key: &str, entry: &CacheEntry, ttl: Duration) {
        let bytes = match entry.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, "Could not encode cache entry: {}", e);
                return;
            }
        };
        match cache.set(key, bytes, ttl).await {
            Ok(true) => {}
            Ok(false) => tracing::debug!(key, "Cache declined entry"),
            Err(e) => tracing::warn!(key, "Cache store failed: {}", e),
        }
    }

    fn shape(rows: &RowSet, request: &QueryRequest) -> QueryOutput {
        let shape = request.effective_shape();
        if request.returns_single_row() {
            QueryOutput::Row(rows.rows.first().map(|row| rows.shape_row(row, shape)))
        } else {
            QueryOutput::Rows(rows.shape_rows(shape))
        }
    }

    /// Execute SQL as given, without parameters or caching
    pub async fn raw_sql(&mut self, sql: &str) -> Result<RowSet, DataError> {
        self.counters.increment(OperationKind::Sql);
        tracing::debug!(sql, "raw sql");
        match self.adapter.execute_raw(sql).await {
            Ok(rows) => {
                self.last_row_count = rows.row_count() as u64;
                Ok(rows)
            }
            Err(e) => Err(self.fail("raw_sql", e)),
        }
    }

    /// Insert one row; returns the affected row count
    pub async fn insert(&mut self, table: &str, data: &RowData) -> Result<u64, DataError> {
        let result = match QueryBuilder::insert(table, data) {
            Ok(statement) => self.write(&statement, OperationKind::Insert).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.fail("insert", e))
    }

    /// Insert many rows in one statement, inside a transaction unless a batch
    /// is already open
    pub async fn insert_batch(
        &mut self,
        table: &str,
        fields: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<u64, DataError> {
        match self.run_insert_batch(table, fields, rows).await {
            Ok(affected) => Ok(affected),
            Err(e) => Err(self.fail("insert_batch", e)),
        }
    }

    async fn run_insert_batch(
        &mut self,
        table: &str,
        fields: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<u64, DataError> {
        let statement = QueryBuilder::insert_batch(table, fields, rows)?;
        if self.in_batch {
            return self.write(&statement, OperationKind::Insert).await;
        }

        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "insert_batch");
        self.adapter.begin_transaction().await?;
        let outcome = match self
            .adapter
            .execute_statement(&statement.sql, &statement.params)
            .await
        {
            Ok(affected) => self.adapter.commit().await.map(|_| affected),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(affected) => {
                self.counters.increment(OperationKind::Insert);
                self.last_row_count = affected;
                Ok(affected)
            }
            Err(e) => {
                if let Err(rollback_err) = self.adapter.rollback().await {
                    tracing::error!("Rollback after failed batch insert into {} failed: {}", table, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Update rows matched on `id`, or on `match_columns` when given
    pub async fn update(
        &mut self,
        table: &str,
        data: &RowData,
        match_columns: Option<&[&str]>,
    ) -> Result<u64, DataError> {
        let result = match QueryBuilder::update(table, data, match_columns) {
            Ok(statement) => self.write(&statement, OperationKind::Update).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.fail("update", e))
    }

    pub async fn delete(&mut self, table: &str, filters: &[Filter]) -> Result<u64, DataError> {
        let result = match QueryBuilder::delete(table, filters) {
            Ok(statement) => self.write(&statement, OperationKind::Delete).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| self.fail("delete", e))
    }

    async fn write(&mut self, statement: &Statement, kind: OperationKind) -> Result<u64, DataError> {
        tracing::debug!(sql = %statement.sql, params = statement.params.len(), "{}", kind.as_str());
        let affected = self
            .adapter
            .execute_statement(&statement.sql, &statement.params)
            .await?;
        self.counters.increment(kind);
        self.last_row_count = affected;
        Ok(affected)
    }

    /// Open a transaction spanning the writes that follow
    pub async fn begin_batch(&mut self) -> Result<(), DataError> {
        if self.in_batch {
            let e = DataError::MalformedRequest("A batch is already open".to_string());
            return Err(self.fail("begin_batch", e));
        }
        match self.adapter.begin_transaction().await {
            Ok(()) => {
                self.in_batch = true;
                Ok(())
            }
            Err(e) => Err(self.fail("begin_batch", e)),
        }
    }

    pub async fn commit_batch(&mut self) -> Result<(), DataError> {
        if !self.in_batch {
            let e = DataError::MalformedRequest("No batch is open".to_string());
            return Err(self.fail("commit_batch", e));
        }
        match self.adapter.commit().await {
            Ok(()) => {
                self.in_batch = false;
                Ok(())
            }
            Err(e) => Err(self.fail("commit_batch", e)),
        }
    }

    pub async fn rollback_batch(&mut self) -> Result<(), DataError> {
        if !self.in_batch {
            let e = DataError::MalformedRequest("No batch is open".to_string());
            return Err(self.fail("rollback_batch", e));
        }
        self.in_batch = false;
        self.adapter
            .rollback()
            .await
            .map_err(|e| self.fail("rollback_batch", e))
    }

    pub fn in_batch(&self) -> bool {
        self.in_batch
    }

    pub async fn last_insert_id(&mut self) -> Result<Option<i64>, DataError> {
        match self.adapter.last_insert_id().await {
            Ok(id) => Ok(id),
            Err(e) => Err(self.fail("last_insert_id", e)),
        }
    }

    /// Rows returned by the last select or affected by the last write
    pub fn last_row_count(&self) -> u64 {
        self.last_row_count
    }

    pub fn operation_counter(&self, kind: OperationKind) -> u64 {
        self.counters.get(kind)
    }

    pub fn operation_counters(&self) -> BTreeMap<&'static str, u64> {
        self.counters.snapshot()
    }

    pub async fn list_tables(&mut self) -> Result<Vec<String>, DataError> {
        match self.adapter.list_tables().await {
            Ok(tables) => Ok(tables),
            Err(e) => Err(self.fail("list_tables", e)),
        }
    }

    pub async fn list_columns(&mut self, table: &str) -> Result<Vec<Column>, DataError> {
        match self.adapter.list_columns(table).await {
            Ok(columns) => Ok(columns),
            Err(e) => Err(self.fail("list_columns", e)),
        }
    }

    pub fn database_type(&self) -> &str {
        self.adapter.database_type()
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn errors_mut(&mut self) -> &mut ErrorLog {
        &mut self.errors
    }

    /// Record a failed operation and hand the error back to the caller
    fn fail(&mut self, operation: &str, error: DataError) -> DataError {
        tracing::error!(operation, code = error.code(), "{}", error);
        self.errors.record(COMPONENT, operation, &error);
        error
    }
}
