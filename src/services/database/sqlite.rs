// SQLite adapter backed by a single rusqlite connection
use crate::error::DataError;
use crate::models::Column;
use crate::services::database::adapter::{DatabaseAdapter, RowSet};
use crate::services::query_builder::Params;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// SQLite adapter
/// Uses tokio::Mutex for async-friendly locking of the one connection
pub struct SqliteAdapter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAdapter {
    /// Open a SQLite database.
    ///
    /// Accepts plain paths, `sqlite:./path`, `sqlite://path` and `sqlite::memory:`.
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, DataError> {
        let path_str = db_path.as_ref().to_string_lossy();
        let clean_path: &str = if path_str.starts_with("sqlite:") {
            // Remove sqlite: or sqlite:// prefix
            let mut cleaned = path_str.trim_start_matches("sqlite:");
            cleaned = cleaned.trim_start_matches("//");
            cleaned
        } else {
            path_str.as_ref()
        };

        let conn = Connection::open(clean_path)
            .map_err(|e| DataError::Connection(format!("Failed to open SQLite database {}: {}", clean_path, e)))?;
        // Enable foreign key constraints
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        tracing::info!("Opened SQLite database: {}", clean_path);
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, DataError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DataError::Connection(format!("Failed to open in-memory SQLite database: {}", e)))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    fn query_rows<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<RowSet, DataError> {
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let column_count = columns.len();

        let mut rows = stmt.query(params)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                values.push(Self::sqlite_value_to_json(row.get_ref(idx)?));
            }
            result.push(values);
        }

        Ok(RowSet {
            columns,
            rows: result,
        })
    }

    fn execute_rows<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<u64, DataError> {
        let mut stmt = conn.prepare(sql)?;
        Ok(stmt.execute(params)? as u64)
    }

    /// Bind names as rusqlite expects them, with the leading `:`
    fn named_values(values: &std::collections::BTreeMap<String, Value>) -> Vec<(String, SqlValue)> {
        values
            .iter()
            .map(|(name, value)| (format!(":{}", name), Self::json_to_sqlite_value(value)))
            .collect()
    }

    fn positional_values(values: &[Value]) -> Vec<SqlValue> {
        values.iter().map(Self::json_to_sqlite_value).collect()
    }

    fn json_to_sqlite_value(value: &Value) -> SqlValue {
        match value {
            Value::Null => SqlValue::Null,
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    SqlValue::Integer(i)
                } else {
                    SqlValue::Real(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => SqlValue::Text(s.clone()),
            // Nested values are stored as their JSON text
            other => SqlValue::Text(other.to_string()),
        }
    }

    /// Helper function to convert a SQLite value to JSON; blobs become hex strings
    fn sqlite_value_to_json(value: ValueRef<'_>) -> Value {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for SqliteAdapter {
    async fn execute_query(&self, sql: &str, params: &Params) -> Result<RowSet, DataError> {
        let conn = self.conn.lock().await;
        match params {
            Params::Named(values) => {
                let bound = Self::named_values(values);
                let refs: Vec<(&str, &dyn ToSql)> = bound
                    .iter()
                    .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                    .collect();
                Self::query_rows(&conn, sql, refs.as_slice())
            }
            Params::Positional(values) => {
                let bound = Self::positional_values(values);
                Self::query_rows(&conn, sql, rusqlite::params_from_iter(bound.iter()))
            }
        }
    }

    async fn execute_statement(&self, sql: &str, params: &Params) -> Result<u64, DataError> {
        let conn = self.conn.lock().await;
        match params {
            Params::Named(values) => {
                let bound = Self::named_values(values);
                let refs: Vec<(&str, &dyn ToSql)> = bound
                    .iter()
                    .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
                    .collect();
                Self::execute_rows(&conn, sql, refs.as_slice())
            }
            Params::Positional(values) => {
                let bound = Self::positional_values(values);
                Self::execute_rows(&conn, sql, rusqlite::params_from_iter(bound.iter()))
            }
        }
    }

    async fn execute_raw(&self, sql: &str) -> Result<RowSet, DataError> {
        let conn = self.conn.lock().await;
        let column_count = conn.prepare(sql)?.column_count();
        if column_count == 0 {
            Self::execute_rows(&conn, sql, [])?;
            Ok(RowSet::default())
        } else {
            Self::query_rows(&conn, sql, [])
        }
    }

    async fn last_insert_id(&self) -> Result<Option<i64>, DataError> {
        let conn = self.conn.lock().await;
        let id = conn.last_insert_rowid();
        Ok(if id == 0 { None } else { Some(id) })
    }

    async fn begin_transaction(&self) -> Result<(), DataError> {
        let conn = self.conn.lock().await;
        conn.execute_batch("BEGIN")?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), DataError> {
        let conn = self.conn.lock().await;
        conn.execute_batch("COMMIT")?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DataError> {
        let conn = self.conn.lock().await;
        conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DataError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut tables = Vec::new();
        for row in rows {
            tables.push(row?);
        }
        Ok(tables)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>, DataError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let rows = stmt.query_map(rusqlite::params![table], |row| {
            Ok(Column {
                name: row.get(0)?,
                data_type: row.get(1)?,
                is_nullable: row.get::<_, i64>(2)? == 0,
                default_value: row.get(3)?,
                is_primary_key: row.get::<_, i64>(4)? > 0,
                extra: None,
            })
        })?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(row?);
        }
        Ok(columns)
    }

    fn database_type(&self) -> &str {
        "sqlite"
    }
}
