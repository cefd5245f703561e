// MySQL adapter holding one connection checked out of a mysql_async pool
use crate::error::DataError;
use crate::models::Column;
use crate::services::database::adapter::{DatabaseAdapter, RowSet};
use crate::services::query_builder::Params;
use mysql_async::{prelude::*, Conn, Opts, Params as MySqlParams, Pool, Row, Value as MySqlValue};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use url::Url;

pub struct MySQLAdapter {
    pool: Pool,
    conn: Mutex<Option<Conn>>,
}

impl MySQLAdapter {
    pub fn new(connection_url: &str) -> Result<Self, DataError> {
        // Validate MySQL URL format
        let url = Url::parse(connection_url)
            .map_err(|e| DataError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        if url.scheme() != "mysql" && url.scheme() != "mariadb" {
            return Err(DataError::Validation(
                "URL must use mysql:// or mariadb:// scheme".to_string(),
            ));
        }

        let opts = Opts::from_url(&url.to_string().replacen("mariadb://", "mysql://", 1))
            .map_err(|e| DataError::Validation(format!("Invalid MySQL URL: {}", e)))?;

        Ok(Self {
            pool: Pool::new(opts),
            conn: Mutex::new(None),
        })
    }

    /// Check out the adapter's connection, opening it on first use
    async fn connection<'a>(&self, slot: &'a mut Option<Conn>) -> Result<&'a mut Conn, DataError> {
        if slot.is_none() {
            let conn = self.pool.get_conn().await.map_err(|e| {
                DataError::Connection(format!("Failed to get MySQL connection from pool: {}", e))
            })?;
            *slot = Some(conn);
        }
        slot.as_mut()
            .ok_or_else(|| DataError::Connection("MySQL connection unavailable".to_string()))
    }

    /// Return the connection to the pool and close the pool
    pub async fn disconnect(self) -> Result<(), DataError> {
        if let Some(conn) = self.conn.into_inner() {
            drop(conn);
        }
        self.pool.disconnect().await?;
        Ok(())
    }

    fn to_mysql_params(params: &Params) -> MySqlParams {
        match params {
            Params::Named(values) if values.is_empty() => MySqlParams::Empty,
            Params::Named(values) => MySqlParams::from(
                values
                    .iter()
                    .map(|(name, value)| (name.clone(), Self::json_to_mysql_value(value)))
                    .collect::<Vec<(String, MySqlValue)>>(),
            ),
            Params::Positional(values) if values.is_empty() => MySqlParams::Empty,
            Params::Positional(values) => {
                MySqlParams::Positional(values.iter().map(Self::json_to_mysql_value).collect())
            }
        }
    }

    fn json_to_mysql_value(value: &Value) -> MySqlValue {
        match value {
            Value::Null => MySqlValue::NULL,
            Value::Bool(b) => MySqlValue::Int(i64::from(*b)),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MySqlValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    MySqlValue::UInt(u)
                } else {
                    MySqlValue::Double(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => MySqlValue::Bytes(s.as_bytes().to_vec()),
            other => MySqlValue::Bytes(other.to_string().into_bytes()),
        }
    }

    /// Helper function to convert MySQL Value to JSON Value
    fn mysql_value_to_json(mysql_val: MySqlValue) -> Value {
        match mysql_val {
            MySqlValue::NULL => Value::Null,
            MySqlValue::Bytes(bytes) => {
                // Try to convert to UTF-8 string
                match String::from_utf8(bytes) {
                    Ok(s) => json!(s),
                    Err(err) => json!(hex::encode(err.into_bytes())),
                }
            }
            MySqlValue::Int(i) => json!(i),
            MySqlValue::UInt(u) => json!(u),
            MySqlValue::Float(f) => json!(f),
            MySqlValue::Double(d) => json!(d),
            MySqlValue::Date(y, m, d, h, min, s, _) => {
                json!(format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, h, min, s))
            }
            MySqlValue::Time(is_neg, d, h, m, s, _) => {
                let sign = if is_neg { "-" } else { "" };
                let total_hours = d * 24 + h as u32;
                json!(format!("{}{}:{:02}:{:02}", sign, total_hours, m, s))
            }
        }
    }

    fn rows_to_row_set(rows: Vec<Row>) -> RowSet {
        let columns: Vec<String> = rows
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|column| column.name_str().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let rows = rows
            .into_iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| match row.get_opt::<MySqlValue, usize>(idx) {
                        Some(Ok(mysql_val)) => Self::mysql_value_to_json(mysql_val),
                        Some(Err(_)) | None => Value::Null,
                    })
                    .collect()
            })
            .collect();

        RowSet { columns, rows }
    }
}

#[async_trait::async_trait]
impl DatabaseAdapter for MySQLAdapter {
    async fn execute_query(&self, sql: &str, params: &Params) -> Result<RowSet, DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        let rows: Vec<Row> = conn.exec(sql, Self::to_mysql_params(params)).await?;
        Ok(Self::rows_to_row_set(rows))
    }

    async fn execute_statement(&self, sql: &str, params: &Params) -> Result<u64, DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        conn.exec_drop(sql, Self::to_mysql_params(params)).await?;
        Ok(conn.affected_rows())
    }

    async fn execute_raw(&self, sql: &str) -> Result<RowSet, DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        let rows: Vec<Row> = conn.query(sql).await?;
        Ok(Self::rows_to_row_set(rows))
    }

    async fn last_insert_id(&self) -> Result<Option<i64>, DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        Ok(conn.last_insert_id().and_then(|id| i64::try_from(id).ok()))
    }

    async fn begin_transaction(&self) -> Result<(), DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        conn.query_drop("START TRANSACTION").await?;
        Ok(())
    }

    async fn commit(&self) -> Result<(), DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        conn.query_drop("COMMIT").await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<(), DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        conn.query_drop("ROLLBACK").await?;
        Ok(())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        let tables: Vec<String> = conn.query("SHOW TABLES").await?;
        Ok(tables)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>, DataError> {
        let mut slot = self.conn.lock().await;
        let conn = self.connection(&mut slot).await?;
        let query = format!("SHOW COLUMNS FROM `{}`", table.replace('`', "``"));

        let rows: Vec<(String, String, String, String, Option<String>, String)> =
            conn.query(query).await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, key, default_value, extra)| Column {
                name,
                data_type,
                is_nullable: is_nullable == "YES",
                is_primary_key: key == "PRI",
                default_value,
                extra: if extra.is_empty() { None } else { Some(extra) },
            })
            .collect())
    }

    fn database_type(&self) -> &str {
        "mysql"
    }
}
