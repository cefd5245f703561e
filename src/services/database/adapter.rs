// Database adapter trait: the narrow driver interface the facade executes through
use crate::error::DataError;
use crate::models::{Column, FetchShape};
use crate::services::query_builder::Params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Rows returned by a driver, in column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Materialize one row in the requested shape
    pub fn shape_row(&self, row: &[Value], shape: FetchShape) -> Value {
        match shape {
            FetchShape::Assoc => {
                let mut row_obj = serde_json::Map::new();
                for (name, value) in self.columns.iter().zip(row.iter()) {
                    row_obj.insert(name.clone(), value.clone());
                }
                Value::Object(row_obj)
            }
            FetchShape::Num => Value::Array(row.to_vec()),
            FetchShape::Column => row.first().cloned().unwrap_or(Value::Null),
        }
    }

    /// All rows in the requested shape
    pub fn shape_rows(&self, shape: FetchShape) -> Vec<Value> {
        self.rows.iter().map(|row| self.shape_row(row, shape)).collect()
    }
}

/// Database adapter trait - abstraction over the relational driver
///
/// Implementations own a single connection and serialize access to it.
/// Statements are prepared internally; `Params::Named` keys carry no `:`.
#[async_trait::async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Run a statement that returns rows
    async fn execute_query(&self, sql: &str, params: &Params) -> Result<RowSet, DataError>;

    /// Run a statement that modifies rows, returning the affected row count
    async fn execute_statement(&self, sql: &str, params: &Params) -> Result<u64, DataError>;

    /// Run unparameterized SQL; statements without a result set yield an empty RowSet
    async fn execute_raw(&self, sql: &str) -> Result<RowSet, DataError>;

    /// Identifier generated by the most recent insert on this connection
    async fn last_insert_id(&self) -> Result<Option<i64>, DataError>;

    async fn begin_transaction(&self) -> Result<(), DataError>;

    async fn commit(&self) -> Result<(), DataError>;

    async fn rollback(&self) -> Result<(), DataError>;

    async fn list_tables(&self) -> Result<Vec<String>, DataError>;

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>, DataError>;

    /// Get database type
    fn database_type(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> RowSet {
        RowSet {
            columns: vec!["id".to_string(), "name".to_string()],
            rows: vec![
                vec![json!(1), json!("Alice")],
                vec![json!(2), json!("Bob")],
            ],
        }
    }

    #[test]
    fn test_shape_rows() {
        let rows = sample();
        assert_eq!(rows.row_count(), 2);
        assert_eq!(
            rows.shape_rows(FetchShape::Assoc),
            vec![json!({"id": 1, "name": "Alice"}), json!({"id": 2, "name": "Bob"})]
        );
        assert_eq!(
            rows.shape_rows(FetchShape::Num),
            vec![json!([1, "Alice"]), json!([2, "Bob"])]
        );
        assert_eq!(rows.shape_rows(FetchShape::Column), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_shape_empty_row_as_column() {
        let rows = RowSet::default();
        assert_eq!(rows.shape_row(&[], FetchShape::Column), Value::Null);
    }
}
