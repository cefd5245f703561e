use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DataError;

/// Column → value data for insert and update
pub type RowData = serde_json::Map<String, Value>;

/// A single WHERE condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// `column = :column`, value bound as a parameter
    Equals { column: String, value: Value },
    /// Boolean expression inserted verbatim, never parameterized
    Raw(String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn raw(predicate: impl Into<String>) -> Self {
        Filter::Raw(predicate.into())
    }
}

/// How a result row is materialized
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchShape {
    /// JSON object keyed by column name
    #[default]
    Assoc,
    /// JSON array in column order
    Num,
    /// First column only, as a bare value
    Column,
}

impl FetchShape {
    pub fn from_str(s: &str) -> Result<Self, DataError> {
        match s.to_lowercase().as_str() {
            "assoc" => Ok(FetchShape::Assoc),
            "num" => Ok(FetchShape::Num),
            "column" | "singlecolumn" => Ok(FetchShape::Column),
            _ => Err(DataError::Validation(format!("Unsupported fetch shape: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FetchShape::Assoc => "assoc",
            FetchShape::Num => "num",
            FetchShape::Column => "column",
        }
    }
}

/// Declarative description of a SELECT
///
/// Identifiers and the `join`/`order_by`/`group_by`/`limit` fragments are
/// inserted verbatim; only `Filter::Equals` values are parameterized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub table: String,
    pub fields: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub join: Option<String>,
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    pub limit: Option<String>,
    #[serde(default)]
    pub single_row: bool,
    #[serde(default)]
    pub single: bool,
    #[serde(default)]
    pub fetch_shape: FetchShape,
    /// 0 disables caching for this call
    #[serde(default)]
    pub cache_ttl_secs: u64,
}

impl QueryRequest {
    /// `fields` may be `*` or a comma-separated column list
    pub fn new(table: impl Into<String>, fields: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            fields: vec![fields.into()],
            ..Default::default()
        }
    }

    pub fn with_fields<I, S>(table: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table: table.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn where_raw(self, predicate: impl Into<String>) -> Self {
        self.filter(Filter::raw(predicate))
    }

    pub fn join(mut self, join: impl Into<String>) -> Self {
        self.join = Some(join.into());
        self
    }

    pub fn order_by(mut self, order_by: impl Into<String>) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn group_by(mut self, group_by: impl Into<String>) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    pub fn limit(mut self, limit: impl Into<String>) -> Self {
        self.limit = Some(limit.into());
        self
    }

    pub fn single_row(mut self) -> Self {
        self.single_row = true;
        self
    }

    /// Fetch one scalar: implies a single row and the column shape
    pub fn single(mut self) -> Self {
        self.single = true;
        self
    }

    pub fn fetch_shape(mut self, shape: FetchShape) -> Self {
        self.fetch_shape = shape;
        self
    }

    pub fn cache_ttl(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    pub fn effective_shape(&self) -> FetchShape {
        if self.single {
            FetchShape::Column
        } else {
            self.fetch_shape
        }
    }

    pub fn returns_single_row(&self) -> bool {
        self.single || self.single_row
    }
}

/// Result of a select, shaped per `FetchShape` and `single_row`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum QueryOutput {
    Rows(Vec<Value>),
    Row(Option<Value>),
}

impl QueryOutput {
    /// All rows; a single-row result yields zero or one element
    pub fn into_rows(self) -> Vec<Value> {
        match self {
            QueryOutput::Rows(rows) => rows,
            QueryOutput::Row(row) => row.into_iter().collect(),
        }
    }

    pub fn first(&self) -> Option<&Value> {
        match self {
            QueryOutput::Rows(rows) => rows.first(),
            QueryOutput::Row(row) => row.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Rows(rows) => rows.len(),
            QueryOutput::Row(row) => usize::from(row.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Unit stored in and read back from the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub row_count: u64,
    pub result: QueryOutput,
}

impl CacheEntry {
    pub fn encode(&self) -> Result<Vec<u8>, DataError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DataError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
