// Query Builder
//
// Renders parameterized SQL from declarative requests. Pure: no I/O, the same
// input always yields the same text and parameters.

use crate::error::DataError;
use crate::models::{Filter, QueryRequest, RowData};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Parameters bound to a rendered statement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Params {
    /// Keyed by bind name, without the leading `:`
    Named(BTreeMap<String, Value>),
    /// In placeholder order
    Positional(Vec<Value>),
}

impl Params {
    pub fn none() -> Self {
        Params::Named(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Params::Named(values) => values.len(),
            Params::Positional(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::none()
    }
}

/// SQL text plus the values to bind when executing it
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Params,
}

/// WHERE conditions split into the raw and the parameterized halves
#[derive(Debug, Default)]
struct WhereParts {
    raw: Vec<String>,
    named: Vec<String>,
    values: BTreeMap<String, Value>,
}

impl WhereParts {
    fn conditions(&self) -> Vec<String> {
        self.raw.iter().chain(self.named.iter()).cloned().collect()
    }
}

pub struct QueryBuilder;

impl QueryBuilder {
    /// Bind name for a column: the column with every `.` removed
    pub fn bind_name(column: &str) -> String {
        column.replace('.', "")
    }

    /// Render a SELECT
    pub fn select(request: &QueryRequest) -> Result<Statement, DataError> {
        Self::require_table(&request.table)?;

        let fields: Vec<&str> = request
            .fields
            .iter()
            .map(|f| f.trim())
            .filter(|f| !f.is_empty())
            .collect();
        if fields.is_empty() {
            return Err(DataError::MalformedRequest(format!(
                "No fields selected from {}",
                request.table
            )));
        }

        let parts = Self::partition_filters(&request.filters)?;
        let mut conditions = parts.conditions();
        if let Some(join) = request.join.as_deref().filter(|j| !j.is_empty()) {
            conditions.push(join.to_string());
        }

        let mut sql = format!("SELECT {} FROM {}", fields.join(","), request.table);
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        if let Some(group_by) = &request.group_by {
            sql.push_str(" GROUP BY ");
            sql.push_str(group_by);
        }
        if let Some(order_by) = &request.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some(limit) = &request.limit {
            sql.push_str(" LIMIT ");
            sql.push_str(limit);
        }

        Ok(Statement {
            sql,
            params: Params::Named(parts.values),
        })
    }

    /// Render a single-row INSERT with named parameters
    pub fn insert(table: &str, data: &RowData) -> Result<Statement, DataError> {
        Self::require_table(table)?;
        if data.is_empty() {
            return Err(DataError::MalformedRequest(format!(
                "No values to insert into {}",
                table
            )));
        }

        let mut columns = Vec::with_capacity(data.len());
        let mut placeholders = Vec::with_capacity(data.len());
        let mut values = BTreeMap::new();
        for (column, value) in data {
            let bind = Self::bind(&mut values, column, value.clone())?;
            columns.push(column.as_str());
            placeholders.push(format!(":{}", bind));
        }

        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(","),
                placeholders.join(",")
            ),
            params: Params::Named(values),
        })
    }

    /// Render a multi-row INSERT with one group of positional placeholders per row
    pub fn insert_batch(
        table: &str,
        fields: &[&str],
        rows: &[Vec<Value>],
    ) -> Result<Statement, DataError> {
        Self::require_table(table)?;
        if fields.is_empty() {
            return Err(DataError::MalformedRequest(format!(
                "Batch insert into {} names no fields",
                table
            )));
        }
        if rows.is_empty() {
            return Err(DataError::MalformedRequest(format!(
                "Batch insert into {} has no rows",
                table
            )));
        }

        let group = format!("({})", vec!["?"; fields.len()].join(","));
        let mut groups = Vec::with_capacity(rows.len());
        let mut values = Vec::with_capacity(rows.len() * fields.len());
        for (idx, row) in rows.iter().enumerate() {
            if row.len() != fields.len() {
                return Err(DataError::MalformedRequest(format!(
                    "Row {} has {} values but {} fields were named",
                    idx,
                    row.len(),
                    fields.len()
                )));
            }
            groups.push(group.as_str());
            values.extend(row.iter().cloned());
        }

        Ok(Statement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES {}",
                table,
                fields.join(","),
                groups.join(",")
            ),
            params: Params::Positional(values),
        })
    }

    /// Render an UPDATE. Rows are matched on `id` unless `match_columns` names
    /// other columns; every match column must carry a value in `data`.
    pub fn update(
        table: &str,
        data: &RowData,
        match_columns: Option<&[&str]>,
    ) -> Result<Statement, DataError> {
        Self::require_table(table)?;
        if data.is_empty() {
            return Err(DataError::MalformedRequest(format!(
                "No values to update in {}",
                table
            )));
        }

        let mut assignments = Vec::with_capacity(data.len());
        let mut values = BTreeMap::new();
        for (column, value) in data {
            let bind = Self::bind(&mut values, column, value.clone())?;
            assignments.push(format!("{} = :{}", column, bind));
        }

        let match_columns = match match_columns {
            Some(columns) if !columns.is_empty() => columns,
            _ => &["id"][..],
        };
        let mut conditions = Vec::with_capacity(match_columns.len());
        for column in match_columns {
            if !data.contains_key(*column) {
                return Err(DataError::MalformedRequest(format!(
                    "Match column {} has no value in the update data for {}",
                    column, table
                )));
            }
            conditions.push(format!("{} = :{}", column, Self::bind_name(column)));
        }

        Ok(Statement {
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                table,
                assignments.join(", "),
                conditions.join(" AND ")
            ),
            params: Params::Named(values),
        })
    }

    /// Render a DELETE. Named filters are bound like in `select`.
    pub fn delete(table: &str, filters: &[Filter]) -> Result<Statement, DataError> {
        Self::require_table(table)?;

        let parts = Self::partition_filters(filters)?;
        let conditions = parts.conditions();
        if conditions.is_empty() {
            return Err(DataError::MalformedRequest(format!(
                "Refusing to delete from {} without a filter",
                table
            )));
        }

        Ok(Statement {
            sql: format!("DELETE FROM {} WHERE {}", table, conditions.join(" AND ")),
            params: Params::Named(parts.values),
        })
    }

    fn partition_filters(filters: &[Filter]) -> Result<WhereParts, DataError> {
        let mut parts = WhereParts::default();
        for filter in filters {
            match filter {
                Filter::Raw(predicate) => {
                    if !predicate.trim().is_empty() {
                        parts.raw.push(predicate.clone());
                    }
                }
                Filter::Equals { column, value } => {
                    let bind = Self::bind(&mut parts.values, column, value.clone())?;
                    parts.named.push(format!("{} = :{}", column, bind));
                }
            }
        }
        Ok(parts)
    }

    /// Register a value under the column's bind name, rejecting collisions
    fn bind(
        values: &mut BTreeMap<String, Value>,
        column: &str,
        value: Value,
    ) -> Result<String, DataError> {
        let bind = Self::bind_name(column);
        if bind.is_empty() {
            return Err(DataError::MalformedRequest(format!(
                "Column name {:?} has no usable bind name",
                column
            )));
        }
        if values.contains_key(&bind) {
            return Err(DataError::MalformedRequest(format!(
                "Column {} collides with another column on bind name :{}",
                column, bind
            )));
        }
        values.insert(bind.clone(), value);
        Ok(bind)
    }

    fn require_table(table: &str) -> Result<(), DataError> {
        if table.trim().is_empty() {
            return Err(DataError::MalformedRequest("Table name is empty".to_string()));
        }
        Ok(())
    }
}
