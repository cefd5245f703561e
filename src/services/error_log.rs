// Error Log
//
// Append-only record of non-fatal failures, queryable after the fact.

use crate::error::DataError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub component: String,
    pub operation: String,
    pub message: String,
    pub code: String,
    pub context: String,
    /// Values substituted into the message template
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

/// Criteria for `ErrorLog::query`. Unset or empty criteria match everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorFilter<'a> {
    pub component: Option<&'a str>,
    pub operation: Option<&'a str>,
    pub context: Option<&'a str>,
    pub code: Option<&'a str>,
}

impl<'a> ErrorFilter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component(mut self, component: &'a str) -> Self {
        self.component = Some(component);
        self
    }

    pub fn operation(mut self, operation: &'a str) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn context(mut self, context: &'a str) -> Self {
        self.context = Some(context);
        self
    }

    pub fn code(mut self, code: &'a str) -> Self {
        self.code = Some(code);
        self
    }
}

fn criterion(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Replace each `{name}` in `template` with its value; unknown placeholders stay as written
fn render_message(template: &str, variables: &BTreeMap<String, String>) -> String {
    variables
        .iter()
        .fold(template.to_string(), |message, (name, value)| {
            message.replace(&format!("{{{}}}", name), value)
        })
}

#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Vec<ErrorEntry>,
    context: String,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry under the current context
    pub fn add(
        &mut self,
        component: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
    ) -> &ErrorEntry {
        let context = self.context.clone();
        self.add_in_context(component, operation, message, code, context)
    }

    /// Append an entry under an explicit context; an empty context falls back
    /// to the current one
    pub fn add_in_context(
        &mut self,
        component: impl Into<String>,
        operation: impl Into<String>,
        message: impl Into<String>,
        code: impl Into<String>,
        context: impl Into<String>,
    ) -> &ErrorEntry {
        self.push(
            component.into(),
            operation.into(),
            message.into(),
            code.into(),
            context.into(),
            BTreeMap::new(),
        )
    }

    /// Append an entry whose message is `template` with `{name}` placeholders
    /// filled from `variables`. The variables are kept on the entry.
    pub fn add_with_variables(
        &mut self,
        component: impl Into<String>,
        operation: impl Into<String>,
        template: &str,
        variables: BTreeMap<String, String>,
        code: impl Into<String>,
    ) -> &ErrorEntry {
        let message = render_message(template, &variables);
        let context = self.context.clone();
        self.push(
            component.into(),
            operation.into(),
            message,
            code.into(),
            context,
            variables,
        )
    }

    fn push(
        &mut self,
        component: String,
        operation: String,
        message: String,
        code: String,
        context: String,
        variables: BTreeMap<String, String>,
    ) -> &ErrorEntry {
        let entry = ErrorEntry {
            component,
            operation,
            message,
            code,
            context: if context.is_empty() {
                self.context.clone()
            } else {
                context
            },
            variables,
            occurred_at: Utc::now(),
        };
        let idx = self.entries.len();
        self.entries.push(entry);
        &self.entries[idx]
    }

    /// Append a `DataError`, keeping the underlying message and its code
    pub fn record(&mut self, component: &str, operation: &str, error: &DataError) -> &ErrorEntry {
        self.add(component, operation, error.detail(), error.code())
    }

    /// Entries matching every given criterion, in insertion order.
    /// Criteria apply as component, operation, context, then code.
    pub fn query(&self, filter: &ErrorFilter<'_>) -> Vec<&ErrorEntry> {
        let component = criterion(filter.component);
        let operation = criterion(filter.operation);
        let context = criterion(filter.context);
        let code = criterion(filter.code);

        self.entries
            .iter()
            .filter(|e| component.map_or(true, |c| e.component == c))
            .filter(|e| operation.map_or(true, |o| e.operation == o))
            .filter(|e| context.map_or(true, |c| e.context == c))
            .filter(|e| code.map_or(true, |c| e.code == c))
            .collect()
    }

    pub fn has_error(&self, filter: &ErrorFilter<'_>) -> bool {
        !self.query(filter).is_empty()
    }

    pub fn first_message(&self, filter: &ErrorFilter<'_>) -> Option<&str> {
        self.query(filter).first().map(|e| e.message.as_str())
    }

    /// Context given to subsequent entries until cleared
    pub fn set_context(&mut self, context: impl Into<String>) {
        self.context = context.into();
    }

    pub fn clear_context(&mut self) {
        self.context.clear();
    }

    pub fn current_context(&self) -> &str {
        &self.context
    }

    pub fn entries(&self) -> &[ErrorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry; the current context is kept
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> ErrorLog {
        let mut log = ErrorLog::new();
        log.add("DataAccessFacade", "select", "no such table: Users", "DRIVER_ERROR");
        log.set_context("request-7");
        log.add("DataAccessFacade", "insert", "UNIQUE constraint failed", "DRIVER_ERROR");
        log.add("Billing", "charge", "card declined", "402");
        log.clear_context();
        log.add_in_context("DataAccessFacade", "update", "missing id", "MALFORMED_REQUEST", "request-9");
        log
    }

    #[test]
    fn test_query_filters_combine() {
        let log = populated();

        assert_eq!(log.query(&ErrorFilter::new()).len(), 4);
        assert_eq!(
            log.query(&ErrorFilter::new().component("DataAccessFacade")).len(),
            3
        );
        let hits = log.query(
            &ErrorFilter::new()
                .component("DataAccessFacade")
                .context("request-7"),
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].operation, "insert");

        assert_eq!(log.query(&ErrorFilter::new().code("DRIVER_ERROR")).len(), 2);
        assert!(log
            .query(&ErrorFilter::new().component("Billing").code("DRIVER_ERROR"))
            .is_empty());
    }

    #[test]
    fn test_query_preserves_insertion_order() {
        let log = populated();
        let operations: Vec<&str> = log
            .query(&ErrorFilter::new().component("DataAccessFacade"))
            .iter()
            .map(|e| e.operation.as_str())
            .collect();
        assert_eq!(operations, vec!["select", "insert", "update"]);
    }

    #[test]
    fn test_empty_criteria_match_everything() {
        let log = populated();
        assert_eq!(log.query(&ErrorFilter::new().component("").code("")).len(), 4);
    }

    #[test]
    fn test_context_defaults() {
        let log = populated();
        assert_eq!(log.entries()[0].context, "");
        assert_eq!(log.entries()[1].context, "request-7");
        assert_eq!(log.entries()[3].context, "request-9");
        assert_eq!(log.current_context(), "");
    }

    #[test]
    fn test_has_error_and_first_message() {
        let log = populated();
        assert!(log.has_error(&ErrorFilter::new().operation("charge")));
        assert!(!log.has_error(&ErrorFilter::new().operation("delete")));
        assert_eq!(
            log.first_message(&ErrorFilter::new().code("DRIVER_ERROR")),
            Some("no such table: Users")
        );
        assert_eq!(log.first_message(&ErrorFilter::new().component("Mailer")), None);
    }

    #[test]
    fn test_record_data_error() {
        let mut log = ErrorLog::new();
        let entry = log.record(
            "DataAccessFacade",
            "update",
            &DataError::MalformedRequest("Match column id has no value".to_string()),
        );
        assert_eq!(entry.code, "MALFORMED_REQUEST");
        assert_eq!(entry.message, "Match column id has no value");
    }

    #[test]
    fn test_message_variables() {
        let mut log = ErrorLog::new();
        log.set_context("import");
        let variables = BTreeMap::from([
            ("table".to_string(), "Users".to_string()),
            ("rows".to_string(), "3".to_string()),
        ]);
        let entry = log.add_with_variables(
            "Importer",
            "load",
            "Could not load {rows} rows into {table} ({reason})",
            variables,
            "IMPORT_FAILED",
        );

        assert_eq!(entry.message, "Could not load 3 rows into Users ({reason})");
        assert_eq!(entry.variables["table"], "Users");
        assert_eq!(entry.context, "import");
        assert!(log.entries()[0].variables.contains_key("rows"));
        assert!(populated().entries()[0].variables.is_empty());
    }

    #[test]
    fn test_clear_keeps_context() {
        let mut log = populated();
        log.set_context("batch");
        log.clear();
        assert!(log.is_empty());
        assert_eq!(log.current_context(), "batch");
    }
}
