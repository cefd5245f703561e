use crate::error::DataError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Operation kinds tracked by the facade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Select,
    Sql,
    Insert,
    Update,
    Delete,
    /// Select answered from the cache
    #[serde(rename = "cache")]
    CacheHit,
}

impl OperationKind {
    pub const ALL: [OperationKind; 6] = [
        OperationKind::Select,
        OperationKind::Sql,
        OperationKind::Insert,
        OperationKind::Update,
        OperationKind::Delete,
        OperationKind::CacheHit,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Select => "select",
            OperationKind::Sql => "sql",
            OperationKind::Insert => "insert",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
            OperationKind::CacheHit => "cache",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, DataError> {
        match s.to_lowercase().as_str() {
            "select" => Ok(OperationKind::Select),
            "sql" => Ok(OperationKind::Sql),
            "insert" => Ok(OperationKind::Insert),
            "update" => Ok(OperationKind::Update),
            "delete" => Ok(OperationKind::Delete),
            "cache" | "cache-hit" | "cache_hit" => Ok(OperationKind::CacheHit),
            _ => Err(DataError::Validation(format!("Unknown operation kind: {}", s))),
        }
    }
}

/// Monotonic per-operation counts
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Counters {
    pub select: u64,
    pub sql: u64,
    pub insert: u64,
    pub update: u64,
    pub delete: u64,
    pub cache: u64,
}

impl Counters {
    pub fn get(&self, kind: OperationKind) -> u64 {
        match kind {
            OperationKind::Select => self.select,
            OperationKind::Sql => self.sql,
            OperationKind::Insert => self.insert,
            OperationKind::Update => self.update,
            OperationKind::Delete => self.delete,
            OperationKind::CacheHit => self.cache,
        }
    }

    pub fn increment(&mut self, kind: OperationKind) {
        let slot = match kind {
            OperationKind::Select => &mut self.select,
            OperationKind::Sql => &mut self.sql,
            OperationKind::Insert => &mut self.insert,
            OperationKind::Update => &mut self.update,
            OperationKind::Delete => &mut self.delete,
            OperationKind::CacheHit => &mut self.cache,
        };
        *slot += 1;
    }

    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        OperationKind::ALL
            .iter()
            .map(|kind| (kind.as_str(), self.get(*kind)))
            .collect()
    }
}
