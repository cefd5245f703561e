// Database abstraction layer for the supported drivers
pub mod adapter;
pub mod mysql;
pub mod sqlite;

pub use adapter::{DatabaseAdapter, RowSet};
pub use mysql::MySQLAdapter;
pub use sqlite::SqliteAdapter;

use crate::error::DataError;
use serde::{Deserialize, Serialize};

/// Database type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Sqlite,
    MySQL,
}

impl DatabaseType {
    pub fn from_str(s: &str) -> Result<Self, DataError> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DatabaseType::Sqlite),
            "mysql" | "mariadb" => Ok(DatabaseType::MySQL),
            _ => Err(DataError::Validation(format!("Unsupported database type: {}", s))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Sqlite => "sqlite",
            DatabaseType::MySQL => "mysql",
        }
    }
}

/// Factory function to open the adapter for a database type
pub async fn create_adapter(
    db_type: DatabaseType,
    connection_url: &str,
) -> Result<Box<dyn DatabaseAdapter>, DataError> {
    tracing::info!(
        "Opening {} database: {}",
        db_type.as_str(),
        mask_credentials(connection_url)
    );

    match db_type {
        DatabaseType::Sqlite => Ok(Box::new(SqliteAdapter::new(connection_url).await?)),
        DatabaseType::MySQL => Ok(Box::new(MySQLAdapter::new(connection_url)?)),
    }
}

/// Mask credentials in connection URL for safe logging
pub fn mask_credentials(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed_url) if parsed_url.password().is_some() => {
            let mut masked = parsed_url.clone();
            let _ = masked.set_password(Some("***"));
            masked.to_string()
        }
        Ok(_) => url.to_string(),
        // Plain filesystem paths carry no credentials
        Err(_) if !url.contains('@') => url.to_string(),
        Err(_) => "[invalid-url]".to_string(),
    }
}
