use serde::{Deserialize, Serialize};

/// Column descriptor returned by `list_columns`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    pub is_primary_key: bool,
    pub default_value: Option<String>,
    /// Driver-specific attributes such as `auto_increment`
    pub extra: Option<String>,
}
