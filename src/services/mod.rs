pub mod counters;
pub mod database; // Driver adapters (SQLite, MySQL)
pub mod error_log;
pub mod facade;
pub mod query_builder;
pub mod query_cache; // Select result cache with LRU and TTL

pub use counters::*;
pub use error_log::*;
pub use facade::*;
pub use query_builder::*;
pub use query_cache::*;
