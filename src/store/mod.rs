//! Persistence layer — SQLite-backed storage for messages, rules, and config.

pub mod libsql_backend;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::Database;
