pub mod models;
pub mod queries;
pub mod sqlite;

pub use models::{CachedFileRecord, HashKind, StoreStats, MTIME_TOLERANCE};
pub use sqlite::HashStore;
