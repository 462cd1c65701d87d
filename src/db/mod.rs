//! Persistence: one document-store vocabulary over two backends.
//!
//! Layout:
//! - `document.rs`: records, queries, updates and result shapes
//! - `live.rs`: MongoDB collection speaking that vocabulary
//! - `fallback.rs`: file-persisted actor used when MongoDB is unreachable
//! - `manager.rs`: connection lifecycle and backend selection

pub mod document;
pub mod fallback;
pub mod live;
pub mod manager;

pub use document::{
    DeleteResult, ID_FIELD, InsertOneResult, Query, Record, Update, UpdateResult, new_record_id,
};
pub use fallback::FallbackCollection;
pub use live::LiveCollection;
pub use manager::{BackendMode, Collection, Database, DatabaseManager};
