//! # Local Content Store
//!
//! Owns the local copy of the synced catalog.
//!
//! ## Overview
//!
//! - [`models`]: `LocalRecord`, `AvailabilityWindow`, `PublishStatus`, `Property`
//! - [`store`]: the `ContentStore` interface the sync engine talks to and its
//!   SQLite implementation
//! - [`db`]: connection pool and embedded migrations (content records, sync
//!   cursors and the dispatch queue)

pub mod db;
pub mod error;
pub mod models;
pub mod store;

pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use error::{LibraryError, Result};
pub use models::{AvailabilityWindow, LocalRecord, Property, PublishStatus, RecordId};
pub use store::{ContentStore, SqliteContentStore};
