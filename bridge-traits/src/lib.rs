//! # Host Bridge Traits
//!
//! Collaborator contracts that the sync core depends on but does not implement.
//!
//! ## Overview
//!
//! The incremental sync engine talks to the outside world through a small set
//! of traits. Each one is implemented by the host application:
//!
//! - [`CatalogProvider`](catalog::CatalogProvider) - The remote media metadata API
//!   (listing with filter/sort/pagination and single-record fetch)
//! - [`Clock`](time::Clock) - Time source, injectable for deterministic tests
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! The remote API's wire format is not part of this crate. Provider
//! implementations turn each raw item into a validated
//! [`RemoteRecord`](catalog::RemoteRecord) through
//! [`RemoteRecord::from_json`](catalog::RemoteRecord::from_json) and the core only
//! ever sees the validated structure.
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type. Implementations
//! should convert transport errors to `BridgeError::OperationFailed` and shape
//! violations to `BridgeError::InvalidPayload`.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across async tasks.

pub mod catalog;
pub mod error;
pub mod time;

pub use error::BridgeError;

pub use catalog::{
    AssetAttributes, CatalogProvider, ContentType, EpisodeAttributes, ListFilter, ListPage,
    ListQuery, RemoteAudience, RemoteGenre, RemoteImage, RemotePayload, RemoteRecord,
    RemoteWindow, SeasonAttributes, ShowAttributes, SortOrder,
};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
