//! # Incremental Catalog Sync
//!
//! Mirrors a remote media catalog (shows, seasons, episodes, assets) into the
//! local content store.
//!
//! ## Overview
//!
//! - Finding what changed since the last completed pass, within a time budget
//! - Resolving each remote record's parent tree to its local parent
//! - Queueing changed records for at-least-once reconciliation
//! - Reconciling a remote record into its local counterpart: fields, images,
//!   classification, availability and publication state
//!
//! ## Components
//!
//! - **Sync Coordinator** (`coordinator`): Runs incremental passes and owns the cursor
//! - **Dispatch Queue** (`dispatch`): Persistent work queue with retry logic
//! - **Dispatch Worker** (`worker`): Drains the queue with per-record serialization
//! - **Record Reconciler** (`reconciler`): Create-or-update of one local record
//! - **Parent Tree** (`parent_tree`): Flattens nested parent references
//! - **Availability** (`availability`): Window evaluation and restricted-only checks
//! - **Record Locks** (`locks`): Per-record serialization of reconciliation
//! - **Projection** (`projection`): Per-type field, image and term mappings
//! - **Cursor Store** (`cursor`): "Synced through" timestamps per content type
//! - **Scheduler** (`scheduler`): Interval-based periodic trigger

pub mod availability;
pub mod coordinator;
pub mod cursor;
pub mod dispatch;
pub mod eligibility;
pub mod error;
pub mod locks;
pub mod parent_tree;
pub mod projection;
pub mod reconciler;
pub mod scheduler;
pub mod worker;

pub use availability::Availability;
pub use coordinator::{SyncCoordinator, SyncOutcome, SyncReport};
pub use cursor::{CursorStore, SqliteCursorStore};
pub use dispatch::{
    DispatchQueue, QueueItem, QueueItemId, QueueItemStatus, QueueStats, SqliteDispatchQueue,
};
pub use eligibility::is_publication_eligible;
pub use error::{Result, SyncError};
pub use locks::KeyedLocks;
pub use parent_tree::{ParentTree, Relation};
pub use projection::TermCache;
pub use reconciler::{ReconcileOutcome, RecordReconciler};
pub use scheduler::{ScheduledRun, SyncScheduler};
pub use worker::{DispatchWorker, DrainReport};
