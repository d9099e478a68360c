//! # Core Runtime Module
//!
//! Foundational runtime infrastructure for the media sync core:
//! - Logging and tracing infrastructure
//! - Sync configuration (per content type policies, budgets, window rules)
//! - Event bus for sync progress and reconciliation outcomes
//!
//! ## Overview
//!
//! Every other core crate depends on this one for its logging conventions,
//! its configuration values and the broadcast channel used to report what a
//! sync pass did.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use config::{ContentTypeConfig, FirstSyncPolicy, SyncSettings, SyncSettingsBuilder};
pub use error::{Error, Result};
pub use events::{CoreEvent, EventBus, EventStream, ReconcileEvent, SyncEvent};
