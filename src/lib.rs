//! Workspace facade crate.
//!
//! Re-exports the individual workspace crates so host applications can
//! depend on `media-sync-workspace` alone. The sync engine is behind the
//! default `sync` feature; hosts that only need the content store or the
//! bridge contracts can disable it.

pub use bridge_traits;
pub use core_library;
pub use core_runtime;

#[cfg(feature = "sync")]
pub use core_sync;
