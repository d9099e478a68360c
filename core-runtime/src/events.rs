//! # Event Bus System
//!
//! Broadcasts what the sync engine is doing using `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: [`SyncEvent`] for pass-level progress, [`ReconcileEvent`]
//!   for per-record outcomes, wrapped in [`CoreEvent`]
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Receiver wrapper with optional filtering
//!
//! Emission never fails a sync: publishing to a bus without subscribers
//! returns an error that callers discard with `.ok()`.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Sync(SyncEvent::Started {
//!         content_type: "asset".to_string(),
//!         since: 0,
//!         pass_start: 1_700_000_000,
//!     }))
//!     .ok();
//!
//! assert!(receiver.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! Slow subscribers receive `RecvError::Lagged(n)` and should resynchronize
//! from the content store rather than rely on having seen every event.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::RecvError, error::SendError, Receiver};

/// Default per-subscriber buffer
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

/// Top-level event envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "domain", content = "event")]
pub enum CoreEvent {
    Sync(SyncEvent),
    Reconcile(ReconcileEvent),
}

/// Pass-level sync events. Timestamps are Unix seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Incremental pass started.
    Started {
        content_type: String,
        /// Cutoff used by this pass
        since: i64,
        pass_start: i64,
    },
    /// One parent-id batch (or listing page for top-level types) was consumed.
    BatchCompleted {
        content_type: String,
        batch_index: usize,
        /// `None` for top-level listings, whose page count is not known
        /// up front
        total_batches: Option<usize>,
        items_enqueued: u64,
    },
    /// Pass finished and the cursor advanced to `cursor`.
    Completed {
        content_type: String,
        items_enqueued: u64,
        items_failed: u64,
        cursor: i64,
        duration_secs: u64,
    },
    /// Pass exceeded its time budget; cursor left untouched.
    TimedOut {
        content_type: String,
        items_enqueued: u64,
        elapsed_secs: u64,
    },
    /// Pass aborted by an error; cursor left untouched.
    Failed {
        content_type: String,
        message: String,
        recoverable: bool,
    },
}

/// Per-record reconciliation events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ReconcileEvent {
    Created { bundle: String, external_id: String },
    Updated { bundle: String, external_id: String },
    /// Staleness guard matched, nothing written.
    Skipped { bundle: String, external_id: String },
    Failed {
        external_id: String,
        parent_id: Option<String>,
        message: String,
    },
}

/// Central event bus
///
/// Cloning is cheap; every clone publishes into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified per-subscriber buffer.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(16);
/// let sync_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Sync(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            match &self.filter {
                Some(filter) if !filter(&event) => continue,
                _ => return Ok(event),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(content_type: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::Started {
            content_type: content_type.to_string(),
            since: 0,
            pass_start: 10,
        })
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(8);
        assert!(bus.emit(started("show")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_event() {
        let bus = EventBus::new(8);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(started("season")).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), started("season"));
        assert_eq!(second.recv().await.unwrap(), started("season"));
    }

    #[tokio::test]
    async fn test_event_stream_filter_skips_other_domains() {
        let bus = EventBus::new(8);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Reconcile(_)));

        bus.emit(started("asset")).unwrap();
        let skipped = CoreEvent::Reconcile(ReconcileEvent::Skipped {
            bundle: "video".to_string(),
            external_id: "guid-1".to_string(),
        });
        bus.emit(skipped.clone()).unwrap();

        assert_eq!(stream.recv().await.unwrap(), skipped);
    }

    #[test]
    fn test_event_serialization_shape() {
        let json = serde_json::to_value(started("show")).unwrap();
        assert_eq!(json["domain"], "Sync");
        assert_eq!(json["event"]["type"], "Started");
        assert_eq!(json["event"]["content_type"], "show");
    }
}
