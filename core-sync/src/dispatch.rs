//! # Dispatch Queue
//!
//! At-least-once work queue between the sync coordinator (producer) and the
//! dispatch worker (consumer).
//!
//! ## Overview
//!
//! Each [`QueueItem`] carries one validated remote record and the local id of
//! the parent it was matched to. Items persist in the `dispatch_queue` table,
//! so a crash between enqueue and reconciliation only causes redelivery.
//!
//! ## Features
//!
//! - **Persistence**: queue state lives in SQLite
//! - **FIFO**: items are dequeued in enqueue order
//! - **Redelivery**: failed items return to `pending` until `max_attempts`
//! - **Permanent failures**: errors that cannot succeed on retry skip redelivery
//!
//! ## Usage
//!
//! ```ignore
//! let queue = SqliteDispatchQueue::new(pool.clone(), 3);
//! queue.enqueue(QueueItem::new(record, Some(parent_id), clock.now())).await?;
//!
//! while let Some(item) = queue.dequeue().await? {
//!     match reconcile(&item).await {
//!         Ok(_) => queue.mark_complete(item.id).await?,
//!         Err(e) => { queue.mark_failed(item.id, &e.to_string(), true).await?; }
//!     }
//! }
//! ```

use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use bridge_traits::{ContentType, RemoteRecord};
use chrono::{DateTime, Utc};
use core_library::RecordId;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Type-safe queue item identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueItemId(Uuid);

impl QueueItemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::Queue(format!("invalid queue item id '{}': {}", s, e)))
    }
}

impl Default for QueueItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueItemStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for QueueItemStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

/// Unit of deferred reconciliation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub content_type: ContentType,
    pub record: RemoteRecord,
    /// Local parent the record was matched to; `None` for top-level records
    pub parent_id: Option<RecordId>,
    /// Bypass the staleness guard
    pub force: bool,
    pub status: QueueItemStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(record: RemoteRecord, parent_id: Option<RecordId>, now: DateTime<Utc>) -> Self {
        Self {
            id: QueueItemId::new(),
            content_type: record.content_type(),
            record,
            parent_id,
            force: false,
            status: QueueItemStatus::Pending,
            attempts: 0,
            last_error: None,
            enqueued_at: now,
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn external_id(&self) -> &str {
        &self.record.id
    }
}

/// Producer side of the queue
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// # Errors
    /// `SyncError::Queue` when the item cannot be stored.
    async fn enqueue(&self, item: QueueItem) -> Result<()>;
}

/// Queue statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// SQLite-backed dispatch queue (`dispatch_queue` table)
pub struct SqliteDispatchQueue {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
}

impl SqliteDispatchQueue {
    pub fn new(pool: SqlitePool, max_attempts: u32) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Claim the oldest pending item, marking it `processing`.
    ///
    /// The claim is a single `UPDATE ... RETURNING`, so concurrent consumers
    /// never receive the same item.
    pub async fn dequeue(&self) -> Result<Option<QueueItem>> {
        let row = sqlx::query(
            r#"
            UPDATE dispatch_queue
            SET status = 'processing', updated_at = ?
            WHERE id = (
                SELECT id FROM dispatch_queue
                WHERE status = 'pending'
                ORDER BY enqueued_at ASC, rowid ASC
                LIMIT 1
            )
            RETURNING id, payload, status, attempts, last_error
            "#,
        )
        .bind(self.clock.now().timestamp_millis())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item = decode_item(&row)?;
        debug!(
            queue_item_id = %item.id,
            external_id = %item.external_id(),
            attempts = item.attempts,
            "Dequeued item"
        );
        Ok(Some(item))
    }

    pub async fn mark_complete(&self, id: QueueItemId) -> Result<()> {
        let result = sqlx::query(
            "UPDATE dispatch_queue SET status = 'completed', attempts = attempts + 1, last_error = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(self.clock.now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::Queue(format!("queue item {} not found", id)));
        }

        Ok(())
    }

    /// Record a failed delivery.
    ///
    /// The item goes back to `pending` while `retry` is set and attempts
    /// remain, otherwise it is parked as `failed`. Returns the new status.
    pub async fn mark_failed(
        &self,
        id: QueueItemId,
        error: &str,
        retry: bool,
    ) -> Result<QueueItemStatus> {
        let attempts: Option<i64> =
            sqlx::query_scalar("SELECT attempts FROM dispatch_queue WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SyncError::Queue(e.to_string()))?;

        let Some(attempts) = attempts else {
            return Err(SyncError::Queue(format!("queue item {} not found", id)));
        };

        let attempts = attempts as u32 + 1;
        let status = if retry && attempts < self.max_attempts {
            QueueItemStatus::Pending
        } else {
            QueueItemStatus::Failed
        };

        sqlx::query(
            "UPDATE dispatch_queue SET status = ?, attempts = ?, last_error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(attempts as i64)
        .bind(error)
        .bind(self.clock.now().timestamp_millis())
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        if status == QueueItemStatus::Pending {
            warn!(
                queue_item_id = %id,
                attempts,
                max_attempts = self.max_attempts,
                error = %error,
                "Queue item failed, will be redelivered"
            );
        } else {
            warn!(
                queue_item_id = %id,
                attempts,
                error = %error,
                "Queue item failed permanently"
            );
        }

        Ok(status)
    }

    pub async fn get(&self, id: QueueItemId) -> Result<Option<QueueItem>> {
        let row = sqlx::query(
            "SELECT id, payload, status, attempts, last_error FROM dispatch_queue WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        row.as_ref().map(decode_item).transpose()
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM dispatch_queue GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| SyncError::Queue(e.to_string()))?;

        let mut stats = QueueStats::default();
        for row in rows {
            let count = row.get::<i64, _>("count") as u64;
            match row.get::<String, _>("status").parse()? {
                QueueItemStatus::Pending => stats.pending = count,
                QueueItemStatus::Processing => stats.processing = count,
                QueueItemStatus::Completed => stats.completed = count,
                QueueItemStatus::Failed => stats.failed = count,
            }
        }

        Ok(stats)
    }

    /// Items parked as failed, most recent first
    pub async fn failed_items(&self) -> Result<Vec<QueueItem>> {
        let rows = sqlx::query(
            "SELECT id, payload, status, attempts, last_error FROM dispatch_queue WHERE status = 'failed' ORDER BY updated_at DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        rows.iter().map(decode_item).collect()
    }

    /// Return items stuck in `processing` (e.g. after a crash) to `pending`
    pub async fn requeue_stalled(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE dispatch_queue SET status = 'pending', updated_at = ? WHERE status = 'processing'",
        )
        .bind(self.clock.now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        if result.rows_affected() > 0 {
            info!(count = result.rows_affected(), "Requeued stalled items");
        }
        Ok(result.rows_affected())
    }

    pub async fn purge_completed(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM dispatch_queue WHERE status = 'completed'")
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Queue(e.to_string()))?;

        info!(deleted = result.rows_affected(), "Purged completed queue items");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DispatchQueue for SqliteDispatchQueue {
    async fn enqueue(&self, item: QueueItem) -> Result<()> {
        let payload = serde_json::to_string(&item)?;

        sqlx::query(
            r#"
            INSERT INTO dispatch_queue (
                id, content_type, external_id, parent_id, payload, force_update,
                status, attempts, last_error, enqueued_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.content_type.as_str())
        .bind(item.external_id())
        .bind(item.parent_id.map(|id| id.to_string()))
        .bind(&payload)
        .bind(item.force)
        .bind(QueueItemStatus::Pending.as_str())
        .bind(0_i64)
        .bind(Option::<String>::None)
        .bind(item.enqueued_at.timestamp_millis())
        .bind(self.clock.now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Queue(e.to_string()))?;

        debug!(
            queue_item_id = %item.id,
            external_id = %item.external_id(),
            parent_id = ?item.parent_id,
            force = item.force,
            "Enqueued item"
        );

        Ok(())
    }
}

// Columns hold the authoritative delivery state; the payload holds the rest.
fn decode_item(row: &SqliteRow) -> Result<QueueItem> {
    let mut item: QueueItem = serde_json::from_str(&row.get::<String, _>("payload"))?;
    item.id = QueueItemId::from_string(&row.get::<String, _>("id"))?;
    item.status = row.get::<String, _>("status").parse()?;
    item.attempts = row.get::<i64, _>("attempts") as u32;
    item.last_error = row.get("last_error");
    Ok(item)
}
