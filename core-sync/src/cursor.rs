//! Time cursor store
//!
//! One "synced through" timestamp per content type. Only the coordinator
//! writes it, and only after a full sweep; the value written is the pass
//! start, never the completion time.

use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use bridge_traits::ContentType;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

#[async_trait]
pub trait CursorStore: Send + Sync {
    /// Stored cursor, or `None` if this content type never completed a pass
    async fn get(&self, content_type: ContentType) -> Result<Option<DateTime<Utc>>>;

    async fn set(&self, content_type: ContentType, synced_through: DateTime<Utc>) -> Result<()>;

    /// Forget the cursor so the next pass uses the first-sync policy
    async fn clear(&self, content_type: ContentType) -> Result<()>;
}

/// SQLite-backed cursor store (`sync_cursors` table)
pub struct SqliteCursorStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteCursorStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl CursorStore for SqliteCursorStore {
    async fn get(&self, content_type: ContentType) -> Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT synced_through FROM sync_cursors WHERE content_type = ?")
            .bind(content_type.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let millis: i64 = row.get("synced_through");
        Utc.timestamp_millis_opt(millis)
            .single()
            .map(Some)
            .ok_or_else(|| {
                SyncError::Database(format!(
                    "invalid cursor {} for {}",
                    millis, content_type
                ))
            })
    }

    async fn set(&self, content_type: ContentType, synced_through: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_cursors (content_type, synced_through, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(content_type) DO UPDATE SET
                synced_through = excluded.synced_through,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(content_type.as_str())
        .bind(synced_through.timestamp_millis())
        .bind(self.clock.now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        debug!(content_type = %content_type, synced_through = %synced_through, "Cursor advanced");
        Ok(())
    }

    async fn clear(&self, content_type: ContentType) -> Result<()> {
        sqlx::query("DELETE FROM sync_cursors WHERE content_type = ?")
            .bind(content_type.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        info!(content_type = %content_type, "Cursor cleared");
        Ok(())
    }
}
