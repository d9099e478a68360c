//! Content store trait and SQLite implementation
//!
//! Records are persisted as a JSON document plus the handful of columns the
//! sync engine filters on (`bundle`, `external_id`, `parent_id`, `status`).

use async_trait::async_trait;
use bridge_traits::time::{Clock, SystemClock};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{LibraryError, Result};
use crate::models::{LocalRecord, Property, RecordId};

/// Local storage interface used by the sync engine
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Find the canonical record for `(bundle, external_id)`.
    ///
    /// More than one match is an integrity fault: it is logged and the first
    /// match (oldest `created_at`, then lowest id) is returned.
    async fn find_one(&self, bundle: &str, external_id: &str) -> Result<Option<LocalRecord>> {
        let matches = self
            .find_many(bundle, &[Property::ExternalId(external_id.to_string())])
            .await?;

        if matches.len() > 1 {
            warn!(
                bundle = %bundle,
                external_id = %external_id,
                duplicates = matches.len(),
                canonical_id = %matches[0].id,
                "Multiple local records share one external id; using the oldest"
            );
        }

        Ok(matches.into_iter().next())
    }

    /// All records of `bundle` matching every property, ordered by
    /// `created_at` then id.
    async fn find_many(&self, bundle: &str, properties: &[Property]) -> Result<Vec<LocalRecord>>;

    /// New unsaved record shell
    fn create(&self, bundle: &str) -> LocalRecord;

    async fn load(&self, id: RecordId) -> Result<Option<LocalRecord>>;

    /// Insert or update the record
    ///
    /// # Errors
    /// Returns `LibraryError::InvalidInput` if validation fails, or a database
    /// error.
    async fn save(&self, record: &mut LocalRecord) -> Result<()>;
}

/// SQLite implementation of ContentStore
pub struct SqliteContentStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteContentStore {
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

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode(data: &str) -> Result<LocalRecord> {
        let mut record: LocalRecord = serde_json::from_str(data)?;
        record.persisted = true;
        Ok(record)
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn find_many(&self, bundle: &str, properties: &[Property]) -> Result<Vec<LocalRecord>> {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT data FROM content_records WHERE bundle = ");
        builder.push_bind(bundle.to_string());

        for property in properties {
            match property {
                Property::ExternalId(external_id) => {
                    builder.push(" AND external_id = ");
                    builder.push_bind(external_id.clone());
                }
                Property::ParentId(parent_id) => {
                    builder.push(" AND parent_id = ");
                    builder.push_bind(parent_id.to_string());
                }
                Property::Status(status) => {
                    builder.push(" AND status = ");
                    builder.push_bind(status.as_str());
                }
                Property::Field { name, value } => {
                    builder.push(" AND json_extract(data, ");
                    builder.push_bind(format!("$.fields.\"{}\"", name.replace('"', "")));
                    builder.push(") = ");
                    builder.push_bind(value.clone());
                }
            }
        }

        builder.push(" ORDER BY created_at ASC, id ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(Self::decode(&row.get::<String, _>("data"))?);
        }

        debug!(bundle = %bundle, count = records.len(), "Loaded records");
        Ok(records)
    }

    fn create(&self, bundle: &str) -> LocalRecord {
        LocalRecord::new(bundle, self.clock.now())
    }

    async fn load(&self, id: RecordId) -> Result<Option<LocalRecord>> {
        let row = sqlx::query("SELECT data FROM content_records WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| Self::decode(&row.get::<String, _>("data")))
            .transpose()
    }

    async fn save(&self, record: &mut LocalRecord) -> Result<()> {
        record
            .validate()
            .map_err(|message| LibraryError::InvalidInput {
                field: "record".to_string(),
                message,
            })?;

        record.updated_at = self.clock.now();
        let data = serde_json::to_string(&*record)?;

        sqlx::query(
            r#"
            INSERT INTO content_records (
                id, bundle, external_id, parent_id, status,
                last_updated, data, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                bundle = excluded.bundle,
                external_id = excluded.external_id,
                parent_id = excluded.parent_id,
                status = excluded.status,
                last_updated = excluded.last_updated,
                data = excluded.data,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.bundle)
        .bind(&record.external_id)
        .bind(record.parent_id.map(|id| id.to_string()))
        .bind(record.status.as_str())
        .bind(record.last_updated.map(|ts| ts.timestamp_millis()))
        .bind(&data)
        .bind(record.created_at.timestamp_millis())
        .bind(record.updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        record.persisted = true;

        debug!(
            record_id = %record.id,
            bundle = %record.bundle,
            external_id = %record.external_id,
            "Saved record"
        );

        Ok(())
    }
}
