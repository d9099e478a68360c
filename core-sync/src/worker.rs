//! Dispatch worker
//!
//! Drains the dispatch queue and reconciles each item. Several consumers may
//! run at once, but reconciliation is serialized per record through the
//! reconciler's [`KeyedLocks`] so two deliveries for the same record never
//! race on read-modify-write.

use core_library::ContentStore;
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, ReconcileEvent};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

use crate::dispatch::{QueueItem, QueueItemStatus, SqliteDispatchQueue};
use crate::error::{Result, SyncError};
use crate::locks::{self, KeyedLocks};
use crate::projection::TermCache;
use crate::reconciler::{ReconcileOutcome, RecordReconciler};

/// Counts from one [`DispatchWorker::drain`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub created: u64,
    pub updated: u64,
    pub skipped: u64,
    /// Deliveries that failed and were returned for redelivery
    pub retried: u64,
    /// Items parked as permanently failed
    pub failed: u64,
}

impl DrainReport {
    pub fn processed(&self) -> u64 {
        self.created + self.updated + self.skipped
    }

    fn merge(mut self, other: DrainReport) -> Self {
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.retried += other.retried;
        self.failed += other.failed;
        self
    }
}

pub struct DispatchWorker {
    queue: Arc<SqliteDispatchQueue>,
    reconciler: Arc<RecordReconciler>,
    store: Arc<dyn ContentStore>,
    settings: Arc<SyncSettings>,
    event_bus: EventBus,
    locks: Arc<KeyedLocks>,
}

impl DispatchWorker {
    pub fn new(
        queue: Arc<SqliteDispatchQueue>,
        reconciler: Arc<RecordReconciler>,
        store: Arc<dyn ContentStore>,
        settings: Arc<SyncSettings>,
        event_bus: EventBus,
    ) -> Self {
        let locks = reconciler.locks();
        Self {
            queue,
            reconciler,
            store,
            settings,
            event_bus,
            locks,
        }
    }

    /// Consume the queue until no pending item remains.
    ///
    /// Runs `worker_concurrency` consumers sharing one [`TermCache`]. Items
    /// that fail are redelivered within the same drain until the queue parks
    /// them.
    ///
    /// # Errors
    /// Only queue bookkeeping failures abort the drain; reconciliation errors
    /// are recorded on the item.
    #[instrument(skip(self))]
    pub async fn drain(&self) -> Result<DrainReport> {
        let cache = TermCache::new();
        let consumers = (0..self.settings.worker_concurrency.max(1)).map(|_| self.consume(&cache));

        let reports = futures::future::try_join_all(consumers).await?;
        self.locks.prune();

        let report = reports
            .into_iter()
            .fold(DrainReport::default(), DrainReport::merge);

        info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            retried = report.retried,
            failed = report.failed,
            "Dispatch queue drained"
        );

        Ok(report)
    }

    async fn consume(&self, cache: &TermCache) -> Result<DrainReport> {
        let mut report = DrainReport::default();

        while let Some(item) = self.queue.dequeue().await? {
            let bundle = self.settings.bundle_for(item.content_type);
            let _guard = self
                .locks
                .lock(&locks::record_key(&bundle, item.external_id()))
                .await;

            match self.process(&item, cache).await {
                Ok(outcome) => {
                    self.queue.mark_complete(item.id).await?;
                    self.record_outcome(&item, outcome, &mut report);
                }
                Err(err) => {
                    error!(
                        external_id = %item.external_id(),
                        parent_id = ?item.parent_id,
                        content_type = %item.content_type,
                        error = %err,
                        "Reconciliation failed"
                    );

                    let status = self
                        .queue
                        .mark_failed(item.id, &err.to_string(), !err.is_permanent())
                        .await?;
                    match status {
                        QueueItemStatus::Pending => report.retried += 1,
                        _ => report.failed += 1,
                    }

                    self.event_bus
                        .emit(CoreEvent::Reconcile(ReconcileEvent::Failed {
                            external_id: item.external_id().to_string(),
                            parent_id: item.parent_id.map(|id| id.to_string()),
                            message: err.to_string(),
                        }))
                        .ok();
                }
            }
        }

        Ok(report)
    }

    /// Load the item's parent and reconcile it
    ///
    /// # Errors
    /// `SyncError::MissingRequiredParent` when the referenced parent no
    /// longer exists locally, plus any reconciliation error.
    pub async fn process(&self, item: &QueueItem, cache: &TermCache) -> Result<ReconcileOutcome> {
        let parent = match item.parent_id {
            Some(parent_id) => match self.store.load(parent_id).await? {
                Some(parent) => Some(parent),
                None => {
                    warn!(
                        external_id = %item.external_id(),
                        parent_id = %parent_id,
                        "Queued parent no longer exists"
                    );
                    return Err(SyncError::MissingRequiredParent {
                        external_id: item.external_id().to_string(),
                    });
                }
            },
            None => None,
        };

        self.reconciler
            .reconcile(&item.record, parent.as_ref(), item.force, cache)
            .await
    }

    fn record_outcome(&self, item: &QueueItem, outcome: ReconcileOutcome, report: &mut DrainReport) {
        let bundle = self.settings.bundle_for(item.content_type);
        let external_id = item.external_id().to_string();

        let event = match outcome {
            ReconcileOutcome::Created(_) => {
                report.created += 1;
                ReconcileEvent::Created {
                    bundle,
                    external_id,
                }
            }
            ReconcileOutcome::Updated(_) => {
                report.updated += 1;
                ReconcileEvent::Updated {
                    bundle,
                    external_id,
                }
            }
            ReconcileOutcome::Skipped(_) => {
                report.skipped += 1;
                ReconcileEvent::Skipped {
                    bundle,
                    external_id,
                }
            }
        };

        debug!(queue_item_id = %item.id, ?outcome, "Queue item reconciled");
        self.event_bus.emit(CoreEvent::Reconcile(event)).ok();
    }
}
