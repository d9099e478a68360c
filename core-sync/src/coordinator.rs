//! # Sync Coordinator
//!
//! Runs incremental sync passes for one content type at a time.
//!
//! ## Overview
//!
//! A pass finds every remote record changed since the stored cursor and
//! hands it to the dispatch queue. It never writes content records itself;
//! that is the [`DispatchWorker`](crate::worker::DispatchWorker)'s job.
//!
//! ## Workflow
//!
//! 1. Resolve the cutoff (`since`): explicit argument, stored cursor, or the
//!    content type's first-sync policy
//! 2. Record the pass start from the injected [`Clock`]
//! 3. Sweep the remote listing newest-first:
//!    - top-level types page through the whole listing
//!    - parent-keyed types list per batch of local parent ids
//! 4. Stop a batch at the first record not newer than the cutoff
//! 5. Check the time budget before every batch and page
//! 6. On completion advance the cursor to the pass start
//!
//! A pass that runs out of time reports [`SyncOutcome::TimedOut`] and leaves
//! the cursor alone, so the next pass re-covers the same window.

use bridge_traits::{
    catalog::{CatalogProvider, ContentType, ListQuery, RemoteRecord, SortOrder},
    time::Clock,
};
use chrono::{DateTime, Utc};
use core_library::{ContentStore, RecordId};
use core_runtime::config::SyncSettings;
use core_runtime::events::{CoreEvent, EventBus, SyncEvent};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

use crate::cursor::CursorStore;
use crate::dispatch::{DispatchQueue, QueueItem, QueueItemId};
use crate::error::{Result, SyncError};
use crate::parent_tree::{self, Relation};

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every batch was consumed and the cursor advanced
    Completed,
    /// The time budget ran out; the cursor was not touched
    TimedOut,
}

/// Summary of one incremental pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub content_type: ContentType,
    pub outcome: SyncOutcome,
    pub since: DateTime<Utc>,
    pub pass_start: DateTime<Utc>,
    /// Records newer than `since` that the pass looked at
    pub items_seen: u64,
    pub items_enqueued: u64,
    /// Items whose parent tree could not be resolved or that failed to enqueue
    pub items_failed: u64,
    /// Items whose parent has no local record
    pub items_dropped: u64,
    /// Parent batches (or listing pages for top-level types) in the pass
    pub batches_total: usize,
    pub batches_processed: usize,
    /// New cursor value, set only when the pass completed
    pub cursor: Option<DateTime<Utc>>,
}

impl SyncReport {
    fn new(content_type: ContentType, since: DateTime<Utc>, pass_start: DateTime<Utc>) -> Self {
        Self {
            content_type,
            outcome: SyncOutcome::Completed,
            since,
            pass_start,
            items_seen: 0,
            items_enqueued: 0,
            items_failed: 0,
            items_dropped: 0,
            batches_total: 0,
            batches_processed: 0,
            cursor: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.outcome == SyncOutcome::Completed
    }
}

/// State carried through one pass
struct Pass {
    report: SyncReport,
    budget: chrono::Duration,
}

impl Pass {
    fn since(&self) -> DateTime<Utc> {
        self.report.since
    }

    fn content_type(&self) -> ContentType {
        self.report.content_type
    }

    fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.report.pass_start
    }

    fn out_of_time(&self, now: DateTime<Utc>) -> bool {
        self.elapsed(now) > self.budget
    }
}

/// Marks a content type as running for as long as it lives
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<ContentType>>,
    content_type: ContentType,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        running.remove(&self.content_type);
    }
}

pub struct SyncCoordinator {
    settings: Arc<SyncSettings>,
    provider: Arc<dyn CatalogProvider>,
    store: Arc<dyn ContentStore>,
    cursors: Arc<dyn CursorStore>,
    queue: Arc<dyn DispatchQueue>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    running: Mutex<HashSet<ContentType>>,
}

impl SyncCoordinator {
    pub fn new(
        settings: Arc<SyncSettings>,
        provider: Arc<dyn CatalogProvider>,
        store: Arc<dyn ContentStore>,
        cursors: Arc<dyn CursorStore>,
        queue: Arc<dyn DispatchQueue>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            settings,
            provider,
            store,
            cursors,
            queue,
            clock,
            event_bus,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Whether a pass for `content_type` is currently running
    pub fn is_running(&self, content_type: ContentType) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(&content_type)
    }

    /// Run one incremental pass.
    ///
    /// `since` overrides the stored cursor, `budget` the configured time
    /// budget.
    ///
    /// # Errors
    ///
    /// - `SyncError::SyncInProgress` if a pass for this type is already running
    /// - `SyncError::Provider` if a listing request fails; the cursor is left
    ///   untouched
    /// - `SyncError::Persistence` / `SyncError::Database` for local storage
    ///   failures
    #[instrument(skip(self, since, budget), fields(content_type = %content_type))]
    pub async fn run_incremental_sync(
        &self,
        content_type: ContentType,
        since: Option<DateTime<Utc>>,
        budget: Option<Duration>,
    ) -> Result<SyncReport> {
        let _running = self.begin(content_type)?;

        let pass_start = self.clock.now();
        let since = match since {
            Some(since) => since,
            None => match self.cursors.get(content_type).await? {
                Some(cursor) => cursor,
                None => self
                    .settings
                    .content_type_or_default(content_type)
                    .first_sync
                    .default_since(pass_start),
            },
        };
        let budget = chrono::Duration::from_std(budget.unwrap_or(self.settings.time_budget))
            .map_err(|e| SyncError::Config(format!("invalid time budget: {}", e)))?;

        info!(since = %since, pass_start = %pass_start, "Starting incremental sync");
        self.emit(SyncEvent::Started {
            content_type: content_type.to_string(),
            since: since.timestamp(),
            pass_start: pass_start.timestamp(),
        });

        let mut pass = Pass {
            report: SyncReport::new(content_type, since, pass_start),
            budget,
        };

        let swept = match content_type.parent_type() {
            None => self.sweep_listing(&mut pass).await,
            Some(parent_type) => self.sweep_parent_batches(&mut pass, parent_type).await,
        };

        if let Err(err) = swept {
            error!(error = %err, "Incremental sync aborted");
            self.emit(SyncEvent::Failed {
                content_type: content_type.to_string(),
                message: err.to_string(),
                recoverable: true,
            });
            return Err(err);
        }

        let elapsed = pass.elapsed(self.clock.now());
        let mut report = pass.report;

        match report.outcome {
            SyncOutcome::TimedOut => {
                warn!(
                    items_enqueued = report.items_enqueued,
                    batches_processed = report.batches_processed,
                    batches_total = report.batches_total,
                    elapsed_secs = elapsed.num_seconds(),
                    "Time budget exhausted, cursor not advanced"
                );
                self.emit(SyncEvent::TimedOut {
                    content_type: content_type.to_string(),
                    items_enqueued: report.items_enqueued,
                    elapsed_secs: elapsed.num_seconds().max(0) as u64,
                });
            }
            SyncOutcome::Completed => {
                if let Err(err) = self.cursors.set(content_type, pass_start).await {
                    error!(error = %err, "Failed to advance cursor");
                    self.emit(SyncEvent::Failed {
                        content_type: content_type.to_string(),
                        message: err.to_string(),
                        recoverable: true,
                    });
                    return Err(err);
                }
                report.cursor = Some(pass_start);

                info!(
                    items_enqueued = report.items_enqueued,
                    items_failed = report.items_failed,
                    items_dropped = report.items_dropped,
                    cursor = %pass_start,
                    "Incremental sync completed"
                );
                self.emit(SyncEvent::Completed {
                    content_type: content_type.to_string(),
                    items_enqueued: report.items_enqueued,
                    items_failed: report.items_failed,
                    cursor: pass_start.timestamp(),
                    duration_secs: elapsed.num_seconds().max(0) as u64,
                });
            }
        }

        Ok(report)
    }

    /// Fetch a single record and enqueue it with `force` set.
    ///
    /// Returns `None` when the remote API does not know the GUID.
    ///
    /// # Errors
    ///
    /// `SyncError::MissingRequiredParent` when the record's parent has no
    /// local record, parent-tree errors, and provider or queue failures.
    #[instrument(skip(self), fields(content_type = %content_type))]
    pub async fn sync_one(
        &self,
        content_type: ContentType,
        guid: &str,
    ) -> Result<Option<QueueItemId>> {
        let Some(record) = self.provider.get(content_type, guid).await? else {
            info!(external_id = %guid, "Record not found remotely");
            return Ok(None);
        };

        let parent_id = match content_type.parent_type() {
            None => None,
            Some(parent_type) => {
                let parent_guid = parent_guid(&record, parent_type)?;
                let bundle = self.settings.bundle_for(parent_type);
                let parent = self
                    .store
                    .find_one(&bundle, &parent_guid)
                    .await?
                    .ok_or_else(|| SyncError::MissingRequiredParent {
                        external_id: record.id.clone(),
                    })?;
                Some(parent.id)
            }
        };

        let item = QueueItem::new(record, parent_id, self.clock.now()).with_force(true);
        let id = item.id;
        self.queue.enqueue(item).await?;

        info!(external_id = %guid, queue_item_id = %id, "Record queued for forced update");
        Ok(Some(id))
    }

    /// Forget the stored cursor; the next pass starts from the first-sync policy
    pub async fn reset_cursor(&self, content_type: ContentType) -> Result<()> {
        self.cursors.clear(content_type).await
    }

    fn begin(&self, content_type: ContentType) -> Result<RunningGuard<'_>> {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !running.insert(content_type) {
            return Err(SyncError::SyncInProgress {
                content_type: content_type.to_string(),
            });
        }
        Ok(RunningGuard {
            running: &self.running,
            content_type,
        })
    }

    /// Page through the whole listing until the cutoff is reached
    async fn sweep_listing(&self, pass: &mut Pass) -> Result<()> {
        let content_type = pass.content_type();
        let mut page = 1;

        loop {
            if pass.out_of_time(self.clock.now()) {
                pass.report.outcome = SyncOutcome::TimedOut;
                return Ok(());
            }

            let enqueued_before = pass.report.items_enqueued;
            let (reached_cutoff, next_page) = self.consume_page(pass, None, page).await?;

            pass.report.batches_total += 1;
            pass.report.batches_processed += 1;
            self.emit(SyncEvent::BatchCompleted {
                content_type: content_type.to_string(),
                batch_index: pass.report.batches_processed - 1,
                total_batches: None,
                items_enqueued: pass.report.items_enqueued - enqueued_before,
            });

            if reached_cutoff {
                debug!(page, "Reached records older than cutoff");
                return Ok(());
            }
            match next_page {
                Some(next) => page = next,
                None => return Ok(()),
            }
        }
    }

    /// List per batch of local parent ids
    async fn sweep_parent_batches(&self, pass: &mut Pass, parent_type: ContentType) -> Result<()> {
        let content_type = pass.content_type();
        let parent_bundle = self.settings.bundle_for(parent_type);
        let parents = self.store.find_many(&parent_bundle, &[]).await?;

        let mut index: HashMap<String, RecordId> = HashMap::with_capacity(parents.len());
        let mut parent_ids = Vec::with_capacity(parents.len());
        for parent in parents {
            if index.contains_key(&parent.external_id) {
                warn!(
                    bundle = %parent_bundle,
                    external_id = %parent.external_id,
                    "Duplicate local parent record, keeping the oldest"
                );
                continue;
            }
            parent_ids.push(parent.external_id.clone());
            index.insert(parent.external_id, parent.id);
        }

        let batches: Vec<&[String]> = parent_ids
            .chunks(self.settings.batch_size.max(1))
            .collect();
        pass.report.batches_total = batches.len();
        debug!(
            parents = parent_ids.len(),
            batches = batches.len(),
            "Partitioned parent ids"
        );

        for (batch_index, batch) in batches.iter().enumerate() {
            if pass.out_of_time(self.clock.now()) {
                pass.report.outcome = SyncOutcome::TimedOut;
                return Ok(());
            }

            let enqueued_before = pass.report.items_enqueued;
            let context = BatchContext {
                parent_ids: batch,
                parent_type,
                index: &index,
            };

            let mut page = 1;
            loop {
                let (reached_cutoff, next_page) =
                    self.consume_page(pass, Some(&context), page).await?;
                if reached_cutoff {
                    debug!(batch_index, page, "Reached records older than cutoff");
                    break;
                }
                match next_page {
                    Some(next) => {
                        if pass.out_of_time(self.clock.now()) {
                            pass.report.outcome = SyncOutcome::TimedOut;
                            return Ok(());
                        }
                        page = next;
                    }
                    None => break,
                }
            }

            pass.report.batches_processed += 1;
            self.emit(SyncEvent::BatchCompleted {
                content_type: content_type.to_string(),
                batch_index,
                total_batches: Some(batches.len()),
                items_enqueued: pass.report.items_enqueued - enqueued_before,
            });
        }

        Ok(())
    }

    /// Fetch one listing page and enqueue every record newer than the cutoff.
    ///
    /// Returns whether the cutoff was reached and the page to fetch next.
    async fn consume_page(
        &self,
        pass: &mut Pass,
        batch: Option<&BatchContext<'_>>,
        page: u32,
    ) -> Result<(bool, Option<u32>)> {
        let mut query = ListQuery::new()
            .with_sort(SortOrder::UpdatedAtDesc)
            .with_page(page)
            .with_page_size(self.settings.page_size);
        if let Some(batch) = batch {
            query = query.with_parent_ids(batch.parent_ids.to_vec());
        }

        let listing = self.provider.list(pass.content_type(), &query).await?;

        for record in listing.records {
            if record.latest_update() <= pass.since() {
                return Ok((true, None));
            }
            pass.report.items_seen += 1;

            let parent_id = match batch {
                None => None,
                Some(batch) => match self.locate_parent(&record, batch) {
                    Ok(Some(parent_id)) => Some(parent_id),
                    Ok(None) => {
                        pass.report.items_dropped += 1;
                        continue;
                    }
                    Err(err) if err.is_item_error() => {
                        error!(
                            external_id = %record.id,
                            content_type = %record.content_type(),
                            error = %err,
                            "Could not resolve parent tree, skipping item"
                        );
                        pass.report.items_failed += 1;
                        continue;
                    }
                    Err(err) => return Err(err),
                },
            };

            let external_id = record.id.clone();
            let item = QueueItem::new(record, parent_id, self.clock.now());
            match self.queue.enqueue(item).await {
                Ok(()) => pass.report.items_enqueued += 1,
                Err(err) if err.is_item_error() => {
                    error!(
                        external_id = %external_id,
                        parent_id = ?parent_id,
                        error = %err,
                        "Failed to enqueue item"
                    );
                    pass.report.items_failed += 1;
                }
                Err(err) => return Err(err),
            }
        }

        // A page number that does not move forward would loop forever
        let next_page = listing.next_page.filter(|next| *next > page);
        if listing.next_page.is_some() && next_page.is_none() {
            warn!(page, next_page = ?listing.next_page, "Listing returned a non-advancing next page");
        }

        Ok((false, next_page))
    }

    /// Map a record to the local id of its partition parent.
    ///
    /// `Ok(None)` means the parent is not among the loaded local records.
    fn locate_parent(&self, record: &RemoteRecord, batch: &BatchContext<'_>) -> Result<Option<RecordId>> {
        let guid = parent_guid(record, batch.parent_type)?;
        match batch.index.get(&guid) {
            Some(id) => Ok(Some(*id)),
            None => {
                warn!(
                    external_id = %record.id,
                    parent_id = %guid,
                    "Parent has no local record, dropping item"
                );
                Ok(None)
            }
        }
    }

    fn emit(&self, event: SyncEvent) {
        self.event_bus.emit(CoreEvent::Sync(event)).ok();
    }
}

struct BatchContext<'a> {
    parent_ids: &'a [String],
    parent_type: ContentType,
    index: &'a HashMap<String, RecordId>,
}

/// GUID of the record's ancestor of `parent_type`
fn parent_guid(record: &RemoteRecord, parent_type: ContentType) -> Result<String> {
    let relation = Relation::for_content_type(parent_type).ok_or_else(|| {
        SyncError::Config(format!("{} cannot be a parent content type", parent_type))
    })?;
    let node = record.lineage.as_ref().ok_or_else(|| {
        SyncError::MalformedParentTree(format!("{} has no parent tree", record.id))
    })?;
    let tree = parent_tree::resolve(node)?;
    Ok(tree.require(relation)?.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::catalog::{AssetAttributes, RemotePayload};
    use chrono::TimeZone;
    use serde_json::json;

    fn asset(parent_tree: serde_json::Value) -> RemoteRecord {
        RemoteRecord {
            id: "asset-1".to_string(),
            updated_at: Utc.timestamp_opt(100, 0).unwrap(),
            title: "Clip".to_string(),
            slug: "clip".to_string(),
            description_short: None,
            description_long: None,
            images: vec![],
            lineage: Some(parent_tree),
            payload: RemotePayload::Asset(AssetAttributes::default()),
        }
    }

    #[test]
    fn test_parent_guid_walks_to_show() {
        let record = asset(json!({
            "type": "episode",
            "id": "ep-1",
            "attributes": {
                "season": {
                    "type": "season",
                    "id": "season-1",
                    "attributes": {
                        "show": { "type": "show", "id": "show-1", "attributes": {} }
                    }
                }
            }
        }));

        assert_eq!(parent_guid(&record, ContentType::Show).unwrap(), "show-1");
    }

    #[test]
    fn test_parent_guid_missing_relation() {
        let record = asset(json!({ "type": "franchise", "id": "fr-1" }));

        let err = parent_guid(&record, ContentType::Show).unwrap_err();
        assert!(matches!(err, SyncError::MissingRelation { .. }));
    }

    #[test]
    fn test_parent_guid_without_tree() {
        let mut record = asset(json!({}));
        record.lineage = None;

        let err = parent_guid(&record, ContentType::Show).unwrap_err();
        assert!(matches!(err, SyncError::MalformedParentTree(_)));
    }

    #[test]
    fn test_pass_budget() {
        let start = Utc.timestamp_opt(1_000, 0).unwrap();
        let pass = Pass {
            report: SyncReport::new(ContentType::Asset, start, start),
            budget: chrono::Duration::seconds(10),
        };

        assert!(!pass.out_of_time(start + chrono::Duration::seconds(10)));
        assert!(pass.out_of_time(start + chrono::Duration::seconds(11)));
    }
}
