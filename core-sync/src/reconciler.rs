//! # Record Reconciler
//!
//! Applies one remote record to local storage.
//!
//! ## Steps
//!
//! 1. Locate the local record by `(bundle, external_id)`, or start a new shell
//! 2. Staleness guard: skip when the stored `last_updated` already covers the
//!    remote's latest update (images included), unless forced
//! 3. Project required fields, then every optional mapping
//! 4. Inherit classification from the parent (copy for new records, union
//!    for existing ones)
//! 5. Derive publish state from availability windows, gated by the parent's
//!    publication eligibility
//! 6. Persist
//! 7. Promote unpublished ancestors when the record is live or scheduled
//!
//! Reconciliation of the same remote snapshot is idempotent: the second call
//! hits the staleness guard and writes nothing beyond completing a promotion
//! an earlier delivery did not finish.
//!
//! Promotion rewrites only the ancestor's status. Each ancestor is reloaded
//! under its record lock, so a concurrent update of the ancestor is never
//! rolled back to the snapshot the child was reconciled against.

use bridge_traits::time::Clock;
use bridge_traits::{ContentType, RemoteRecord};
use core_library::{ContentStore, LocalRecord, PublishStatus, RecordId};
use core_runtime::config::SyncSettings;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::availability::Availability;
use crate::eligibility::is_publication_eligible;
use crate::error::{Result, SyncError};
use crate::locks::{self, KeyedLocks};
use crate::parent_tree;
use crate::projection::{self, TermCache};

/// Result of one reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Created(RecordId),
    Updated(RecordId),
    /// Staleness guard matched; nothing written
    Skipped(RecordId),
}

impl ReconcileOutcome {
    pub fn record_id(&self) -> RecordId {
        match self {
            Self::Created(id) | Self::Updated(id) | Self::Skipped(id) => *id,
        }
    }
}

pub struct RecordReconciler {
    store: Arc<dyn ContentStore>,
    clock: Arc<dyn Clock>,
    settings: Arc<SyncSettings>,
    locks: Arc<KeyedLocks>,
}

impl RecordReconciler {
    pub fn new(
        store: Arc<dyn ContentStore>,
        clock: Arc<dyn Clock>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Record locks shared with whoever drives this reconciler
    pub fn locks(&self) -> Arc<KeyedLocks> {
        self.locks.clone()
    }

    /// Reconcile `remote` into local storage.
    ///
    /// `parent` is the local record the item hangs under. When omitted for an
    /// existing record, the record's stored parent is loaded instead.
    ///
    /// # Errors
    ///
    /// - `SyncError::MissingRequiredParent` for a new child record with no parent
    /// - `SyncError::Persistence` when the store fails
    #[instrument(
        skip(self, remote, parent, cache),
        fields(external_id = %remote.id, content_type = %remote.content_type())
    )]
    pub async fn reconcile(
        &self,
        remote: &RemoteRecord,
        parent: Option<&LocalRecord>,
        force: bool,
        cache: &TermCache,
    ) -> Result<ReconcileOutcome> {
        let content_type = remote.content_type();
        let bundle = self.settings.bundle_for(content_type);
        let latest_update = remote.latest_update();

        let existing = self.store.find_one(&bundle, &remote.id).await?;

        if let Some(record) = &existing {
            let up_to_date = record
                .last_updated
                .map_or(false, |last_updated| last_updated >= latest_update);
            if up_to_date && !force {
                debug!(record_id = %record.id, "Local record is current, skipping");
                if record.is_published() || record.publish_on.is_some() {
                    if let Some(parent_id) = record.parent_id {
                        self.promote_ancestors(parent_id).await?;
                    }
                }
                return Ok(ReconcileOutcome::Skipped(record.id));
            }
        }

        let mut record = existing.unwrap_or_else(|| {
            let mut shell = self.store.create(&bundle);
            shell.external_id = remote.id.clone();
            shell
        });
        let is_new = record.is_new();

        let parent = match parent {
            Some(parent) => Some(parent.clone()),
            None => match record.parent_id {
                Some(parent_id) => self.store.load(parent_id).await?,
                None => None,
            },
        };

        if is_new && content_type.parent_type().is_some() && parent.is_none() {
            return Err(SyncError::MissingRequiredParent {
                external_id: remote.id.clone(),
            });
        }

        // Required projection
        record.title = remote.title.clone();
        record.slug = remote.slug.clone();
        record.description = projection::description(remote);
        record.duration_secs = projection::duration(remote);
        if let Some(parent) = &parent {
            record.parent_id = Some(parent.id);
        }
        if let Some(lineage) = &remote.lineage {
            record.lineage = parent_tree::resolve(lineage)?.to_lineage();
        }
        record.last_updated = Some(latest_update);

        // Optional projection
        projection::apply_fields(&mut record, remote);
        projection::apply_images(&mut record, remote);
        if let Some(windows) = projection::windows(remote) {
            record.windows = windows;
        }

        match &parent {
            Some(parent) => record.audience_scope = parent.audience_scope.clone(),
            None => record.audience_scope = projection::audience_scope(remote),
        }

        if content_type == ContentType::Show {
            record.classification.clear();
            if let Some(genre) = projection::genre(remote) {
                let term = cache.resolve(self.store.as_ref(), genre).await?;
                record.classification.insert(term.to_string());
            }
        }

        if let Some(parent) = &parent {
            if is_new {
                record.classification = parent.classification.clone();
            } else {
                record
                    .classification
                    .extend(parent.classification.iter().cloned());
            }
        }

        let eligible = parent.as_ref().map_or(true, |parent| {
            is_publication_eligible(parent, &self.settings.reserved_audience_scopes)
        });

        if content_type == ContentType::Asset {
            self.derive_publish_state(&mut record, eligible);
        }

        self.store.save(&mut record).await?;

        // Promotion needs the parent to be eligible; an ineligible parent
        // already forced this record unpublished above.
        let live_or_scheduled = record.is_published() || record.publish_on.is_some();
        if live_or_scheduled {
            if let Some(parent) = &parent {
                self.promote_ancestors(parent.id).await?;
            }
        }

        if is_new {
            info!(record_id = %record.id, bundle = %bundle, "Created local record");
            Ok(ReconcileOutcome::Created(record.id))
        } else {
            debug!(record_id = %record.id, bundle = %bundle, "Updated local record");
            Ok(ReconcileOutcome::Updated(record.id))
        }
    }

    fn derive_publish_state(&self, record: &mut LocalRecord, eligible: bool) {
        if !eligible {
            record.status = PublishStatus::Unpublished;
            record.publish_on = None;
            record.unpublish_on = None;
            return;
        }

        let now = self.clock.now();
        let availability = Availability::new(&record.windows);

        let publish_on = availability.earliest_start().filter(|start| *start > now);
        let unpublish_on = availability.latest_end().filter(|end| *end > now);
        let available = availability.is_available(now);
        let restricted_only = availability.is_restricted_only(
            now,
            &self.settings.window_priority,
            &self.settings.restricted_windows,
        );

        record.publish_on = publish_on;
        record.unpublish_on = unpublish_on;
        record.status = if available {
            PublishStatus::Published
        } else {
            PublishStatus::Unpublished
        };
        record.set_field("restricted_only", Some(restricted_only.to_string()));
    }

    /// Publish `parent_id` and each unpublished ancestor above it, stopping
    /// at the first ancestor that is already published.
    async fn promote_ancestors(&self, parent_id: RecordId) -> Result<()> {
        let mut next = Some(parent_id);

        while let Some(id) = next.take() {
            let Some(snapshot) = self.store.load(id).await? else {
                break;
            };
            let _guard = self
                .locks
                .lock(&locks::record_key(&snapshot.bundle, &snapshot.external_id))
                .await;

            let Some(mut ancestor) = self.store.load(id).await? else {
                break;
            };
            if ancestor.is_published() {
                break;
            }

            ancestor.status = PublishStatus::Published;
            self.store.save(&mut ancestor).await?;
            info!(
                record_id = %ancestor.id,
                external_id = %ancestor.external_id,
                "Promoted parent to published"
            );

            next = ancestor.parent_id;
        }

        Ok(())
    }
}
