//! Periodic trigger
//!
//! Runs each enabled content type whose interval has elapsed since its last
//! run. Content types are visited parents-first so a child pass sees the
//! parents the previous pass created.

use bridge_traits::{time::Clock, ContentType};
use chrono::{DateTime, Utc};
use core_runtime::config::SyncSettings;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use crate::coordinator::{SyncCoordinator, SyncReport};
use crate::error::Result;

/// Result of one scheduled pass
#[derive(Debug)]
pub struct ScheduledRun {
    pub content_type: ContentType,
    pub result: Result<SyncReport>,
}

pub struct SyncScheduler {
    coordinator: Arc<SyncCoordinator>,
    settings: Arc<SyncSettings>,
    clock: Arc<dyn Clock>,
    last_runs: Mutex<HashMap<ContentType, DateTime<Utc>>>,
}

impl SyncScheduler {
    pub fn new(
        coordinator: Arc<SyncCoordinator>,
        settings: Arc<SyncSettings>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            coordinator,
            settings,
            clock,
            last_runs: Mutex::new(HashMap::new()),
        }
    }

    /// When `content_type` was last started by this scheduler
    pub async fn last_run(&self, content_type: ContentType) -> Option<DateTime<Utc>> {
        self.last_runs.lock().await.get(&content_type).copied()
    }

    pub async fn is_due(&self, content_type: ContentType, now: DateTime<Utc>) -> bool {
        let config = self.settings.content_type_or_default(content_type);
        if !config.enabled {
            return false;
        }

        match self.last_run(content_type).await {
            None => true,
            Some(last) => match chrono::Duration::from_std(config.interval) {
                Ok(interval) => now - last >= interval,
                Err(_) => false,
            },
        }
    }

    /// Run every due content type, one after another.
    ///
    /// A failed pass still counts as a run, so a failing content type is
    /// retried on its next interval rather than on every trigger.
    pub async fn run_due(&self) -> Vec<ScheduledRun> {
        let mut runs = Vec::new();

        for content_type in ContentType::ALL {
            let now = self.clock.now();
            if !self.is_due(content_type, now).await {
                debug!(content_type = %content_type, "Not due");
                continue;
            }

            self.last_runs.lock().await.insert(content_type, now);

            let result = self
                .coordinator
                .run_incremental_sync(content_type, None, None)
                .await;
            match &result {
                Ok(report) => info!(
                    content_type = %content_type,
                    outcome = ?report.outcome,
                    items_enqueued = report.items_enqueued,
                    "Scheduled sync finished"
                ),
                Err(err) => error!(
                    content_type = %content_type,
                    error = %err,
                    "Scheduled sync failed"
                ),
            }

            runs.push(ScheduledRun {
                content_type,
                result,
            });
        }

        runs
    }
}
