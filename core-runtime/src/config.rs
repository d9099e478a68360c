//! # Sync Configuration Module
//!
//! Configuration values consumed by the sync core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a
//! [`SyncSettings`] instance. The builder validates values that would
//! otherwise surface as confusing runtime behavior (an empty batch, a
//! restricted window that never gets scanned) before anything runs.
//!
//! Admin screens and field-mapping UI live in the host. They hand the core
//! plain values: the bundle each content type is stored under, whether its
//! periodic sync is enabled, how often it runs, and where its first-ever sync
//! starts from.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::{ContentTypeConfig, FirstSyncPolicy, SyncSettings};
//! use bridge_traits::ContentType;
//! use std::time::Duration;
//!
//! let settings = SyncSettings::builder()
//!     .database_path("/var/lib/media-sync/content.db")
//!     .time_budget(Duration::from_secs(300))
//!     .content_type(
//!         ContentTypeConfig::new(ContentType::Asset, "video")
//!             .with_first_sync(FirstSyncPolicy::Epoch),
//!     )
//!     .build()
//!     .expect("valid settings");
//!
//! assert_eq!(settings.bundle_for(ContentType::Asset), "video");
//! ```
//!
//! Settings can also be deserialized from JSON with [`SyncSettings::from_json`];
//! omitted fields take their defaults.

use crate::error::{Error, Result};
use bridge_traits::ContentType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound on parent ids per remote query
pub const MAX_BATCH_SIZE: usize = 50;

const DAY_SECS: u64 = 24 * 60 * 60;

/// Where the first-ever sync of a content type starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstSyncPolicy {
    /// Everything since the Unix epoch
    Epoch,
    /// Only changes within this window before the pass starts
    Lookback(Duration),
}

impl FirstSyncPolicy {
    /// Cutoff to use when no cursor has been stored yet
    pub fn default_since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Epoch => DateTime::<Utc>::UNIX_EPOCH,
            Self::Lookback(window) => chrono::Duration::from_std(*window)
                .ok()
                .and_then(|window| now.checked_sub_signed(window))
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        }
    }
}

/// Per-content-type sync policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentTypeConfig {
    pub content_type: ContentType,
    /// Local bundle the records are stored under
    pub bundle: String,
    /// Whether the periodic trigger runs this type
    pub enabled: bool,
    /// Minimum time between periodic runs
    pub interval: Duration,
    pub first_sync: FirstSyncPolicy,
}

impl ContentTypeConfig {
    pub fn new(content_type: ContentType, bundle: impl Into<String>) -> Self {
        Self {
            content_type,
            bundle: bundle.into(),
            enabled: true,
            interval: Duration::from_secs(60 * 60),
            first_sync: FirstSyncPolicy::Epoch,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_first_sync(mut self, first_sync: FirstSyncPolicy) -> Self {
        self.first_sync = first_sync;
        self
    }

    /// Defaults for each content type.
    ///
    /// Shows and assets look back seven days on their first sync because a
    /// full listing of either is expensive; seasons and episodes are bounded
    /// by their parents and start from the epoch.
    pub fn default_for(content_type: ContentType) -> Self {
        match content_type {
            ContentType::Show => Self::new(content_type, "show")
                .with_first_sync(FirstSyncPolicy::Lookback(Duration::from_secs(7 * DAY_SECS))),
            ContentType::Season => Self::new(content_type, "season"),
            ContentType::Episode => Self::new(content_type, "episode"),
            ContentType::Asset => Self::new(content_type, "video")
                .with_first_sync(FirstSyncPolicy::Lookback(Duration::from_secs(7 * DAY_SECS))),
        }
    }
}

/// Settings for the sync core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Path to the SQLite database holding records, cursors and the queue
    pub database_path: PathBuf,

    /// Wall-clock budget for a single incremental pass
    pub time_budget: Duration,

    /// Parent ids per remote query (1..=50)
    pub batch_size: usize,

    /// Records requested per listing page
    pub page_size: u32,

    /// Availability window names, most permissive first
    pub window_priority: Vec<String>,

    /// Window names that only grant access to a restricted audience
    pub restricted_windows: Vec<String>,

    /// Audience scopes that make a parent ineligible for publication
    pub reserved_audience_scopes: Vec<String>,

    /// Redelivery attempts before a queue item is parked as failed
    pub queue_max_attempts: u32,

    /// Queue items reconciled concurrently by the dispatch worker
    pub worker_concurrency: usize,

    pub content_types: Vec<ContentTypeConfig>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("media-sync.db"),
            time_budget: Duration::from_secs(300),
            batch_size: MAX_BATCH_SIZE,
            page_size: 50,
            window_priority: vec![
                "public".to_string(),
                "all_members".to_string(),
                "station_members".to_string(),
            ],
            restricted_windows: vec!["all_members".to_string(), "station_members".to_string()],
            reserved_audience_scopes: vec!["station".to_string()],
            queue_max_attempts: 3,
            worker_concurrency: 4,
            content_types: ContentType::ALL
                .iter()
                .map(|content_type| ContentTypeConfig::default_for(*content_type))
                .collect(),
        }
    }
}

impl SyncSettings {
    /// Creates a new builder seeded with the defaults.
    pub fn builder() -> SyncSettingsBuilder {
        SyncSettingsBuilder::default()
    }

    /// Parse and validate settings from JSON.
    pub fn from_json(raw: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(raw)
            .map_err(|e| Error::Config(format!("Invalid settings JSON: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validates the settings.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Batch size is within 1..=50 and page size is non-zero
    /// - Time budget is non-zero
    /// - Every restricted window appears in the priority order
    /// - Each content type is configured at most once with a non-empty bundle
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(Error::Config(format!(
                "Batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }

        if self.page_size == 0 {
            return Err(Error::Config("Page size must be greater than 0".to_string()));
        }

        if self.time_budget.is_zero() {
            return Err(Error::Config(
                "Time budget must be greater than 0 seconds".to_string(),
            ));
        }

        if self.worker_concurrency == 0 {
            return Err(Error::Config(
                "Worker concurrency must be greater than 0".to_string(),
            ));
        }

        if let Some(missing) = self
            .restricted_windows
            .iter()
            .find(|name| !self.window_priority.contains(name))
        {
            return Err(Error::Config(format!(
                "Restricted window '{}' is not part of the window priority order",
                missing
            )));
        }

        for (index, config) in self.content_types.iter().enumerate() {
            if config.bundle.trim().is_empty() {
                return Err(Error::Config(format!(
                    "Bundle for content type {} cannot be empty",
                    config.content_type
                )));
            }

            if self.content_types[..index]
                .iter()
                .any(|other| other.content_type == config.content_type)
            {
                return Err(Error::Config(format!(
                    "Content type {} is configured more than once",
                    config.content_type
                )));
            }
        }

        Ok(())
    }

    /// Configuration for a content type, if present
    pub fn content_type(&self, content_type: ContentType) -> Option<&ContentTypeConfig> {
        self.content_types
            .iter()
            .find(|config| config.content_type == content_type)
    }

    /// Configuration for a content type, falling back to the built-in default
    pub fn content_type_or_default(&self, content_type: ContentType) -> ContentTypeConfig {
        self.content_type(content_type)
            .cloned()
            .unwrap_or_else(|| ContentTypeConfig::default_for(content_type))
    }

    /// Local bundle for a content type
    pub fn bundle_for(&self, content_type: ContentType) -> String {
        self.content_type_or_default(content_type).bundle
    }
}

/// Builder for [`SyncSettings`]
#[derive(Debug, Default)]
pub struct SyncSettingsBuilder {
    database_path: Option<PathBuf>,
    time_budget: Option<Duration>,
    batch_size: Option<usize>,
    page_size: Option<u32>,
    window_priority: Option<Vec<String>>,
    restricted_windows: Option<Vec<String>>,
    reserved_audience_scopes: Option<Vec<String>>,
    queue_max_attempts: Option<u32>,
    worker_concurrency: Option<usize>,
    content_types: Vec<ContentTypeConfig>,
}

impl SyncSettingsBuilder {
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the wall-clock budget of a single pass.
    ///
    /// Default: 300 seconds
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Sets the number of parent ids per remote query.
    ///
    /// Default: 50, which is also the maximum.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Sets the availability window scan order, most permissive first.
    pub fn window_priority<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.window_priority = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn restricted_windows<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.restricted_windows = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn reserved_audience_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_audience_scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    pub fn queue_max_attempts(mut self, attempts: u32) -> Self {
        self.queue_max_attempts = Some(attempts);
        self
    }

    pub fn worker_concurrency(mut self, concurrency: usize) -> Self {
        self.worker_concurrency = Some(concurrency);
        self
    }

    /// Overrides the policy for one content type. Types that are never
    /// overridden keep [`ContentTypeConfig::default_for`].
    pub fn content_type(mut self, config: ContentTypeConfig) -> Self {
        self.content_types
            .retain(|existing| existing.content_type != config.content_type);
        self.content_types.push(config);
        self
    }

    /// Builds and validates the settings.
    pub fn build(self) -> Result<SyncSettings> {
        let defaults = SyncSettings::default();

        let mut content_types = defaults.content_types;
        for config in self.content_types {
            if let Some(slot) = content_types
                .iter_mut()
                .find(|existing| existing.content_type == config.content_type)
            {
                *slot = config;
            } else {
                content_types.push(config);
            }
        }

        let settings = SyncSettings {
            database_path: self.database_path.unwrap_or(defaults.database_path),
            time_budget: self.time_budget.unwrap_or(defaults.time_budget),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            page_size: self.page_size.unwrap_or(defaults.page_size),
            window_priority: self.window_priority.unwrap_or(defaults.window_priority),
            restricted_windows: self.restricted_windows.unwrap_or(defaults.restricted_windows),
            reserved_audience_scopes: self
                .reserved_audience_scopes
                .unwrap_or(defaults.reserved_audience_scopes),
            queue_max_attempts: self.queue_max_attempts.unwrap_or(defaults.queue_max_attempts),
            worker_concurrency: self.worker_concurrency.unwrap_or(defaults.worker_concurrency),
            content_types,
        };

        settings.validate()?;
        Ok(settings)
    }
}
