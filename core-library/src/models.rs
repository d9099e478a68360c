//! Domain models for the local content store
//!
//! A [`LocalRecord`] is the persisted counterpart of one remote catalog item.
//! The store keys records by a local [`RecordId`]; the remote GUID lives in
//! `external_id` and is the join key used by the sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LibraryError;

// =============================================================================
// ID Types
// =============================================================================

/// Unique identifier for a local record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Publication
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Published,
    #[default]
    Unpublished,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Unpublished => "unpublished",
        }
    }
}

impl FromStr for PublishStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "published" => Ok(Self::Published),
            "unpublished" => Ok(Self::Unpublished),
            other => Err(LibraryError::InvalidInput {
                field: "status".to_string(),
                message: format!("unknown publish status '{}'", other),
            }),
        }
    }
}

/// Named availability window. `None` on either side means unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub name: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl AvailabilityWindow {
    pub fn new(
        name: impl Into<String>,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            end,
        }
    }
}

// =============================================================================
// Local Record
// =============================================================================

/// Persisted content item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalRecord {
    pub id: RecordId,
    /// Local content-type classification ("show", "video", ...)
    pub bundle: String,
    /// Remote GUID
    pub external_id: String,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub duration_secs: Option<u32>,
    pub parent_id: Option<RecordId>,
    /// Image slot -> URL
    #[serde(default)]
    pub images: BTreeMap<String, String>,
    /// Multi-value classification (genre terms)
    #[serde(default)]
    pub classification: BTreeSet<String>,
    #[serde(default)]
    pub windows: Vec<AvailabilityWindow>,
    #[serde(default)]
    pub status: PublishStatus,
    pub publish_on: Option<DateTime<Utc>>,
    pub unpublish_on: Option<DateTime<Utc>>,
    /// Audience marker; reserved values make the record ineligible as a
    /// publication parent.
    pub audience_scope: Option<String>,
    /// Resolved parent tree (relation -> remote GUID)
    #[serde(default)]
    pub lineage: BTreeMap<String, String>,
    /// Type-specific scalar fields
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Remote change time last applied to this record
    pub last_updated: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set once the store has written or loaded the record
    #[serde(skip)]
    pub persisted: bool,
}

impl LocalRecord {
    /// Unsaved shell for `bundle`
    pub fn new(bundle: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: RecordId::new(),
            bundle: bundle.into(),
            external_id: String::new(),
            title: String::new(),
            slug: String::new(),
            description: None,
            duration_secs: None,
            parent_id: None,
            images: BTreeMap::new(),
            classification: BTreeSet::new(),
            windows: Vec::new(),
            status: PublishStatus::Unpublished,
            publish_on: None,
            unpublish_on: None,
            audience_scope: None,
            lineage: BTreeMap::new(),
            fields: BTreeMap::new(),
            last_updated: None,
            created_at: now,
            updated_at: now,
            persisted: false,
        }
    }

    pub fn is_new(&self) -> bool {
        !self.persisted
    }

    pub fn is_published(&self) -> bool {
        self.status == PublishStatus::Published
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Set or clear a type-specific field
    pub fn set_field(&mut self, name: &str, value: Option<String>) {
        match value {
            Some(value) => {
                self.fields.insert(name.to_string(), value);
            }
            None => {
                self.fields.remove(name);
            }
        }
    }

    /// Set or clear an image slot
    pub fn set_image(&mut self, slot: &str, url: Option<String>) {
        match url {
            Some(url) => {
                self.images.insert(slot.to_string(), url);
            }
            None => {
                self.images.remove(slot);
            }
        }
    }

    pub fn window(&self, name: &str) -> Option<&AvailabilityWindow> {
        self.windows.iter().find(|window| window.name == name)
    }

    /// Validate record invariants before persisting
    pub fn validate(&self) -> Result<(), String> {
        if self.bundle.trim().is_empty() {
            return Err("Bundle cannot be empty".to_string());
        }

        if self.external_id.trim().is_empty() {
            return Err("External id cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Property filter for [`crate::store::ContentStore::find_many`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Property {
    ExternalId(String),
    ParentId(RecordId),
    Status(PublishStatus),
    /// Type-specific field equality
    Field { name: String, value: String },
}

impl Property {
    pub fn field(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Field {
            name: name.into(),
            value: value.into(),
        }
    }
}
