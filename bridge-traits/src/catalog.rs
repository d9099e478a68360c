//! Remote Catalog Abstractions
//!
//! The remote media metadata API as seen by the sync core: a listing
//! endpoint with filter/sort/pagination, a single-record fetch, and the
//! validated record types both return.
//!
//! Raw API items have the shape `{ "id", "type", "attributes": { ... } }` with
//! the type-specific fields living inside `attributes`. [`RemoteRecord::from_json`]
//! validates that shape once, at the boundary, and produces a tagged
//! [`RemotePayload`] per content type so the rest of the engine never has to
//! probe untyped JSON.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Remote content types handled by the sync engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Show,
    Season,
    Episode,
    Asset,
}

impl ContentType {
    /// All content types in dependency order (parents before children)
    pub const ALL: [ContentType; 4] = [
        ContentType::Show,
        ContentType::Season,
        ContentType::Episode,
        ContentType::Asset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Show => "show",
            Self::Season => "season",
            Self::Episode => "episode",
            Self::Asset => "asset",
        }
    }

    /// Content type whose local records partition the remote queries for this
    /// type, or `None` for top-level types.
    pub fn parent_type(&self) -> Option<ContentType> {
        match self {
            Self::Show => None,
            Self::Season => Some(Self::Show),
            Self::Episode => Some(Self::Season),
            Self::Asset => Some(Self::Show),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "show" => Ok(Self::Show),
            "season" => Ok(Self::Season),
            "episode" => Ok(Self::Episode),
            "asset" => Ok(Self::Asset),
            other => Err(BridgeError::InvalidPayload(format!(
                "Unknown content type: {}",
                other
            ))),
        }
    }
}

/// Image attached to a remote record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteImage {
    /// Image profile key (e.g. `show-poster2x3`, `asset-mezzanine-16x9`)
    pub profile: String,
    pub url: String,
    /// Image sub-resources carry their own timestamp that does not bubble up
    /// into the record's `updated_at`.
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteGenre {
    pub slug: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteAudience {
    pub scope: String,
}

/// Raw availability window as published by the API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RemoteWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShowAttributes {
    pub nola: Option<String>,
    pub genre: Option<RemoteGenre>,
    pub audience: Vec<RemoteAudience>,
    pub premiered_on: Option<NaiveDate>,
    pub language: Option<String>,
    pub funder_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonAttributes {
    pub ordinal: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeAttributes {
    pub ordinal: Option<i64>,
    pub nola: Option<String>,
    pub premiered_on: Option<NaiveDate>,
    pub language: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetAttributes {
    /// `full_length`, `clip`, `preview`, ...
    pub object_type: Option<String>,
    /// Duration in seconds
    pub duration: Option<u32>,
    pub premiered_on: Option<NaiveDate>,
    pub language: Option<String>,
    pub content_rating: Option<String>,
    /// Named availability windows (`public`, `all_members`, `station_members`)
    pub availabilities: BTreeMap<String, RemoteWindow>,
}

/// Type-specific part of a remote record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RemotePayload {
    Show(ShowAttributes),
    Season(SeasonAttributes),
    Episode(EpisodeAttributes),
    Asset(AssetAttributes),
}

impl RemotePayload {
    pub fn content_type(&self) -> ContentType {
        match self {
            Self::Show(_) => ContentType::Show,
            Self::Season(_) => ContentType::Season,
            Self::Episode(_) => ContentType::Episode,
            Self::Asset(_) => ContentType::Asset,
        }
    }
}

/// Validated snapshot of a remote catalog item
///
/// Owned by the sync pass that fetched it; serializable so it can travel
/// through the dispatch queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Remote GUID, the join key to local storage
    pub id: String,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub slug: String,
    pub description_short: Option<String>,
    pub description_long: Option<String>,
    pub images: Vec<RemoteImage>,
    /// Nested parent-reference node (`{type, id, attributes: {season|show|franchise}}`)
    /// consumed by the parent-tree resolver. `None` for top-level records.
    pub lineage: Option<Value>,
    pub payload: RemotePayload,
}

impl RemoteRecord {
    /// Validate a raw API item into a `RemoteRecord`.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::InvalidPayload` when the id, type, attributes,
    /// title or `updated_at` are missing or malformed.
    pub fn from_json(value: &Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| BridgeError::InvalidPayload("missing id".to_string()))?
            .to_string();

        let content_type: ContentType = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidPayload(format!("{}: missing type", id)))?
            .parse()?;

        let attributes = value
            .get("attributes")
            .filter(|a| a.is_object())
            .ok_or_else(|| BridgeError::InvalidPayload(format!("{}: missing attributes", id)))?;

        let updated_at = attributes
            .get("updated_at")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .ok_or_else(|| {
                BridgeError::InvalidPayload(format!("{}: missing or invalid updated_at", id))
            })?;

        let title = attributes
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| BridgeError::InvalidPayload(format!("{}: missing title", id)))?
            .to_string();

        let payload = match content_type {
            ContentType::Show => RemotePayload::Show(typed_attributes(&id, attributes)?),
            ContentType::Season => RemotePayload::Season(typed_attributes(&id, attributes)?),
            ContentType::Episode => RemotePayload::Episode(typed_attributes(&id, attributes)?),
            ContentType::Asset => RemotePayload::Asset(typed_attributes(&id, attributes)?),
        };

        let lineage = match content_type {
            ContentType::Show => None,
            ContentType::Asset => attributes.get("parent_tree").cloned(),
            ContentType::Season | ContentType::Episode => Some(serde_json::json!({
                "type": content_type.as_str(),
                "id": id,
                "attributes": attributes,
            })),
        };

        Ok(Self {
            id,
            updated_at,
            title,
            slug: optional_string(attributes, "slug").unwrap_or_default(),
            description_short: optional_string(attributes, "description_short"),
            description_long: optional_string(attributes, "description_long"),
            images: parse_images(attributes),
            lineage,
            payload,
        })
    }

    pub fn content_type(&self) -> ContentType {
        self.payload.content_type()
    }

    /// Latest change to this record, including image sub-resources.
    pub fn latest_update(&self) -> DateTime<Utc> {
        self.images
            .iter()
            .filter_map(|image| image.updated_at)
            .fold(self.updated_at, |latest, ts| latest.max(ts))
    }

    /// First image matching the profile key
    pub fn image(&self, profile: &str) -> Option<&RemoteImage> {
        self.images.iter().find(|image| image.profile == profile)
    }
}

fn typed_attributes<T: serde::de::DeserializeOwned>(id: &str, attributes: &Value) -> Result<T> {
    serde_json::from_value(attributes.clone())
        .map_err(|e| BridgeError::InvalidPayload(format!("{}: {}", id, e)))
}

fn optional_string(attributes: &Value, key: &str) -> Option<String> {
    attributes
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

// Entries without a profile or URL are dropped rather than failing the record.
fn parse_images(attributes: &Value) -> Vec<RemoteImage> {
    attributes
        .get("images")
        .and_then(Value::as_array)
        .map(|images| {
            images
                .iter()
                .filter_map(|image| {
                    let profile = image.get("profile").and_then(Value::as_str)?;
                    let url = image.get("image").and_then(Value::as_str)?;
                    Some(RemoteImage {
                        profile: profile.to_string(),
                        url: url.to_string(),
                        updated_at: image
                            .get("updated_at")
                            .and_then(Value::as_str)
                            .and_then(parse_timestamp),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Sort order for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// `-updated_at`: newest first
    #[default]
    UpdatedAtDesc,
}

impl SortOrder {
    /// Query parameter value understood by the API
    pub fn as_param(&self) -> &'static str {
        match self {
            Self::UpdatedAtDesc => "-updated_at",
        }
    }
}

/// Listing filter
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ListFilter {
    /// Only records whose parent GUID is in this set
    pub parent_ids: Vec<String>,
    /// Free-text id match
    pub id: Option<String>,
}

/// Listing request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub filter: ListFilter,
    pub sort: SortOrder,
    /// 1-based page number
    pub page: u32,
    pub page_size: u32,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            filter: ListFilter::default(),
            sort: SortOrder::UpdatedAtDesc,
            page: 1,
            page_size: 50,
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent_ids(mut self, parent_ids: Vec<String>) -> Self {
        self.filter.parent_ids = parent_ids;
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.filter.id = Some(id.into());
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

/// One page of listing results
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ListPage {
    pub records: Vec<RemoteRecord>,
    /// Next page number, `None` on the last page
    pub next_page: Option<u32>,
}

/// Remote media metadata API
///
/// # Example
///
/// ```ignore
/// use bridge_traits::catalog::{CatalogProvider, ContentType, ListQuery};
///
/// async fn newest_shows(api: &dyn CatalogProvider) -> bridge_traits::error::Result<()> {
///     let page = api.list(ContentType::Show, &ListQuery::new()).await?;
///     for show in page.records {
///         println!("{} updated {}", show.title, show.latest_update());
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// List records of a content type
    async fn list(&self, content_type: ContentType, query: &ListQuery) -> Result<ListPage>;

    /// Fetch a single record by GUID, `None` when the API does not know it
    async fn get(&self, content_type: ContentType, id: &str) -> Result<Option<RemoteRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn asset_json() -> Value {
        json!({
            "id": "asset-1",
            "type": "asset",
            "attributes": {
                "title": "Episode 1 | Full Episode",
                "slug": "episode-1-full",
                "updated_at": "2024-03-01T10:00:00Z",
                "description_short": "Short",
                "object_type": "full_length",
                "duration": 3300,
                "images": [
                    { "profile": "asset-mezzanine-16x9", "image": "https://img/1.jpg",
                      "updated_at": "2024-03-05T08:00:00Z" },
                    { "profile": "broken" }
                ],
                "availabilities": {
                    "public": { "start": "2024-03-01T00:00:00Z", "end": null },
                    "all_members": { "start": null, "end": null }
                },
                "parent_tree": {
                    "type": "episode",
                    "id": "ep-1",
                    "attributes": {}
                }
            }
        })
    }

    #[test]
    fn test_from_json_asset() {
        let record = RemoteRecord::from_json(&asset_json()).unwrap();

        assert_eq!(record.id, "asset-1");
        assert_eq!(record.content_type(), ContentType::Asset);
        assert_eq!(record.slug, "episode-1-full");
        assert_eq!(record.images.len(), 1);
        assert!(record.lineage.is_some());

        match &record.payload {
            RemotePayload::Asset(asset) => {
                assert_eq!(asset.duration, Some(3300));
                assert_eq!(asset.object_type.as_deref(), Some("full_length"));
                assert_eq!(asset.availabilities.len(), 2);
                assert!(asset.availabilities["public"].end.is_none());
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_latest_update_scans_images() {
        let record = RemoteRecord::from_json(&asset_json()).unwrap();
        let expected = Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap();
        assert_eq!(record.latest_update(), expected);
        assert!(record.updated_at < record.latest_update());
    }

    #[test]
    fn test_season_lineage_is_own_node() {
        let raw = json!({
            "id": "season-1",
            "type": "season",
            "attributes": {
                "title": "Season 1",
                "updated_at": "2024-01-01T00:00:00Z",
                "ordinal": 1,
                "show": { "id": "show-1", "type": "show", "attributes": {} }
            }
        });

        let record = RemoteRecord::from_json(&raw).unwrap();
        let lineage = record.lineage.unwrap();
        assert_eq!(lineage["id"], "season-1");
        assert_eq!(lineage["attributes"]["show"]["id"], "show-1");
    }

    #[test]
    fn test_from_json_rejects_missing_updated_at() {
        let raw = json!({
            "id": "show-1",
            "type": "show",
            "attributes": { "title": "A Show" }
        });

        let err = RemoteRecord::from_json(&raw).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidPayload(_)));
    }

    #[test]
    fn test_from_json_rejects_unknown_type() {
        let raw = json!({
            "id": "x",
            "type": "franchise",
            "attributes": { "title": "F", "updated_at": "2024-01-01T00:00:00Z" }
        });

        assert!(RemoteRecord::from_json(&raw).is_err());
    }

    #[test]
    fn test_payload_serde_roundtrip_keeps_variant() {
        let record = RemoteRecord::from_json(&asset_json()).unwrap();
        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: RemoteRecord = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_list_query_builder() {
        let query = ListQuery::new()
            .with_parent_ids(vec!["a".into(), "b".into()])
            .with_page(3);

        assert_eq!(query.sort.as_param(), "-updated_at");
        assert_eq!(query.page, 3);
        assert_eq!(query.filter.parent_ids.len(), 2);
    }

    #[test]
    fn test_content_type_parent_types() {
        assert_eq!(ContentType::Show.parent_type(), None);
        assert_eq!(ContentType::Season.parent_type(), Some(ContentType::Show));
        assert_eq!(ContentType::Episode.parent_type(), Some(ContentType::Season));
        assert_eq!(ContentType::Asset.parent_type(), Some(ContentType::Show));
        assert_eq!("asset".parse::<ContentType>().unwrap(), ContentType::Asset);
    }
}
