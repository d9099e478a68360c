//! Field projection from remote records onto local records
//!
//! Every optional field is an `Option`-returning mapping function. Applying
//! a mapping sets the local field when the function yields a value and
//! clears it otherwise, so a field removed upstream disappears locally too.

use bridge_traits::{ContentType, RemoteGenre, RemotePayload, RemoteRecord};
use core_library::{AvailabilityWindow, ContentStore, LocalRecord, RecordId};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// Mapping from a remote record to one optional local value
pub type FieldMap = fn(&RemoteRecord) -> Option<String>;

/// Named type-specific field
pub struct FieldMapping {
    pub name: &'static str,
    pub map: FieldMap,
}

/// Local image slot filled from the first remote profile present
pub struct ImageSlot {
    pub slot: &'static str,
    /// Candidate profiles, highest priority first
    pub profiles: &'static [&'static str],
}

const SHOW_IMAGES: &[ImageSlot] = &[
    ImageSlot {
        slot: "mezzanine",
        profiles: &["show-mezzanine16x9", "show-kids-16x9-mezzanine", "mezzanine"],
    },
    ImageSlot {
        slot: "poster",
        profiles: &["show-poster2x3", "show-kids-poster2x3"],
    },
    ImageSlot {
        slot: "logo",
        profiles: &["show-logo", "white-logo", "color-logo"],
    },
];

const SEASON_IMAGES: &[ImageSlot] = &[ImageSlot {
    slot: "mezzanine",
    profiles: &["season-mezzanine16x9", "mezzanine"],
}];

const EPISODE_IMAGES: &[ImageSlot] = &[ImageSlot {
    slot: "mezzanine",
    profiles: &["episode-mezzanine16x9", "asset-mezzanine-16x9", "mezzanine"],
}];

const ASSET_IMAGES: &[ImageSlot] = &[ImageSlot {
    slot: "mezzanine",
    profiles: &["asset-mezzanine-16x9", "mezzanine"],
}];

const SHOW_FIELDS: &[FieldMapping] = &[
    FieldMapping { name: "nola", map: nola },
    FieldMapping { name: "premiered_on", map: premiered_on },
    FieldMapping { name: "language", map: language },
    FieldMapping { name: "funder_message", map: funder_message },
];

const SEASON_FIELDS: &[FieldMapping] = &[FieldMapping { name: "ordinal", map: ordinal }];

const EPISODE_FIELDS: &[FieldMapping] = &[
    FieldMapping { name: "ordinal", map: ordinal },
    FieldMapping { name: "nola", map: nola },
    FieldMapping { name: "premiered_on", map: premiered_on },
    FieldMapping { name: "language", map: language },
];

const ASSET_FIELDS: &[FieldMapping] = &[
    FieldMapping { name: "object_type", map: object_type },
    FieldMapping { name: "premiered_on", map: premiered_on },
    FieldMapping { name: "language", map: language },
    FieldMapping { name: "content_rating", map: content_rating },
];

pub fn image_slots(content_type: ContentType) -> &'static [ImageSlot] {
    match content_type {
        ContentType::Show => SHOW_IMAGES,
        ContentType::Season => SEASON_IMAGES,
        ContentType::Episode => EPISODE_IMAGES,
        ContentType::Asset => ASSET_IMAGES,
    }
}

pub fn field_mappings(content_type: ContentType) -> &'static [FieldMapping] {
    match content_type {
        ContentType::Show => SHOW_FIELDS,
        ContentType::Season => SEASON_FIELDS,
        ContentType::Episode => EPISODE_FIELDS,
        ContentType::Asset => ASSET_FIELDS,
    }
}

/// Apply every type-specific field mapping
pub fn apply_fields(record: &mut LocalRecord, remote: &RemoteRecord) {
    for mapping in field_mappings(remote.content_type()) {
        record.set_field(mapping.name, (mapping.map)(remote));
    }
}

/// Fill every image slot from its fallback chain
pub fn apply_images(record: &mut LocalRecord, remote: &RemoteRecord) {
    for slot in image_slots(remote.content_type()) {
        record.set_image(slot.slot, first_image(remote, slot.profiles));
    }
}

/// URL of the first candidate profile the record carries
pub fn first_image(remote: &RemoteRecord, profiles: &[&str]) -> Option<String> {
    profiles
        .iter()
        .find_map(|profile| remote.image(profile))
        .map(|image| image.url.clone())
}

/// Long description, falling back to the short one
pub fn description(remote: &RemoteRecord) -> Option<String> {
    remote
        .description_long
        .clone()
        .or_else(|| remote.description_short.clone())
}

pub fn duration(remote: &RemoteRecord) -> Option<u32> {
    match &remote.payload {
        RemotePayload::Asset(asset) => asset.duration,
        _ => None,
    }
}

/// Availability windows; only assets carry them
pub fn windows(remote: &RemoteRecord) -> Option<Vec<AvailabilityWindow>> {
    match &remote.payload {
        RemotePayload::Asset(asset) => Some(
            asset
                .availabilities
                .iter()
                .map(|(name, window)| AvailabilityWindow::new(name.clone(), window.start, window.end))
                .collect(),
        ),
        _ => None,
    }
}

/// Audience scope declared by a top-level record
pub fn audience_scope(remote: &RemoteRecord) -> Option<String> {
    match &remote.payload {
        RemotePayload::Show(show) => show
            .audience
            .iter()
            .map(|audience| audience.scope.trim())
            .find(|scope| !scope.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

pub fn genre(remote: &RemoteRecord) -> Option<&RemoteGenre> {
    match &remote.payload {
        RemotePayload::Show(show) => show.genre.as_ref().filter(|genre| !genre.slug.is_empty()),
        _ => None,
    }
}

fn nola(remote: &RemoteRecord) -> Option<String> {
    match &remote.payload {
        RemotePayload::Show(show) => show.nola.clone(),
        RemotePayload::Episode(episode) => episode.nola.clone(),
        _ => None,
    }
}

fn premiered_on(remote: &RemoteRecord) -> Option<String> {
    let date = match &remote.payload {
        RemotePayload::Show(show) => show.premiered_on,
        RemotePayload::Episode(episode) => episode.premiered_on,
        RemotePayload::Asset(asset) => asset.premiered_on,
        RemotePayload::Season(_) => None,
    };
    date.map(|date| date.to_string())
}

fn language(remote: &RemoteRecord) -> Option<String> {
    match &remote.payload {
        RemotePayload::Show(show) => show.language.clone(),
        RemotePayload::Episode(episode) => episode.language.clone(),
        RemotePayload::Asset(asset) => asset.language.clone(),
        RemotePayload::Season(_) => None,
    }
}

fn funder_message(remote: &RemoteRecord) -> Option<String> {
    match &remote.payload {
        RemotePayload::Show(show) => show.funder_message.clone(),
        _ => None,
    }
}

fn ordinal(remote: &RemoteRecord) -> Option<String> {
    let ordinal = match &remote.payload {
        RemotePayload::Season(season) => season.ordinal,
        RemotePayload::Episode(episode) => episode.ordinal,
        _ => None,
    };
    ordinal.map(|ordinal| ordinal.to_string())
}

fn object_type(remote: &RemoteRecord) -> Option<String> {
    match &remote.payload {
        RemotePayload::Asset(asset) => asset.object_type.clone(),
        _ => None,
    }
}

fn content_rating(remote: &RemoteRecord) -> Option<String> {
    match &remote.payload {
        RemotePayload::Asset(asset) => asset.content_rating.clone(),
        _ => None,
    }
}

/// Genre slug -> local term lookups for one sync pass (or one queue drain).
///
/// Terms are local records in their own bundle keyed by the genre slug. A
/// miss is looked up in the store and created there if absent; the cache is
/// dropped with the pass, so renamed or deleted terms are picked up on the
/// next one.
pub struct TermCache {
    bundle: String,
    terms: Mutex<HashMap<String, RecordId>>,
}

impl TermCache {
    pub fn new() -> Self {
        Self::with_bundle("genre")
    }

    pub fn with_bundle(bundle: impl Into<String>) -> Self {
        Self {
            bundle: bundle.into(),
            terms: Mutex::new(HashMap::new()),
        }
    }

    /// Local term id for `genre`, creating the term on first sight.
    ///
    /// The cache lock is held across the lookup so concurrent consumers
    /// never create the same term twice.
    pub async fn resolve(&self, store: &dyn ContentStore, genre: &RemoteGenre) -> Result<RecordId> {
        let mut terms = self.terms.lock().await;
        if let Some(id) = terms.get(&genre.slug) {
            return Ok(*id);
        }

        let id = match store.find_one(&self.bundle, &genre.slug).await? {
            Some(term) => term.id,
            None => {
                let mut term = store.create(&self.bundle);
                term.external_id = genre.slug.clone();
                term.slug = genre.slug.clone();
                term.title = genre.title.clone();
                store.save(&mut term).await?;
                debug!(slug = %genre.slug, term_id = %term.id, "Created genre term");
                term.id
            }
        };

        terms.insert(genre.slug.clone(), id);
        Ok(id)
    }

    pub async fn len(&self) -> usize {
        self.terms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.terms.lock().await.is_empty()
    }
}

impl Default for TermCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{RemoteImage, ShowAttributes};
    use chrono::{TimeZone, Utc};
    use core_library::Property;
    use mockall::mock;

    mock! {
        Store {}

        #[async_trait]
        impl ContentStore for Store {
            async fn find_one(&self, bundle: &str, external_id: &str) -> core_library::Result<Option<LocalRecord>>;
            async fn find_many(&self, bundle: &str, properties: &[Property]) -> core_library::Result<Vec<LocalRecord>>;
            fn create(&self, bundle: &str) -> LocalRecord;
            async fn load(&self, id: RecordId) -> core_library::Result<Option<LocalRecord>>;
            async fn save(&self, record: &mut LocalRecord) -> core_library::Result<()>;
        }
    }

    fn show(images: Vec<(&str, &str)>) -> RemoteRecord {
        RemoteRecord {
            id: "show-1".to_string(),
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            title: "Nature".to_string(),
            slug: "nature".to_string(),
            description_short: Some("Short".to_string()),
            description_long: None,
            images: images
                .into_iter()
                .map(|(profile, url)| RemoteImage {
                    profile: profile.to_string(),
                    url: url.to_string(),
                    updated_at: None,
                })
                .collect(),
            lineage: None,
            payload: RemotePayload::Show(ShowAttributes {
                nola: Some("NATR".to_string()),
                genre: Some(RemoteGenre {
                    slug: "science-and-nature".to_string(),
                    title: "Science and Nature".to_string(),
                }),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_image_fallback_chain_prefers_first_profile() {
        let remote = show(vec![
            ("show-kids-16x9-mezzanine", "https://img/kids.jpg"),
            ("show-mezzanine16x9", "https://img/main.jpg"),
        ]);
        let mut record = LocalRecord::new("show", Utc::now());
        apply_images(&mut record, &remote);

        assert_eq!(
            record.images.get("mezzanine"),
            Some(&"https://img/main.jpg".to_string())
        );
        assert!(!record.images.contains_key("poster"));
    }

    #[test]
    fn test_image_fallback_uses_next_candidate() {
        let remote = show(vec![("white-logo", "https://img/white.png")]);
        let mut record = LocalRecord::new("show", Utc::now());
        apply_images(&mut record, &remote);

        assert_eq!(
            record.images.get("logo"),
            Some(&"https://img/white.png".to_string())
        );
    }

    #[test]
    fn test_absent_values_clear_existing_fields() {
        let mut record = LocalRecord::new("show", Utc::now());
        record.set_image("poster", Some("https://img/old.jpg".to_string()));
        record.set_field("language", Some("es".to_string()));

        let remote = show(vec![]);
        apply_images(&mut record, &remote);
        apply_fields(&mut record, &remote);

        assert!(record.images.is_empty());
        assert!(record.field("language").is_none());
        assert_eq!(record.field("nola"), Some("NATR"));
    }

    #[test]
    fn test_description_falls_back_to_short() {
        let mut remote = show(vec![]);
        assert_eq!(description(&remote), Some("Short".to_string()));

        remote.description_long = Some("Long".to_string());
        assert_eq!(description(&remote), Some("Long".to_string()));
    }

    #[test]
    fn test_non_asset_has_no_windows() {
        assert!(windows(&show(vec![])).is_none());
        assert!(duration(&show(vec![])).is_none());
    }

    #[tokio::test]
    async fn test_term_cache_hits_store_once_per_slug() {
        let mut store = MockStore::new();
        store.expect_find_one().times(1).returning(|_, _| Ok(None));
        store
            .expect_create()
            .times(1)
            .returning(|bundle| LocalRecord::new(bundle, Utc::now()));
        store.expect_save().times(1).returning(|_| Ok(()));

        let cache = TermCache::new();
        let remote = show(vec![]);
        let genre = genre(&remote).unwrap();

        let first = cache.resolve(&store, genre).await.unwrap();
        let second = cache.resolve(&store, genre).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_term_cache_reuses_existing_term() {
        let mut existing = LocalRecord::new("genre", Utc::now());
        existing.external_id = "science-and-nature".to_string();
        let existing_id = existing.id;

        let mut store = MockStore::new();
        store
            .expect_find_one()
            .withf(|bundle, slug| bundle.to_string() == "genre" && slug.to_string() == "science-and-nature")
            .times(1)
            .returning(move |_, _| Ok(Some(existing.clone())));
        store.expect_save().never();

        let cache = TermCache::new();
        let remote = show(vec![]);
        let id = cache.resolve(&store, genre(&remote).unwrap()).await.unwrap();

        assert_eq!(id, existing_id);
    }
}
