//! Parent-tree resolution
//!
//! Remote child records carry their ancestry as a nested node:
//!
//! ```json
//! { "type": "episode", "id": "ep-1", "attributes": {
//!     "season": { "id": "s-1", "attributes": {
//!         "show": { "id": "show-1", "attributes": {
//!             "franchise": { "id": "fr-1" } } } } } } }
//! ```
//!
//! [`resolve`] flattens that into a [`ParentTree`] of relation -> GUID.

use bridge_traits::ContentType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SyncError};

/// Relation kinds in leaf-first order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Episode,
    Special,
    Season,
    Show,
    Franchise,
}

impl Relation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episode => "episode",
            Self::Special => "special",
            Self::Season => "season",
            Self::Show => "show",
            Self::Franchise => "franchise",
        }
    }

    pub fn from_type(node_type: &str) -> Option<Self> {
        match node_type {
            "episode" => Some(Self::Episode),
            "special" => Some(Self::Special),
            "season" => Some(Self::Season),
            "show" => Some(Self::Show),
            "franchise" => Some(Self::Franchise),
            _ => None,
        }
    }

    /// Relation naming a local record of `content_type`, if any
    pub fn for_content_type(content_type: ContentType) -> Option<Self> {
        match content_type {
            ContentType::Show => Some(Self::Show),
            ContentType::Season => Some(Self::Season),
            ContentType::Episode => Some(Self::Episode),
            ContentType::Asset => None,
        }
    }

    fn depth(&self) -> u8 {
        match self {
            Self::Episode | Self::Special => 0,
            Self::Season => 1,
            Self::Show => 2,
            Self::Franchise => 3,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Links followed below the starting node, in descent order
const LINKS: [Relation; 3] = [Relation::Season, Relation::Show, Relation::Franchise];

/// Flat relation -> GUID mapping. Absent relations are absent keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentTree {
    entries: BTreeMap<Relation, String>,
}

impl ParentTree {
    pub fn get(&self, relation: Relation) -> Option<&str> {
        self.entries.get(&relation).map(String::as_str)
    }

    /// GUID for a relation the caller relies on.
    ///
    /// # Errors
    /// `SyncError::MissingRelation` when the entry is absent.
    pub fn require(&self, relation: Relation) -> Result<&str> {
        self.get(relation).ok_or_else(|| SyncError::MissingRelation {
            relation: relation.to_string(),
        })
    }

    pub fn contains(&self, relation: Relation) -> bool {
        self.entries.contains_key(&relation)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries leaf-first
    pub fn iter(&self) -> impl Iterator<Item = (Relation, &str)> {
        self.entries
            .iter()
            .map(|(relation, id)| (*relation, id.as_str()))
    }

    /// String-keyed copy for storage on a local record
    pub fn to_lineage(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(relation, id)| (relation.as_str().to_string(), id.clone()))
            .collect()
    }
}

/// Flatten a nested parent-reference node.
///
/// Starts with the node's own `type`/`id`, then follows `season`, `show` and
/// `franchise` links (only those ranked above the starting node) through each
/// node's `attributes`.
///
/// # Errors
/// `SyncError::MalformedParentTree` for an unknown or missing type, a missing
/// id, or a node without `attributes` that still has links to inspect.
pub fn resolve(node: &Value) -> Result<ParentTree> {
    let node_type = node
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::MalformedParentTree("node has no type".to_string()))?;

    let root = Relation::from_type(node_type).ok_or_else(|| {
        SyncError::MalformedParentTree(format!("unknown node type '{}'", node_type))
    })?;

    let mut tree = ParentTree::default();
    tree.entries.insert(root, node_id(node, root)?);

    let mut current = node;
    let mut current_relation = root;

    for link in LINKS.iter().filter(|link| link.depth() > root.depth()) {
        let attributes = current
            .get("attributes")
            .filter(|attributes| attributes.is_object())
            .ok_or_else(|| {
                SyncError::MalformedParentTree(format!(
                    "{} node has no attributes",
                    current_relation
                ))
            })?;

        if let Some(next) = attributes.get(link.as_str()).filter(|v| !v.is_null()) {
            tree.entries.insert(*link, node_id(next, *link)?);
            current = next;
            current_relation = *link;
        }
    }

    Ok(tree)
}

fn node_id(node: &Value, relation: Relation) -> Result<String> {
    node.get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or_else(|| SyncError::MalformedParentTree(format!("{} node has no id", relation)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn episode_tree() -> Value {
        json!({
            "type": "episode",
            "id": "ep-1",
            "attributes": {
                "season": {
                    "id": "season-1",
                    "attributes": {
                        "show": {
                            "id": "show-1",
                            "attributes": {
                                "franchise": { "id": "franchise-1" }
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn test_resolve_full_episode_chain() {
        let tree = resolve(&episode_tree()).unwrap();

        let relations: Vec<_> = tree.iter().map(|(relation, _)| relation).collect();
        assert_eq!(
            relations,
            vec![
                Relation::Episode,
                Relation::Season,
                Relation::Show,
                Relation::Franchise
            ]
        );
        assert_eq!(tree.get(Relation::Episode), Some("ep-1"));
        assert_eq!(tree.get(Relation::Season), Some("season-1"));
        assert_eq!(tree.get(Relation::Show), Some("show-1"));
        assert_eq!(tree.get(Relation::Franchise), Some("franchise-1"));
    }

    #[test]
    fn test_season_without_franchise_omits_key() {
        let node = json!({
            "type": "season",
            "id": "season-1",
            "attributes": {
                "show": { "id": "show-1", "attributes": {} }
            }
        });

        let tree = resolve(&node).unwrap();
        assert_eq!(tree.len(), 2);
        assert!(!tree.contains(Relation::Franchise));
        assert_eq!(tree.require(Relation::Show).unwrap(), "show-1");
    }

    #[test]
    fn test_special_linked_directly_to_show() {
        let node = json!({
            "type": "special",
            "id": "sp-1",
            "attributes": {
                "show": { "id": "show-9", "attributes": { "franchise": null } }
            }
        });

        let tree = resolve(&node).unwrap();
        assert_eq!(tree.get(Relation::Special), Some("sp-1"));
        assert!(!tree.contains(Relation::Season));
        assert_eq!(tree.get(Relation::Show), Some("show-9"));
        assert!(!tree.contains(Relation::Franchise));
    }

    #[test]
    fn test_franchise_root_needs_no_attributes() {
        let tree = resolve(&json!({ "type": "franchise", "id": "fr-1" })).unwrap();
        assert_eq!(tree.len(), 1);
        assert!(matches!(
            tree.require(Relation::Show),
            Err(SyncError::MissingRelation { .. })
        ));
    }

    #[test]
    fn test_missing_attributes_is_malformed() {
        let node = json!({
            "type": "episode",
            "id": "ep-1",
            "attributes": {
                "season": { "id": "season-1" }
            }
        });

        assert!(matches!(
            resolve(&node),
            Err(SyncError::MalformedParentTree(_))
        ));
    }

    #[test]
    fn test_missing_id_and_unknown_type_are_malformed() {
        assert!(matches!(
            resolve(&json!({ "type": "episode", "attributes": {} })),
            Err(SyncError::MalformedParentTree(_))
        ));
        assert!(matches!(
            resolve(&json!({ "type": "collection", "id": "c-1", "attributes": {} })),
            Err(SyncError::MalformedParentTree(_))
        ));
    }

    #[test]
    fn test_lineage_uses_relation_names() {
        let lineage = resolve(&episode_tree()).unwrap().to_lineage();
        assert_eq!(lineage.get("show"), Some(&"show-1".to_string()));
        assert_eq!(lineage.len(), 4);
    }
}
