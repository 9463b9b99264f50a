//! InkVault (墨库) data layer.
//!
//! A client-side repository for a blog system that serves uniform CRUD over
//! ten resource collections plus a settings singleton, against either a
//! remote HTTP API or a local SQLite snapshot depending on the deployment
//! environment. Remote failures fall back to the snapshot; successful remote
//! mutations are written through to it. Derived category/tag counts are
//! recomputed after every article mutation, and a static role-based
//! permission matrix gates the admin surface.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod accounts;
pub mod binder;
pub mod environment;
pub mod errors;
pub mod rbac;
pub mod remote;
pub mod repository;
pub mod seed;
pub mod snapshot;
pub mod stats;
pub mod validate;

pub use accounts::AccountManager;
pub use binder::PermissionBinder;
pub use environment::{BackendMode, DeployTarget, EnvironmentInfo};
pub use errors::{Result, StoreError};
pub use rbac::{Action, ActiveUser, Module, Permission, PermissionEngine, Role};
pub use repository::Repository;
pub use snapshot::SnapshotStore;

/// Logical key holding the full snapshot in the local store.
pub const SNAPSHOT_KEY: &str = "blogData";
/// Logical key holding the flat media mirror in the local store.
pub const MEDIA_MIRROR_KEY: &str = "blog_media";

/// `mediaType` value tagged onto image records in the media mirror.
pub const MEDIA_TYPE_IMAGE: &str = "image";
/// `mediaType` value tagged onto video records in the media mirror.
pub const MEDIA_TYPE_VIDEO: &str = "video";

/// The ten managed collections. `settings` is a singleton object handled
/// separately, not a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// Blog articles; newest-first insertion order.
    Articles,
    /// Article categories with derived `count`.
    Categories,
    /// Article tags with derived `count`.
    Tags,
    /// Article comments.
    Comments,
    /// Guestbook messages.
    Guestbook,
    /// Uploaded images (mirrored into the media mirror).
    Images,
    /// Music entries.
    Music,
    /// Video entries (mirrored into the media mirror).
    Videos,
    /// Friend links.
    Links,
    /// Admin accounts; ids are `user_{epoch_millis}`.
    Users,
}

impl ResourceKind {
    /// Every kind, in snapshot layout order.
    pub const ALL: [ResourceKind; 10] = [
        ResourceKind::Articles,
        ResourceKind::Categories,
        ResourceKind::Tags,
        ResourceKind::Comments,
        ResourceKind::Guestbook,
        ResourceKind::Images,
        ResourceKind::Music,
        ResourceKind::Videos,
        ResourceKind::Links,
        ResourceKind::Users,
    ];

    /// Plural lowercase name, as used in URLs and the snapshot layout.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Articles => "articles",
            ResourceKind::Categories => "categories",
            ResourceKind::Tags => "tags",
            ResourceKind::Comments => "comments",
            ResourceKind::Guestbook => "guestbook",
            ResourceKind::Images => "images",
            ResourceKind::Music => "music",
            ResourceKind::Videos => "videos",
            ResourceKind::Links => "links",
            ResourceKind::Users => "users",
        }
    }

    /// Whether ids for this kind follow the numeric `max + 1` rule.
    /// Users are the exception (`user_{epoch_millis}`).
    pub fn uses_numeric_ids(&self) -> bool {
        !matches!(self, ResourceKind::Users)
    }

    /// Whether new records are prepended instead of appended.
    /// Articles list newest-first.
    pub fn prepends_on_create(&self) -> bool {
        matches!(self, ResourceKind::Articles)
    }

    /// Whether this kind feeds the `blog_media` mirror.
    pub fn feeds_media_mirror(&self) -> bool {
        matches!(self, ResourceKind::Images | ResourceKind::Videos)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "articles" => Ok(ResourceKind::Articles),
            "categories" => Ok(ResourceKind::Categories),
            "tags" => Ok(ResourceKind::Tags),
            "comments" => Ok(ResourceKind::Comments),
            "guestbook" => Ok(ResourceKind::Guestbook),
            "images" => Ok(ResourceKind::Images),
            "music" => Ok(ResourceKind::Music),
            "videos" => Ok(ResourceKind::Videos),
            "links" => Ok(ResourceKind::Links),
            "users" => Ok(ResourceKind::Users),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

/// Full serialized state of all collections plus settings, as persisted
/// under [`SNAPSHOT_KEY`]. Records are open JSON objects; only the shapes
/// this crate derives from (counts, stats) are typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlogSnapshot {
    /// Blog articles, newest first.
    pub articles: Vec<Value>,
    /// Categories with derived counts.
    pub categories: Vec<Value>,
    /// Tags with derived counts.
    pub tags: Vec<Value>,
    /// Comments.
    pub comments: Vec<Value>,
    /// Guestbook messages.
    pub guestbook: Vec<Value>,
    /// Images.
    pub images: Vec<Value>,
    /// Music entries.
    pub music: Vec<Value>,
    /// Videos.
    pub videos: Vec<Value>,
    /// Friend links.
    pub links: Vec<Value>,
    /// Admin accounts.
    pub users: Vec<Value>,
    /// Settings singleton object.
    pub settings: Value,
}

impl Default for BlogSnapshot {
    fn default() -> Self {
        BlogSnapshot {
            articles: Vec::new(),
            categories: Vec::new(),
            tags: Vec::new(),
            comments: Vec::new(),
            guestbook: Vec::new(),
            images: Vec::new(),
            music: Vec::new(),
            videos: Vec::new(),
            links: Vec::new(),
            users: Vec::new(),
            settings: Value::Object(serde_json::Map::new()),
        }
    }
}

impl BlogSnapshot {
    /// Borrow the collection for a kind.
    pub fn collection(&self, kind: ResourceKind) -> &Vec<Value> {
        match kind {
            ResourceKind::Articles => &self.articles,
            ResourceKind::Categories => &self.categories,
            ResourceKind::Tags => &self.tags,
            ResourceKind::Comments => &self.comments,
            ResourceKind::Guestbook => &self.guestbook,
            ResourceKind::Images => &self.images,
            ResourceKind::Music => &self.music,
            ResourceKind::Videos => &self.videos,
            ResourceKind::Links => &self.links,
            ResourceKind::Users => &self.users,
        }
    }

    /// Mutably borrow the collection for a kind.
    pub fn collection_mut(&mut self, kind: ResourceKind) -> &mut Vec<Value> {
        match kind {
            ResourceKind::Articles => &mut self.articles,
            ResourceKind::Categories => &mut self.categories,
            ResourceKind::Tags => &mut self.tags,
            ResourceKind::Comments => &mut self.comments,
            ResourceKind::Guestbook => &mut self.guestbook,
            ResourceKind::Images => &mut self.images,
            ResourceKind::Music => &mut self.music,
            ResourceKind::Videos => &mut self.videos,
            ResourceKind::Links => &mut self.links,
            ResourceKind::Users => &mut self.users,
        }
    }
}

/// Canonical string form of a record id.
///
/// Ids arrive as numbers from some code paths and strings from others; all
/// comparisons inside this crate go through this normalization so equality
/// is unambiguous.
pub fn canonical_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// The `id` field of a record, canonicalized; empty string when absent.
pub fn record_id(record: &Value) -> String {
    record.get("id").map(canonical_id).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>(), Ok(kind));
        }
    }

    #[test]
    fn canonical_id_is_number_string_insensitive() {
        assert_eq!(canonical_id(&json!(7)), canonical_id(&json!("7")));
        assert_eq!(record_id(&json!({"id": 42})), "42");
        assert_eq!(record_id(&json!({"title": "no id"})), "");
    }

    #[test]
    fn snapshot_default_has_object_settings() {
        let snapshot = BlogSnapshot::default();
        assert!(snapshot.settings.is_object());
        assert!(snapshot.articles.is_empty());
    }

    #[test]
    fn snapshot_deserializes_with_missing_collections() {
        let snapshot: BlogSnapshot =
            serde_json::from_value(json!({"articles": [{"id": 1}]})).expect("partial snapshot");
        assert_eq!(snapshot.articles.len(), 1);
        assert!(snapshot.tags.is_empty());
        assert!(snapshot.settings.is_object());
    }
}
