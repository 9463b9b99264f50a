//! Seed snapshot for explicit initialization.
//!
//! Seeding only ever happens through an explicit `init`; opening a store
//! never writes defaults implicitly, so a fresh store genuinely starts
//! empty.

use chrono::Utc;
use serde_json::json;

use crate::errors::Result;
use crate::rbac::Role;
use crate::snapshot::SnapshotStore;
use crate::BlogSnapshot;

/// The default snapshot: empty collections, baseline settings, and one
/// `admin` super_admin account.
pub fn default_snapshot() -> BlogSnapshot {
    BlogSnapshot {
        users: vec![json!({
            "id": "1",
            "username": "admin",
            "password": "admin123",
            "role": Role::SuperAdmin.as_str(),
            "status": "active",
            "displayName": "admin",
            "createdAt": Utc::now().to_rfc3339(),
        })],
        settings: json!({
            "siteName": "墨库博客",
            "siteDescription": "记录与分享",
            "postsPerPage": 10,
            "commentModeration": true,
            "totalWords": 125_000,
            "totalViews": 5432,
            "totalVisitors": 1234,
            "startDate": "2025-01-01",
        }),
        ..BlogSnapshot::default()
    }
}

/// Write the default snapshot unless data already exists. Returns whether
/// seeding happened.
pub fn init_store(store: &SnapshotStore) -> Result<bool> {
    let current = store.load()?;
    let has_data = current != BlogSnapshot::default();
    if has_data {
        tracing::info!("store already holds data, init skipped");
        return Ok(false);
    }
    store.save(&default_snapshot())?;
    tracing::info!("store seeded with default snapshot");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_seeds_once() {
        let store = SnapshotStore::open_in_memory().expect("store");
        assert!(init_store(&store).expect("first init"));
        assert!(!init_store(&store).expect("second init"));

        let snapshot = store.load().expect("load");
        assert!(snapshot.articles.is_empty());
        assert_eq!(snapshot.users.len(), 1);
        assert_eq!(snapshot.users[0]["username"], json!("admin"));
        assert_eq!(snapshot.users[0]["role"], json!("super_admin"));
        assert_eq!(snapshot.settings["siteName"], json!("墨库博客"));
    }

    #[test]
    fn init_never_overwrites_existing_data() {
        let store = SnapshotStore::open_in_memory().expect("store");
        let mut snapshot = BlogSnapshot::default();
        snapshot.articles.push(json!({"id": "1", "title": "既有"}));
        store.save(&snapshot).expect("save");

        assert!(!init_store(&store).expect("init"));
        assert_eq!(store.load().expect("load").articles.len(), 1);
    }
}
