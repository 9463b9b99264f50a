//! Local cache store: a persistent key-value snapshot backed by SQLite.
//!
//! Two logical records exist: [`SNAPSHOT_KEY`](crate::SNAPSHOT_KEY) holds the
//! full [`BlogSnapshot`], [`MEDIA_MIRROR_KEY`](crate::MEDIA_MIRROR_KEY) holds
//! a flat array of media entries for fast media reads. Every write replaces
//! the whole value under its key; nothing is partially persisted.

use std::env;
use std::path::Path;

use chrono::Utc;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use crate::errors::{Result, StoreError};
use crate::{BlogSnapshot, ResourceKind, MEDIA_MIRROR_KEY, SNAPSHOT_KEY};

/// Default quota for the serialized snapshot, mirroring the ~5 MB budget of
/// the browser storage this layer replaced.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

/// Environment variable overriding the snapshot quota.
pub const ENV_QUOTA_BYTES: &str = "INK_VAULT_QUOTA_BYTES";

/// Inline base64 images inside Markdown content. Only bodies of 100+ chars
/// are scrubbed; short data URIs are not worth removing.
static EMBEDDED_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"!\[([^\]]*)\]\(data:image/[^;)]+;base64,[^)]{100,}\)")
        .expect("embedded image pattern")
});

const CLEANUP_PLACEHOLDER: &str = "图片已移除-请重新上传";

/// Process-wide persistent snapshot store.
///
/// The SQLite connection is serialized behind a mutex; all access is
/// synchronous and fast relative to the async repository above it.
pub struct SnapshotStore {
    conn: Mutex<Connection>,
    quota_bytes: usize,
}

impl SnapshotStore {
    /// Open (and auto-create) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key        TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        let quota_bytes = env::var(ENV_QUOTA_BYTES)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_QUOTA_BYTES);
        Ok(SnapshotStore {
            conn: Mutex::new(conn),
            quota_bytes,
        })
    }

    /// Configured quota in bytes.
    pub fn quota_bytes(&self) -> usize {
        self.quota_bytes
    }

    /// Load the full snapshot; an absent key yields the empty default.
    pub fn load(&self) -> Result<BlogSnapshot> {
        match self.get_raw(SNAPSHOT_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(BlogSnapshot::default()),
        }
    }

    /// Serialize and replace the whole snapshot.
    ///
    /// If the serialized form exceeds the quota, one embedded-image cleanup
    /// pass runs on a copy; if the result still exceeds the quota the save
    /// fails with [`StoreError::QuotaExceeded`] and nothing is written.
    pub fn save(&self, snapshot: &BlogSnapshot) -> Result<()> {
        let raw = serde_json::to_string(snapshot)?;
        if raw.len() <= self.quota_bytes {
            return self.put_raw(SNAPSHOT_KEY, &raw);
        }

        tracing::warn!(
            used = raw.len(),
            quota = self.quota_bytes,
            "snapshot over quota, scrubbing embedded images"
        );
        let mut cleaned = snapshot.clone();
        let scrubbed = scrub_embedded_images(&mut cleaned, 1);
        let raw = serde_json::to_string(&cleaned)?;
        if raw.len() > self.quota_bytes {
            return Err(StoreError::QuotaExceeded {
                used_bytes: raw.len(),
                quota_bytes: self.quota_bytes,
            });
        }
        tracing::info!(scrubbed, new_size = raw.len(), "cleanup pass freed space");
        self.put_raw(SNAPSHOT_KEY, &raw)
    }

    /// Load the flat media mirror; absent key yields an empty array.
    pub fn load_media_mirror(&self) -> Result<Vec<Value>> {
        match self.get_raw(MEDIA_MIRROR_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the media mirror wholesale.
    pub fn save_media_mirror(&self, entries: &[Value]) -> Result<()> {
        let raw = serde_json::to_string(entries)?;
        self.put_raw(MEDIA_MIRROR_KEY, &raw)
    }

    /// Storage usage breakdown for the current snapshot.
    pub fn storage_report(&self) -> Result<StorageReport> {
        let snapshot = self.load()?;
        let total = serde_json::to_string(&snapshot)?.len();
        let mut collections = Vec::with_capacity(ResourceKind::ALL.len());
        for kind in ResourceKind::ALL {
            let records = snapshot.collection(kind);
            collections.push(CollectionUsage {
                kind,
                records: records.len(),
                bytes: serde_json::to_string(records)?.len(),
            });
        }
        Ok(StorageReport {
            used_bytes: total,
            quota_bytes: self.quota_bytes,
            usage_percent: (total as f64 / self.quota_bytes as f64) * 100.0,
            collections,
        })
    }

    /// Run the embedded-image cleanup pass explicitly, keeping the newest
    /// `keep_newest` articles untouched. Returns the number of images
    /// scrubbed; persists only when anything changed.
    pub fn cleanup(&self, keep_newest: usize) -> Result<usize> {
        let mut snapshot = self.load()?;
        let scrubbed = scrub_embedded_images(&mut snapshot, keep_newest);
        if scrubbed > 0 {
            let raw = serde_json::to_string(&snapshot)?;
            self.put_raw(SNAPSHOT_KEY, &raw)?;
        }
        Ok(scrubbed)
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at",
            params![key, value, Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}

/// Per-collection usage entry in a [`StorageReport`].
#[derive(Debug, Clone, Serialize)]
pub struct CollectionUsage {
    /// Which collection.
    pub kind: ResourceKind,
    /// Record count.
    pub records: usize,
    /// Serialized size in bytes.
    pub bytes: usize,
}

/// Snapshot storage usage summary.
#[derive(Debug, Clone, Serialize)]
pub struct StorageReport {
    /// Serialized snapshot size.
    pub used_bytes: usize,
    /// Configured quota.
    pub quota_bytes: usize,
    /// `used / quota` as a percentage.
    pub usage_percent: f64,
    /// Per-collection breakdown.
    pub collections: Vec<CollectionUsage>,
}

/// Human-readable byte size (B/KB/MB).
pub fn format_size(bytes: usize) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} B")
    }
}

/// Replace inline base64 images with a placeholder in every article except
/// the newest `keep_newest` (by numeric id, descending). Returns how many
/// images were scrubbed.
fn scrub_embedded_images(snapshot: &mut BlogSnapshot, keep_newest: usize) -> usize {
    let mut ids: Vec<i64> = snapshot
        .articles
        .iter()
        .filter_map(|article| article.get("id"))
        .filter_map(numeric_id)
        .collect();
    ids.sort_unstable_by(|a, b| b.cmp(a));
    let keep: Vec<i64> = ids.into_iter().take(keep_newest).collect();

    let mut scrubbed = 0;
    for article in &mut snapshot.articles {
        let is_kept = article
            .get("id")
            .and_then(numeric_id)
            .map(|id| keep.contains(&id))
            .unwrap_or(false);
        if is_kept {
            continue;
        }
        let replaced = {
            let Some(content) = article.get("content").and_then(Value::as_str) else {
                continue;
            };
            EMBEDDED_IMAGE
                .replace_all(content, |caps: &regex::Captures<'_>| {
                    scrubbed += 1;
                    format!("![{}]({CLEANUP_PLACEHOLDER})", &caps[1])
                })
                .into_owned()
        };
        article["content"] = Value::String(replaced);
    }
    scrubbed
}

fn numeric_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn store() -> SnapshotStore {
        SnapshotStore::open_in_memory().expect("in-memory store")
    }

    #[test]
    fn load_absent_key_yields_default() {
        let store = store();
        let snapshot = store.load().expect("load");
        assert_eq!(snapshot, BlogSnapshot::default());
    }

    #[test]
    fn save_then_load_round_trips() {
        let store = store();
        let mut snapshot = BlogSnapshot::default();
        snapshot.articles.push(json!({"id": "1", "title": "你好"}));
        store.save(&snapshot).expect("save");
        assert_eq!(store.load().expect("load"), snapshot);
    }

    #[test]
    fn media_mirror_round_trips() {
        let store = store();
        let entries = vec![json!({"id": "1", "mediaType": "image"})];
        store.save_media_mirror(&entries).expect("save mirror");
        assert_eq!(store.load_media_mirror().expect("load mirror"), entries);
    }

    #[test]
    fn cleanup_scrubs_old_articles_only() {
        let big = format!("![shot](data:image/png;base64,{})", "A".repeat(200));
        let mut snapshot = BlogSnapshot::default();
        snapshot
            .articles
            .push(json!({"id": "1", "content": big.clone()}));
        snapshot
            .articles
            .push(json!({"id": "2", "content": big.clone()}));

        let scrubbed = scrub_embedded_images(&mut snapshot, 1);
        assert_eq!(scrubbed, 1);

        // Newest article (id 2) keeps its image.
        let newest = snapshot.articles[1]["content"].as_str().unwrap_or_default();
        assert!(newest.contains("base64"));
        let oldest = snapshot.articles[0]["content"].as_str().unwrap_or_default();
        assert!(oldest.contains(CLEANUP_PLACEHOLDER));
        assert!(!oldest.contains("base64"));
    }

    fn heavy_snapshot() -> BlogSnapshot {
        let big = format!("![shot](data:image/png;base64,{})", "A".repeat(300));
        let mut snapshot = BlogSnapshot::default();
        snapshot
            .articles
            .push(json!({"id": "1", "content": big.clone()}));
        snapshot.articles.push(json!({"id": "2", "content": big}));
        snapshot
    }

    #[test]
    fn over_quota_save_scrubs_then_succeeds() {
        let mut store = store();
        store.quota_bytes = 700;

        store.save(&heavy_snapshot()).expect("save after cleanup pass");
        let loaded = store.load().expect("load");
        // Oldest article lost its embedded image; the newest kept it.
        let oldest = loaded.articles[0]["content"].as_str().unwrap_or_default();
        assert!(oldest.contains(CLEANUP_PLACEHOLDER));
        let newest = loaded.articles[1]["content"].as_str().unwrap_or_default();
        assert!(newest.contains("base64"));
    }

    #[test]
    fn quota_exceeded_when_cleanup_is_insufficient() {
        let mut store = store();
        store.quota_bytes = 200;

        let err = store.save(&heavy_snapshot()).expect_err("still over quota");
        assert!(matches!(err, StoreError::QuotaExceeded { .. }));
        // Nothing was written.
        assert_eq!(store.load().expect("load"), BlogSnapshot::default());
    }

    #[test]
    fn storage_report_counts_collections() {
        let store = store();
        let mut snapshot = BlogSnapshot::default();
        snapshot.articles.push(json!({"id": "1", "title": "a"}));
        snapshot.tags.push(json!({"id": "1", "name": "t"}));
        store.save(&snapshot).expect("save");

        let report = store.storage_report().expect("report");
        assert!(report.used_bytes > 0);
        let articles = report
            .collections
            .iter()
            .find(|c| c.kind == ResourceKind::Articles)
            .expect("articles entry");
        assert_eq!(articles.records, 1);
    }

    #[test]
    fn format_size_picks_unit() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
