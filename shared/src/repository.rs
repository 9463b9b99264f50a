//! Environment-aware resource repository.
//!
//! One call, one backend: in `Remote` mode every operation first runs
//! against the HTTP API under its timeout, and on any recoverable failure
//! (network, timeout, rejection) retries once against the local snapshot.
//! Successful remote mutations are mirrored into the snapshot so the local
//! copy stays a usable fallback. In `LocalCache` mode the snapshot is the
//! only backend. Reads are never merged across backends.
//!
//! Absence is not an error at this boundary: `get_by_id`/`update` return
//! `None` and `delete` returns `false` for unknown ids, on either backend.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::environment::{BackendMode, EnvironmentInfo};
use crate::errors::{Result, StoreError};
use crate::remote::RemoteClient;
use crate::snapshot::SnapshotStore;
use crate::stats::{self, DashboardStats, StatsCache};
use crate::{canonical_id, record_id, validate, BlogSnapshot, ResourceKind};
use crate::{MEDIA_TYPE_IMAGE, MEDIA_TYPE_VIDEO};

/// Unfiltered list cache lifetime.
const LIST_TTL: Duration = Duration::from_secs(5 * 60);
/// By-id LRU capacity.
const BY_ID_CAPACITY: usize = 128;

/// Per-kind outcome of a sync push.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    /// Collection pushed.
    pub kind: ResourceKind,
    /// Error message when the push of this collection failed.
    pub error: Option<String>,
}

/// Result of [`Repository::push`].
#[derive(Debug, Clone, Default)]
pub struct PushReport {
    /// The remote was down and nothing was attempted.
    pub skipped: bool,
    /// Whether the settings PUT succeeded (when attempted).
    pub settings_error: Option<String>,
    /// Per-collection outcomes.
    pub outcomes: Vec<PushOutcome>,
}

impl PushReport {
    /// Whether every attempted push succeeded.
    pub fn is_clean(&self) -> bool {
        !self.skipped
            && self.settings_error.is_none()
            && self.outcomes.iter().all(|o| o.error.is_none())
    }
}

/// The uniform CRUD surface over all collections plus settings.
pub struct Repository {
    mode: BackendMode,
    store: Arc<SnapshotStore>,
    remote: Option<RemoteClient>,
    list_cache: DashMap<ResourceKind, (Instant, Vec<Value>)>,
    by_id_cache: Mutex<LruCache<(ResourceKind, String), Value>>,
    stats_cache: StatsCache,
}

impl Repository {
    /// Repository for an explicit mode over `store`.
    pub fn new(mode: BackendMode, store: Arc<SnapshotStore>) -> Self {
        let remote = match &mode {
            BackendMode::Remote { api_root } => Some(RemoteClient::new(api_root)),
            BackendMode::LocalCache => None,
        };
        let capacity = NonZeroUsize::new(BY_ID_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Repository {
            mode,
            store,
            remote,
            list_cache: DashMap::new(),
            by_id_cache: Mutex::new(LruCache::new(capacity)),
            stats_cache: StatsCache::default(),
        }
    }

    /// Repository for a resolved environment.
    pub fn from_environment(info: &EnvironmentInfo, store: Arc<SnapshotStore>) -> Self {
        Self::new(info.mode.clone(), store)
    }

    /// Active backend mode.
    pub fn mode(&self) -> &BackendMode {
        &self.mode
    }

    /// The underlying snapshot store.
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Remote liveness; `false` in `LocalCache` mode.
    pub async fn remote_healthy(&self) -> bool {
        match &self.remote {
            Some(remote) => remote.health().await,
            None => false,
        }
    }

    // ----- uniform CRUD -----

    /// List a collection in insertion order, optionally filtered by exact
    /// `status` match.
    pub async fn list(&self, kind: ResourceKind, status: Option<&str>) -> Result<Vec<Value>> {
        let records = self.list_unfiltered(kind).await?;
        Ok(match status {
            Some(status) => records
                .into_iter()
                .filter(|r| r.get("status").and_then(Value::as_str) == Some(status))
                .collect(),
            None => records,
        })
    }

    /// Fetch one record by canonical id.
    pub async fn get_by_id(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>> {
        if let Some(hit) = self
            .by_id_cache
            .lock()
            .get(&(kind, id.to_string()))
            .cloned()
        {
            tracing::debug!(kind = %kind, id, "by-id cache hit");
            return Ok(Some(hit));
        }

        let found = match &self.remote {
            Some(remote) => match remote.get_by_id(kind, id).await {
                Ok(found) => found,
                Err(err) if err.is_recoverable() => {
                    self.log_fallback(kind, "get", &err);
                    self.local_get(kind, id)?
                }
                Err(err) => return Err(err),
            },
            None => self.local_get(kind, id)?,
        };

        if let Some(record) = &found {
            self.by_id_cache
                .lock()
                .put((kind, id.to_string()), record.clone());
        }
        Ok(found)
    }

    /// Create a record. Validation and defaults run before any I/O; the
    /// backend assigns the id and the fully populated record comes back.
    pub async fn add(&self, kind: ResourceKind, payload: &Value) -> Result<Value> {
        let cleaned = validate::clean_for_create(kind, payload)?;

        let record = match &self.remote {
            Some(remote) => match remote.create(kind, &cleaned).await {
                Ok(record) => {
                    self.write_through(kind, |snapshot| {
                        insert_record(snapshot, kind, record.clone());
                    });
                    record
                }
                Err(err) if err.is_recoverable() => {
                    self.log_fallback(kind, "add", &err);
                    self.local_add(kind, cleaned)?
                }
                Err(err) => return Err(err),
            },
            None => self.local_add(kind, cleaned)?,
        };

        self.invalidate(kind);
        Ok(record)
    }

    /// Shallow-merge `patch` over the stored record. `None` when the id is
    /// unknown to the backend that served the call.
    pub async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        patch: &Value,
    ) -> Result<Option<Value>> {
        let cleaned = validate::clean_for_update(kind, patch)?;

        let updated = match &self.remote {
            Some(remote) => match remote.update(kind, id, &cleaned).await {
                Ok(Some(record)) => {
                    self.write_through(kind, |snapshot| {
                        replace_record(snapshot, kind, id, record.clone());
                    });
                    Some(record)
                }
                Ok(None) => None,
                Err(err) if err.is_recoverable() => {
                    self.log_fallback(kind, "update", &err);
                    self.local_update(kind, id, &cleaned)?
                }
                Err(err) => return Err(err),
            },
            None => self.local_update(kind, id, &cleaned)?,
        };

        self.invalidate(kind);
        Ok(updated)
    }

    /// Delete by id. `false` (a successful no-op) when the id is unknown.
    pub async fn delete(&self, kind: ResourceKind, id: &str) -> Result<bool> {
        let removed = match &self.remote {
            Some(remote) => match remote.delete(kind, id).await {
                Ok(true) => {
                    self.write_through(kind, |snapshot| {
                        remove_record(snapshot, kind, id);
                    });
                    true
                }
                Ok(false) => false,
                Err(err) if err.is_recoverable() => {
                    self.log_fallback(kind, "delete", &err);
                    self.local_delete(kind, id)?
                }
                Err(err) => return Err(err),
            },
            None => self.local_delete(kind, id)?,
        };

        self.invalidate(kind);
        Ok(removed)
    }

    // ----- settings -----

    /// The settings singleton.
    pub async fn settings(&self) -> Result<Value> {
        match &self.remote {
            Some(remote) => match remote.settings().await {
                Ok(settings) => Ok(settings),
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(%err, "remote settings read failed, serving snapshot");
                    Ok(self.store.load()?.settings)
                }
                Err(err) => Err(err),
            },
            None => Ok(self.store.load()?.settings),
        }
    }

    /// Replace the settings singleton.
    pub async fn save_settings(&self, settings: &Value) -> Result<()> {
        match &self.remote {
            Some(remote) => match remote.save_settings(settings).await {
                Ok(_) => {
                    self.write_through_settings(settings);
                    Ok(())
                }
                Err(err) if err.is_recoverable() => {
                    tracing::warn!(%err, "remote settings write failed, writing snapshot");
                    self.local_save_settings(settings)
                }
                Err(err) => Err(err),
            },
            None => self.local_save_settings(settings),
        }
    }

    /// Merge `patch` into the current settings, then replace.
    pub async fn update_settings(&self, patch: &Value) -> Result<Value> {
        let mut settings = self.settings().await?;
        shallow_merge(&mut settings, patch);
        self.save_settings(&settings).await?;
        Ok(settings)
    }

    // ----- typed families -----

    /// Articles, optionally by status (`published` / `draft`).
    pub async fn articles(&self, status: Option<&str>) -> Result<Vec<Value>> {
        self.list(ResourceKind::Articles, status).await
    }

    /// Bump an article's `views` by one; `None` for unknown ids.
    pub async fn increment_views(&self, id: &str) -> Result<Option<Value>> {
        let Some(article) = self.get_by_id(ResourceKind::Articles, id).await? else {
            return Ok(None);
        };
        let views = article.get("views").and_then(Value::as_u64).unwrap_or(0) + 1;
        self.update(ResourceKind::Articles, id, &json!({ "views": views }))
            .await
    }

    /// Mark a comment approved; `None` for unknown ids.
    pub async fn approve_comment(&self, id: &str) -> Result<Option<Value>> {
        self.update(ResourceKind::Comments, id, &json!({ "status": "approved" }))
            .await
    }

    /// Add one like to a guestbook message; `None` for unknown ids.
    pub async fn toggle_guestbook_like(&self, id: &str) -> Result<Option<Value>> {
        let Some(message) = self.get_by_id(ResourceKind::Guestbook, id).await? else {
            return Ok(None);
        };
        let likes = message.get("likes").and_then(Value::as_u64).unwrap_or(0) + 1;
        self.update(ResourceKind::Guestbook, id, &json!({ "likes": likes }))
            .await
    }

    /// Flip a guestbook message's pinned flag; `None` for unknown ids.
    pub async fn toggle_guestbook_pin(&self, id: &str) -> Result<Option<Value>> {
        let Some(message) = self.get_by_id(ResourceKind::Guestbook, id).await? else {
            return Ok(None);
        };
        let pinned = message.get("isTop").and_then(Value::as_bool).unwrap_or(false);
        self.update(ResourceKind::Guestbook, id, &json!({ "isTop": !pinned }))
            .await
    }

    /// Distinct link categories, `默认` when none exist.
    pub async fn link_categories(&self) -> Result<Vec<String>> {
        let links = self.list(ResourceKind::Links, None).await?;
        let mut categories: Vec<String> = Vec::new();
        for link in &links {
            if let Some(category) = link.get("category").and_then(Value::as_str) {
                if !categories.iter().any(|c| c == category) {
                    categories.push(category.to_string());
                }
            }
        }
        if categories.is_empty() {
            categories.push("默认".to_string());
        }
        Ok(categories)
    }

    /// Links with `status == "active"`.
    pub async fn active_links(&self) -> Result<Vec<Value>> {
        self.list(ResourceKind::Links, Some("active")).await
    }

    /// Active links in one category.
    pub async fn links_by_category(&self, category: &str) -> Result<Vec<Value>> {
        let links = self.active_links().await?;
        Ok(links
            .into_iter()
            .filter(|l| l.get("category").and_then(Value::as_str) == Some(category))
            .collect())
    }

    /// The flat media mirror (images and videos tagged with `mediaType`).
    pub async fn media_mirror(&self) -> Result<Vec<Value>> {
        let mirror = self.store.load_media_mirror()?;
        if !mirror.is_empty() {
            return Ok(mirror);
        }
        // First access before any media mutation: build it once.
        let snapshot = self.store.load()?;
        let mirror = build_media_mirror(&snapshot);
        if !mirror.is_empty() {
            self.store.save_media_mirror(&mirror)?;
        }
        Ok(mirror)
    }

    // ----- stats -----

    /// Dashboard summary, served from a 5-minute cache invalidated by
    /// article mutations.
    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        if let Some(cached) = self.stats_cache.get() {
            tracing::debug!("dashboard stats cache hit");
            return Ok(cached);
        }
        let computed = stats::compute_dashboard_stats(&BlogSnapshot {
            articles: self.list(ResourceKind::Articles, None).await?,
            comments: self.list(ResourceKind::Comments, None).await?,
            settings: self.settings().await?,
            ..BlogSnapshot::default()
        });
        self.stats_cache.put(computed.clone());
        Ok(computed)
    }

    /// Run the category/tag count synchronization against the snapshot.
    /// Returns whether anything changed.
    pub fn sync_counts(&self) -> Result<bool> {
        let mut snapshot = self.store.load()?;
        let changed = stats::sync_derived_counts(&mut snapshot);
        if changed {
            self.store.save(&snapshot)?;
            self.list_cache.remove(&ResourceKind::Categories);
            self.list_cache.remove(&ResourceKind::Tags);
        }
        Ok(changed)
    }

    // ----- remote sync -----

    /// Push local collections (all by default) and settings to the remote.
    /// Skips silently when the remote is down; per-kind failures are
    /// collected, not fatal.
    pub async fn push(&self, kinds: Option<&[ResourceKind]>) -> Result<PushReport> {
        let Some(remote) = &self.remote else {
            tracing::info!("no remote backend, push skipped");
            return Ok(PushReport {
                skipped: true,
                ..PushReport::default()
            });
        };
        if !remote.health().await {
            tracing::info!("remote down, push skipped");
            return Ok(PushReport {
                skipped: true,
                ..PushReport::default()
            });
        }

        let snapshot = self.store.load()?;
        let mut report = PushReport::default();

        if let Err(err) = remote.save_settings(&snapshot.settings).await {
            tracing::warn!(%err, "settings push failed");
            report.settings_error = Some(err.to_string());
        }

        let kinds: Vec<ResourceKind> = kinds
            .map(<[ResourceKind]>::to_vec)
            .unwrap_or_else(|| ResourceKind::ALL.to_vec());
        for kind in kinds {
            let outcome = match remote.replace_collection(kind, snapshot.collection(kind)).await {
                Ok(()) => PushOutcome { kind, error: None },
                Err(err) => {
                    tracing::warn!(kind = %kind, %err, "collection push failed");
                    PushOutcome {
                        kind,
                        error: Some(err.to_string()),
                    }
                }
            };
            report.outcomes.push(outcome);
        }
        Ok(report)
    }

    /// Replace local collections (all by default) and settings with the
    /// remote's copies.
    pub async fn pull(&self, kinds: Option<&[ResourceKind]>) -> Result<()> {
        let Some(remote) = &self.remote else {
            return Err(StoreError::NetworkUnavailable(
                "no remote backend configured".to_string(),
            ));
        };

        let kinds: Vec<ResourceKind> = kinds
            .map(<[ResourceKind]>::to_vec)
            .unwrap_or_else(|| ResourceKind::ALL.to_vec());
        let mut snapshot = self.store.load()?;
        for kind in &kinds {
            *snapshot.collection_mut(*kind) = remote.list(*kind).await?;
        }
        snapshot.settings = remote.settings().await?;
        self.store.save(&snapshot)?;
        self.store
            .save_media_mirror(&build_media_mirror(&snapshot))?;

        self.list_cache.clear();
        self.by_id_cache.lock().clear();
        self.stats_cache.invalidate();
        tracing::info!(kinds = kinds.len(), "pulled remote data into snapshot");
        Ok(())
    }

    // ----- internals -----

    async fn list_unfiltered(&self, kind: ResourceKind) -> Result<Vec<Value>> {
        if let Some(entry) = self.list_cache.get(&kind) {
            let (at, records) = entry.value();
            if at.elapsed() < LIST_TTL {
                tracing::debug!(kind = %kind, "list cache hit");
                return Ok(records.clone());
            }
        }

        let records = match &self.remote {
            Some(remote) => match remote.list(kind).await {
                Ok(records) => records,
                Err(err) if err.is_recoverable() => {
                    self.log_fallback(kind, "list", &err);
                    self.store.load()?.collection(kind).clone()
                }
                Err(err) => return Err(err),
            },
            None => self.store.load()?.collection(kind).clone(),
        };

        self.list_cache
            .insert(kind, (Instant::now(), records.clone()));
        Ok(records)
    }

    fn local_get(&self, kind: ResourceKind, id: &str) -> Result<Option<Value>> {
        let snapshot = self.store.load()?;
        Ok(snapshot
            .collection(kind)
            .iter()
            .find(|record| record_id(record) == id)
            .cloned())
    }

    fn local_add(&self, kind: ResourceKind, mut record: Value) -> Result<Value> {
        let mut snapshot = self.store.load()?;
        record["id"] = json!(next_id(kind, snapshot.collection(kind)));
        insert_record(&mut snapshot, kind, record.clone());
        self.finish_local_mutation(kind, snapshot)?;
        Ok(record)
    }

    fn local_update(&self, kind: ResourceKind, id: &str, patch: &Value) -> Result<Option<Value>> {
        let mut snapshot = self.store.load()?;
        let Some(record) = snapshot
            .collection_mut(kind)
            .iter_mut()
            .find(|record| record_id(record) == id)
        else {
            return Ok(None);
        };
        shallow_merge(record, patch);
        let updated = record.clone();
        self.finish_local_mutation(kind, snapshot)?;
        Ok(Some(updated))
    }

    fn local_delete(&self, kind: ResourceKind, id: &str) -> Result<bool> {
        let mut snapshot = self.store.load()?;
        let removed = remove_record(&mut snapshot, kind, id);
        if removed {
            self.finish_local_mutation(kind, snapshot)?;
        }
        Ok(removed)
    }

    fn local_save_settings(&self, settings: &Value) -> Result<()> {
        let mut snapshot = self.store.load()?;
        snapshot.settings = settings.clone();
        self.store.save(&snapshot)?;
        self.stats_cache.invalidate();
        Ok(())
    }

    /// Count sync (articles), persist, media mirror upkeep.
    fn finish_local_mutation(&self, kind: ResourceKind, mut snapshot: BlogSnapshot) -> Result<()> {
        if kind == ResourceKind::Articles {
            stats::sync_derived_counts(&mut snapshot);
        }
        self.store.save(&snapshot)?;
        if kind.feeds_media_mirror() {
            self.store
                .save_media_mirror(&build_media_mirror(&snapshot))?;
        }
        Ok(())
    }

    /// Mirror a successful remote mutation into the snapshot. Best-effort:
    /// the call was already satisfied by the remote, so a local fault here
    /// is logged, not raised.
    fn write_through<F>(&self, kind: ResourceKind, mutate: F)
    where
        F: FnOnce(&mut BlogSnapshot),
    {
        let result = self.store.load().and_then(|mut snapshot| {
            mutate(&mut snapshot);
            self.finish_local_mutation(kind, snapshot)
        });
        if let Err(err) = result {
            tracing::warn!(kind = %kind, %err, "write-through to snapshot failed");
        }
    }

    fn write_through_settings(&self, settings: &Value) {
        if let Err(err) = self.local_save_settings(settings) {
            tracing::warn!(%err, "settings write-through failed");
        }
    }

    fn invalidate(&self, kind: ResourceKind) {
        self.list_cache.remove(&kind);
        if kind == ResourceKind::Articles {
            // Count sync rewrites these two collections.
            self.list_cache.remove(&ResourceKind::Categories);
            self.list_cache.remove(&ResourceKind::Tags);
            self.stats_cache.invalidate();
        }
        if kind == ResourceKind::Comments {
            self.stats_cache.invalidate();
        }
        self.by_id_cache.lock().clear();
    }

    fn log_fallback(&self, kind: ResourceKind, operation: &str, err: &StoreError) {
        tracing::warn!(kind = %kind, operation, %err, "remote failed, retrying against snapshot");
    }
}

/// Next backend-assigned id: numeric kinds take `max + 1` as a string,
/// users take `user_{epoch_millis}` with a sequence suffix when two
/// creations land in the same millisecond.
fn next_id(kind: ResourceKind, records: &[Value]) -> String {
    if !kind.uses_numeric_ids() {
        let base = format!("user_{}", Utc::now().timestamp_millis());
        let mut candidate = base.clone();
        let mut sequence = 1;
        while records.iter().any(|record| record_id(record) == candidate) {
            candidate = format!("{base}_{sequence}");
            sequence += 1;
        }
        return candidate;
    }
    let max = records
        .iter()
        .filter_map(|record| record.get("id"))
        .filter_map(|id| canonical_id(id).parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    (max + 1).to_string()
}

/// Insert at the kind's creation position.
fn insert_record(snapshot: &mut BlogSnapshot, kind: ResourceKind, record: Value) {
    let collection = snapshot.collection_mut(kind);
    if kind.prepends_on_create() {
        collection.insert(0, record);
    } else {
        collection.push(record);
    }
}

/// Replace the record with `id`, or append when absent (remote knew it).
fn replace_record(snapshot: &mut BlogSnapshot, kind: ResourceKind, id: &str, record: Value) {
    let collection = snapshot.collection_mut(kind);
    match collection.iter_mut().find(|r| record_id(r) == id) {
        Some(slot) => *slot = record,
        None => collection.push(record),
    }
}

/// Remove the record with `id`; whether anything was removed.
fn remove_record(snapshot: &mut BlogSnapshot, kind: ResourceKind, id: &str) -> bool {
    let collection = snapshot.collection_mut(kind);
    let before = collection.len();
    collection.retain(|record| record_id(record) != id);
    collection.len() != before
}

/// Shallow merge: top-level fields of `patch` overwrite `target`.
fn shallow_merge(target: &mut Value, patch: &Value) {
    let (Value::Object(target), Value::Object(patch)) = (target, patch) else {
        return;
    };
    for (key, value) in patch {
        target.insert(key.clone(), value.clone());
    }
}

/// Images and videos flattened into mirror entries tagged with `mediaType`.
fn build_media_mirror(snapshot: &BlogSnapshot) -> Vec<Value> {
    let tag = |records: &[Value], media_type: &str| -> Vec<Value> {
        records
            .iter()
            .cloned()
            .map(|mut record| {
                record["mediaType"] = json!(media_type);
                record
            })
            .collect()
    };
    let mut mirror = tag(&snapshot.images, MEDIA_TYPE_IMAGE);
    mirror.extend(tag(&snapshot.videos, MEDIA_TYPE_VIDEO));
    mirror
}
