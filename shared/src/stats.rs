//! Derived statistics: category/tag count synchronization and the dashboard
//! summary.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{canonical_id, BlogSnapshot, ResourceKind};

/// Dashboard cache lifetime.
pub const STATS_TTL: Duration = Duration::from_secs(5 * 60);

/// Dashboard summary, camelCase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Published article count.
    pub total_articles: u64,
    /// Comment count.
    pub total_comments: u64,
    /// Settings override, else the sum of article `views`.
    pub total_views: u64,
    /// Settings override, else 0.
    pub total_visitors: u64,
    /// Settings override, else summed `content` length of published articles.
    pub total_words: u64,
    /// Whole days since `settings.startDate`, never negative.
    pub running_days: u64,
}

/// Recompute `count` on every category and tag from actual article
/// occurrences. Existing records are overwritten in place (including to 0);
/// names present on articles but missing from the collection are synthesized
/// with the next numeric id. Idempotent: a second run with no interleaving
/// mutation changes nothing. Returns whether anything changed.
pub fn sync_derived_counts(snapshot: &mut BlogSnapshot) -> bool {
    let category_counts = occurrence_counts(&snapshot.articles, |article| {
        article
            .get("category")
            .and_then(Value::as_str)
            .map(|name| vec![name.to_string()])
            .unwrap_or_default()
    });
    let tag_counts = occurrence_counts(&snapshot.articles, |article| {
        article
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    });

    let changed_categories =
        apply_counts(&mut snapshot.categories, &category_counts, ResourceKind::Categories);
    let changed_tags = apply_counts(&mut snapshot.tags, &tag_counts, ResourceKind::Tags);
    changed_categories || changed_tags
}

/// Compute the dashboard summary from a snapshot.
pub fn compute_dashboard_stats(snapshot: &BlogSnapshot) -> DashboardStats {
    let published: Vec<&Value> = snapshot
        .articles
        .iter()
        .filter(|article| {
            article.get("status").and_then(Value::as_str) == Some("published")
        })
        .collect();

    let computed_views: u64 = snapshot
        .articles
        .iter()
        .filter_map(|article| article.get("views").and_then(Value::as_u64))
        .sum();
    let computed_words: u64 = published
        .iter()
        .filter_map(|article| article.get("content").and_then(Value::as_str))
        .map(|content| content.chars().count() as u64)
        .sum();

    // Zero counts as unset for the settings overrides.
    let override_of = |field: &str| -> u64 {
        snapshot
            .settings
            .get(field)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };
    let total_views = match override_of("totalViews") {
        0 => computed_views,
        n => n,
    };
    let total_words = match override_of("totalWords") {
        0 => computed_words,
        n => n,
    };
    let total_visitors = override_of("totalVisitors");

    DashboardStats {
        total_articles: published.len() as u64,
        total_comments: snapshot.comments.len() as u64,
        total_views,
        total_visitors,
        total_words,
        running_days: running_days(&snapshot.settings),
    }
}

/// Single-slot TTL cache for the dashboard summary.
#[derive(Debug, Default)]
pub struct StatsCache {
    slot: Mutex<Option<(Instant, DashboardStats)>>,
}

impl StatsCache {
    /// Fresh cached value, if any.
    pub fn get(&self) -> Option<DashboardStats> {
        let slot = self.slot.lock();
        slot.as_ref()
            .filter(|(at, _)| at.elapsed() < STATS_TTL)
            .map(|(_, stats)| stats.clone())
    }

    /// Store a freshly computed value.
    pub fn put(&self, stats: DashboardStats) {
        *self.slot.lock() = Some((Instant::now(), stats));
    }

    /// Drop the cached value (article mutations).
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }
}

fn running_days(settings: &Value) -> u64 {
    let Some(start) = settings
        .get("startDate")
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
    else {
        return 0;
    };
    let days = Utc::now().date_naive().signed_duration_since(start).num_days();
    days.max(0) as u64
}

fn occurrence_counts<F>(articles: &[Value], names_of: F) -> HashMap<String, u64>
where
    F: Fn(&Value) -> Vec<String>,
{
    let mut counts: HashMap<String, u64> = HashMap::new();
    for article in articles {
        for name in names_of(article) {
            if !name.is_empty() {
                *counts.entry(name).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// Overwrite `count` on existing records and synthesize records for names
/// with no record yet.
fn apply_counts(
    records: &mut Vec<Value>,
    counts: &HashMap<String, u64>,
    kind: ResourceKind,
) -> bool {
    let mut changed = false;
    let mut seen: Vec<String> = Vec::with_capacity(records.len());

    for record in records.iter_mut() {
        let Some(name) = record.get("name").and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        let count = counts.get(&name).copied().unwrap_or(0);
        if record.get("count").and_then(Value::as_u64) != Some(count) {
            record["count"] = json!(count);
            changed = true;
        }
        seen.push(name);
    }

    let mut next_id = records
        .iter()
        .filter_map(|record| record.get("id"))
        .filter_map(|id| canonical_id(id).parse::<u64>().ok())
        .max()
        .unwrap_or(0)
        + 1;
    let mut missing: Vec<&String> = counts
        .keys()
        .filter(|name| !seen.contains(name))
        .collect();
    missing.sort();
    for name in missing {
        tracing::debug!(kind = kind.as_str(), name = %name, "synthesizing counted record");
        records.push(json!({
            "id": next_id.to_string(),
            "name": name,
            "count": counts[name],
        }));
        next_id += 1;
        changed = true;
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_articles(articles: Vec<Value>) -> BlogSnapshot {
        BlogSnapshot {
            articles,
            ..BlogSnapshot::default()
        }
    }

    #[test]
    fn counts_overwrite_and_synthesize() {
        let mut snapshot = snapshot_with_articles(vec![
            json!({"id": "1", "category": "Tech", "tags": ["rust", "blog"]}),
            json!({"id": "2", "category": "Tech", "tags": ["rust"]}),
        ]);
        snapshot
            .categories
            .push(json!({"id": "1", "name": "Life", "count": 9}));

        assert!(sync_derived_counts(&mut snapshot));

        // Stale category reset to 0, missing one synthesized.
        assert_eq!(snapshot.categories[0]["count"], json!(0));
        let tech = snapshot
            .categories
            .iter()
            .find(|c| c["name"] == json!("Tech"))
            .expect("synthesized category");
        assert_eq!(tech["count"], json!(2));
        assert_eq!(tech["id"], json!("2"));

        let rust = snapshot
            .tags
            .iter()
            .find(|t| t["name"] == json!("rust"))
            .expect("synthesized tag");
        assert_eq!(rust["count"], json!(2));
    }

    #[test]
    fn count_sync_is_idempotent() {
        let mut snapshot = snapshot_with_articles(vec![
            json!({"id": "1", "category": "Tech", "tags": ["rust"]}),
        ]);
        assert!(sync_derived_counts(&mut snapshot));
        let after_first = snapshot.clone();
        assert!(!sync_derived_counts(&mut snapshot));
        assert_eq!(snapshot, after_first);
    }

    #[test]
    fn dashboard_counts_published_only() {
        let mut snapshot = snapshot_with_articles(vec![
            json!({"id": "1", "status": "published", "content": "四个字呀", "views": 10}),
            json!({"id": "2", "status": "draft", "content": "草稿草稿", "views": 5}),
        ]);
        snapshot.comments.push(json!({"id": "1", "content": "好"}));

        let stats = compute_dashboard_stats(&snapshot);
        assert_eq!(stats.total_articles, 1);
        assert_eq!(stats.total_comments, 1);
        // Views sum over all articles, words only over published ones.
        assert_eq!(stats.total_views, 15);
        assert_eq!(stats.total_words, 4);
        assert_eq!(stats.total_visitors, 0);
    }

    #[test]
    fn settings_overrides_win_when_nonzero() {
        let mut snapshot = snapshot_with_articles(vec![
            json!({"id": "1", "status": "published", "content": "正文", "views": 10}),
        ]);
        snapshot.settings = json!({
            "totalViews": 5432,
            "totalWords": 0,
            "totalVisitors": 1234,
            "startDate": "2025-01-01",
        });

        let stats = compute_dashboard_stats(&snapshot);
        assert_eq!(stats.total_views, 5432);
        assert_eq!(stats.total_words, 2);
        assert_eq!(stats.total_visitors, 1234);
        assert!(stats.running_days > 0);
    }

    #[test]
    fn stats_cache_round_trips_and_invalidates() {
        let cache = StatsCache::default();
        assert!(cache.get().is_none());

        let stats = compute_dashboard_stats(&BlogSnapshot::default());
        cache.put(stats.clone());
        assert_eq!(cache.get(), Some(stats));

        cache.invalidate();
        assert!(cache.get().is_none());
    }
}
