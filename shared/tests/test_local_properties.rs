//! Local-mode repository behavior: count consistency across CRUD
//! sequences, dashboard stats, and on-disk persistence.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use ink_vault_shared::{BackendMode, Repository, ResourceKind, SnapshotStore};
    use serde_json::{json, Value};

    fn repo() -> Repository {
        let store = Arc::new(SnapshotStore::open_in_memory().expect("in-memory store"));
        Repository::new(BackendMode::LocalCache, store)
    }

    /// Actual occurrence counts across articles for one field extractor.
    fn occurrences(articles: &[Value], f: impl Fn(&Value) -> Vec<String>) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for article in articles {
            for name in f(article) {
                *counts.entry(name).or_insert(0) += 1;
            }
        }
        counts
    }

    async fn assert_counts_consistent(repo: &Repository) {
        let articles = repo.list(ResourceKind::Articles, None).await.expect("articles");
        let category_counts = occurrences(&articles, |a| {
            a.get("category")
                .and_then(Value::as_str)
                .map(|c| vec![c.to_string()])
                .unwrap_or_default()
        });
        let tag_counts = occurrences(&articles, |a| {
            a.get("tags")
                .and_then(Value::as_array)
                .map(|tags| {
                    tags.iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        });

        for category in repo
            .list(ResourceKind::Categories, None)
            .await
            .expect("categories")
        {
            let name = category["name"].as_str().expect("name").to_string();
            let expected = category_counts.get(&name).copied().unwrap_or(0);
            assert_eq!(
                category["count"].as_u64(),
                Some(expected),
                "category {name} count drifted"
            );
        }
        for tag in repo.list(ResourceKind::Tags, None).await.expect("tags") {
            let name = tag["name"].as_str().expect("name").to_string();
            let expected = tag_counts.get(&name).copied().unwrap_or(0);
            assert_eq!(
                tag["count"].as_u64(),
                Some(expected),
                "tag {name} count drifted"
            );
        }
    }

    #[tokio::test]
    async fn counts_stay_consistent_through_crud_sequence() {
        let repo = repo();

        // Pre-existing category with a stale count.
        repo.add(ResourceKind::Categories, &json!({"name": "Life", "count": 99}))
            .await
            .expect("add category");

        let first = repo
            .add(
                ResourceKind::Articles,
                &json!({
                    "title": "一",
                    "content": "正文",
                    "category": "Tech",
                    "tags": ["rust", "wasm"],
                }),
            )
            .await
            .expect("add");
        repo.add(
            ResourceKind::Articles,
            &json!({
                "title": "二",
                "content": "正文",
                "category": "Tech",
                "tags": ["rust"],
            }),
        )
        .await
        .expect("add");
        assert_counts_consistent(&repo).await;

        // Re-categorize the first article.
        let id = first["id"].as_str().expect("id").to_string();
        repo.update(
            ResourceKind::Articles,
            &id,
            &json!({"category": "Life", "tags": ["wasm"]}),
        )
        .await
        .expect("update")
        .expect("present");
        assert_counts_consistent(&repo).await;

        // Delete the second article; Tech and rust drop to zero.
        assert!(repo
            .delete(ResourceKind::Articles, "2")
            .await
            .expect("delete"));
        assert_counts_consistent(&repo).await;

        let categories = repo
            .list(ResourceKind::Categories, None)
            .await
            .expect("categories");
        let tech = categories
            .iter()
            .find(|c| c["name"] == json!("Tech"))
            .expect("tech kept");
        assert_eq!(tech["count"], json!(0));
    }

    #[tokio::test]
    async fn recount_is_idempotent_through_repository() {
        let repo = repo();
        repo.add(
            ResourceKind::Articles,
            &json!({"title": "一", "content": "正文", "category": "Tech", "tags": ["rust"]}),
        )
        .await
        .expect("add");

        // The article mutation already synced; a manual pass finds nothing.
        assert!(!repo.sync_counts().expect("sync"));
        assert_counts_consistent(&repo).await;
    }

    #[tokio::test]
    async fn status_filter_is_exact_match() {
        let repo = repo();
        repo.add(
            ResourceKind::Articles,
            &json!({"title": "一", "content": "正文", "status": "published"}),
        )
        .await
        .expect("add");
        repo.add(ResourceKind::Articles, &json!({"title": "二", "content": "正文"}))
            .await
            .expect("add");

        let published = repo
            .list(ResourceKind::Articles, Some("published"))
            .await
            .expect("list");
        assert_eq!(published.len(), 1);
        let drafts = repo
            .list(ResourceKind::Articles, Some("draft"))
            .await
            .expect("list");
        assert_eq!(drafts.len(), 1);
    }

    #[tokio::test]
    async fn dashboard_stats_reflect_local_data() {
        let repo = repo();
        repo.save_settings(&json!({"startDate": "2025-01-01"}))
            .await
            .expect("settings");
        repo.add(
            ResourceKind::Articles,
            &json!({"title": "一", "content": "四字正文", "status": "published", "views": 3}),
        )
        .await
        .expect("add");
        repo.add(ResourceKind::Comments, &json!({"content": "好文"}))
            .await
            .expect("add");

        let stats = repo.dashboard_stats().await.expect("stats");
        assert_eq!(stats.total_articles, 1);
        assert_eq!(stats.total_comments, 1);
        assert_eq!(stats.total_views, 3);
        assert_eq!(stats.total_words, 4);
        assert!(stats.running_days > 0);
    }

    #[tokio::test]
    async fn data_survives_store_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("inkvault.db");

        {
            let store = Arc::new(SnapshotStore::open(&path).expect("open"));
            let repo = Repository::new(BackendMode::LocalCache, store);
            repo.add(ResourceKind::Articles, &json!({"title": "一", "content": "正文"}))
                .await
                .expect("add");
        }

        let store = Arc::new(SnapshotStore::open(&path).expect("reopen"));
        let repo = Repository::new(BackendMode::LocalCache, store);
        let article = repo
            .get_by_id(ResourceKind::Articles, "1")
            .await
            .expect("get")
            .expect("persisted");
        assert_eq!(article["title"], json!("一"));
    }

    #[tokio::test]
    async fn increment_views_persists() {
        let repo = repo();
        let article = repo
            .add(ResourceKind::Articles, &json!({"title": "一", "content": "正文"}))
            .await
            .expect("add");
        let id = article["id"].as_str().expect("id").to_string();

        repo.increment_views(&id).await.expect("bump").expect("present");
        repo.increment_views(&id).await.expect("bump").expect("present");
        let article = repo
            .get_by_id(ResourceKind::Articles, &id)
            .await
            .expect("get")
            .expect("present");
        assert_eq!(article["views"], json!(2));
    }
}
