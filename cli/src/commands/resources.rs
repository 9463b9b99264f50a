use anyhow::Result;
use ink_vault_shared::ResourceKind;
use serde_json::Value;

use crate::commands::AppContext;
use crate::utils::{display_cell, print_json, print_table, read_payload};

/// Summary columns per kind for the table view.
fn summary_fields(kind: ResourceKind) -> &'static [&'static str] {
    match kind {
        ResourceKind::Articles => &["id", "title", "category", "status", "views", "publishDate"],
        ResourceKind::Categories | ResourceKind::Tags => &["id", "name", "count"],
        ResourceKind::Comments => &["id", "articleId", "author", "status", "likes"],
        ResourceKind::Guestbook => &["id", "author", "content", "likes", "isTop"],
        ResourceKind::Images => &["id", "filename", "url"],
        ResourceKind::Music => &["id", "title", "artist"],
        ResourceKind::Videos => &["id", "title", "url"],
        ResourceKind::Links => &["id", "name", "url", "category", "status"],
        ResourceKind::Users => &["id", "username", "role", "status", "displayName"],
    }
}

/// List a collection.
pub async fn list(
    ctx: &AppContext,
    kind: ResourceKind,
    status: Option<&str>,
    json: bool,
) -> Result<()> {
    let records = ctx.repo.list(kind, status).await?;
    if json {
        return print_json(&Value::Array(records));
    }

    let fields = summary_fields(kind);
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| fields.iter().map(|f| display_cell(record, f)).collect())
        .collect();
    print_table(fields, &rows);
    println!("{} 条记录", records.len());
    Ok(())
}

/// Fetch one record.
pub async fn get(ctx: &AppContext, kind: ResourceKind, id: &str) -> Result<()> {
    match ctx.repo.get_by_id(kind, id).await? {
        Some(record) => print_json(&record),
        None => {
            println!("{kind} 中没有 id 为 {id} 的记录");
            Ok(())
        },
    }
}

/// Create a record from `--data`.
pub async fn create(ctx: &AppContext, kind: ResourceKind, data: &str) -> Result<()> {
    let payload = read_payload(data)?;
    let record = ctx.repo.add(kind, &payload).await?;
    print_json(&record)
}

/// Patch a record from `--data`.
pub async fn update(ctx: &AppContext, kind: ResourceKind, id: &str, data: &str) -> Result<()> {
    let patch = read_payload(data)?;
    match ctx.repo.update(kind, id, &patch).await? {
        Some(record) => print_json(&record),
        None => {
            println!("{kind} 中没有 id 为 {id} 的记录");
            Ok(())
        },
    }
}

/// Delete a record; refuses without `--yes`.
pub async fn delete(ctx: &AppContext, kind: ResourceKind, id: &str, yes: bool) -> Result<()> {
    anyhow::ensure!(yes, "删除操作需要 --yes 确认");
    if ctx.repo.delete(kind, id).await? {
        println!("已删除 {kind}/{id}");
    } else {
        println!("{kind} 中没有 id 为 {id} 的记录");
    }
    Ok(())
}
