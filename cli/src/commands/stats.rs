use anyhow::Result;

use crate::commands::AppContext;
use crate::utils::{print_json, print_table};

/// Show the dashboard summary.
pub async fn run(ctx: &AppContext, json: bool) -> Result<()> {
    let stats = ctx.repo.dashboard_stats().await?;
    if json {
        return print_json(&serde_json::to_value(&stats)?);
    }

    let rows = vec![
        vec!["发布文章".to_string(), stats.total_articles.to_string()],
        vec!["评论".to_string(), stats.total_comments.to_string()],
        vec!["浏览量".to_string(), stats.total_views.to_string()],
        vec!["访客".to_string(), stats.total_visitors.to_string()],
        vec!["总字数".to_string(), stats.total_words.to_string()],
        vec!["运行天数".to_string(), stats.running_days.to_string()],
    ];
    print_table(&["指标", "值"], &rows);
    Ok(())
}

/// Recompute category/tag counts from article occurrences.
pub fn sync_counts(ctx: &AppContext) -> Result<()> {
    if ctx.repo.sync_counts()? {
        println!("分类/标签计数已更新");
    } else {
        println!("计数已是最新");
    }
    Ok(())
}
