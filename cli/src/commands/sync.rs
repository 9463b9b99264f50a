use anyhow::Result;
use ink_vault_shared::ResourceKind;

use crate::commands::AppContext;
use crate::utils::print_table;

fn selection(kinds: &[ResourceKind]) -> Option<&[ResourceKind]> {
    (!kinds.is_empty()).then_some(kinds)
}

/// Push local collections and settings to the remote.
pub async fn push(ctx: &AppContext, kinds: &[ResourceKind]) -> Result<()> {
    let report = ctx.repo.push(selection(kinds)).await?;
    if report.skipped {
        println!("远程后端不可用，跳过同步");
        return Ok(());
    }

    let mut rows = Vec::with_capacity(report.outcomes.len() + 1);
    rows.push(vec![
        "settings".to_string(),
        report
            .settings_error
            .clone()
            .unwrap_or_else(|| "ok".to_string()),
    ]);
    for outcome in &report.outcomes {
        rows.push(vec![
            outcome.kind.to_string(),
            outcome.error.clone().unwrap_or_else(|| "ok".to_string()),
        ]);
    }
    print_table(&["collection", "result"], &rows);
    if !report.is_clean() {
        anyhow::bail!("部分集合同步失败");
    }
    Ok(())
}

/// Replace local collections and settings with the remote's copies.
pub async fn pull(ctx: &AppContext, kinds: &[ResourceKind]) -> Result<()> {
    ctx.repo.pull(selection(kinds)).await?;
    println!("已从远程拉取数据");
    Ok(())
}
