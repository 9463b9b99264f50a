use anyhow::Result;
use ink_vault_shared::snapshot::format_size;

use crate::cli::StorageCommands;
use crate::commands::AppContext;
use crate::utils::print_table;

/// Storage subcommands.
pub fn run(ctx: &AppContext, command: StorageCommands) -> Result<()> {
    match command {
        StorageCommands::Report => report(ctx),
        StorageCommands::Cleanup { keep } => cleanup(ctx, keep),
    }
}

fn report(ctx: &AppContext) -> Result<()> {
    let report = ctx.store.storage_report()?;
    let rows: Vec<Vec<String>> = report
        .collections
        .iter()
        .map(|usage| {
            vec![
                usage.kind.to_string(),
                usage.records.to_string(),
                format_size(usage.bytes),
            ]
        })
        .collect();
    print_table(&["collection", "records", "size"], &rows);
    println!(
        "总计 {} / {} ({:.1}%)",
        format_size(report.used_bytes),
        format_size(report.quota_bytes),
        report.usage_percent
    );
    Ok(())
}

fn cleanup(ctx: &AppContext, keep: usize) -> Result<()> {
    let scrubbed = ctx.store.cleanup(keep)?;
    if scrubbed > 0 {
        println!("已移除 {scrubbed} 张内嵌图片（保留最新 {keep} 篇文章）");
    } else {
        println!("没有可清理的内嵌图片");
    }
    Ok(())
}
