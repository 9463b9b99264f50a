use anyhow::Result;
use ink_vault_shared::BackendMode;

use crate::commands::AppContext;

/// Probe the remote backend.
pub async fn run(ctx: &AppContext) -> Result<()> {
    match &ctx.env.mode {
        BackendMode::LocalCache => {
            println!("local-cache 模式，无远程后端");
        },
        BackendMode::Remote { api_root } => {
            if ctx.repo.remote_healthy().await {
                println!("远程后端正常: {api_root}");
            } else {
                println!("远程后端不可用: {api_root}");
            }
        },
    }
    Ok(())
}
