use anyhow::Result;

use crate::cli::SettingsCommands;
use crate::commands::AppContext;
use crate::utils::{print_json, read_payload};

/// Settings subcommands.
pub async fn run(ctx: &AppContext, command: SettingsCommands) -> Result<()> {
    match command {
        SettingsCommands::Get => {
            let settings = ctx.repo.settings().await?;
            print_json(&settings)
        },
        SettingsCommands::Set { data, merge } => {
            let payload = read_payload(&data)?;
            if merge {
                let merged = ctx.repo.update_settings(&payload).await?;
                print_json(&merged)
            } else {
                ctx.repo.save_settings(&payload).await?;
                print_json(&payload)
            }
        },
    }
}
