use anyhow::Result;
use ink_vault_shared::BackendMode;

use crate::commands::AppContext;
use crate::utils::{print_json, print_table};

/// Show the resolved environment.
pub fn run(ctx: &AppContext, json: bool) -> Result<()> {
    if json {
        return print_json(&serde_json::to_value(&ctx.env)?);
    }

    let mode = match &ctx.env.mode {
        BackendMode::Remote { api_root } => format!("remote ({api_root})"),
        BackendMode::LocalCache => "local-cache".to_string(),
    };
    let features = &ctx.env.features;
    let rows = vec![
        vec!["target".to_string(), ctx.env.target.as_str().to_string()],
        vec!["mode".to_string(), mode],
        vec![
            "supports_write".to_string(),
            ctx.env.supports_write.to_string(),
        ],
        vec!["data_read".to_string(), features.data_read.to_string()],
        vec!["data_write".to_string(), features.data_write.to_string()],
        vec!["file_upload".to_string(), features.file_upload.to_string()],
        vec![
            "real_time_sync".to_string(),
            features.real_time_sync.to_string(),
        ],
    ];
    print_table(&["key", "value"], &rows);
    Ok(())
}
