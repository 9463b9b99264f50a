use anyhow::{Context as _, Result};
use ink_vault_shared::rbac::ActiveUser;
use ink_vault_shared::{AccountManager, ResourceKind, Role};
use serde_json::Value;

use crate::cli::UserCommands;
use crate::commands::AppContext;
use crate::utils::{print_json, print_table, read_payload};

/// Account subcommands, guarded by the acting user's role.
pub async fn run(ctx: &AppContext, actor: &str, command: UserCommands) -> Result<()> {
    let accounts = AccountManager::new(ctx.repo.clone());
    match command {
        UserCommands::Add { data } => {
            let payload = read_payload(&data)?;
            let user = accounts.add_user(&payload).await?;
            print_json(&redact(user))
        },
        UserCommands::Update { username, data } => {
            let actor = resolve_actor(ctx, actor).await?;
            let patch = read_payload(&data)?;
            match accounts.update_user(&actor, &username, &patch).await? {
                Some(user) => print_json(&redact(user)),
                None => {
                    println!("用户 {username} 不存在");
                    Ok(())
                },
            }
        },
        UserCommands::Delete { username, yes } => {
            anyhow::ensure!(yes, "删除操作需要 --yes 确认");
            let actor = resolve_actor(ctx, actor).await?;
            if accounts.delete_user(&actor, &username).await? {
                println!("已删除用户 {username}");
            } else {
                println!("用户 {username} 不存在");
            }
            Ok(())
        },
        UserCommands::Login { username, password } => {
            let outcome = accounts.validate_login(&username, &password).await?;
            println!("{}", outcome.message);
            if let Some(profile) = outcome.profile {
                print_json(&serde_json::to_value(&profile)?)?;
            }
            Ok(())
        },
        UserCommands::Passwd { username, password } => {
            match accounts.change_password(&username, &password).await? {
                Some(_) => println!("用户 {username} 密码已更新"),
                None => println!("用户 {username} 不存在"),
            }
            Ok(())
        },
        UserCommands::Stats => {
            let stats = accounts.user_stats().await?;
            let rows = vec![
                vec!["总数".to_string(), stats.total.to_string()],
                vec!["启用".to_string(), stats.active.to_string()],
                vec!["禁用".to_string(), stats.inactive.to_string()],
                vec!["管理员".to_string(), stats.admins.to_string()],
                vec!["编辑者".to_string(), stats.editors.to_string()],
            ];
            print_table(&["指标", "值"], &rows);
            Ok(())
        },
    }
}

/// Look the acting user up in the store so guards see its real role.
async fn resolve_actor(ctx: &AppContext, username: &str) -> Result<ActiveUser> {
    let users = ctx.repo.list(ResourceKind::Users, None).await?;
    let user = users
        .iter()
        .find(|u| u.get("username").and_then(Value::as_str) == Some(username))
        .with_context(|| format!("操作者 {username} 不存在，请先 init 或指定 --actor"))?;
    let role: Role = user
        .get("role")
        .and_then(Value::as_str)
        .unwrap_or("viewer")
        .parse()
        .map_err(|err| anyhow::anyhow!("{err}"))?;
    Ok(ActiveUser {
        username: username.to_string(),
        role,
    })
}

/// Strip the password before printing.
fn redact(mut user: Value) -> Value {
    if let Some(map) = user.as_object_mut() {
        map.remove("password");
    }
    user
}
