use anyhow::Result;
use ink_vault_shared::rbac::{self, Action, Module, Permission, Role};

use crate::cli::PermCommands;
use crate::utils::print_table;

/// Permission matrix subcommands. These are pure matrix queries; no store
/// access is involved.
pub fn run(command: PermCommands) -> Result<()> {
    match command {
        PermCommands::Check { role, permission } => {
            let role: Role = role.parse().map_err(|err| anyhow::anyhow!("{err}"))?;
            let permission: Permission =
                permission.parse().map_err(|err| anyhow::anyhow!("{err}"))?;
            let allowed = rbac::allowed_roles(permission.module, permission.action)
                .map(|roles| roles.contains(&role))
                .unwrap_or(false);
            println!(
                "{} ({}) {} {permission}",
                role.display_name(),
                role,
                if allowed { "允许" } else { "拒绝" }
            );
            Ok(())
        },
        PermCommands::List { role } => {
            let role: Role = role.parse().map_err(|err| anyhow::anyhow!("{err}"))?;
            println!(
                "{} ({}): {}",
                role.display_name(),
                role,
                role.level_description()
            );
            for permission in rbac::permissions_for(role) {
                println!("  {permission}");
            }
            Ok(())
        },
        PermCommands::Matrix => {
            let headers: Vec<&str> = std::iter::once("module.action")
                .chain(Role::ALL.iter().map(|r| r.as_str()))
                .collect();
            let mut rows = Vec::new();
            for module in Module::ALL {
                for action in Action::ALL {
                    let Some(roles) = rbac::allowed_roles(module, action) else {
                        continue;
                    };
                    let mut row = vec![Permission::new(module, action).to_string()];
                    for role in Role::ALL {
                        row.push(if roles.contains(&role) { "✓" } else { "·" }.to_string());
                    }
                    rows.push(row);
                }
            }
            print_table(&headers, &rows);
            Ok(())
        },
    }
}
