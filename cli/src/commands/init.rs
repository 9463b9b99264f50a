use anyhow::Result;
use ink_vault_shared::seed;

use crate::commands::AppContext;

/// Seed the store with the default snapshot unless data already exists.
pub fn run(ctx: &AppContext) -> Result<()> {
    if seed::init_store(&ctx.store)? {
        println!("已写入默认数据（admin/admin123）");
    } else {
        println!("数据已存在，跳过初始化");
    }
    Ok(())
}
