//! Subcommand implementations and dispatch.

/// Resolved-environment display.
pub mod env;
/// Remote backend health probe.
pub mod health;
/// Seed initialization.
pub mod init;
/// Permission matrix queries.
pub mod perm;
/// Uniform CRUD over the collections.
pub mod resources;
/// Settings singleton operations.
pub mod settings;
/// Dashboard summary and count sync.
pub mod stats;
/// Snapshot storage report and cleanup.
pub mod storage;
/// Remote push and pull.
pub mod sync;
/// Guarded account management.
pub mod user;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use ink_vault_shared::environment::{self, EnvironmentInfo};
use ink_vault_shared::{Repository, SnapshotStore};

use crate::cli::{Cli, Commands};

/// Environment variable naming the snapshot database path.
pub const ENV_DB: &str = "INK_VAULT_DB";

const DEFAULT_DB_PATH: &str = "./data/inkvault.db";

/// Handles every command operates on.
pub struct AppContext {
    /// Resolved deployment environment.
    pub env: EnvironmentInfo,
    /// Snapshot store.
    pub store: Arc<SnapshotStore>,
    /// Repository over the resolved mode.
    pub repo: Arc<Repository>,
}

/// Resolve the environment and open the snapshot store.
pub fn open_context(cli: &Cli) -> Result<AppContext> {
    let explicit = cli
        .env
        .clone()
        .or_else(|| std::env::var(environment::ENV_TARGET).ok());
    let host = std::env::var(environment::ENV_HOST).ok();
    let force_remote = std::env::var(environment::ENV_FORCE_REMOTE)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let api_root = cli
        .api_root
        .clone()
        .or_else(|| std::env::var(environment::ENV_API_ROOT).ok());
    let env = environment::resolve_from_parts(
        explicit.as_deref(),
        host.as_deref(),
        force_remote,
        api_root.as_deref(),
    );

    let path = cli
        .db
        .clone()
        .or_else(|| std::env::var(ENV_DB).ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let store = Arc::new(
        SnapshotStore::open(&path)
            .with_context(|| format!("failed to open snapshot store at {}", path.display()))?,
    );
    tracing::debug!(target_env = env.target.as_str(), db = %path.display(), "context opened");
    let repo = Arc::new(Repository::from_environment(&env, store.clone()));
    Ok(AppContext { env, store, repo })
}

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> Result<()> {
    let ctx = open_context(&cli)?;
    match cli.command {
        Commands::Init => init::run(&ctx),
        Commands::Env { json } => env::run(&ctx, json),
        Commands::Health => health::run(&ctx).await,
        Commands::List { kind, status, json } => {
            resources::list(&ctx, kind, status.as_deref(), json).await
        },
        Commands::Get { kind, id } => resources::get(&ctx, kind, &id).await,
        Commands::Create { kind, data } => resources::create(&ctx, kind, &data).await,
        Commands::Update { kind, id, data } => resources::update(&ctx, kind, &id, &data).await,
        Commands::Delete { kind, id, yes } => resources::delete(&ctx, kind, &id, yes).await,
        Commands::Settings { command } => settings::run(&ctx, command).await,
        Commands::Stats { json } => stats::run(&ctx, json).await,
        Commands::SyncCounts => stats::sync_counts(&ctx),
        Commands::Push { kinds } => sync::push(&ctx, &kinds).await,
        Commands::Pull { kinds } => sync::pull(&ctx, &kinds).await,
        Commands::Storage { command } => storage::run(&ctx, command),
        Commands::User { actor, command } => user::run(&ctx, &actor, command).await,
        Commands::Perm { command } => perm::run(command),
    }
}
