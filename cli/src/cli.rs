//! Command-line definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ink_vault_shared::ResourceKind;

/// InkVault operator CLI.
#[derive(Parser)]
#[command(name = "iv-cli", version, about = "InkVault blog data layer CLI")]
pub struct Cli {
    /// Snapshot database path (defaults to $INK_VAULT_DB or
    /// ./data/inkvault.db).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Deploy target override (vercel/local/github-pages/static); wins over
    /// $INK_VAULT_ENV.
    #[arg(long, global = true)]
    pub env: Option<String>,

    /// Remote API root override; wins over $INK_VAULT_API_ROOT.
    #[arg(long, global = true)]
    pub api_root: Option<String>,

    /// Top-level command.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Seed the snapshot store with default data (no-op when data exists).
    Init,
    /// Show the resolved environment (target, mode, features).
    Env {
        /// Print as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Probe the remote backend's /health endpoint.
    Health,
    /// List a collection.
    List {
        /// Collection name (articles/categories/tags/comments/guestbook/
        /// images/music/videos/links/users).
        kind: ResourceKind,
        /// Filter by exact status (e.g. published, pending, active).
        #[arg(long)]
        status: Option<String>,
        /// Print full JSON records instead of the summary table.
        #[arg(long)]
        json: bool,
    },
    /// Fetch one record by id.
    Get {
        /// Collection name.
        kind: ResourceKind,
        /// Record id.
        id: String,
    },
    /// Create a record from a JSON payload.
    Create {
        /// Collection name.
        kind: ResourceKind,
        /// Inline JSON object, @file, or `-` for stdin.
        #[arg(long)]
        data: String,
    },
    /// Shallow-merge a JSON patch into a record.
    Update {
        /// Collection name.
        kind: ResourceKind,
        /// Record id.
        id: String,
        /// Inline JSON object, @file, or `-` for stdin.
        #[arg(long)]
        data: String,
    },
    /// Delete a record by id (requires --yes).
    Delete {
        /// Collection name.
        kind: ResourceKind,
        /// Record id.
        id: String,
        /// Confirm destructive operation.
        #[arg(long)]
        yes: bool,
    },
    /// Settings singleton operations.
    Settings {
        /// Settings subcommand.
        #[command(subcommand)]
        command: SettingsCommands,
    },
    /// Show the dashboard summary.
    Stats {
        /// Print as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Recompute category/tag counts from article occurrences.
    SyncCounts,
    /// Push local collections and settings to the remote backend.
    Push {
        /// Comma-separated collections (defaults to all).
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<ResourceKind>,
    },
    /// Replace local collections and settings with the remote's copies.
    Pull {
        /// Comma-separated collections (defaults to all).
        #[arg(long, value_delimiter = ',')]
        kinds: Vec<ResourceKind>,
    },
    /// Snapshot storage operations.
    Storage {
        /// Storage subcommand.
        #[command(subcommand)]
        command: StorageCommands,
    },
    /// Account management with the user-layer guards.
    User {
        /// Acting username for guarded operations (looked up in the store).
        #[arg(long, global = true, default_value = "admin")]
        actor: String,
        /// User subcommand.
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Permission matrix queries.
    Perm {
        /// Permission subcommand.
        #[command(subcommand)]
        command: PermCommands,
    },
}

/// `settings` subcommands.
#[derive(Subcommand)]
pub enum SettingsCommands {
    /// Print the settings object.
    Get,
    /// Replace (or with --merge, patch) the settings object.
    Set {
        /// Inline JSON object, @file, or `-` for stdin.
        #[arg(long)]
        data: String,
        /// Merge into the current settings instead of replacing them.
        #[arg(long)]
        merge: bool,
    },
}

/// `storage` subcommands.
#[derive(Subcommand)]
pub enum StorageCommands {
    /// Show snapshot usage against the quota, per collection.
    Report,
    /// Scrub embedded base64 images from all but the newest articles.
    Cleanup {
        /// How many newest articles keep their embedded images.
        #[arg(long, default_value_t = 1)]
        keep: usize,
    },
}

/// `user` subcommands.
#[derive(Subcommand)]
pub enum UserCommands {
    /// Add an account.
    Add {
        /// Inline JSON object, @file, or `-` for stdin
        /// (username/password required).
        #[arg(long)]
        data: String,
    },
    /// Update an account (username immutable; role changes are guarded).
    Update {
        /// Target username.
        username: String,
        /// Inline JSON object, @file, or `-` for stdin.
        #[arg(long)]
        data: String,
    },
    /// Delete an account (requires --yes).
    Delete {
        /// Target username.
        username: String,
        /// Confirm destructive operation.
        #[arg(long)]
        yes: bool,
    },
    /// Check credentials without issuing a session.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// Change an account's password.
    Passwd {
        /// Target username.
        username: String,
        /// New password (at least 6 characters).
        password: String,
    },
    /// Show aggregate account counts.
    Stats,
}

/// `perm` subcommands.
#[derive(Subcommand)]
pub enum PermCommands {
    /// Check whether a role holds a `module.action` permission.
    Check {
        /// Role (super_admin/admin/editor/viewer).
        role: String,
        /// Permission in `module.action` form.
        permission: String,
    },
    /// List every permission a role holds.
    List {
        /// Role (super_admin/admin/editor/viewer).
        role: String,
    },
    /// Print the full module × action matrix.
    Matrix,
}
