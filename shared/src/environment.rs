//! Deployment environment resolution.
//!
//! The data layer serves two very different deployments from one codebase:
//! hosted instances that talk to an HTTP API, and static deployments that
//! only have the local snapshot. This module classifies the deployment once
//! per process and every other component consumes the resolved value instead
//! of re-sniffing the environment.

use std::env;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Environment variable naming the deploy target explicitly.
pub const ENV_TARGET: &str = "INK_VAULT_ENV";
/// Environment variable carrying the deployment host identity.
pub const ENV_HOST: &str = "INK_VAULT_HOST";
/// Environment variable overriding the remote API root.
pub const ENV_API_ROOT: &str = "INK_VAULT_API_ROOT";
/// Environment variable forcing the local-server remote target.
pub const ENV_FORCE_REMOTE: &str = "INK_VAULT_FORCE_REMOTE";

/// Host suffixes that identify a Vercel-style hosted deployment.
const VERCEL_HOST_SUFFIXES: &[&str] = &["vercel.app", "vercel.com", "web3v.vip", "slxhdjy.top"];

static RESOLVED: OnceCell<EnvironmentInfo> = OnceCell::new();

/// Classified deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeployTarget {
    /// Hosted on Vercel (or one of the custom domains fronting it).
    Vercel,
    /// Local development against the companion API server.
    Local,
    /// GitHub Pages static hosting, read-only remote.
    GithubPages,
    /// Any other static deployment; no remote backend at all.
    Static,
}

impl DeployTarget {
    /// Stable string form, matching the explicit override values.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployTarget::Vercel => "vercel",
            DeployTarget::Local => "local",
            DeployTarget::GithubPages => "github-pages",
            DeployTarget::Static => "static",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vercel" => Some(DeployTarget::Vercel),
            "local" => Some(DeployTarget::Local),
            "github-pages" | "github_pages" => Some(DeployTarget::GithubPages),
            "static" => Some(DeployTarget::Static),
            _ => None,
        }
    }
}

/// Resolved transport choice for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BackendMode {
    /// Talk to the remote HTTP API under `api_root`, falling back to the
    /// local snapshot on failure.
    Remote {
        /// Base URL of the remote API, without a trailing slash.
        api_root: String,
    },
    /// Only the local snapshot store is consulted.
    LocalCache,
}

impl BackendMode {
    /// Whether this mode attempts remote calls.
    pub fn is_remote(&self) -> bool {
        matches!(self, BackendMode::Remote { .. })
    }
}

/// Feature availability reported alongside the resolved mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    /// Reads are always available.
    pub data_read: bool,
    /// Writes are available on write-capable targets.
    pub data_write: bool,
    /// File upload piggybacks on write capability.
    pub file_upload: bool,
    /// Real-time sync only exists when a remote backend exists.
    pub real_time_sync: bool,
}

/// Full resolution output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    /// Classified deploy target.
    pub target: DeployTarget,
    /// Transport the repository should use.
    pub mode: BackendMode,
    /// Whether the target historically accepted writes.
    pub supports_write: bool,
    /// Per-feature availability.
    pub features: FeatureMatrix,
}

/// Resolve the process environment once and cache the result.
///
/// Idempotent and side-effect-free; later env var changes are ignored for
/// the lifetime of the process.
pub fn resolve() -> &'static EnvironmentInfo {
    RESOLVED.get_or_init(|| {
        let info = resolve_from_parts(
            env::var(ENV_TARGET).ok().as_deref(),
            env::var(ENV_HOST).ok().as_deref(),
            env::var(ENV_FORCE_REMOTE)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            env::var(ENV_API_ROOT).ok().as_deref(),
        );
        tracing::info!(
            target_env = info.target.as_str(),
            remote = info.mode.is_remote(),
            "environment resolved"
        );
        info
    })
}

/// Pure resolution from explicit inputs, in override order:
/// explicit target, host identity, force-remote flag, `Static` default.
pub fn resolve_from_parts(
    explicit_target: Option<&str>,
    host: Option<&str>,
    force_remote: bool,
    api_root_override: Option<&str>,
) -> EnvironmentInfo {
    let target = explicit_target
        .and_then(DeployTarget::parse)
        .or_else(|| host.and_then(known_host_target))
        .or_else(|| force_remote.then_some(DeployTarget::Local))
        .unwrap_or(DeployTarget::Static);

    let mode = match target {
        DeployTarget::Vercel => BackendMode::Remote {
            api_root: api_root_override.unwrap_or("/api").to_string(),
        },
        DeployTarget::Local => BackendMode::Remote {
            api_root: api_root_override
                .unwrap_or("http://localhost:3001/api")
                .to_string(),
        },
        DeployTarget::GithubPages | DeployTarget::Static => BackendMode::LocalCache,
    };

    let supports_write = matches!(target, DeployTarget::Vercel | DeployTarget::Local);
    EnvironmentInfo {
        target,
        supports_write,
        features: FeatureMatrix {
            data_read: true,
            data_write: supports_write,
            file_upload: supports_write,
            real_time_sync: mode.is_remote(),
        },
        mode,
    }
}

/// `classify_host` for the resolution chain: the `Static` catch-all means
/// no known pattern matched, which must not preempt the force-remote flag.
fn known_host_target(host: &str) -> Option<DeployTarget> {
    match classify_host(host) {
        DeployTarget::Static => None,
        target => Some(target),
    }
}

/// Classify a host identity into a deploy target.
pub fn classify_host(host: &str) -> DeployTarget {
    let host = host.trim().to_ascii_lowercase();
    if VERCEL_HOST_SUFFIXES
        .iter()
        .any(|suffix| host.ends_with(suffix))
    {
        return DeployTarget::Vercel;
    }
    if host.ends_with("github.io") {
        return DeployTarget::GithubPages;
    }
    if host == "localhost" || host == "127.0.0.1" {
        return DeployTarget::Local;
    }
    DeployTarget::Static
}
