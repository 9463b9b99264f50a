//! `iv-cli` entry point.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Default to info-level logs; override via RUST_LOG if needed.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // File logging is opt-in; the guard must outlive all logging.
    let _guard = match std::env::var("INK_VAULT_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "iv-cli.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        },
        Err(_) => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        },
    };

    let cli = iv_cli::cli::Cli::parse();
    iv_cli::commands::run(cli).await
}
