use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use snapvault::config::LoggingConfig;
use snapvault::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "snapvault")]
#[command(about = "Snapvault - encrypted database snapshots with remote retention")]
#[command(version)]
struct Cli {
    /// Configuration file path (default: ~/.snapvault/snapvault.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Snapshot passphrase; falls back to the remembered one
    #[arg(long, global = true, env = "SNAPVAULT_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Export, upload and commit a new snapshot
    Backup {
        /// Back up even when scheduled backups are disabled
        #[arg(long)]
        force: bool,
    },

    /// Let `backup` run without --force
    Enable,

    /// Make `backup` a no-op unless --force is given
    Disable,

    /// Replace the local database with the newest remote snapshot
    Restore,

    /// Show the snapshot a restore would use
    Latest,

    /// List remote and local snapshots
    List,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    if let Commands::InitConfig { force } = cli.command {
        return commands::run_init_config(&config_path, force);
    }

    let config = Config::load_or_create(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;
    init_tracing(&config.logging);
    config.ensure_dirs().context("Failed to create data directories")?;

    tracing::debug!("Config file: {}", config_path.display());

    let ctx = commands::CommandContext::new(config, cli.passphrase)?;

    match cli.command {
        Commands::Backup { force } => commands::run_backup(&ctx, force).await,
        Commands::Restore => commands::run_restore(&ctx).await,
        Commands::Latest => commands::run_latest(&ctx).await,
        Commands::List => commands::run_list(&ctx).await,
        Commands::Enable => commands::run_set_enabled(&ctx, true),
        Commands::Disable => commands::run_set_enabled(&ctx, false),
        Commands::InitConfig { .. } => Ok(()),
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| logging.level.clone()),
    );

    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
