mod collect;
mod store;

use anyhow::Context;
use clap::{Parser, Subcommand};
use roastdb_core::YamlConfigProvider;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "roastdb-cli")]
#[command(about = "Storefront price collection for specialty coffee roasters")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Probe each source with a single-item catalog request
    Check {
        /// Restrict to one source (by id)
        #[arg(long)]
        source: Option<String>,
    },
    /// Report WooCommerce catalog sizes without paging through them
    Count {
        /// Restrict to one source (by id)
        #[arg(long)]
        source: Option<String>,
    },
    /// Fetch current prices, reconcile against stored state and record changes
    Collect {
        /// Restrict collection to one source (by id)
        #[arg(long)]
        source: Option<String>,

        /// Report deltas without writing state or archiving payloads
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = roastdb_core::load_app_config()?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let provider = YamlConfigProvider::from_path(&config.sources_path).with_context(|| {
        format!(
            "failed to load sources registry {}",
            config.sources_path.display()
        )
    })?;

    match cli.command {
        Commands::Check { source } => {
            collect::run_check(&config, &provider, source.as_deref()).await
        }
        Commands::Count { source } => {
            collect::run_count(&config, &provider, source.as_deref()).await
        }
        Commands::Collect { source, dry_run } => {
            collect::run_collect(&config, &provider, source.as_deref(), dry_run).await
        }
    }
}
