use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use confluence::app::AppContext;
use confluence::cli::{commands, Cli, Commands};
use confluence::config::interval::parse_interval;
use confluence::config::Config;
use confluence::watch::{WatchConfig, Watcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(workers) = cli.workers {
        config.fetcher.concurrency = workers.max(1);
    }
    let source = cli.source.unwrap_or(config.sources.default);

    let ctx = AppContext::new(config)?;

    match cli.command {
        Commands::Top {
            sort,
            filter,
            limit,
            json,
        } => {
            commands::top_stories(&ctx, source, sort, &filter, limit, json).await?;
        }
        Commands::Comments {
            id,
            depth,
            max_nodes,
            json,
        } => {
            commands::comments(&ctx, &id, depth, max_nodes, json).await?;
        }
        Commands::Preview { id } => {
            commands::preview(&ctx, &id).await?;
        }
        Commands::Watch {
            interval,
            sort,
            filter,
        } => {
            let interval = parse_interval(&interval).map_err(anyhow::Error::msg)?;
            anyhow::ensure!(!interval.is_zero(), "Watch interval must be positive");
            let watcher = Watcher::new(
                Arc::new(ctx),
                WatchConfig {
                    interval,
                    source,
                    sort,
                    filter: filter.trim().to_string(),
                },
            );
            watcher.run().await?;
        }
    }

    Ok(())
}
