//! Foreground refresh loop over the top-stories listing.
//!
//! Each round goes through the aggregation cache, so the printed state shows
//! the listing moving from fresh to stale and back as the TTL expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::time::{interval, MissedTickBehavior};

use crate::app::{AppContext, Result};
use crate::cli::commands::{format_item, listing_summary, warn_refresh_error};
use crate::config::interval::format_interval;
use crate::domain::SourceKind;
use crate::query::SortMode;

/// Stories printed per round.
const WATCH_ROWS: usize = 10;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub interval: Duration,
    pub source: SourceKind,
    pub sort: SortMode,
    pub filter: String,
}

pub struct Watcher {
    ctx: Arc<AppContext>,
    config: WatchConfig,
}

impl Watcher {
    pub fn new(ctx: Arc<AppContext>, config: WatchConfig) -> Self {
        Self { ctx, config }
    }

    /// Run until Ctrl-C.
    pub async fn run(&self) -> Result<()> {
        println!(
            "Watching {} top stories every {} (Ctrl-C to stop)",
            self.config.source,
            format_interval(self.config.interval)
        );

        let mut timer = interval(self.config.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = timer.tick() => self.run_round().await,
            }
        }

        tracing::info!("Watch stopped");
        Ok(())
    }

    async fn run_round(&self) {
        let start = std::time::Instant::now();
        let result = self
            .ctx
            .aggregator
            .top_stories(self.config.source, self.config.sort, &self.config.filter)
            .await;

        println!("[{}]", Local::now().format("%Y-%m-%d %H:%M:%S"));
        match result {
            Ok(listing) => {
                for (rank, item) in listing.items.iter().take(WATCH_ROWS).enumerate() {
                    println!("{}", format_item(rank + 1, item));
                }
                println!("{}", listing_summary(&listing, self.config.source));
                warn_refresh_error(&listing);
                tracing::debug!(
                    "Watch round served {} listing in {:.1}s",
                    listing.state,
                    start.elapsed().as_secs_f64()
                );
            }
            Err(e) => {
                eprintln!("Error loading top stories: {}", e);
            }
        }
        println!();
    }
}
