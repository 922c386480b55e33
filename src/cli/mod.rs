pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{ItemId, SourceKind};
use crate::query::SortMode;

#[derive(Parser)]
#[command(name = "confluence")]
#[command(about = "Aggregated, cached news front page and discussions", long_about = None)]
pub struct Cli {
    /// Config file (default: ~/.config/confluence/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Number of requests in flight during a fan-out
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    /// Upstream source: item or search-index
    #[arg(short, long, global = true)]
    pub source: Option<SourceKind>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the current top stories
    Top {
        /// Sort order: points, date or rank
        #[arg(long, default_value_t = SortMode::Points)]
        sort: SortMode,

        /// Case-insensitive title filter
        #[arg(short, long, default_value = "")]
        filter: String,

        /// Show at most this many stories
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the discussion tree of a story
    Comments {
        /// Story id
        id: ItemId,

        /// Deepest reply level to expand (0 = top-level only)
        #[arg(short, long)]
        depth: Option<usize>,

        /// Maximum number of comments to resolve
        #[arg(long)]
        max_nodes: Option<usize>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the first few top-level comments of a story
    Preview {
        /// Story id
        id: ItemId,
    },
    /// Re-query the top stories periodically until interrupted
    Watch {
        /// Refresh interval (e.g., "30s", "1m", "5m")
        #[arg(short, long, default_value = "1m")]
        interval: String,

        /// Sort order: points, date or rank
        #[arg(long, default_value_t = SortMode::Points)]
        sort: SortMode,

        /// Case-insensitive title filter
        #[arg(short, long, default_value = "")]
        filter: String,
    },
}
