//! # Confluence
//!
//! An aggregation and caching layer over two news sources: a search index
//! and a per-item API.
//!
//! ## Architecture
//!
//! ```text
//! Fetcher → ParallelFetcher → Normalizer → AggregationCache → Query → CLI
//!                    ↘ TreeBuilder (comments) ↗
//! ```
//!
//! - [`fetcher`]: HTTP transport and bounded-concurrency fan-out
//! - [`normalizer`]: Converts both upstream shapes into one [`Item`](domain::Item)
//! - [`comments`]: Breadth-first comment tree construction
//! - [`cache`]: Keyed cache with pending/fresh/stale/failed entries
//! - [`aggregator`]: Request/response boundary tying the pieces together
//!
//! ## Quick Start
//!
//! ```bash
//! # Front page, most recent first, titles mentioning rust
//! confluence top --sort date --filter rust
//!
//! # Same listing from the search index
//! confluence --source search-index top
//!
//! # Discussion tree, two levels deep
//! confluence comments 8863 --depth 1
//!
//! # Re-query every 30 seconds
//! confluence watch --interval 30s
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// config, fetcher, fan-out, caches and aggregator.
pub mod app;

/// Aggregation entry points.
///
/// - [`Aggregator`](aggregator::Aggregator): top stories, comment trees, previews
/// - [`Listing`](aggregator::Listing): a sorted, filtered view with cache state
pub mod aggregator;

/// Keyed result cache with de-duplicated in-flight computations.
pub mod cache;

/// Command-line interface using clap.
///
/// - `top` - List the current top stories
/// - `comments <id>` - Show a discussion tree
/// - `preview <id>` - Show the first few comments
/// - `watch` - Re-query the listing on an interval
pub mod cli;

/// Breadth-first comment tree builder with depth and node limits.
pub mod comments;

/// Configuration management.
///
/// Loads from `~/.config/confluence/config.toml`, supporting:
/// - Upstream base URLs and default source
/// - Fan-out concurrency and timeouts
/// - Cache TTL and failure backoff
/// - Comment tree limits
pub mod config;

/// Core domain models.
///
/// - [`Item`](domain::Item): Canonical news submission
/// - [`CommentTree`](domain::CommentTree): Nested discussion
/// - [`RawRecord`](domain::RawRecord): Upstream records before normalization
pub mod domain;

/// HTTP fetching and fan-out.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for a single upstream request
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): Concurrent fetching with semaphore
pub mod fetcher;

/// Upstream record normalization.
pub mod normalizer;

/// Sorting and filtering of normalized items.
pub mod query;

/// Foreground refresh loop for `confluence watch`.
pub mod watch;
