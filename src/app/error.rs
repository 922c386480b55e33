use std::sync::Arc;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::config::ConfigError;

/// Failure of a single transport call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request for {resource} timed out")]
    Timeout { resource: String },

    #[error("HTTP {status} for {resource}")]
    Status { resource: String, status: u16 },

    #[error("Transport error for {resource}: {message}")]
    Transport { resource: String, message: String },

    #[error("Undecodable body for {resource}: {message}")]
    Body { resource: String, message: String },

    #[error("Invalid URL for {resource}: {message}")]
    InvalidUrl { resource: String, message: String },
}

/// An upstream record that cannot be turned into a canonical item.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Upstream returned an empty record")]
    Empty,

    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Malformed record: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported source kind: {0}")]
pub struct UnsupportedSourceError(pub String);

/// Outcome of one slot in a fan-out batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Fetch task aborted: {0}")]
    Aborted(String),
}

impl Serialize for FetchError {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Every request of a batch failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("All {failed} upstream requests failed (first cause: {})", first_cause(.causes))]
pub struct AggregationError {
    pub failed: usize,
    /// The first few underlying causes, in batch order.
    pub causes: Vec<FetchError>,
}

pub const MAX_SAMPLED_CAUSES: usize = 3;

impl AggregationError {
    pub fn from_failures(failed: usize, causes: impl IntoIterator<Item = FetchError>) -> Self {
        Self {
            failed,
            causes: causes.into_iter().take(MAX_SAMPLED_CAUSES).collect(),
        }
    }
}

fn first_cause(causes: &[FetchError]) -> String {
    causes
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none recorded".to_string())
}

#[derive(Error, Debug)]
pub enum ConfluenceError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    UnsupportedSource(#[from] UnsupportedSourceError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A failure recorded by the cache and shared between callers.
    #[error(transparent)]
    Cached(Arc<ConfluenceError>),

    #[error("{0}")]
    Other(String),
}

impl ConfluenceError {
    /// Strip any layers of cache sharing.
    pub fn root(&self) -> &ConfluenceError {
        match self {
            ConfluenceError::Cached(inner) => inner.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfluenceError>;
