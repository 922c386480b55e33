use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::SourceKind;

/// Upstream identifier. The item API hands out integers, the search index
/// hands out strings; numeric strings collapse onto the integer form so the
/// same story compares equal from either source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Numeric(u64),
    Text(String),
}

impl ItemId {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<u64>() {
            Ok(n) => ItemId::Numeric(n),
            Err(_) => ItemId::Text(trimmed.to_string()),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Numeric(n) => write!(f, "{}", n),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

impl From<u64> for ItemId {
    fn from(n: u64) -> Self {
        ItemId::Numeric(n)
    }
}

impl FromStr for ItemId {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ItemId::parse(s))
    }
}

/// Canonical news item, independent of the source it was read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub source: SourceKind,
    pub title: String,
    pub url: Option<String>,
    pub score: u64,
    pub author: Option<String>,
    /// Millisecond precision, see [`Item::created_at_millis`].
    pub created_at: DateTime<Utc>,
    pub comment_ids: Vec<ItemId>,
    pub comment_count: u64,
}

impl Item {
    pub fn new(id: ItemId, source: SourceKind, title: impl Into<String>) -> Self {
        Self {
            id,
            source,
            title: title.into(),
            url: None,
            score: 0,
            author: None,
            created_at: DateTime::<Utc>::default(),
            comment_ids: Vec::new(),
            comment_count: 0,
        }
    }

    /// The shared epoch representation: Unix milliseconds.
    pub fn created_at_millis(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    pub fn display_author(&self) -> &str {
        self.author.as_deref().unwrap_or("(unknown)")
    }

    /// Host of the linked page, without a leading `www.`.
    pub fn domain(&self) -> Option<String> {
        let url = Url::parse(self.url.as_deref()?).ok()?;
        let host = url.host_str()?;
        Some(host.strip_prefix("www.").unwrap_or(host).to_string())
    }
}
