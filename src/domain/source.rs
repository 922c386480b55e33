//! Upstream record shapes, exactly as the two providers send them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::error::{SchemaError, UnsupportedSourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Full-text search index: one request returns a page of hits.
    SearchIndex,
    /// Per-item API: an id list plus one request per item.
    Item,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::SearchIndex => "searchIndex",
            SourceKind::Item => "item",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = UnsupportedSourceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "searchindex" | "search-index" | "search_index" | "search" => {
                Ok(SourceKind::SearchIndex)
            }
            "item" | "items" => Ok(SourceKind::Item),
            _ => Err(UnsupportedSourceError(s.to_string())),
        }
    }
}

/// A child entry of a search-index record: either a bare id or a nested
/// record carrying one.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SearchChild {
    Id(u64),
    Node { id: u64 },
}

impl SearchChild {
    pub fn id(&self) -> u64 {
        match self {
            SearchChild::Id(id) | SearchChild::Node { id } => *id,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "objectID")]
    pub object_id: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub points: Option<i64>,
    pub author: Option<String>,
    pub created_at: Option<String>,
    pub created_at_i: Option<i64>,
    pub num_comments: Option<i64>,
    #[serde(default)]
    pub children: Vec<SearchChild>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemRecord {
    pub id: Option<u64>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub by: Option<String>,
    pub time: Option<i64>,
    #[serde(default)]
    pub kids: Vec<u64>,
    pub descendants: Option<i64>,
    pub text: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub dead: bool,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Input to the normalizer, tagged with the shape it arrived in.
#[derive(Debug, Clone)]
pub enum RawRecord {
    SearchIndex(SearchHit),
    Item(ItemRecord),
}

impl RawRecord {
    /// Decode `value` as the shape of `kind`.
    pub fn decode(kind: SourceKind, value: Value) -> Result<Self, SchemaError> {
        if value.is_null() {
            return Err(SchemaError::Empty);
        }
        let record = match kind {
            SourceKind::SearchIndex => RawRecord::SearchIndex(
                serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?,
            ),
            SourceKind::Item => RawRecord::Item(
                serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?,
            ),
        };
        Ok(record)
    }

    /// Decode a record that names its own shape in a `kind` field, e.g.
    /// `{"kind": "searchIndex", "objectID": "1", ...}`.
    pub fn from_tagged(mut value: Value) -> crate::app::Result<Self> {
        let tag = value
            .as_object_mut()
            .and_then(|obj| obj.remove("kind"))
            .ok_or(SchemaError::MissingField("kind"))?;
        let tag = tag
            .as_str()
            .ok_or_else(|| SchemaError::Malformed("`kind` is not a string".into()))?;
        let kind: SourceKind = tag.parse()?;
        Ok(Self::decode(kind, value)?)
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            RawRecord::SearchIndex(_) => SourceKind::SearchIndex,
            RawRecord::Item(_) => SourceKind::Item,
        }
    }
}
