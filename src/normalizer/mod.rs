use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::app::error::SchemaError;
use crate::app::Result;
use crate::domain::{CommentBody, Item, ItemId, ItemRecord, RawRecord, SearchHit, SourceKind};

#[derive(Clone)]
pub struct Normalizer;

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Normalizer {
    pub fn new() -> Self {
        Self
    }

    pub fn normalize(&self, raw: RawRecord) -> std::result::Result<Item, SchemaError> {
        match raw {
            RawRecord::SearchIndex(hit) => self.normalize_search_hit(hit),
            RawRecord::Item(record) => self.normalize_item_record(record),
        }
    }

    /// Normalize an untyped record whose shape is named by `source`.
    pub fn normalize_json(&self, value: Value, source: &str) -> Result<Item> {
        let kind: SourceKind = source.parse()?;
        let raw = RawRecord::decode(kind, value)?;
        Ok(self.normalize(raw)?)
    }

    fn normalize_search_hit(&self, hit: SearchHit) -> std::result::Result<Item, SchemaError> {
        let id = hit
            .object_id
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(ItemId::parse)
            .ok_or(SchemaError::MissingField("objectID"))?;
        let title = required_title(hit.title)?;

        let created_at = match hit.created_at.as_deref().map(DateTime::parse_from_rfc3339) {
            Some(Ok(parsed)) => truncate_to_millis(parsed.with_timezone(&Utc)),
            Some(Err(e)) => {
                tracing::warn!("Unparseable created_at on {}: {}", id, e);
                from_seconds(hit.created_at_i)?
            }
            None => from_seconds(hit.created_at_i)?,
        };

        let comment_ids: Vec<ItemId> = hit.children.iter().map(|c| c.id().into()).collect();
        let comment_count = non_negative(hit.num_comments).unwrap_or(comment_ids.len() as u64);

        Ok(Item {
            id,
            source: SourceKind::SearchIndex,
            title,
            url: hit.url.filter(|u| !u.is_empty()),
            score: non_negative(hit.points).unwrap_or(0),
            author: hit.author,
            created_at,
            comment_ids,
            comment_count,
        })
    }

    fn normalize_item_record(&self, record: ItemRecord) -> std::result::Result<Item, SchemaError> {
        let id = record.id.map(ItemId::Numeric).ok_or(SchemaError::MissingField("id"))?;
        let title = required_title(record.title)?;
        let created_at = from_seconds(record.time)?;

        let comment_ids: Vec<ItemId> = record.kids.into_iter().map(ItemId::Numeric).collect();
        let comment_count = non_negative(record.descendants).unwrap_or(comment_ids.len() as u64);

        Ok(Item {
            id,
            source: SourceKind::Item,
            title,
            url: record.url.filter(|u| !u.is_empty()),
            score: non_negative(record.score).unwrap_or(0),
            author: record.by,
            created_at,
            comment_ids,
            comment_count,
        })
    }

    /// Decode an item-shaped comment record into its body and reply ids.
    pub fn normalize_comment(
        &self,
        value: Value,
    ) -> std::result::Result<(CommentBody, Vec<ItemId>), SchemaError> {
        if value.is_null() {
            return Err(SchemaError::Empty);
        }
        let record: ItemRecord =
            serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        if record.id.is_none() {
            return Err(SchemaError::MissingField("id"));
        }

        let replies = record.kids.iter().copied().map(ItemId::Numeric).collect();
        if record.deleted || record.dead {
            return Ok((CommentBody::Deleted, replies));
        }

        let created_at = match record.time {
            Some(_) => Some(from_seconds(record.time)?),
            None => None,
        };
        let body = CommentBody::Text {
            author: record.by,
            html_text: record.text.unwrap_or_default(),
            created_at,
        };
        Ok((body, replies))
    }
}

fn required_title(title: Option<String>) -> std::result::Result<String, SchemaError> {
    title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(SchemaError::MissingField("title"))
}

fn non_negative(value: Option<i64>) -> Option<u64> {
    value.map(|v| v.max(0) as u64)
}

/// Unix seconds to the canonical millisecond instant (`secs * 1000`).
fn from_seconds(secs: Option<i64>) -> std::result::Result<DateTime<Utc>, SchemaError> {
    let Some(secs) = secs else {
        tracing::warn!("Record has no timestamp, using the epoch");
        return Ok(DateTime::<Utc>::default());
    };
    secs.checked_mul(1000)
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .ok_or_else(|| SchemaError::Malformed(format!("timestamp out of range: {}", secs)))
}

fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(dt.timestamp_millis()).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::error::UnsupportedSourceError;
    use crate::app::ConfluenceError;
    use serde_json::json;

    const SEARCH_HIT: &str = r#"{
        "objectID": "38000000",
        "title": "Show HN: A tiny Rust web server",
        "url": "https://example.com/server",
        "points": 128,
        "author": "alice",
        "created_at": "2023-10-25T12:30:00.000Z",
        "created_at_i": 1698237000,
        "num_comments": 42
    }"#;

    const ITEM_RECORD: &str = r#"{
        "id": 38000000,
        "type": "story",
        "title": "Show HN: A tiny Rust web server",
        "url": "https://example.com/server",
        "score": 128,
        "by": "alice",
        "time": 1698237000,
        "kids": [38000010, 38000011],
        "descendants": 42
    }"#;

    #[test]
    fn test_normalize_search_hit() {
        let normalizer = Normalizer::new();
        let item = normalizer
            .normalize_json(serde_json::from_str(SEARCH_HIT).unwrap(), "searchIndex")
            .unwrap();

        assert_eq!(item.id, ItemId::Numeric(38000000));
        assert_eq!(item.source, SourceKind::SearchIndex);
        assert_eq!(item.title, "Show HN: A tiny Rust web server");
        assert_eq!(item.score, 128);
        assert_eq!(item.author.as_deref(), Some("alice"));
        assert_eq!(item.comment_count, 42);
        assert!(item.comment_ids.is_empty());
    }

    #[test]
    fn test_normalize_item_record() {
        let normalizer = Normalizer::new();
        let item = normalizer
            .normalize_json(serde_json::from_str(ITEM_RECORD).unwrap(), "item")
            .unwrap();

        assert_eq!(item.id, ItemId::Numeric(38000000));
        assert_eq!(item.source, SourceKind::Item);
        assert_eq!(item.comment_ids, vec![ItemId::Numeric(38000010), ItemId::Numeric(38000011)]);
        assert_eq!(item.comment_count, 42);
        assert_eq!(item.created_at_millis(), 1_698_237_000_000);
    }

    #[test]
    fn test_both_shapes_agree_on_instant_and_score() {
        let normalizer = Normalizer::new();
        let search = normalizer
            .normalize_json(
                json!({"objectID": "x", "title": "Same", "points": 42,
                       "created_at": "2021-01-01T00:00:00Z", "author": "u"}),
                "searchIndex",
            )
            .unwrap();
        let item = normalizer
            .normalize_json(
                json!({"id": 7, "title": "Same", "score": 42, "time": 1609459200, "by": "u"}),
                "item",
            )
            .unwrap();

        assert_eq!(search.id, ItemId::Text("x".into()));
        assert_eq!(search.created_at_millis(), 1_609_459_200_000);
        assert_eq!(search.created_at, item.created_at);
        assert_eq!(search.score, 42);
        assert_eq!(item.score, 42);
    }

    #[test]
    fn test_search_hit_falls_back_to_epoch_seconds() {
        let normalizer = Normalizer::new();
        let item = normalizer
            .normalize(RawRecord::SearchIndex(SearchHit {
                object_id: Some("1".into()),
                title: Some("t".into()),
                created_at: Some("yesterday".into()),
                created_at_i: Some(1609459200),
                ..Default::default()
            }))
            .unwrap();
        assert_eq!(item.created_at_millis(), 1_609_459_200_000);
    }

    #[test]
    fn test_fractional_seconds_truncate_to_millis() {
        let normalizer = Normalizer::new();
        let item = normalizer
            .normalize_json(
                json!({"objectID": "1", "title": "t", "created_at": "2021-01-01T00:00:00.123456Z"}),
                "searchIndex",
            )
            .unwrap();
        assert_eq!(item.created_at_millis(), 1_609_459_200_123);
        assert_eq!(item.created_at.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn test_negative_score_clamps_to_zero() {
        let normalizer = Normalizer::new();
        let item = normalizer
            .normalize_json(json!({"id": 1, "title": "t", "score": -5}), "item")
            .unwrap();
        assert_eq!(item.score, 0);
    }

    #[test]
    fn test_comment_count_derived_from_kids() {
        let normalizer = Normalizer::new();
        let item = normalizer
            .normalize_json(json!({"id": 1, "title": "t", "kids": [2, 3, 4]}), "item")
            .unwrap();
        assert_eq!(item.comment_count, 3);
    }

    #[test]
    fn test_missing_title_is_schema_error() {
        let normalizer = Normalizer::new();
        let err = normalizer
            .normalize(RawRecord::Item(ItemRecord {
                id: Some(1),
                title: Some("   ".into()),
                ..Default::default()
            }))
            .unwrap_err();
        assert_eq!(err, SchemaError::MissingField("title"));
    }

    #[test]
    fn test_missing_id_is_schema_error() {
        let normalizer = Normalizer::new();
        let err = normalizer
            .normalize_json(json!({"title": "no id"}), "searchIndex")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfluenceError::Schema(SchemaError::MissingField("objectID"))
        ));
    }

    #[test]
    fn test_unknown_source_is_rejected() {
        let normalizer = Normalizer::new();
        let err = normalizer
            .normalize_json(json!({"id": 1, "title": "t"}), "lobsters")
            .unwrap_err();
        assert!(matches!(
            err,
            ConfluenceError::UnsupportedSource(UnsupportedSourceError(_))
        ));
    }

    #[test]
    fn test_normalize_comment_text() {
        let normalizer = Normalizer::new();
        let (body, replies) = normalizer
            .normalize_comment(json!({
                "id": 10, "by": "bob", "text": "I <i>agree</i> &amp; more",
                "time": 1609459200, "kids": [11, 12], "type": "comment"
            }))
            .unwrap();

        assert_eq!(replies, vec![ItemId::Numeric(11), ItemId::Numeric(12)]);
        match body {
            CommentBody::Text {
                author,
                html_text,
                created_at,
            } => {
                assert_eq!(author.as_deref(), Some("bob"));
                assert_eq!(html_text, "I <i>agree</i> &amp; more");
                assert_eq!(created_at.map(|t| t.timestamp()), Some(1609459200));
            }
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[test]
    fn test_normalize_deleted_comment_keeps_replies() {
        let normalizer = Normalizer::new();
        let (body, replies) = normalizer
            .normalize_comment(json!({"id": 10, "deleted": true, "kids": [11]}))
            .unwrap();
        assert_eq!(body, CommentBody::Deleted);
        assert_eq!(replies, vec![ItemId::Numeric(11)]);
    }

    #[test]
    fn test_normalize_null_comment() {
        let normalizer = Normalizer::new();
        assert_eq!(
            normalizer.normalize_comment(Value::Null).unwrap_err(),
            SchemaError::Empty
        );
    }
}
