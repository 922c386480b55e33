//! Sorting and title filtering over normalized items. No I/O.

use std::fmt;
use std::str::FromStr;

use crate::domain::Item;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortMode {
    /// Highest score first.
    #[default]
    Points,
    /// Newest first.
    Date,
    /// Upstream order, untouched.
    Rank,
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SortMode::Points => "points",
            SortMode::Date => "date",
            SortMode::Rank => "rank",
        })
    }
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "points" | "score" => Ok(SortMode::Points),
            "date" | "time" | "new" => Ok(SortMode::Date),
            "rank" | "front" => Ok(SortMode::Rank),
            other => Err(format!(
                "Unknown sort mode: {}. Use 'points', 'date' or 'rank'",
                other
            )),
        }
    }
}

/// Filter by title, then sort. Both sorts are stable, so equal keys keep
/// their fetch order. The filter matches literally, whitespace included;
/// only an empty filter passes everything through.
pub fn select(items: &[Item], sort: SortMode, filter: &str) -> Vec<Item> {
    let needle = filter.to_lowercase();

    let mut selected: Vec<Item> = if needle.is_empty() {
        items.to_vec()
    } else {
        items
            .iter()
            .filter(|item| item.title.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    };

    match sort {
        SortMode::Points => selected.sort_by(|a, b| b.score.cmp(&a.score)),
        SortMode::Date => selected.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortMode::Rank => {}
    }

    selected
}
