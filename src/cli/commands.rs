use html_escape::decode_html_entities;

use crate::aggregator::Listing;
use crate::app::{AppContext, Result};
use crate::cache::CacheState;
use crate::comments::TreeLimits;
use crate::domain::{CommentBody, CommentNode, Item, ItemId, SourceKind};
use crate::query::SortMode;

pub async fn top_stories(
    ctx: &AppContext,
    source: SourceKind,
    sort: SortMode,
    filter: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut listing = ctx
        .aggregator
        .top_stories(source, sort, filter.trim())
        .await?;
    if let Some(limit) = limit {
        listing.items.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&listing.items)?);
        return Ok(());
    }

    if listing.items.is_empty() {
        println!("No stories");
    }
    for (rank, item) in listing.items.iter().enumerate() {
        println!("{}", format_item(rank + 1, item));
    }
    println!();
    println!("{}", listing_summary(&listing, source));
    warn_refresh_error(&listing);

    Ok(())
}

pub async fn comments(
    ctx: &AppContext,
    story: &ItemId,
    depth: Option<usize>,
    max_nodes: Option<usize>,
    json: bool,
) -> Result<()> {
    let defaults = ctx.tree_limits();
    let limits = TreeLimits {
        max_depth: depth.unwrap_or(defaults.max_depth),
        max_nodes: max_nodes.unwrap_or(defaults.max_nodes).max(1),
    };

    let cached = ctx.aggregator.comments(story, limits).await?;
    let tree = &cached.value;

    if json {
        println!("{}", serde_json::to_string_pretty(tree.as_ref())?);
        return Ok(());
    }

    if tree.roots.is_empty() {
        println!("No comments");
    }
    for node in tree.walk() {
        print_comment(node);
    }

    println!();
    println!(
        "{} comments{}, {} unavailable [{}]",
        tree.node_count,
        if tree.truncated { " (truncated)" } else { "" },
        tree.failed_count(),
        cached.state
    );
    if let Some(e) = &cached.refresh_error {
        eprintln!("Warning: refresh failed, showing older comments: {}", e);
    }

    Ok(())
}

pub async fn preview(ctx: &AppContext, story: &ItemId) -> Result<()> {
    let tree = ctx
        .aggregator
        .comment_preview(story, ctx.config.comments.preview_limit)
        .await?;

    if tree.roots.is_empty() {
        println!("No comments");
        return Ok(());
    }
    for node in &tree.roots {
        print_comment(node);
    }

    Ok(())
}

pub fn format_item(rank: usize, item: &Item) -> String {
    let title = match item.domain() {
        Some(domain) => format!("{} ({})", item.title, domain),
        None => item.title.clone(),
    };
    format!(
        "{:>3}. {}\n     {} points by {} | {} comments | {}",
        rank,
        title,
        item.score,
        item.display_author(),
        item.comment_count,
        item.created_at.format("%Y-%m-%d %H:%M")
    )
}

pub fn listing_summary(listing: &Listing, source: SourceKind) -> String {
    format!(
        "{} of {} {} stories [{}] fetched {}",
        listing.items.len(),
        listing.candidates,
        source,
        listing.state,
        listing.fetched_at.format("%H:%M:%S")
    )
}

pub fn warn_refresh_error(listing: &Listing) {
    if listing.state == CacheState::Stale {
        if let Some(e) = &listing.refresh_error {
            eprintln!("Warning: refresh failed, showing older stories: {}", e);
        }
    }
}

fn print_comment(node: &CommentNode) {
    let indent = "  ".repeat(node.depth);
    match &node.body {
        CommentBody::Text {
            author, html_text, ..
        } => {
            println!("{}{}:", indent, author.as_deref().unwrap_or("unknown"));
            for line in render_html(html_text).lines() {
                println!("{}  {}", indent, line);
            }
        }
        CommentBody::Deleted => println!("{}[deleted]", indent),
        CommentBody::Failed { error } => println!("{}[unavailable: {}]", indent, error),
    }
    if node.unresolved_replies > 0 {
        println!("{}  ... {} more replies", indent, node.unresolved_replies);
    }
}

/// Upstream comment markup as plain text: tags dropped, paragraph and line
/// breaks kept, entities decoded.
pub fn render_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        text.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('>') else {
            rest = &rest[start..];
            break;
        };

        let inner = &rest[start + 1..start + end];
        let name: String = inner
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if name == "p" || name == "br" {
            text.push('\n');
        }
        rest = &rest[start + end + 1..];
    }
    text.push_str(rest);

    decode_html_entities(&text).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_render_html_strips_tags_and_decodes() {
        let html = "Hello &amp; <i>world</i><p>See <a href=\"https://x.io\">this</a> &#x27;now&#x27;";
        assert_eq!(render_html(html), "Hello & world\nSee this 'now'");
    }

    #[test]
    fn test_render_html_keeps_unclosed_bracket() {
        assert_eq!(render_html("a < b"), "a < b");
        assert_eq!(render_html("x<br/>y</p>"), "x\ny");
    }

    #[test]
    fn test_format_item() {
        let mut item = Item::new(ItemId::Numeric(1), SourceKind::Item, "Show HN: a thing");
        item.url = Some("https://www.example.com/post".into());
        item.score = 42;
        item.author = Some("pg".into());
        item.comment_count = 7;
        item.created_at = Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap();

        assert_eq!(
            format_item(3, &item),
            "  3. Show HN: a thing (example.com)\n     42 points by pg | 7 comments | 2024-03-01 09:30"
        );
    }
}
