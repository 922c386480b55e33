use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::app::error::FetchError;
use crate::domain::ItemId;

/// What a resolved (or unresolvable) comment carries.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommentBody {
    Text {
        author: Option<String>,
        /// Raw upstream markup. Must be sanitized by whoever renders it.
        html_text: String,
        created_at: Option<DateTime<Utc>>,
    },
    /// Deleted or flagged dead upstream.
    Deleted,
    /// The id could not be resolved; the node keeps its place in the tree.
    Failed { error: FetchError },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    pub id: ItemId,
    pub depth: usize,
    pub body: CommentBody,
    pub children: Vec<CommentNode>,
    /// Reply ids that were known but not expanded.
    pub unresolved_replies: usize,
}

impl CommentNode {
    pub fn author(&self) -> Option<&str> {
        match &self.body {
            CommentBody::Text { author, .. } => author.as_deref(),
            _ => None,
        }
    }

    pub fn html_text(&self) -> Option<&str> {
        match &self.body {
            CommentBody::Text { html_text, .. } => Some(html_text),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.body, CommentBody::Failed { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CommentTree {
    pub story_id: Option<ItemId>,
    pub roots: Vec<CommentNode>,
    pub node_count: usize,
    /// Expansion stopped at the depth or node cap.
    pub truncated: bool,
}

impl CommentTree {
    /// Nodes in display order: each node followed by its replies.
    pub fn walk(&self) -> Vec<&CommentNode> {
        let mut out = Vec::with_capacity(self.node_count);
        let mut stack: Vec<&CommentNode> = self.roots.iter().rev().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(node.children.iter().rev());
        }
        out
    }

    pub fn failed_count(&self) -> usize {
        self.walk().into_iter().filter(|n| n.is_failed()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(id: u64, depth: usize, children: Vec<CommentNode>) -> CommentNode {
        CommentNode {
            id: ItemId::Numeric(id),
            depth,
            body: CommentBody::Text {
                author: Some(format!("user{}", id)),
                html_text: format!("comment {}", id),
                created_at: None,
            },
            children,
            unresolved_replies: 0,
        }
    }

    #[test]
    fn test_walk_is_preorder() {
        let tree = CommentTree {
            story_id: Some(ItemId::Numeric(1)),
            roots: vec![
                text(2, 0, vec![text(4, 1, vec![text(6, 2, vec![])]), text(5, 1, vec![])]),
                text(3, 0, vec![]),
            ],
            node_count: 5,
            truncated: false,
        };

        let order: Vec<String> = tree.walk().iter().map(|n| n.id.to_string()).collect();
        assert_eq!(order, vec!["2", "4", "6", "5", "3"]);
    }

    #[test]
    fn test_failed_node_has_no_text() {
        let node = CommentNode {
            id: ItemId::Numeric(9),
            depth: 0,
            body: CommentBody::Failed {
                error: FetchError::Aborted("boom".into()),
            },
            children: vec![],
            unresolved_replies: 0,
        };
        assert!(node.is_failed());
        assert_eq!(node.author(), None);
        assert_eq!(node.html_text(), None);
    }
}
