//! Breadth-first comment tree construction.
//!
//! Each depth level is resolved with one fan-out batch. Nodes live in a flat
//! arena while the tree is being built (parents always precede their
//! children), and are folded into owned [`CommentNode`] trees at the end.

use std::collections::HashSet;
use std::sync::Arc;

use crate::app::error::FetchError;
use crate::domain::{CommentBody, CommentNode, CommentTree, ItemId};
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::Resource;
use crate::normalizer::Normalizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeLimits {
    /// Deepest level expanded; the story's direct replies are depth 0.
    pub max_depth: usize,
    /// Maximum number of nodes in the tree, failed nodes included.
    pub max_nodes: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: 3,
            max_nodes: 200,
        }
    }
}

struct ArenaNode {
    id: ItemId,
    depth: usize,
    body: CommentBody,
    children: Vec<usize>,
    reply_count: usize,
}

pub struct TreeBuilder {
    parallel: Arc<ParallelFetcher>,
    normalizer: Normalizer,
}

impl TreeBuilder {
    pub fn new(parallel: Arc<ParallelFetcher>) -> Self {
        Self {
            parallel,
            normalizer: Normalizer::new(),
        }
    }

    pub async fn build_tree(&self, root_ids: &[ItemId], limits: TreeLimits) -> CommentTree {
        let mut arena: Vec<ArenaNode> = Vec::new();
        let mut visited: HashSet<ItemId> = HashSet::new();
        let mut truncated = false;

        // (parent arena index, id) pairs waiting for the next batch.
        let mut level: Vec<(Option<usize>, ItemId)> =
            root_ids.iter().cloned().map(|id| (None, id)).collect();
        let mut depth = 0;

        while !level.is_empty() {
            if depth > limits.max_depth {
                truncated = true;
                break;
            }

            level.retain(|(_, id)| {
                let fresh = visited.insert(id.clone());
                if !fresh {
                    tracing::debug!("Skipping repeated comment id {}", id);
                }
                fresh
            });

            let budget = limits.max_nodes.saturating_sub(arena.len());
            if level.len() > budget {
                tracing::debug!(
                    "Comment budget reached at depth {}: dropping {} of {} ids",
                    depth,
                    level.len() - budget,
                    level.len()
                );
                level.truncate(budget);
                truncated = true;
            }
            if level.is_empty() {
                break;
            }

            let resources = level.iter().map(|(_, id)| Resource::Item(id.clone())).collect();
            let results = self.parallel.fetch_raw(resources).await;

            let mut next = Vec::new();
            for ((parent, id), result) in level.into_iter().zip(results) {
                let index = arena.len();
                let decoded = result.and_then(|value| {
                    self.normalizer
                        .normalize_comment(value)
                        .map_err(FetchError::from)
                });
                let (body, replies) = match decoded {
                    Ok(decoded) => decoded,
                    Err(error) => {
                        tracing::warn!("Comment {} failed to resolve: {}", id, error);
                        (CommentBody::Failed { error }, Vec::new())
                    }
                };

                next.extend(replies.iter().cloned().map(|child| (Some(index), child)));
                arena.push(ArenaNode {
                    id,
                    depth,
                    body,
                    children: Vec::new(),
                    reply_count: replies.len(),
                });
                if let Some(parent) = parent {
                    arena[parent].children.push(index);
                }
            }

            level = next;
            depth += 1;
        }

        let node_count = arena.len();
        tracing::info!(
            "Built comment tree: {} nodes, {} levels{}",
            node_count,
            depth,
            if truncated { " (truncated)" } else { "" }
        );

        CommentTree {
            story_id: None,
            roots: assemble(arena),
            node_count,
            truncated,
        }
    }
}

/// Fold the arena into owned trees. Children always sit at higher indices
/// than their parent, so a reverse sweep finishes every child first.
fn assemble(arena: Vec<ArenaNode>) -> Vec<CommentNode> {
    let mut built: Vec<Option<CommentNode>> = Vec::with_capacity(arena.len());
    built.resize_with(arena.len(), || None);
    let mut is_child = vec![false; arena.len()];
    for node in &arena {
        for &child in &node.children {
            is_child[child] = true;
        }
    }

    for (index, node) in arena.into_iter().enumerate().rev() {
        let children: Vec<CommentNode> = node
            .children
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[index] = Some(CommentNode {
            id: node.id,
            depth: node.depth,
            body: node.body,
            unresolved_replies: node.reply_count.saturating_sub(children.len()),
            children,
        });
    }

    built
        .into_iter()
        .zip(is_child)
        .filter_map(|(node, child)| if child { None } else { node })
        .collect()
}
