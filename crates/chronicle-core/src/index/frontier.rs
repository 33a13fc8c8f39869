//! Max-heap frontier for best-first graph traversal.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A node index paired with its traversal score
#[derive(Debug, Clone, Copy)]
pub struct ScoredNode {
    pub node: usize,
    pub score: f32,
}

impl PartialEq for ScoredNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredNode {}

impl Ord for ScoredNode {
    // Higher score first; on equal scores the lower node index wins
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for ScoredNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Pending nodes, highest score popped first
#[derive(Debug, Default)]
pub struct Frontier {
    heap: BinaryHeap<ScoredNode>,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: usize, score: f32) {
        self.heap.push(ScoredNode { node, score });
    }

    pub fn pop(&mut self) -> Option<ScoredNode> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
