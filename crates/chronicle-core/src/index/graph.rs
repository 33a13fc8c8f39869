//! ============================================================================
//! Graph Memory Index - k-NN graph with greedy best-first search
//! ============================================================================
//! Built once over a chunk snapshot and never mutated. Nodes live in an
//! arena; edges are index lists. When the chunk set changes, build a new
//! index.
//!
//! ```text
//! query ─► top-8 entry points ─► best-first walk over k-NN edges
//!                                    │  (filter admits → candidate)
//!                                    ▼
//!                        candidates ─► MMR (λ = 0.7) ─► top k
//! ```
//! ============================================================================

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::frontier::Frontier;
use super::mmr::{mmr_select, DEFAULT_MMR_LAMBDA};
use crate::filter::SearchFilter;
use crate::memory::MemoryChunk;
use crate::similarity::{cosine_similarity, recency_decay};
use crate::types::ChronicleError;

/// Default number of outgoing edges per node
pub const DEFAULT_NEIGHBOR_COUNT: usize = 8;

/// Maximum number of traversal entry points
const MAX_ENTRY_POINTS: usize = 8;

/// Visited-node budget as a multiple of the candidate target
const EXPLORATION_FACTOR: usize = 5;

const SIMILARITY_WEIGHT: f32 = 0.8;
const RECENCY_WEIGHT: f32 = 0.2;

/// A candidate found during traversal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Position of the node in the index
    pub node: usize,
    pub similarity: f32,
    /// Similarity blended with recency when requested
    pub score: f32,
}

/// Candidates from one graph walk plus the number of nodes it visited
#[derive(Debug, Clone, Default)]
struct Walk {
    hits: Vec<SearchHit>,
    visited: usize,
}

/// Immutable approximate nearest-neighbor graph over chunk embeddings
#[derive(Debug, Clone)]
pub struct GraphMemoryIndex {
    nodes: Vec<MemoryChunk>,
    neighbors: Vec<Vec<usize>>,
    dimension: usize,
    half_life_days: f64,
    built_at: DateTime<Utc>,
}

impl GraphMemoryIndex {
    /// Build over `chunks`, measuring recency from now
    pub fn build(chunks: Vec<MemoryChunk>, neighbor_count: usize, half_life_days: f64) -> Self {
        Self::build_at(chunks, neighbor_count, half_life_days, Utc::now())
    }

    /// Build with an explicit reference time for recency decay
    pub fn build_at(
        chunks: Vec<MemoryChunk>,
        neighbor_count: usize,
        half_life_days: f64,
        now: DateTime<Utc>,
    ) -> Self {
        let dimension = chunks
            .iter()
            .map(|c| c.embedding.len())
            .find(|&d| d > 0)
            .unwrap_or(0);

        let total = chunks.len();
        let nodes: Vec<MemoryChunk> = chunks
            .into_iter()
            .filter(|c| c.embedding.len() == dimension && dimension > 0)
            .collect();
        if nodes.len() < total {
            warn!(
                "Skipped {} chunks whose embedding dimension differs from {}",
                total - nodes.len(),
                dimension
            );
        }

        let neighbors = build_knn_graph(&nodes, neighbor_count);
        debug!(
            "Built graph index: {} nodes, {} edges, dimension {}",
            nodes.len(),
            neighbors.iter().map(Vec::len).sum::<usize>(),
            dimension
        );

        Self {
            nodes,
            neighbors,
            dimension,
            half_life_days,
            built_at: now,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Embedding dimension shared by every node (0 when empty)
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn chunk(&self, node: usize) -> Option<&MemoryChunk> {
        self.nodes.get(node)
    }

    pub fn chunks(&self) -> &[MemoryChunk] {
        &self.nodes
    }

    /// Outgoing edges of `node`
    pub fn neighbors(&self, node: usize) -> &[usize] {
        self.neighbors.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Top-`k` chunks for `query`, diversified with MMR, with recency
    /// measured from build time.
    ///
    /// Never fails: an unusable query or an over-strict filter yields an
    /// empty list.
    pub fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
        include_recency: bool,
    ) -> Vec<MemoryChunk> {
        self.search_at(query, k, filter, include_recency, self.built_at)
    }

    /// Same as [`search`](Self::search) with recency measured from `now`
    pub fn search_at(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
        include_recency: bool,
        now: DateTime<Utc>,
    ) -> Vec<MemoryChunk> {
        let hits = self.search_hits_at(query, k, filter, include_recency, now);
        if hits.is_empty() {
            return Vec::new();
        }

        let embeddings: Vec<&[f32]> = hits
            .iter()
            .map(|h| self.nodes[h.node].embedding.as_slice())
            .collect();

        mmr_select(query, &embeddings, k, DEFAULT_MMR_LAMBDA)
            .into_iter()
            .map(|i| self.nodes[hits[i].node].clone())
            .collect()
    }

    /// Filtered candidates from the graph walk, in discovery order, before MMR
    pub fn search_hits(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
        include_recency: bool,
    ) -> Vec<SearchHit> {
        self.search_hits_at(query, k, filter, include_recency, self.built_at)
    }

    pub fn search_hits_at(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
        include_recency: bool,
        now: DateTime<Utc>,
    ) -> Vec<SearchHit> {
        self.walk(query, k, filter, include_recency.then_some(now)).hits
    }

    /// Best-first walk; `recency_from` enables recency scoring
    fn walk(
        &self,
        query: &[f32],
        k: usize,
        filter: &SearchFilter,
        recency_from: Option<DateTime<Utc>>,
    ) -> Walk {
        if let Err(e) = self.validate_query(query) {
            debug!("{}", e);
            return Walk::default();
        }

        let n = self.nodes.len();
        if k == 0 || n == 0 {
            return Walk::default();
        }

        let k = k.min(n);
        let target = n.min(k.saturating_mul(4).max(k.saturating_add(2)));
        let exploration_cap = target.saturating_mul(EXPLORATION_FACTOR);

        let similarities: Vec<f32> = self
            .nodes
            .iter()
            .map(|c| cosine_similarity(query, &c.embedding))
            .collect();

        let mut by_similarity: Vec<usize> = (0..n).collect();
        by_similarity.sort_by(|&a, &b| {
            similarities[b]
                .total_cmp(&similarities[a])
                .then_with(|| a.cmp(&b))
        });

        let mut frontier = Frontier::new();
        for &entry in by_similarity.iter().take(MAX_ENTRY_POINTS.min(n)) {
            frontier.push(entry, self.score(entry, similarities[entry], recency_from));
        }

        let mut visited = vec![false; n];
        let mut visited_count = 0;
        let mut hits = Vec::with_capacity(target);

        while let Some(current) = frontier.pop() {
            if visited[current.node] {
                continue;
            }
            visited[current.node] = true;
            visited_count += 1;

            if filter.admits(&self.nodes[current.node]) {
                hits.push(SearchHit {
                    node: current.node,
                    similarity: similarities[current.node],
                    score: current.score,
                });
                if hits.len() >= target {
                    break;
                }
            }

            if visited_count >= exploration_cap {
                break;
            }

            for &next in &self.neighbors[current.node] {
                if !visited[next] {
                    frontier.push(next, self.score(next, similarities[next], recency_from));
                }
            }
        }

        debug!(
            "Graph search: visited {} of {} nodes, {} candidates (target {})",
            visited_count,
            n,
            hits.len(),
            target
        );
        Walk {
            hits,
            visited: visited_count,
        }
    }

    fn validate_query(&self, query: &[f32]) -> Result<(), ChronicleError> {
        if query.is_empty() {
            return Err(ChronicleError::InvalidIndexQuery("empty query embedding".into()));
        }
        if !self.nodes.is_empty() && query.len() != self.dimension {
            return Err(ChronicleError::InvalidIndexQuery(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            )));
        }
        Ok(())
    }

    fn score(&self, node: usize, similarity: f32, recency_from: Option<DateTime<Utc>>) -> f32 {
        let Some(now) = recency_from else {
            return similarity;
        };
        match recency_decay(self.nodes[node].latest_timestamp, now, self.half_life_days) {
            Some(decay) => SIMILARITY_WEIGHT * similarity + RECENCY_WEIGHT * decay,
            None => similarity,
        }
    }
}

/// Directed k-NN lists plus a reciprocal edge for every unreciprocated
/// best-neighbor edge.
fn build_knn_graph(nodes: &[MemoryChunk], neighbor_count: usize) -> Vec<Vec<usize>> {
    let n = nodes.len();
    let mut similarity = vec![vec![0.0f32; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let s = cosine_similarity(&nodes[i].embedding, &nodes[j].embedding);
            similarity[i][j] = s;
            similarity[j][i] = s;
        }
    }

    let directed: Vec<Vec<usize>> = (0..n)
        .map(|i| {
            let mut others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
            others.sort_by(|&a, &b| {
                similarity[i][b]
                    .total_cmp(&similarity[i][a])
                    .then_with(|| a.cmp(&b))
            });
            others.truncate(neighbor_count);
            others
        })
        .collect();

    let mut graph = directed.clone();
    for (i, edges) in directed.iter().enumerate() {
        if let Some(&best) = edges.first() {
            if !graph[best].contains(&i) {
                graph[best].push(i);
            }
        }
    }
    graph
}
