//! ============================================================================
//! Index Module - approximate nearest-neighbor search over memory chunks
//! ============================================================================
//! A k-NN graph walked best-first from the most similar entry points, with
//! metadata filtering during traversal and MMR diversification at the end.
//! ============================================================================

mod frontier;
mod graph;
mod mmr;

pub use frontier::{Frontier, ScoredNode};
pub use graph::{GraphMemoryIndex, SearchHit, DEFAULT_NEIGHBOR_COUNT};
pub use mmr::{mmr_select, DEFAULT_MMR_LAMBDA};
