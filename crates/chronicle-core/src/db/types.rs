//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::memory::MemoryChunk;

/// A cached chunk together with the provenance key it was stored under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedChunkRecord {
    pub key: String,
    pub chunk: MemoryChunk,
    /// Unix timestamp of the write
    pub stored_at: i64,
}

/// Cache statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbStats {
    pub total_chunks: usize,
    /// Chunk count per level
    pub level_counts: BTreeMap<u32, usize>,
    pub total_covered_interactions: usize,
}
