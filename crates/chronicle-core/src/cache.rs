//! ============================================================================
//! Chunk Cache - content-addressed storage for built chunks
//! ============================================================================
//! Keys are SHA-256 digests of a chunk's provenance, never its id, so a
//! rebuild over the same interactions finds the chunks it made last time.
//!
//! - Level 0: ordered `(interaction id, timestamp)` pairs. Position matters.
//! - Level n: target level plus the sorted, deduplicated union of covered
//!   interaction ids. Child order does not matter.
//! ============================================================================

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use crate::memory::MemoryChunk;
use crate::types::Interaction;

/// Best-effort key-value store for chunks
pub trait ChunkCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<MemoryChunk>>;
    fn put(&self, key: &str, chunk: &MemoryChunk) -> Result<()>;
}

/// Cache key for a level-0 group of interactions
pub fn level_zero_key(group: &[Interaction]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"l0|");
    for interaction in group {
        hasher.update(interaction.id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(interaction.timestamp.timestamp_millis().to_string().as_bytes());
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// Cache key for a chunk at `level` built over `children`
pub fn upper_level_key(level: u32, children: &[MemoryChunk]) -> String {
    let ids: BTreeSet<&str> = children
        .iter()
        .flat_map(|c| c.source_interaction_ids.iter().map(String::as_str))
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(format!("up|{}|", level).as_bytes());
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// Order-sensitive digest of a chunk list, used to recognise a snapshot
pub fn snapshot_fingerprint(chunks: &[MemoryChunk]) -> String {
    let mut hasher = Sha256::new();
    for chunk in chunks {
        hasher.update(chunk.id.as_bytes());
        hasher.update(b"\x1e");
    }
    hex::encode(hasher.finalize())
}

/// Hit/miss/write counters for a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounters {
    pub hits: usize,
    pub misses: usize,
    pub puts: usize,
}

/// Process-local cache
#[derive(Default)]
pub struct InMemoryChunkCache {
    entries: RwLock<HashMap<String, MemoryChunk>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
    puts: AtomicUsize,
}

impl InMemoryChunkCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn counters(&self) -> CacheCounters {
        CacheCounters {
            hits: self.hits.load(Ordering::SeqCst),
            misses: self.misses.load(Ordering::SeqCst),
            puts: self.puts.load(Ordering::SeqCst),
        }
    }
}

impl ChunkCache for InMemoryChunkCache {
    fn get(&self, key: &str) -> Result<Option<MemoryChunk>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow!("Cache lock poisoned: {}", e))?;
        let found = entries.get(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::SeqCst);
        } else {
            self.misses.fetch_add(1, Ordering::SeqCst);
        }
        Ok(found)
    }

    fn put(&self, key: &str, chunk: &MemoryChunk) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| anyhow!("Cache lock poisoned: {}", e))?;
        entries.insert(key.to_string(), chunk.clone());
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
