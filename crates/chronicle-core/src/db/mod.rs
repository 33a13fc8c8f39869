// ============================================================================
// ChunkDb - Embedded Chunk Cache (redb)
// ============================================================================
// Persistent content-addressed storage for built chunks, so a rebuild after
// a restart skips summaries it has already paid for.
// Default path: ~/.chronicle/chunks.redb (override via CHRONICLE_CACHE_PATH)
// ============================================================================

pub mod types;

pub use types::{CachedChunkRecord, DbStats};

use anyhow::{anyhow, Result};
use redb::{Database, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::cache::ChunkCache;
use crate::memory::MemoryChunk;

// Table definitions
const CHUNKS: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");

/// Embedded database backing the chunk cache
pub struct ChunkDb {
    db: Database,
    path: PathBuf,
}

impl ChunkDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses CHRONICLE_CACHE_PATH env var or ~/.chronicle/chunks.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            p.to_path_buf()
        } else if let Ok(env_path) = std::env::var("CHRONICLE_CACHE_PATH") {
            PathBuf::from(env_path)
        } else {
            let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
            let chronicle_dir = home.join(".chronicle");
            std::fs::create_dir_all(&chronicle_dir)
                .map_err(|e| anyhow!("Failed to create .chronicle directory: {}", e))?;
            chronicle_dir.join("chunks.redb")
        };

        info!("Opening chunk cache at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure the table exists by doing a write transaction
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(CHUNKS)
                .map_err(|e| anyhow!("Failed to create chunks table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store_chunk(&self, key: &str, chunk: &MemoryChunk) -> Result<()> {
        let record = CachedChunkRecord {
            key: key.to_string(),
            chunk: chunk.clone(),
            stored_at: chrono::Utc::now().timestamp(),
        };
        let value = bincode::serialize(&record)
            .map_err(|e| anyhow!("Failed to serialize chunk: {}", e))?;

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(CHUNKS)
                .map_err(|e| anyhow!("Failed to open chunks table: {}", e))?;
            table.insert(key, value.as_slice())
                .map_err(|e| anyhow!("Failed to insert chunk: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored chunk {} (level {}) under {}", chunk.id, chunk.level, &key[..key.len().min(12)]);
        Ok(())
    }

    pub fn get_chunk(&self, key: &str) -> Result<Option<MemoryChunk>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(CHUNKS)
            .map_err(|e| anyhow!("Failed to open chunks table: {}", e))?;

        match table.get(key).map_err(|e| anyhow!("Failed to get chunk: {}", e))? {
            Some(value) => {
                let record: CachedChunkRecord = bincode::deserialize(value.value())
                    .map_err(|e| anyhow!("Failed to deserialize chunk: {}", e))?;
                Ok(Some(record.chunk))
            }
            None => Ok(None),
        }
    }

    pub fn list_chunks(&self) -> Result<Vec<CachedChunkRecord>> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(CHUNKS)
            .map_err(|e| anyhow!("Failed to open chunks table: {}", e))?;

        let mut results = Vec::new();
        let iter = table.range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate chunks: {}", e))?;
        for entry in iter {
            let (_key, value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            let record: CachedChunkRecord = bincode::deserialize(value.value())
                .map_err(|e| anyhow!("Failed to deserialize chunk: {}", e))?;
            results.push(record);
        }
        Ok(results)
    }

    pub fn delete_chunk(&self, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn.open_table(CHUNKS)
                .map_err(|e| anyhow!("Failed to open chunks table: {}", e))?;
            removed = table.remove(key)
                .map_err(|e| anyhow!("Failed to remove chunk: {}", e))?
                .is_some();
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed {
            debug!("Deleted cached chunk under {}", key);
        }
        Ok(removed)
    }

    /// Number of cached chunks
    pub fn len(&self) -> Result<usize> {
        let read_txn = self.db.begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn.open_table(CHUNKS)
            .map_err(|e| anyhow!("Failed to open chunks table: {}", e))?;
        let count = table.len().map_err(|e| anyhow!("Failed to count chunks: {}", e))?;
        Ok(count as usize)
    }

    /// Remove every cached chunk. Returns the number deleted.
    pub fn clear(&self) -> Result<usize> {
        let keys: Vec<String> = self.list_chunks()?.into_iter().map(|r| r.key).collect();

        let write_txn = self.db.begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn.open_table(CHUNKS)
                .map_err(|e| anyhow!("Failed to open chunks table: {}", e))?;
            for key in &keys {
                table.remove(key.as_str())
                    .map_err(|e| anyhow!("Failed to remove chunk: {}", e))?;
            }
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit clear: {}", e))?;

        if !keys.is_empty() {
            info!("Cleared {} cached chunks", keys.len());
        }
        Ok(keys.len())
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        let records = self.list_chunks()?;

        let mut stats = DbStats {
            total_chunks: records.len(),
            ..DbStats::default()
        };
        for record in &records {
            *stats.level_counts.entry(record.chunk.level).or_insert(0) += 1;
            if record.chunk.level == 0 {
                stats.total_covered_interactions += record.chunk.coverage();
            }
        }
        Ok(stats)
    }
}

impl ChunkCache for ChunkDb {
    fn get(&self, key: &str) -> Result<Option<MemoryChunk>> {
        self.get_chunk(key)
    }

    fn put(&self, key: &str, chunk: &MemoryChunk) -> Result<()> {
        self.store_chunk(key, chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Interaction, SourceKind};
    use chrono::Utc;

    fn chunk(ids: &[&str]) -> MemoryChunk {
        let group: Vec<_> = ids
            .iter()
            .map(|id| Interaction::new(*id, SourceKind::Note, "me@x.com", "note", Utc::now()))
            .collect();
        MemoryChunk::from_interactions(&group, format!("summary of {}", ids.join(",")), vec![0.5, 0.5])
    }

    #[test]
    fn test_store_and_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let db = ChunkDb::open(Some(dir.path().join("cache.redb").as_path())).unwrap();

        let c = chunk(&["a", "b"]);
        db.store_chunk("k1", &c).unwrap();

        assert_eq!(db.get_chunk("k1").unwrap(), Some(c));
        assert!(db.get_chunk("missing").unwrap().is_none());
        assert_eq!(db.len().unwrap(), 1);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.redb");
        let c = chunk(&["a"]);
        {
            let db = ChunkDb::open(Some(path.as_path())).unwrap();
            ChunkCache::put(&db, "k", &c).unwrap();
        }
        let db = ChunkDb::open(Some(path.as_path())).unwrap();
        assert_eq!(ChunkCache::get(&db, "k").unwrap(), Some(c));
    }

    #[test]
    fn test_stats_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let db = ChunkDb::open(Some(dir.path().join("cache.redb").as_path())).unwrap();

        let a = chunk(&["a", "b"]);
        let b = chunk(&["c"]);
        let parent = MemoryChunk::from_children(1, &[a.clone(), b.clone()], "p".into(), vec![1.0, 0.0]);
        db.store_chunk("a", &a).unwrap();
        db.store_chunk("b", &b).unwrap();
        db.store_chunk("p", &parent).unwrap();

        let stats = db.stats().unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.level_counts.get(&0), Some(&2));
        assert_eq!(stats.level_counts.get(&1), Some(&1));
        assert_eq!(stats.total_covered_interactions, 3);

        assert!(db.delete_chunk("b").unwrap());
        assert!(!db.delete_chunk("b").unwrap());
        assert_eq!(db.clear().unwrap(), 2);
        assert_eq!(db.len().unwrap(), 0);
    }
}
