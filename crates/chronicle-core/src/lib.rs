//! ============================================================================
//! CHRONICLE-CORE: Hierarchical cross-channel memory
//! ============================================================================
//! This crate turns a stream of messages from many channels into a memory
//! an assistant can query:
//! - Hierarchical summarization of interactions into leveled chunks
//! - Content-addressed chunk caching (in memory or redb on disk)
//! - A k-NN graph index with recency-aware, filtered, diversified search
//! - A multi-stage retriever that assembles prompt-ready context
//! ============================================================================

pub mod cache;
pub mod config;
pub mod context_tree;
pub mod db;
pub mod filter;
pub mod gate;
pub mod index;
pub mod llm;
pub mod memory;
pub mod retrieval;
pub mod similarity;
pub mod types;

// Re-export main types for convenience
pub use types::*;
pub use cache::{ChunkCache, InMemoryChunkCache};
pub use config::ChronicleConfig;
pub use db::ChunkDb;
pub use filter::SearchFilter;
pub use gate::{ConcurrencyGate, GatedCollaborator};
pub use index::GraphMemoryIndex;
pub use llm::{LlmCollaborator, OfflineCollaborator, OpenAiCollaborator};
pub use memory::{MemoryBuilder, MemoryChunk};
pub use retrieval::{MultiStageRetriever, Retrieval};
