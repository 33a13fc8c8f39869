//! ============================================================================
//! Memory Module - Hierarchical summaries of cross-channel history
//! ============================================================================
//! Raw interactions are grouped and summarized into level-0 chunks; groups of
//! chunks are summarized again, level by level, into a small set of roots.
//!
//! ## Architecture
//! ```text
//! Interactions → sort by time → groups of chunk_size → summarize + embed
//!                                                         ↓
//!                                                  level-0 chunks
//!                                                         ↓
//!                              groups of group_size → summarize + embed
//!                                                         ↓
//!                                              level 1 … until one root
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use chronicle_core::memory::MemoryBuilder;
//!
//! let builder = MemoryBuilder::new(llm, cache);
//! let chunks = builder.build_memory(&interactions, 12, 5).await?;
//! ```
//! ============================================================================

mod builder;
mod types;

pub use builder::{render_interactions, MemoryBuilder};
pub use types::{normalize_participant, MemoryChunk};
