//! ============================================================================
//! LLM Module - The language-model collaborator boundary
//! ============================================================================
//! Everything that needs a model goes through [`LlmCollaborator`]:
//! summarization and embedding during memory building, embedding and
//! relevance judgment during retrieval.
//!
//! ## Implementations
//! - [`OpenAiCollaborator`]: OpenAI-compatible HTTP API (chat + embeddings)
//! - [`OfflineCollaborator`]: deterministic, network-free, counts its calls
//! - [`crate::gate::GatedCollaborator`]: bounds in-flight calls of any of the above
//!
//! ## Usage
//! ```rust,ignore
//! use chronicle_core::llm::{LlmCollaborator, OpenAiCollaborator};
//!
//! let llm = OpenAiCollaborator::new_openai(api_key);
//! let summary = llm.summarize(&text, "Summarize this thread").await?;
//! let vector = llm.embed(&summary).await?;
//! ```
//! ============================================================================

mod offline;
mod openai;

pub use offline::{CallCounts, FailOn, OfflineCollaborator, OFFLINE_EMBEDDING_DIM};
pub use openai::{OpenAiCollaborator, DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_MODEL};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::Result;

/// A chunk offered to the model for a relevance verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelevanceCandidate {
    pub id: String,
    pub summary: String,
}

/// External language-model operations. None of them are retried here.
#[async_trait]
pub trait LlmCollaborator: Send + Sync {
    /// Condense `text` following `instruction`
    async fn summarize(&self, text: &str, instruction: &str) -> Result<String>;

    /// Fixed-dimension embedding of `text`
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Verdict per candidate id; ids absent from the map were not judged relevant
    async fn judge_relevance(
        &self,
        query: &str,
        candidates: &[RelevanceCandidate],
    ) -> Result<HashMap<String, bool>>;

    async fn complete_chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: LlmCollaborator + ?Sized> LlmCollaborator for Arc<T> {
    async fn summarize(&self, text: &str, instruction: &str) -> Result<String> {
        (**self).summarize(text, instruction).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn judge_relevance(
        &self,
        query: &str,
        candidates: &[RelevanceCandidate],
    ) -> Result<HashMap<String, bool>> {
        (**self).judge_relevance(query, candidates).await
    }

    async fn complete_chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        (**self).complete_chat(system_prompt, user_prompt).await
    }
}
