//! ============================================================================
//! Concurrency Gate - bounds in-flight collaborator calls
//! ============================================================================
//! A counting semaphore shared by every task of a build. A permit is held
//! only while the collaborator is being called and is released when the
//! guard drops, whichever way the call ends.
//! ============================================================================

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::llm::{LlmCollaborator, RelevanceCandidate};
use crate::types::{ChronicleError, Result};

/// Default number of concurrent collaborator calls
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Cloneable handle to a shared counting semaphore
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        self.semaphore
            .acquire()
            .await
            .map_err(|e| ChronicleError::Task(format!("Semaphore acquire failed: {e}")))
    }

    /// Run `call` while holding a permit
    pub async fn run<F, T>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let _permit = self.acquire().await?;
        call.await
    }
}

impl Default for ConcurrencyGate {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENCY)
    }
}

/// Collaborator wrapper that passes every call through a [`ConcurrencyGate`]
pub struct GatedCollaborator<L> {
    inner: L,
    gate: ConcurrencyGate,
}

impl<L: LlmCollaborator> GatedCollaborator<L> {
    pub fn new(inner: L, gate: ConcurrencyGate) -> Self {
        Self { inner, gate }
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }
}

#[async_trait]
impl<L: LlmCollaborator> LlmCollaborator for GatedCollaborator<L> {
    async fn summarize(&self, text: &str, instruction: &str) -> Result<String> {
        self.gate.run(self.inner.summarize(text, instruction)).await
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.gate.run(self.inner.embed(text)).await
    }

    async fn judge_relevance(
        &self,
        query: &str,
        candidates: &[RelevanceCandidate],
    ) -> Result<HashMap<String, bool>> {
        self.gate.run(self.inner.judge_relevance(query, candidates)).await
    }

    async fn complete_chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.gate.run(self.inner.complete_chat(system_prompt, user_prompt)).await
    }
}
