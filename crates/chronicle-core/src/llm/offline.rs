//! ============================================================================
//! Offline Collaborator - deterministic stand-in for a language model
//! ============================================================================
//! Embeds text as a hashed bag of words, "summarizes" by keeping the leading
//! words, and judges relevance by token overlap. Every call is counted so
//! callers can assert how much model traffic an operation caused.
//! ============================================================================

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{LlmCollaborator, RelevanceCandidate};
use crate::types::{ChronicleError, Result};

/// Dimension of offline embeddings
pub const OFFLINE_EMBEDDING_DIM: usize = 64;

const SUMMARY_WORDS: usize = 40;

/// Which operation should fail, for exercising error paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailOn {
    #[default]
    Nothing,
    Summarize,
    /// Succeed for the first n summaries, then fail
    SummarizeAfter(usize),
    Embed,
    Judge,
}

/// Snapshot of calls made so far
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CallCounts {
    pub summarize: usize,
    pub embed: usize,
    pub judge: usize,
    pub chat: usize,
}

/// Deterministic, network-free collaborator
pub struct OfflineCollaborator {
    dimension: usize,
    latency: Option<Duration>,
    fail_on: FailOn,
    summarize_calls: AtomicUsize,
    embed_calls: AtomicUsize,
    judge_calls: AtomicUsize,
    chat_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Default for OfflineCollaborator {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineCollaborator {
    pub fn new() -> Self {
        Self::with_dimension(OFFLINE_EMBEDDING_DIM)
    }

    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            latency: None,
            fail_on: FailOn::Nothing,
            summarize_calls: AtomicUsize::new(0),
            embed_calls: AtomicUsize::new(0),
            judge_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Simulate a network round-trip on every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn failing_on(mut self, fail_on: FailOn) -> Self {
        self.fail_on = fail_on;
        self
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            summarize: self.summarize_calls.load(Ordering::SeqCst),
            embed: self.embed_calls.load(Ordering::SeqCst),
            judge: self.judge_calls.load(Ordering::SeqCst),
            chat: self.chat_calls.load(Ordering::SeqCst),
        }
    }

    /// Highest number of calls that were in progress at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// The embedding `embed` would return, without counting a call
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]) as usize
                % self.dimension;
            let sign = if digest[4] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    async fn simulate_call(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        match self.latency {
            Some(latency) => tokio::time::sleep(latency).await,
            None => tokio::task::yield_now().await,
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

#[async_trait]
impl LlmCollaborator for OfflineCollaborator {
    async fn summarize(&self, text: &str, _instruction: &str) -> Result<String> {
        let call = self.summarize_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.simulate_call().await;

        match self.fail_on {
            FailOn::Summarize => {
                return Err(ChronicleError::CollaboratorFailure("offline summarize failure".into()))
            }
            FailOn::SummarizeAfter(n) if call > n => {
                return Err(ChronicleError::CollaboratorFailure(format!(
                    "offline summarize failure on call {}",
                    call
                )))
            }
            _ => {}
        }

        let words: Vec<&str> = text.split_whitespace().take(SUMMARY_WORDS).collect();
        if words.is_empty() {
            return Ok("(empty)".to_string());
        }
        Ok(words.join(" "))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await;

        if self.fail_on == FailOn::Embed {
            return Err(ChronicleError::CollaboratorFailure("offline embed failure".into()));
        }
        Ok(self.embed_text(text))
    }

    async fn judge_relevance(
        &self,
        query: &str,
        candidates: &[RelevanceCandidate],
    ) -> Result<HashMap<String, bool>> {
        self.judge_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await;

        if self.fail_on == FailOn::Judge {
            return Err(ChronicleError::CollaboratorFailure("offline judge failure".into()));
        }

        let query_tokens: HashSet<String> = tokens(query).filter(|t| t.len() >= 3).collect();
        Ok(candidates
            .iter()
            .map(|c| {
                let relevant = tokens(&c.summary).any(|t| query_tokens.contains(&t));
                (c.id.clone(), relevant)
            })
            .collect())
    }

    async fn complete_chat(&self, _system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_call().await;
        Ok(user_prompt.to_string())
    }
}
