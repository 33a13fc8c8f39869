//! ============================================================================
//! Memory Builder - turns an interaction stream into a chunk hierarchy
//! ============================================================================
//! Level 0 summarizes contiguous, time-ordered groups of interactions. Each
//! level above summarizes groups of the level below, until a level collapses
//! to a single chunk or stops shrinking.
//!
//! Every group at a level runs as its own tokio task. Tasks check the cache
//! first and only take a gate permit for the summarize + embed calls.
//! ============================================================================

use futures_util::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::MemoryChunk;
use crate::cache::{level_zero_key, upper_level_key, ChunkCache};
use crate::config::BuilderConfig;
use crate::gate::ConcurrencyGate;
use crate::llm::LlmCollaborator;
use crate::types::{ChronicleError, Interaction, Result};

const LEAF_INSTRUCTION: &str = "Summarize these messages as one memory. Keep who was involved, \
what was decided or asked, commitments, and any dates.";

const UPPER_INSTRUCTION: &str = "Merge these memory summaries into one higher-level summary. \
Keep recurring people, open threads, and decisions; drop small talk.";

/// Outcome of a single group task
struct GroupOutcome {
    position: usize,
    chunk: MemoryChunk,
    cached: bool,
}

/// Shared handles cloned into each group task
#[derive(Clone)]
struct GroupWorker {
    llm: Arc<dyn LlmCollaborator>,
    cache: Arc<dyn ChunkCache>,
    gate: ConcurrencyGate,
}

impl GroupWorker {
    // Cache I/O runs on the blocking pool. Failures degrade to a miss or a
    // skipped write.
    async fn cached(&self, key: &str) -> Option<MemoryChunk> {
        let cache = self.cache.clone();
        let owned = key.to_string();
        match tokio::task::spawn_blocking(move || cache.get(&owned)).await {
            Ok(Ok(hit)) => hit,
            Ok(Err(e)) => {
                warn!("{}", ChronicleError::Cache(format!("read {}: {}", short_key(key), e)));
                None
            }
            Err(e) => {
                warn!("{}", ChronicleError::Task(format!("cache read {}: {}", short_key(key), e)));
                None
            }
        }
    }

    async fn store(&self, key: &str, chunk: &MemoryChunk) {
        let cache = self.cache.clone();
        let owned = key.to_string();
        let chunk = chunk.clone();
        match tokio::task::spawn_blocking(move || cache.put(&owned, &chunk)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("{}", ChronicleError::Cache(format!("write {}: {}", short_key(key), e)));
            }
            Err(e) => {
                warn!("{}", ChronicleError::Task(format!("cache write {}: {}", short_key(key), e)));
            }
        }
    }

    /// Summarize and embed under one gate permit
    async fn summarize_and_embed(&self, text: &str, instruction: &str) -> Result<(String, Vec<f32>)> {
        let _permit = self.gate.acquire().await?;

        let summary = self.llm.summarize(text, instruction).await?;
        if summary.trim().is_empty() {
            return Err(ChronicleError::CollaboratorFailure(
                "summarize returned empty text".into(),
            ));
        }

        let embedding = self.llm.embed(&summary).await?;
        if embedding.is_empty() {
            return Err(ChronicleError::CollaboratorFailure(
                "embed returned an empty vector".into(),
            ));
        }

        Ok((summary, embedding))
    }

    async fn leaf(self, position: usize, group: Vec<Interaction>) -> Result<GroupOutcome> {
        let key = level_zero_key(&group);
        if let Some(chunk) = self.cached(&key).await {
            return Ok(GroupOutcome { position, chunk, cached: true });
        }

        let (summary, embedding) = self
            .summarize_and_embed(&render_interactions(&group), LEAF_INSTRUCTION)
            .await?;
        let chunk = MemoryChunk::from_interactions(&group, summary, embedding);
        self.store(&key, &chunk).await;

        Ok(GroupOutcome { position, chunk, cached: false })
    }

    async fn upper(self, position: usize, level: u32, children: Vec<MemoryChunk>) -> Result<GroupOutcome> {
        let key = upper_level_key(level, &children);
        if let Some(chunk) = self.cached(&key).await {
            return Ok(GroupOutcome { position, chunk, cached: true });
        }

        let (summary, embedding) = self
            .summarize_and_embed(&render_summaries(&children), UPPER_INSTRUCTION)
            .await?;
        let chunk = MemoryChunk::from_children(level, &children, summary, embedding);
        self.store(&key, &chunk).await;

        Ok(GroupOutcome { position, chunk, cached: false })
    }
}

/// Builds the multi-level chunk hierarchy over a set of interactions
pub struct MemoryBuilder {
    worker: GroupWorker,
    config: BuilderConfig,
}

impl MemoryBuilder {
    /// Create a builder with default sizes and a gate of the default capacity
    pub fn new(llm: Arc<dyn LlmCollaborator>, cache: Arc<dyn ChunkCache>) -> Self {
        Self::from_config(llm, cache, &BuilderConfig::default())
    }

    pub fn from_config(
        llm: Arc<dyn LlmCollaborator>,
        cache: Arc<dyn ChunkCache>,
        config: &BuilderConfig,
    ) -> Self {
        Self {
            worker: GroupWorker {
                llm,
                cache,
                gate: ConcurrencyGate::new(config.max_concurrency),
            },
            config: config.clone(),
        }
    }

    /// Share a gate with other users of the same collaborator
    pub fn with_gate(mut self, gate: ConcurrencyGate) -> Self {
        self.config.max_concurrency = gate.capacity();
        self.worker.gate = gate;
        self
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.worker.gate
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Build with the configured chunk and group sizes
    pub async fn build(&self, interactions: &[Interaction]) -> Result<Vec<MemoryChunk>> {
        self.build_memory(interactions, self.config.chunk_size, self.config.group_size)
            .await
    }

    /// Build every level of the hierarchy. The result holds all levels,
    /// lowest first.
    ///
    /// The first collaborator failure aborts the build. Groups finished before
    /// that point stay cached, so a retry only redoes the rest.
    pub async fn build_memory(
        &self,
        interactions: &[Interaction],
        chunk_size: usize,
        group_size: usize,
    ) -> Result<Vec<MemoryChunk>> {
        if interactions.is_empty() {
            debug!("No interactions to build memory from");
            return Ok(Vec::new());
        }

        let chunk_size = chunk_size.max(1);
        let group_size = group_size.max(1);

        let mut ordered = interactions.to_vec();
        ordered.sort_by_key(|i| i.timestamp);

        let handles: Vec<JoinHandle<Result<GroupOutcome>>> = ordered
            .chunks(chunk_size)
            .enumerate()
            .map(|(position, group)| {
                let worker = self.worker.clone();
                tokio::spawn(worker.leaf(position, group.to_vec()))
            })
            .collect();

        let mut current = collect_level(0, handles).await?;
        let mut all = current.clone();

        let mut level = 0u32;
        while current.len() > 1 {
            level += 1;
            let handles: Vec<JoinHandle<Result<GroupOutcome>>> = current
                .chunks(group_size)
                .enumerate()
                .map(|(position, children)| {
                    let worker = self.worker.clone();
                    tokio::spawn(worker.upper(position, level, children.to_vec()))
                })
                .collect();

            let next = collect_level(level, handles).await?;
            all.extend(next.iter().cloned());

            if next.len() >= current.len() {
                warn!(
                    "Level {} did not shrink ({} -> {} chunks), stopping",
                    level,
                    current.len(),
                    next.len()
                );
                break;
            }
            current = next;
        }

        info!(
            "Built memory: {} interactions -> {} chunks across {} levels",
            interactions.len(),
            all.len(),
            level + 1
        );
        Ok(all)
    }
}

/// Await every task of a level and restore group order
async fn collect_level(
    level: u32,
    handles: Vec<JoinHandle<Result<GroupOutcome>>>,
) -> Result<Vec<MemoryChunk>> {
    let total = handles.len();
    let mut pending: FuturesUnordered<_> = handles.into_iter().collect();
    let mut slots: Vec<Option<MemoryChunk>> = vec![None; total];
    let mut hits = 0usize;

    // Returning early drops the remaining handles, which detaches those tasks
    while let Some(joined) = pending.next().await {
        let outcome = joined
            .map_err(|e| ChronicleError::Task(format!("Level {} group task failed: {}", level, e)))??;
        if outcome.cached {
            hits += 1;
        }
        slots[outcome.position] = Some(outcome.chunk);
    }

    info!(
        "Level {}: {} chunks ({} cache hits, {} misses)",
        level,
        total,
        hits,
        total - hits
    );

    slots
        .into_iter()
        .enumerate()
        .map(|(position, slot)| {
            slot.ok_or_else(|| {
                ChronicleError::Task(format!("Level {} group {} produced no chunk", level, position))
            })
        })
        .collect()
}

fn short_key(key: &str) -> &str {
    &key[..12.min(key.len())]
}

/// Plain-text rendering of a group of interactions for summarization
pub fn render_interactions(group: &[Interaction]) -> String {
    group
        .iter()
        .map(|i| {
            let mut block = format!(
                "[{}] ({}) {} -> {}",
                i.timestamp.to_rfc3339(),
                i.source_kind,
                i.from,
                i.to.join(", ")
            );
            if let Some(subject) = i.subject_or_title.as_deref().filter(|s| !s.is_empty()) {
                block.push_str("\nSubject: ");
                block.push_str(subject);
            }
            block.push('\n');
            block.push_str(&i.body);
            block
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_summaries(children: &[MemoryChunk]) -> String {
    children
        .iter()
        .map(|c| c.summary_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
