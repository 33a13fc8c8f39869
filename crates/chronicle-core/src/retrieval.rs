//! ============================================================================
//! Multi-Stage Retriever - query → ranked chunks → assembled context
//! ============================================================================
//! ```text
//! query ─► embed ─► entity pre-filter ─► channel preference
//!                                             │
//!                     graph index search (max(12, 3k)) ◄┘
//!                                             │
//!                  LLM relevance judge (only when > k remain)
//!                                             │
//!            0.7·similarity + 0.3·recency ─► top k ─► context text
//! ```
//! Every narrowing stage is soft: if it would leave nothing, the stage is
//! skipped and the wider set is used.
//! ============================================================================

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::cache::snapshot_fingerprint;
use crate::config::{ChronicleConfig, IndexConfig, RetrieverConfig};
use crate::filter::SearchFilter;
use crate::index::GraphMemoryIndex;
use crate::llm::{LlmCollaborator, RelevanceCandidate};
use crate::memory::{normalize_participant, MemoryChunk};
use crate::similarity::{cosine_similarity, recency_decay};
use crate::types::{EntityCard, PersonaCard, Result, SituationCard, SourceKind};

const MIN_SEARCH_CANDIDATES: usize = 12;
const SIMILARITY_WEIGHT: f32 = 0.7;
const RECENCY_WEIGHT: f32 = 0.3;

/// Chunks chosen for a query plus the context text built around them
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub chunks: Vec<MemoryChunk>,
    pub context: String,
}

/// Last index built, keyed by the fingerprint of its chunk set
struct CachedIndex {
    fingerprint: String,
    index: Arc<GraphMemoryIndex>,
}

pub struct MultiStageRetriever {
    llm: Arc<dyn LlmCollaborator>,
    config: RetrieverConfig,
    index_config: IndexConfig,
    cached_index: RwLock<Option<CachedIndex>>,
    index_builds: AtomicUsize,
}

impl MultiStageRetriever {
    pub fn new(llm: Arc<dyn LlmCollaborator>) -> Self {
        Self::with_settings(llm, RetrieverConfig::default(), IndexConfig::default())
    }

    pub fn from_config(llm: Arc<dyn LlmCollaborator>, config: &ChronicleConfig) -> Self {
        Self::with_settings(llm, config.retriever.clone(), config.index.clone())
    }

    pub fn with_settings(
        llm: Arc<dyn LlmCollaborator>,
        config: RetrieverConfig,
        index_config: IndexConfig,
    ) -> Self {
        Self {
            llm,
            config,
            index_config,
            cached_index: RwLock::new(None),
            index_builds: AtomicUsize::new(0),
        }
    }

    /// Number of graph indexes built so far
    pub fn index_builds(&self) -> usize {
        self.index_builds.load(Ordering::SeqCst)
    }

    /// Select up to `k` chunks for `query` and assemble the context text.
    ///
    /// Fails only when embedding the query or judging relevance fails.
    pub async fn retrieve(
        &self,
        query: &str,
        persona: Option<&PersonaCard>,
        entity_cards: &[EntityCard],
        situation: Option<&SituationCard>,
        chunks: &[MemoryChunk],
        k: usize,
    ) -> Result<Retrieval> {
        self.retrieve_at(query, persona, entity_cards, situation, chunks, k, Utc::now())
            .await
    }

    /// [`Self::retrieve`] with recency measured from `now`
    #[allow(clippy::too_many_arguments)]
    pub async fn retrieve_at(
        &self,
        query: &str,
        persona: Option<&PersonaCard>,
        entity_cards: &[EntityCard],
        situation: Option<&SituationCard>,
        chunks: &[MemoryChunk],
        k: usize,
        now: DateTime<Utc>,
    ) -> Result<Retrieval> {
        let selected = if chunks.is_empty() || k == 0 {
            Vec::new()
        } else {
            self.select(query, entity_cards, chunks, k, now).await?
        };

        let context = assemble_context(persona, entity_cards, situation, &selected);
        Ok(Retrieval {
            chunks: selected,
            context,
        })
    }

    async fn select(
        &self,
        query: &str,
        entity_cards: &[EntityCard],
        chunks: &[MemoryChunk],
        k: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<MemoryChunk>> {
        let query_embedding = self.llm.embed(query).await?;

        // Stage 1: entity pre-filter
        let entity_ids: HashSet<String> = entity_cards
            .iter()
            .map(|c| normalize_participant(&c.entity_id))
            .filter(|id| !id.is_empty())
            .collect();
        let (pool, entity_applied) = soft_filter(chunks.iter().collect(), |c| {
            entity_ids.iter().any(|id| c.has_participant(id))
        }, !entity_ids.is_empty());

        // Stage 2: channel preference
        let preferred = infer_channel_preference(query);
        let (pool, channel_applied) = soft_filter(pool, |c| {
            c.source_kinds.iter().any(|kind| preferred.contains(kind))
        }, !preferred.is_empty());

        debug!(
            "Retrieval pool: {} of {} chunks (entity filter: {}, channel filter: {})",
            pool.len(),
            chunks.len(),
            entity_applied,
            channel_applied
        );

        // Stage 3: graph search
        let candidates_owned: Vec<MemoryChunk> = pool.into_iter().cloned().collect();
        let index = self.index_for(candidates_owned, now).await;

        let mut filter = SearchFilter::new();
        if entity_applied {
            filter = filter.with_participants(entity_ids.iter());
        }
        if channel_applied {
            filter = filter.with_source_kinds(preferred.iter().copied());
        }

        let fetch = MIN_SEARCH_CANDIDATES.max(k.saturating_mul(3));
        let mut candidates = index.search_at(&query_embedding, fetch, &filter, true, now);

        // Stage 4: relevance judgment
        if self.config.use_llm_judge && candidates.len() > k {
            let offered: Vec<RelevanceCandidate> = candidates
                .iter()
                .map(|c| RelevanceCandidate {
                    id: c.id.clone(),
                    summary: c.summary_text.clone(),
                })
                .collect();
            let verdicts = self.llm.judge_relevance(query, &offered).await?;
            let relevant: Vec<MemoryChunk> = candidates
                .iter()
                .filter(|c| verdicts.get(&c.id).copied().unwrap_or(false))
                .cloned()
                .collect();
            debug!("Judge kept {} of {} candidates", relevant.len(), candidates.len());
            if !relevant.is_empty() {
                candidates = relevant;
            }
        }

        // Stage 5: final ranking
        let mut scored: Vec<(f32, MemoryChunk)> = candidates
            .into_iter()
            .map(|c| {
                let similarity = cosine_similarity(&c.embedding, &query_embedding);
                let decay = recency_decay(c.latest_timestamp, now, self.config.half_life_days)
                    .unwrap_or(0.0);
                (SIMILARITY_WEIGHT * similarity + RECENCY_WEIGHT * decay, c)
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| sb.total_cmp(sa).then_with(|| a.level.cmp(&b.level)));
        scored.truncate(k);

        info!("Retrieved {} chunks for query ({} available)", scored.len(), chunks.len());
        Ok(scored.into_iter().map(|(_, c)| c).collect())
    }

    /// Reuse the last index when the chunk set is unchanged
    async fn index_for(&self, chunks: Vec<MemoryChunk>, now: DateTime<Utc>) -> Arc<GraphMemoryIndex> {
        let fingerprint = snapshot_fingerprint(&chunks);
        {
            let cached = self.cached_index.read().await;
            if let Some(entry) = cached.as_ref().filter(|e| e.fingerprint == fingerprint) {
                debug!("Reusing graph index over {} chunks", entry.index.len());
                return entry.index.clone();
            }
        }

        let index = Arc::new(GraphMemoryIndex::build_at(
            chunks,
            self.index_config.neighbor_count,
            self.index_config.half_life_days,
            now,
        ));
        self.index_builds.fetch_add(1, Ordering::SeqCst);

        *self.cached_index.write().await = Some(CachedIndex {
            fingerprint,
            index: index.clone(),
        });
        index
    }
}

/// Keep the items passing `keep`, unless none would remain or `active` is false.
/// Returns the pool and whether the filter actually narrowed it.
fn soft_filter<'a, F>(pool: Vec<&'a MemoryChunk>, keep: F, active: bool) -> (Vec<&'a MemoryChunk>, bool)
where
    F: Fn(&MemoryChunk) -> bool,
{
    if !active {
        return (pool, false);
    }
    let narrowed: Vec<&MemoryChunk> = pool.iter().copied().filter(|c| keep(*c)).collect();
    if narrowed.is_empty() {
        (pool, false)
    } else {
        (narrowed, true)
    }
}

const CHANNEL_KEYWORDS: [(&str, &[SourceKind]); 7] = [
    ("email", &[SourceKind::Email]),
    ("inbox", &[SourceKind::Email]),
    ("slack", &[SourceKind::Slack]),
    ("channel", &[SourceKind::Slack]),
    ("text", &[SourceKind::Imessage, SourceKind::Whatsapp]),
    ("imessage", &[SourceKind::Imessage, SourceKind::Whatsapp]),
    ("sms", &[SourceKind::Imessage, SourceKind::Whatsapp]),
];

/// Source kinds the query's wording points at; empty when it names none.
///
/// A word counts when it starts with a keyword, so plurals and inflections
/// ("emails", "texted", "channels") match.
pub fn infer_channel_preference(query: &str) -> HashSet<SourceKind> {
    let mut kinds = HashSet::new();
    for token in query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
    {
        for (keyword, matched) in CHANNEL_KEYWORDS {
            if token.starts_with(keyword) {
                kinds.extend(matched.iter().copied());
            }
        }
    }
    kinds
}

/// Render persona, entities, situation and memory into one prompt-ready block
pub fn assemble_context(
    persona: Option<&PersonaCard>,
    entity_cards: &[EntityCard],
    situation: Option<&SituationCard>,
    chunks: &[MemoryChunk],
) -> String {
    let mut out = String::new();

    out.push_str("## Persona\n");
    match persona {
        Some(p) => {
            let _ = writeln!(out, "{}: {}", p.title, p.summary_text);
        }
        None => out.push_str("(no persona provided)\n"),
    }

    out.push_str("\n## Entities\n");
    if entity_cards.is_empty() {
        out.push_str("(no entity cards)\n");
    }
    for card in entity_cards {
        let _ = writeln!(out, "- {} ({}): {}", card.title, card.entity_id, card.summary_text);
    }

    out.push_str("\n## Situation\n");
    match situation {
        Some(s) => {
            let _ = writeln!(out, "{}: {}", s.title, s.summary_text);
        }
        None => out.push_str("(no situation provided)\n"),
    }

    out.push_str("\n## Memory\n");
    if chunks.is_empty() {
        out.push_str("(no relevant memory)\n");
    }
    for chunk in chunks {
        let _ = writeln!(out, "- [L{}] {}: {}", chunk.level, chunk.id, chunk.summary_text);
    }

    out
}
