//! ============================================================================
//! Memory Types - Summarized, embedded chunks of interaction history
//! ============================================================================
//! A chunk at level 0 summarizes raw interactions; a chunk at level n
//! summarizes level n-1 chunks. Metadata is always the union of what the
//! chunk covers.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::types::{Interaction, SourceKind};

/// A compressed, embedded summary of interaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryChunk {
    /// Unique identifier for this chunk
    pub id: String,
    /// Height in the summary tree (0 = direct interaction summary)
    pub level: u32,
    pub summary_text: String,
    pub embedding: Vec<f32>,
    /// Interaction ids covered, in first-seen order
    pub source_interaction_ids: Vec<String>,
    /// Lower-cased sender/recipient addresses
    pub participants: Vec<String>,
    pub source_kinds: Vec<SourceKind>,
    // Always serialized: the redb cache stores chunks with bincode
    #[serde(default)]
    pub latest_timestamp: Option<DateTime<Utc>>,
}

impl MemoryChunk {
    /// Create a level-0 chunk describing a group of interactions
    pub fn from_interactions(
        interactions: &[Interaction],
        summary_text: String,
        embedding: Vec<f32>,
    ) -> Self {
        let mut participants = Vec::new();
        let mut source_kinds = Vec::new();
        for interaction in interactions {
            extend_participants(&mut participants, interaction.addresses());
            push_unique(&mut source_kinds, interaction.source_kind);
        }

        Self {
            id: Uuid::new_v4().to_string(),
            level: 0,
            summary_text,
            embedding,
            source_interaction_ids: interactions.iter().map(|i| i.id.clone()).collect(),
            participants,
            source_kinds,
            latest_timestamp: interactions.iter().map(|i| i.timestamp).max(),
        }
    }

    /// Create a chunk one level above `children`, unioning their metadata
    pub fn from_children(
        level: u32,
        children: &[MemoryChunk],
        summary_text: String,
        embedding: Vec<f32>,
    ) -> Self {
        let mut source_interaction_ids = Vec::new();
        let mut seen = HashSet::new();
        let mut participants = Vec::new();
        let mut source_kinds = Vec::new();

        for child in children {
            for id in &child.source_interaction_ids {
                if seen.insert(id.as_str()) {
                    source_interaction_ids.push(id.clone());
                }
            }
            extend_participants(&mut participants, child.participants.iter().map(String::as_str));
            for kind in &child.source_kinds {
                push_unique(&mut source_kinds, *kind);
            }
        }

        Self {
            id: Uuid::new_v4().to_string(),
            level,
            summary_text,
            embedding,
            source_interaction_ids,
            participants,
            source_kinds,
            latest_timestamp: children.iter().filter_map(|c| c.latest_timestamp).max(),
        }
    }

    /// Number of distinct interactions this chunk covers
    pub fn coverage(&self) -> usize {
        self.source_interaction_ids.len()
    }

    pub fn source_id_set(&self) -> HashSet<&str> {
        self.source_interaction_ids.iter().map(String::as_str).collect()
    }

    pub fn has_participant(&self, address: &str) -> bool {
        let needle = normalize_participant(address);
        self.participants.iter().any(|p| *p == needle)
    }
}

/// Canonical form for participant comparison
pub fn normalize_participant(address: &str) -> String {
    address.trim().to_lowercase()
}

fn extend_participants<'a>(into: &mut Vec<String>, addresses: impl Iterator<Item = &'a str>) {
    for address in addresses {
        let normalized = normalize_participant(address);
        if !normalized.is_empty() && !into.contains(&normalized) {
            into.push(normalized);
        }
    }
}

fn push_unique<T: PartialEq>(into: &mut Vec<T>, value: T) {
    if !into.contains(&value) {
        into.push(value);
    }
}
