//! ============================================================================
//! Core Types for Chronicle
//! ============================================================================
//! Raw interactions as they arrive from ingestion, the context cards that
//! accompany a retrieval call, and the crate-wide error type.
//! These types are serialized to JSON for the CLI's input/output files.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel an interaction arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Email,
    Imessage,
    Slack,
    Whatsapp,
    Note,
    Doc,
    Calendar,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Email => "email",
            SourceKind::Imessage => "imessage",
            SourceKind::Slack => "slack",
            SourceKind::Whatsapp => "whatsapp",
            SourceKind::Note => "note",
            SourceKind::Doc => "doc",
            SourceKind::Calendar => "calendar",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "email" => Ok(SourceKind::Email),
            "imessage" => Ok(SourceKind::Imessage),
            "slack" => Ok(SourceKind::Slack),
            "whatsapp" => Ok(SourceKind::Whatsapp),
            "note" => Ok(SourceKind::Note),
            "doc" => Ok(SourceKind::Doc),
            "calendar" => Ok(SourceKind::Calendar),
            _ => Err(format!("Unknown source kind: {}", s)),
        }
    }
}

/// A single raw communication. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    pub source_kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    /// Email subject, document title, calendar event name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_or_title: Option<String>,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

impl Interaction {
    pub fn new(
        id: impl Into<String>,
        source_kind: SourceKind,
        from: impl Into<String>,
        body: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            source_kind,
            thread_id: None,
            from: from.into(),
            to: Vec::new(),
            subject_or_title: None,
            body: body.into(),
            timestamp,
        }
    }

    pub fn with_recipients(mut self, to: Vec<String>) -> Self {
        self.to = to;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject_or_title = Some(subject.into());
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Sender followed by recipients, in message order
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.from.as_str()).chain(self.to.iter().map(String::as_str))
    }
}

// ============================================================================
// Context Cards
// ============================================================================
// Produced by card builders outside this crate. Only their text reaches the
// assembled context, and entity ids drive participant filtering.

/// Who the assistant is speaking for
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaCard {
    pub id: String,
    pub title: String,
    pub summary_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// A person or organisation the query is about
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCard {
    pub id: String,
    /// Identifier matched against chunk participants (usually an address)
    pub entity_id: String,
    pub title: String,
    pub summary_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

/// What is going on right now
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SituationCard {
    pub id: String,
    pub title: String,
    pub summary_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl PersonaCard {
    pub fn new(title: impl Into<String>, summary_text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            summary_text: summary_text.into(),
            embedding: Vec::new(),
        }
    }
}

impl EntityCard {
    pub fn new(
        entity_id: impl Into<String>,
        title: impl Into<String>,
        summary_text: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_id: entity_id.into(),
            title: title.into(),
            summary_text: summary_text.into(),
            embedding: Vec::new(),
        }
    }
}

impl SituationCard {
    pub fn new(title: impl Into<String>, summary_text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            summary_text: summary_text.into(),
            embedding: Vec::new(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error types for memory building and retrieval
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ChronicleError {
    #[error("Collaborator call failed: {0}")]
    CollaboratorFailure(String),

    #[error("Invalid index query: {0}")]
    InvalidIndexQuery(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Builder task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, ChronicleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("Email".parse::<SourceKind>().unwrap(), SourceKind::Email);
        assert_eq!(" whatsapp ".parse::<SourceKind>().unwrap(), SourceKind::Whatsapp);
        assert!("fax".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_source_kind_serde_is_snake_case() {
        let json = serde_json::to_string(&SourceKind::Imessage).unwrap();
        assert_eq!(json, "\"imessage\"");
    }

    #[test]
    fn test_interaction_addresses() {
        let interaction = Interaction::new("i1", SourceKind::Email, "a@x.com", "hi", Utc::now())
            .with_recipients(vec!["b@x.com".into(), "c@x.com".into()]);
        let addresses: Vec<_> = interaction.addresses().collect();
        assert_eq!(addresses, vec!["a@x.com", "b@x.com", "c@x.com"]);
    }

    #[test]
    fn test_interaction_json_defaults() {
        let json = r#"{
            "id": "m1",
            "source_kind": "slack",
            "from": "alice",
            "body": "ship it",
            "timestamp": "2024-03-01T12:00:00Z"
        }"#;
        let interaction: Interaction = serde_json::from_str(json).unwrap();
        assert!(interaction.to.is_empty());
        assert!(interaction.thread_id.is_none());
        assert_eq!(interaction.source_kind, SourceKind::Slack);
    }
}
