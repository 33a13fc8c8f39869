//! ============================================================================
//! Search Filter - metadata predicate applied during index traversal
//! ============================================================================
//! Every present clause must pass; an absent or empty clause passes anything.
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::memory::{normalize_participant, MemoryChunk};
use crate::types::SourceKind;

/// Query-time chunk predicate
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilter {
    /// Any overlap with chunk participants admits (case-insensitive)
    #[serde(default)]
    pub required_participants: Option<HashSet<String>>,

    /// Any overlap with chunk source kinds admits
    #[serde(default)]
    pub allowed_source_kinds: Option<HashSet<SourceKind>>,

    /// Inclusive bounds on `latest_timestamp`
    #[serde(default)]
    pub time_window: Option<TimeWindow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| timestamp >= s) && self.end.map_or(true, |e| timestamp <= e)
    }
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_participants<I, S>(mut self, participants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = participants
            .into_iter()
            .map(|p| normalize_participant(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        self.required_participants = Some(set);
        self
    }

    pub fn with_source_kinds<I>(mut self, kinds: I) -> Self
    where
        I: IntoIterator<Item = SourceKind>,
    {
        self.allowed_source_kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn with_time_window(
        mut self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        self.time_window = Some(TimeWindow { start, end });
        self
    }

    /// True when no clause constrains anything
    pub fn is_empty(&self) -> bool {
        self.required_participants.as_ref().map_or(true, |p| p.is_empty())
            && self.allowed_source_kinds.as_ref().map_or(true, |k| k.is_empty())
            && self.time_window.is_none()
    }

    pub fn admits(&self, chunk: &MemoryChunk) -> bool {
        if let Some(required) = self.required_participants.as_ref().filter(|p| !p.is_empty()) {
            if !required.iter().any(|r| chunk.has_participant(r)) {
                return false;
            }
        }

        if let Some(allowed) = self.allowed_source_kinds.as_ref().filter(|k| !k.is_empty()) {
            if !chunk.source_kinds.iter().any(|k| allowed.contains(k)) {
                return false;
            }
        }

        if let (Some(window), Some(timestamp)) = (self.time_window, chunk.latest_timestamp) {
            if !window.contains(timestamp) {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Interaction;
    use chrono::{Duration, TimeZone};

    fn chunk_from(from: &str, kind: SourceKind, ts: Option<DateTime<Utc>>) -> MemoryChunk {
        let when = ts.unwrap_or_else(Utc::now);
        let mut chunk = MemoryChunk::from_interactions(
            &[Interaction::new("i", kind, from, "hello", when)],
            "s".into(),
            vec![1.0],
        );
        chunk.latest_timestamp = ts;
        chunk
    }

    #[test]
    fn test_participant_clause_case_insensitive() {
        let chunk = chunk_from("a@x.com", SourceKind::Email, None);

        assert!(SearchFilter::new().admits(&chunk));
        assert!(!SearchFilter::new().with_participants(["b@x.com"]).admits(&chunk));
        assert!(SearchFilter::new().with_participants(["A@X.COM"]).admits(&chunk));
        assert!(SearchFilter::new()
            .with_participants(["b@x.com", "a@x.com"])
            .admits(&chunk));
    }

    #[test]
    fn test_directly_filled_set_still_case_insensitive() {
        let chunk = chunk_from("a@x.com", SourceKind::Email, None);
        let filter = SearchFilter {
            required_participants: Some(["A@X.COM".to_string()].into_iter().collect()),
            ..SearchFilter::default()
        };
        assert!(filter.admits(&chunk));
    }

    #[test]
    fn test_source_kind_clause() {
        let chunk = chunk_from("a@x.com", SourceKind::Slack, None);
        assert!(SearchFilter::new().with_source_kinds([SourceKind::Slack]).admits(&chunk));
        assert!(!SearchFilter::new()
            .with_source_kinds([SourceKind::Email, SourceKind::Imessage])
            .admits(&chunk));
        assert!(SearchFilter::new().with_source_kinds(Vec::new()).admits(&chunk));
    }

    #[test]
    fn test_time_window_clause() {
        let t = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let inside = chunk_from("a@x.com", SourceKind::Email, Some(t));
        let undated = chunk_from("a@x.com", SourceKind::Email, None);

        let window = SearchFilter::new().with_time_window(Some(t - Duration::days(1)), Some(t));
        assert!(window.admits(&inside));
        assert!(window.admits(&undated));

        let later = SearchFilter::new().with_time_window(Some(t + Duration::seconds(1)), None);
        assert!(!later.admits(&inside));
        assert!(later.admits(&undated));
    }

    #[test]
    fn test_clauses_are_anded() {
        let chunk = chunk_from("a@x.com", SourceKind::Email, None);
        let filter = SearchFilter::new()
            .with_participants(["a@x.com"])
            .with_source_kinds([SourceKind::Slack]);
        assert!(!filter.admits(&chunk));
        assert!(!filter.is_empty());
        assert!(SearchFilter::new().with_participants(Vec::<String>::new()).is_empty());
    }
}
