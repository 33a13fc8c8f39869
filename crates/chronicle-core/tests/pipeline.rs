//! End-to-end build → cache → index → retrieve scenarios using the offline
//! collaborator.

use chrono::{DateTime, Duration, TimeZone, Utc};
use chronicle_core::context_tree::{infer_parents, render_context_tree};
use chronicle_core::llm::FailOn;
use chronicle_core::{
    ChronicleError, ChunkDb, EntityCard, InMemoryChunkCache, Interaction, MemoryBuilder,
    MemoryChunk, MultiStageRetriever, OfflineCollaborator, SourceKind,
};
use std::collections::HashSet;
use std::sync::Arc;

const TOPICS: [&str; 6] = [
    "roadmap milestones slipped into autumn",
    "invoice reconciliation for vendor contracts",
    "weekend hiking trip logistics",
    "kernel upgrade broke staging cluster",
    "birthday gift ideas for grandma",
    "conference talk proposal deadline",
];

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
}

fn interactions(count: usize) -> Vec<Interaction> {
    let kinds = [
        SourceKind::Email,
        SourceKind::Slack,
        SourceKind::Imessage,
        SourceKind::Whatsapp,
    ];
    (0..count)
        .map(|i| {
            Interaction::new(
                format!("msg-{:03}", i),
                kinds[i % kinds.len()],
                format!("person{}@example.com", i % 7),
                format!("{} (note {})", TOPICS[(i / 12) % TOPICS.len()], i),
                start() + Duration::minutes(i as i64),
            )
            .with_recipients(vec!["me@example.com".to_string()])
        })
        .collect()
}

fn levels(chunks: &[MemoryChunk], level: u32) -> Vec<&MemoryChunk> {
    chunks.iter().filter(|c| c.level == level).collect()
}

#[tokio::test]
async fn twelve_interactions_make_one_chunk() {
    let llm = Arc::new(OfflineCollaborator::new());
    let builder = MemoryBuilder::new(llm.clone(), Arc::new(InMemoryChunkCache::new()));

    let chunks = builder.build_memory(&interactions(12), 12, 5).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].level, 0);
    assert_eq!(chunks[0].coverage(), 12);
    assert_eq!(llm.calls().summarize, 1);
}

#[tokio::test]
async fn sixty_interactions_make_five_leaves_and_a_root() {
    let llm = Arc::new(OfflineCollaborator::new());
    let builder = MemoryBuilder::new(llm.clone(), Arc::new(InMemoryChunkCache::new()));
    let input = interactions(60);

    let chunks = builder.build_memory(&input, 12, 5).await.unwrap();
    assert_eq!(chunks.len(), 6);
    assert_eq!(levels(&chunks, 0).len(), 5);
    assert_eq!(levels(&chunks, 1).len(), 1);
    assert_eq!(llm.calls().summarize, 6);
    assert_eq!(llm.calls().embed, 6);

    // Level 0 partitions the input in time order
    let leaf_ids: Vec<&str> = levels(&chunks, 0)
        .iter()
        .flat_map(|c| c.source_interaction_ids.iter().map(String::as_str))
        .collect();
    let input_ids: Vec<&str> = input.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(leaf_ids, input_ids);
    assert!(levels(&chunks, 0).iter().all(|c| c.coverage() <= 12));

    // The root unions its children
    let root = levels(&chunks, 1)[0];
    let all_ids: HashSet<&str> = input_ids.iter().copied().collect();
    assert_eq!(root.source_id_set(), all_ids);
    assert_eq!(root.participants.len(), 8);
    assert_eq!(root.source_kinds.len(), 4);
    assert_eq!(root.latest_timestamp, Some(start() + Duration::minutes(59)));
}

#[tokio::test]
async fn warm_cache_rebuild_makes_no_summaries() {
    let cache = Arc::new(InMemoryChunkCache::new());
    let input = interactions(60);

    let first = MemoryBuilder::new(Arc::new(OfflineCollaborator::new()), cache.clone())
        .build_memory(&input, 12, 5)
        .await
        .unwrap();

    let llm = Arc::new(OfflineCollaborator::new());
    let second = MemoryBuilder::new(llm.clone(), cache.clone())
        .build_memory(&input, 12, 5)
        .await
        .unwrap();

    assert_eq!(llm.calls().summarize, 0);
    assert_eq!(llm.calls().embed, 0);
    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.level, b.level);
        assert_eq!(a.source_interaction_ids, b.source_interaction_ids);
        assert_eq!(a.participants, b.participants);
        assert_eq!(a.source_kinds, b.source_kinds);
        assert_eq!(a.latest_timestamp, b.latest_timestamp);
    }
    assert_eq!(cache.counters().hits, 6);
}

#[tokio::test]
async fn redb_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.redb");
    let input = interactions(24);

    {
        let db = Arc::new(ChunkDb::open(Some(path.as_path())).unwrap());
        let chunks = MemoryBuilder::new(Arc::new(OfflineCollaborator::new()), db.clone())
            .build_memory(&input, 12, 5)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(db.len().unwrap(), 3);
    }

    let db = Arc::new(ChunkDb::open(Some(path.as_path())).unwrap());
    let llm = Arc::new(OfflineCollaborator::new());
    let chunks = MemoryBuilder::new(llm.clone(), db.clone())
        .build_memory(&input, 12, 5)
        .await
        .unwrap();
    assert_eq!(chunks.len(), 3);
    assert_eq!(llm.calls().summarize, 0);

    let stats = db.stats().unwrap();
    assert_eq!(stats.total_chunks, 3);
    assert_eq!(stats.level_counts.get(&0), Some(&2));
    assert_eq!(stats.level_counts.get(&1), Some(&1));
}

#[tokio::test]
async fn collaborator_failure_aborts_and_retry_completes() {
    let cache = Arc::new(InMemoryChunkCache::new());
    let input = interactions(60);

    let failing = Arc::new(OfflineCollaborator::new().failing_on(FailOn::SummarizeAfter(3)));
    let result = MemoryBuilder::new(failing, cache.clone())
        .build_memory(&input, 12, 5)
        .await;
    assert!(matches!(result, Err(ChronicleError::CollaboratorFailure(_))));

    let llm = Arc::new(OfflineCollaborator::new());
    let chunks = MemoryBuilder::new(llm.clone(), cache)
        .build_memory(&input, 12, 5)
        .await
        .unwrap();
    assert_eq!(chunks.len(), 6);
    assert!(llm.calls().summarize <= 6);
}

#[tokio::test]
async fn retrieval_over_built_memory() {
    let llm = Arc::new(OfflineCollaborator::new());
    let builder = MemoryBuilder::new(llm.clone(), Arc::new(InMemoryChunkCache::new()));
    let chunks = builder.build_memory(&interactions(60), 12, 5).await.unwrap();
    let now = start() + Duration::hours(2);

    let retriever = MultiStageRetriever::new(llm.clone());

    // A query equal to a middle leaf's summary selects that leaf
    let target = levels(&chunks, 0)[2].clone();
    let result = retriever
        .retrieve_at(&target.summary_text, None, &[], None, &chunks, 1, now)
        .await
        .unwrap();
    assert_eq!(result.chunks.len(), 1);
    assert_eq!(result.chunks[0].id, target.id);
    assert!(result.context.contains(&format!("- [L0] {}:", target.id)));

    // Entities nobody wrote to fall back to the full set; the judge then
    // keeps only the leaf that mentions the trip
    let stranger = EntityCard::new("ghost@nowhere.io", "Ghost", "Not in any thread");
    let result = retriever
        .retrieve_at("hiking trip", None, &[stranger.clone()], None, &chunks, 3, now)
        .await
        .unwrap();
    assert_eq!(result.chunks.len(), 1);
    assert_eq!(result.chunks[0].id, target.id);
    assert!(result.context.contains("- Ghost (ghost@nowhere.io): Not in any thread"));

    // Nothing matches the judge either, so every candidate stays in play
    let result = retriever
        .retrieve_at("quarterly numbers", None, &[stranger], None, &chunks, 3, now)
        .await
        .unwrap();
    assert_eq!(result.chunks.len(), 3);
}

#[tokio::test]
async fn context_tree_over_built_memory() {
    let builder = MemoryBuilder::new(
        Arc::new(OfflineCollaborator::new()),
        Arc::new(InMemoryChunkCache::new()),
    );
    let chunks = builder.build_memory(&interactions(60), 12, 5).await.unwrap();

    let parents = infer_parents(&chunks);
    let root = chunks.iter().position(|c| c.level == 1).unwrap();
    assert_eq!(parents[root], None);
    for (i, parent) in parents.iter().enumerate() {
        if i != root {
            assert_eq!(*parent, Some(root));
        }
    }

    let rendered = render_context_tree(&chunks);
    assert_eq!(rendered.lines().count(), 6);
    assert!(rendered.starts_with(&format!("[L1] {} (60 interactions)", chunks[root].id)));
    assert_eq!(rendered.matches("├── ").count(), 4);
    assert_eq!(rendered.matches("└── ").count(), 1);
}
