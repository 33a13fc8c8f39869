//! Parent/child view over a flat chunk list, rendered as an indented tree.
//!
//! A chunk's parent is the lowest-level chunk whose covered interactions
//! strictly contain its own.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::memory::MemoryChunk;

const PREVIEW_WORDS: usize = 12;

/// Parent position for each chunk, `None` for roots
pub fn infer_parents(chunks: &[MemoryChunk]) -> Vec<Option<usize>> {
    let id_sets: Vec<HashSet<&str>> = chunks.iter().map(MemoryChunk::source_id_set).collect();

    (0..chunks.len())
        .map(|child| {
            (0..chunks.len())
                .filter(|&candidate| {
                    candidate != child
                        && id_sets[candidate].len() > id_sets[child].len()
                        && id_sets[child].is_subset(&id_sets[candidate])
                })
                .min_by(|&a, &b| level_then_id(&chunks[a], &chunks[b]))
        })
        .collect()
}

fn level_then_id(a: &MemoryChunk, b: &MemoryChunk) -> Ordering {
    a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id))
}

/// ASCII tree of `chunks`, highest levels first
pub fn render_context_tree(chunks: &[MemoryChunk]) -> String {
    if chunks.is_empty() {
        return "(empty)\n".to_string();
    }

    let parents = infer_parents(chunks);
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); chunks.len()];
    let mut roots = Vec::new();
    for (node, parent) in parents.iter().enumerate() {
        match parent {
            Some(p) => children[*p].push(node),
            None => roots.push(node),
        }
    }

    roots.sort_by(|&a, &b| {
        chunks[b]
            .level
            .cmp(&chunks[a].level)
            .then_with(|| chunks[a].id.cmp(&chunks[b].id))
    });
    for list in &mut children {
        list.sort_by(|&a, &b| level_then_id(&chunks[a], &chunks[b]));
    }

    let mut out = String::new();
    for &root in &roots {
        out.push_str(&describe(&chunks[root]));
        out.push('\n');
        render_children(chunks, &children, root, "", &mut out);
    }
    out
}

fn render_children(
    chunks: &[MemoryChunk],
    children: &[Vec<usize>],
    node: usize,
    prefix: &str,
    out: &mut String,
) {
    let list = &children[node];
    for (i, &child) in list.iter().enumerate() {
        let last = i + 1 == list.len();
        out.push_str(prefix);
        out.push_str(if last { "└── " } else { "├── " });
        out.push_str(&describe(&chunks[child]));
        out.push('\n');

        let deeper = format!("{}{}", prefix, if last { "    " } else { "│   " });
        render_children(chunks, children, child, &deeper, out);
    }
}

fn describe(chunk: &MemoryChunk) -> String {
    format!(
        "[L{}] {} ({} interactions) {}",
        chunk.level,
        chunk.id,
        chunk.coverage(),
        preview(&chunk.summary_text)
    )
}

fn preview(text: &str) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > PREVIEW_WORDS {
        format!("{}…", words[..PREVIEW_WORDS].join(" "))
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, level: u32, sources: &[&str], summary: &str) -> MemoryChunk {
        MemoryChunk {
            id: id.to_string(),
            level,
            summary_text: summary.to_string(),
            embedding: vec![1.0],
            source_interaction_ids: sources.iter().map(|s| s.to_string()).collect(),
            participants: Vec::new(),
            source_kinds: Vec::new(),
            latest_timestamp: None,
        }
    }

    fn sample() -> Vec<MemoryChunk> {
        vec![
            chunk("a", 0, &["1", "2"], "first pair"),
            chunk("b", 0, &["3", "4"], "second pair"),
            chunk("c", 0, &["5"], "lonely"),
            chunk("p", 1, &["1", "2", "3", "4"], "both pairs"),
            chunk("r", 2, &["1", "2", "3", "4", "5"], "everything"),
        ]
    }

    #[test]
    fn test_parent_is_lowest_strict_superset() {
        let parents = infer_parents(&sample());
        assert_eq!(parents, vec![Some(3), Some(3), Some(4), Some(4), None]);
    }

    #[test]
    fn test_equal_sets_are_not_parents() {
        let chunks = vec![
            chunk("x", 0, &["1"], "leaf"),
            chunk("y", 1, &["1"], "same coverage"),
        ];
        assert_eq!(infer_parents(&chunks), vec![None, None]);
    }

    #[test]
    fn test_parent_ties_go_to_smaller_id() {
        let chunks = vec![
            chunk("leaf", 0, &["1"], "leaf"),
            chunk("zeta", 1, &["1", "2"], "z"),
            chunk("alpha", 1, &["1", "3"], "a"),
        ];
        assert_eq!(infer_parents(&chunks)[0], Some(2));
    }

    #[test]
    fn test_render_tree() {
        let rendered = render_context_tree(&sample());
        let expected = "\
[L2] r (5 interactions) everything
├── [L0] c (1 interactions) lonely
└── [L1] p (4 interactions) both pairs
    ├── [L0] a (2 interactions) first pair
    └── [L0] b (2 interactions) second pair
";
        assert_eq!(rendered, expected);
    }

    #[test]
    fn test_preview_truncates_long_summaries() {
        let long = "one two three four five six seven eight nine ten eleven twelve thirteen";
        assert_eq!(
            preview(long),
            "one two three four five six seven eight nine ten eleven twelve…"
        );
        assert_eq!(preview("short  text"), "short text");
        assert_eq!(render_context_tree(&[]), "(empty)\n");
    }
}
