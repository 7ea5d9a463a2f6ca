use super::*;
use crate::documents::{Document, MetadataValue, SOURCE_KEY};

fn config(max_size: usize, overlap: usize) -> ChunkingConfig {
    ChunkingConfig { max_size, overlap }
}

fn numbered_words(count: usize) -> String {
    (0..count)
        .map(|i| format!("word{:04}", i))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Length in characters of the longest prefix of `next` that is also a suffix of `prev`
fn shared_boundary(prev: &str, next: &str) -> usize {
    let prev: Vec<char> = prev.chars().collect();
    let next: Vec<char> = next.chars().collect();
    (1..=prev.len().min(next.len()))
        .rev()
        .find(|&k| prev[prev.len() - k..] == next[..k])
        .unwrap_or(0)
}

#[test]
fn short_text_is_a_single_unchanged_chunk() {
    let text = "  The capital of France is Paris.\n";
    let chunks = split_text(text, &ChunkingConfig::default());
    assert_eq!(chunks, vec![text.to_string()]);
}

#[test]
fn text_of_exactly_max_size_is_not_split() {
    let text = "a".repeat(50);
    let chunks = split_text(&text, &config(50, 10));
    assert_eq!(chunks, vec![text]);
}

#[test]
fn empty_and_blank_text_yield_no_chunks() {
    assert!(split_text("", &ChunkingConfig::default()).is_empty());
    assert!(split_text(" \n\n\t ", &ChunkingConfig::default()).is_empty());
}

#[test]
fn long_text_respects_max_size_and_overlaps() {
    let text = numbered_words(400);
    let cfg = config(100, 30);

    let chunks = split_text(&text, &cfg);
    assert!(chunks.len() > 1);

    for chunk in &chunks {
        assert!(
            chunk.chars().count() <= cfg.max_size,
            "chunk too long: {} chars",
            chunk.chars().count()
        );
    }

    for pair in chunks.windows(2) {
        let shared = shared_boundary(&pair[0], &pair[1]);
        assert!(shared > 0, "no overlap between {:?} and {:?}", pair[0], pair[1]);
        assert!(shared <= cfg.overlap, "overlap {} exceeds configured", shared);
    }

    // Every word of the input survives somewhere
    for i in [0, 1, 199, 398, 399] {
        let word = format!("word{:04}", i);
        assert!(chunks.iter().any(|c| c.contains(&word)), "{} lost", word);
    }
}

#[test]
fn zero_overlap_produces_disjoint_chunks() {
    let text = numbered_words(100);
    let chunks = split_text(&text, &config(60, 0));

    let rejoined = chunks.join(" ");
    assert_eq!(rejoined, text);
}

#[test]
fn prefers_paragraph_boundaries() {
    let p1 = "a".repeat(40);
    let p2 = "b".repeat(40);
    let p3 = "c".repeat(40);
    let text = format!("{}\n\n{}\n\n{}", p1, p2, p3);

    let chunks = split_text(&text, &config(100, 0));
    assert_eq!(chunks, vec![format!("{}\n\n{}", p1, p2), p3.clone()]);

    let chunks = split_text(&text, &config(100, 50));
    assert_eq!(
        chunks,
        vec![format!("{}\n\n{}", p1, p2), format!("{}\n\n{}", p2, p3)]
    );
}

#[test]
fn falls_back_to_sentence_boundaries() {
    let text = (1..=12)
        .map(|i| format!("Sentence number {:02} is here.", i))
        .collect::<Vec<_>>()
        .join(" ");

    let chunks = split_text(&text, &config(100, 0));
    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.starts_with("Sentence"), "bad start: {:?}", chunk);
        assert!(chunk.ends_with('.'), "bad end: {:?}", chunk);
    }
}

#[test]
fn unbroken_text_is_split_by_characters() {
    let text = "x".repeat(2500);
    let chunks = split_text(&text, &config(1000, 200));

    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|c| c.chars().count() <= 1000));
    assert_eq!(chunks[0].len(), 1000);
    assert_eq!(chunks[2].len(), 900);
}

#[test]
fn sizes_are_counted_in_characters() {
    let text = "é".repeat(300);
    let chunks = split_text(&text, &config(100, 10));
    assert!(chunks.len() >= 3);
    assert!(chunks.iter().all(|c| c.chars().count() <= 100));
}

#[test]
fn chunks_carry_their_document_metadata() {
    let documents = vec![
        Document::new(numbered_words(300), "a.pdf")
            .with_metadata("page", 1)
            .prepare(),
        Document::new("", "empty.pdf").prepare(),
        Document::new("Short second document.", "b.pdf")
            .with_metadata("page", 7)
            .prepare(),
    ];

    let chunks = split_documents(&documents, &config(200, 40));

    let from_a: Vec<_> = chunks
        .iter()
        .filter(|c| c.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str) == Some("a.pdf"))
        .collect();
    assert!(from_a.len() > 1);
    assert!(from_a.iter().all(|c| c.metadata == documents[0].metadata));

    assert!(
        !chunks
            .iter()
            .any(|c| c.metadata.get(SOURCE_KEY).and_then(MetadataValue::as_str)
                == Some("empty.pdf"))
    );

    let last = chunks.last().expect("has chunks");
    assert_eq!(last.text, "Short second document.");
    assert_eq!(last.metadata.get("page").and_then(MetadataValue::as_u64), Some(7));
}
