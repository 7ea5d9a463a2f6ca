#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

use crate::documents::{Metadata, PreparedDocument};

/// Boundaries tried in order, from paragraph down to single characters
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// A bounded slice of a document's text, carrying that document's metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: Metadata,
}

/// Configuration for content chunking. Sizes are measured in characters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub max_size: usize,
    /// Amount of trailing context repeated at the start of the next chunk
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_size: 1000,
            overlap: 200,
        }
    }
}

/// Split every document into chunks, preserving per-document metadata
#[inline]
pub fn split_documents(documents: &[PreparedDocument], config: &ChunkingConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for document in documents {
        let pieces = split_text(&document.text, config);
        if pieces.is_empty() {
            debug!(
                "Document {:?} produced 0 chunks",
                document.metadata.get(crate::documents::SOURCE_KEY)
            );
            continue;
        }

        chunks.extend(pieces.into_iter().map(|text| Chunk {
            text,
            metadata: document.metadata.clone(),
        }));
    }

    debug!(
        "Split {} documents into {} chunks",
        documents.len(),
        chunks.len()
    );
    chunks
}

/// Split a single text into overlapping chunks of at most `max_size` characters.
///
/// Text that already fits is returned unchanged as a single chunk; blank text
/// yields no chunks.
#[inline]
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    if char_len(text) <= config.max_size {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    split_recursive(text, &SEPARATORS, config, &mut chunks);
    chunks
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    config: &ChunkingConfig,
    chunks: &mut Vec<String>,
) {
    // The empty separator always matches, so a position is always found
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(*sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let separator = separators.get(position).copied().unwrap_or("");
    let finer = separators.get(position + 1..).unwrap_or_default();

    let mut fitting: Vec<&str> = Vec::new();

    for piece in split_keeping_separator(text, separator) {
        if char_len(piece) <= config.max_size {
            fitting.push(piece);
            continue;
        }

        if !fitting.is_empty() {
            merge_pieces(&fitting, config, chunks);
            fitting.clear();
        }

        if finer.is_empty() {
            // Only reachable with a zero max size; keep the text rather than loop
            push_chunk(piece, chunks);
        } else {
            split_recursive(piece, finer, config, chunks);
        }
    }

    if !fitting.is_empty() {
        merge_pieces(&fitting, config, chunks);
    }
}

/// Split on `separator`, keeping it attached to the end of each piece
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(start, c)| text.get(start..start + c.len_utf8()).unwrap_or_default())
            .collect();
    }

    text.split_inclusive(separator)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Greedily pack pieces into chunks, carrying up to `overlap` characters of
/// trailing pieces into the next chunk
fn merge_pieces(pieces: &[&str], config: &ChunkingConfig, chunks: &mut Vec<String>) {
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut total = 0;

    for &piece in pieces {
        let len = char_len(piece);

        if total + len > config.max_size && !window.is_empty() {
            push_chunk(&window.iter().copied().collect::<String>(), chunks);

            while total > config.overlap || (total + len > config.max_size && total > 0) {
                let Some(front) = window.pop_front() else {
                    break;
                };
                total -= char_len(front);
            }
        }

        window.push_back(piece);
        total += len;
    }

    if !window.is_empty() {
        push_chunk(&window.iter().copied().collect::<String>(), chunks);
    }
}

fn push_chunk(text: &str, chunks: &mut Vec<String>) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[inline]
fn char_len(text: &str) -> usize {
    text.chars().count()
}
