use crate::error::IngestError;
use crate::models::{ChunkingOptions, DocChunk, Document};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits text into fixed-size character windows where consecutive windows
/// share exactly `overlap_chars` characters. The final window may be shorter.
/// Operates on `char` boundaries so multi-byte input never splits a scalar.
pub fn split_text(text: &str, options: ChunkingOptions) -> Result<Vec<String>, IngestError> {
    if options.max_chars == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "max_chars must be greater than zero".to_string(),
        ));
    }

    if options.overlap_chars >= options.max_chars {
        return Err(IngestError::InvalidChunkConfig(format!(
            "overlap {} must be smaller than max chunk size {}",
            options.overlap_chars, options.max_chars
        )));
    }

    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = text.chars().collect();
    let step = options.max_chars - options.overlap_chars;
    let mut pieces = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + options.max_chars).min(chars.len());
        pieces.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(pieces)
}

/// Chunks one document, inheriting its metadata unmodified on every chunk.
/// Returns the chunks plus the next global chunk index, so callers can keep
/// a single running cursor across a whole ingestion run.
pub fn build_chunks(
    document: &Document,
    options: ChunkingOptions,
    global_index: u64,
) -> Result<(Vec<DocChunk>, u64), IngestError> {
    let mut chunks = Vec::new();
    let mut cursor = global_index;

    for (local_index, piece) in split_text(&document.text, options)?.into_iter().enumerate() {
        chunks.push(DocChunk {
            chunk_id: make_chunk_id(&document.metadata, local_index as u64, &piece),
            chunk_index: cursor,
            text: piece,
            metadata: document.metadata.clone(),
        });
        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

/// Deterministic UUID from the parent document's metadata, the chunk's
/// position within that document, and its text. Ids never depend on what
/// else is in the ingestion run, so unchanged files keep their ids across
/// runs and the vector store upserts instead of accumulating stale
/// duplicates.
fn make_chunk_id(metadata: &BTreeMap<String, String>, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    for (key, value) in metadata {
        hasher.update(key.as_bytes());
        hasher.update([0]);
        hasher.update(value.as_bytes());
        hasher.update([0]);
    }
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}
