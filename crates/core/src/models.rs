use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Metadata key for the originating file path. Present on every document.
pub const META_SOURCE: &str = "source";

/// Metadata key for the category label derived from the ingestion root.
pub const META_CATEGORY: &str = "category";

/// Category assigned to files sitting directly at the ingestion root.
pub const DEFAULT_CATEGORY: &str = "general";

/// Extracted text plus provenance, as produced by a format loader.
///
/// Metadata always carries `source`; the ingestion pipeline adds `category`
/// before chunking. `BTreeMap` keeps payload ordering deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert(META_SOURCE.to_string(), source.into());
        Self {
            text: text.into(),
            metadata,
        }
    }
}

/// The atomic retrievable unit: a bounded slice of one document's text,
/// carrying the parent document's metadata unmodified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocChunk {
    pub chunk_id: String,
    pub chunk_index: u64,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

/// A chunk as returned by vector search or reranking, with its score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    pub score: f64,
    pub metadata: BTreeMap<String, String>,
}

impl RetrievedChunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(META_SOURCE).map(String::as_str)
    }

    pub fn category(&self) -> Option<&str> {
        self.metadata.get(META_CATEGORY).map(String::as_str)
    }
}

/// A synthesized answer together with everything a caller needs to render
/// citations. An answer without its supporting sources is not a valid result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,
    /// Deduplicated, lexicographically sorted `source` values.
    pub sources: Vec<String>,
    /// Raw text of each context chunk handed to the model.
    pub contexts: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingOptions {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingOptions {
    fn default() -> Self {
        Self {
            max_chars: 900,
            overlap_chars: 120,
        }
    }
}

/// HNSW construction parameters handed to the vector store.
#[derive(Debug, Clone, Copy)]
pub struct HnswParams {
    /// Neighbor fan-out per graph node.
    pub m: usize,
    /// Search breadth during construction.
    pub ef_construct: usize,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construct: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Candidates fetched from vector search.
    pub top_k: usize,
    /// Candidates kept after reranking.
    pub rerank_top_n: usize,
    /// Cosine similarity at or above which a cached question counts as a hit.
    pub cache_threshold: f32,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            rerank_top_n: 3,
            cache_threshold: 0.98,
        }
    }
}

/// A file the ingestion run could not use, with the reason it was skipped.
#[derive(Debug, Clone)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Aggregate outcome of one ingestion run. Skipped files are diagnostics,
/// not failures; a fatal stage error surfaces as `Err` instead.
#[derive(Debug)]
pub struct IngestionReport {
    pub documents_loaded: usize,
    pub chunks_indexed: usize,
    pub skipped_files: Vec<SkippedFile>,
    pub finished_at: DateTime<Utc>,
}
