pub mod cache;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod loaders;
pub mod models;
pub mod pipeline;
pub mod rerank;
pub mod stores;
pub mod synthesize;
pub mod traits;

pub use cache::{cosine_similarity, InMemorySemanticCache, SemanticCacheStore};
pub use chunking::{build_chunks, normalize_whitespace, split_text};
pub use embeddings::{Embedder, HashingEmbedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{IngestError, QueryError};
pub use generation::{ChatModel, HttpChatModel};
pub use ingest::{derive_category, discover_source_files, IngestionPipeline};
pub use loaders::{loader_for_extension, DocumentLoader, DocxLoader, PdfLoader, TextLoader};
pub use models::{
    Answer, ChunkingOptions, DocChunk, Document, HnswParams, IngestionReport, QueryOptions,
    RetrievedChunk, SkippedFile, DEFAULT_CATEGORY, META_CATEGORY, META_SOURCE,
};
pub use pipeline::QueryPipeline;
pub use rerank::{HttpReranker, Reranker};
pub use stores::{QdrantGateway, QdrantSemanticCache};
pub use synthesize::{build_prompt, collect_sources, synthesize_answer, GROUNDING_INSTRUCTION};
pub use traits::VectorStore;
