use crate::error::QueryError;
use crate::models::{DocChunk, HnswParams, RetrievedChunk};
use async_trait::async_trait;
use std::sync::Arc;

/// Gateway to the persistent vector index. One long-lived connection shared
/// by both pipelines; implementations must tolerate reads while the index is
/// being (re)built.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Bulk upsert of chunks with their embeddings. Chunk ids are stable, so
    /// re-ingesting unchanged content overwrites in place.
    async fn add_chunks(
        &self,
        chunks: &[DocChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), QueryError>;

    /// K-nearest search, optionally restricted to one category by
    /// exact-match metadata filter.
    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, QueryError>;

    /// (Re)configure the similarity index over all stored entries. The store
    /// applies this in the background; reads are never blocked.
    async fn build_index(&self, params: &HnswParams) -> Result<(), QueryError>;
}

// Both pipelines hold the same long-lived gateway through an `Arc` handle.
#[async_trait]
impl<T> VectorStore for Arc<T>
where
    T: VectorStore + ?Sized,
{
    async fn add_chunks(
        &self,
        chunks: &[DocChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), QueryError> {
        (**self).add_chunks(chunks, embeddings).await
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        (**self).search(query_vector, limit, category).await
    }

    async fn build_index(&self, params: &HnswParams) -> Result<(), QueryError> {
        (**self).build_index(params).await
    }
}
