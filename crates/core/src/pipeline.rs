use crate::cache::SemanticCacheStore;
use crate::embeddings::Embedder;
use crate::error::QueryError;
use crate::generation::ChatModel;
use crate::models::{Answer, QueryOptions, RetrievedChunk};
use crate::rerank::Reranker;
use crate::synthesize::synthesize_answer;
use crate::traits::VectorStore;
use tracing::{debug, warn};

/// Question answering over ingested documents: semantic cache probe, then
/// filtered vector search + rerank, then grounded synthesis. All
/// collaborators are injected, so tests run against fakes and multiple
/// isolated instances can coexist in one process.
pub struct QueryPipeline<E, S, R, M, C>
where
    E: Embedder,
    S: VectorStore,
    R: Reranker,
    M: ChatModel,
    C: SemanticCacheStore,
{
    embedder: E,
    store: S,
    reranker: R,
    chat: M,
    cache: C,
    options: QueryOptions,
}

impl<E, S, R, M, C> QueryPipeline<E, S, R, M, C>
where
    E: Embedder + Send + Sync,
    S: VectorStore + Send + Sync,
    R: Reranker + Send + Sync,
    M: ChatModel + Send + Sync,
    C: SemanticCacheStore + Send + Sync,
{
    pub fn new(embedder: E, store: S, reranker: R, chat: M, cache: C) -> Self {
        Self {
            embedder,
            store,
            reranker,
            chat,
            cache,
            options: QueryOptions::default(),
        }
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    /// Answers a question from the indexed documents, optionally restricted
    /// to one category. Cache hits and fresh answers return the same shape;
    /// callers cannot tell them apart except by latency.
    pub async fn answer_with_docs(
        &self,
        question: &str,
        category: Option<&str>,
    ) -> Result<Answer, QueryError> {
        if question.trim().is_empty() {
            return Err(QueryError::Request("question is empty".to_string()));
        }

        let query_vector = self.embedder.embed(question).await?;

        if let Some(cached) = self
            .cache
            .lookup(&query_vector, self.options.cache_threshold)
            .await?
        {
            debug!("semantic cache hit");
            return Ok(cached);
        }

        let chunks = self
            .retrieve_ranked(&query_vector, question, category)
            .await?;
        let answer = synthesize_answer(&self.chat, question, &chunks).await?;

        // The answer is already valid at this point; a failed cache write
        // costs a future hit, not this query.
        if let Err(cache_error) = self.cache.store(query_vector, answer.clone()).await {
            warn!(error = %cache_error, "semantic cache write failed");
        }

        Ok(answer)
    }

    /// Raw reranked retrieval, for callers that render their own answers.
    pub async fn retrieve(
        &self,
        question: &str,
        category: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        let query_vector = self.embedder.embed(question).await?;
        self.retrieve_ranked(&query_vector, question, category).await
    }

    async fn retrieve_ranked(
        &self,
        query_vector: &[f32],
        question: &str,
        category: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        let candidates = self
            .store
            .search(query_vector, self.options.top_k, category)
            .await?;

        self.reranker
            .rerank(question, candidates, self.options.rerank_top_n)
            .await
    }
}
