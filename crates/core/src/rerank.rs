use crate::error::QueryError;
use crate::models::RetrievedChunk;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Second-pass relevance scoring over the vector-search candidates. This is
/// a hard dependency of retrieval: a failure here fails the query.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedChunk>,
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, QueryError>;
}

#[async_trait]
impl<T> Reranker for Arc<T>
where
    T: Reranker + ?Sized,
{
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedChunk>,
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        (**self).rerank(query, candidates, top_n).await
    }
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f64,
}

/// Client for a Cohere-style `/rerank` endpoint: posts the query plus the
/// candidate texts, gets back indices ordered by cross-encoder relevance.
pub struct HttpReranker {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpReranker {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievedChunk>,
        top_n: usize,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let documents: Vec<&str> = candidates
            .iter()
            .map(|candidate| candidate.text.as_str())
            .collect();

        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "query": query,
            "documents": documents,
            "top_n": top_n,
        }));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "rerank".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: RerankResponse = response.json().await?;

        let mut reranked = Vec::with_capacity(parsed.results.len().min(top_n));
        for result in parsed.results.into_iter().take(top_n) {
            let candidate =
                candidates
                    .get(result.index)
                    .ok_or_else(|| QueryError::BackendResponse {
                        backend: "rerank".to_string(),
                        details: format!(
                            "result index {} out of range for {} candidates",
                            result.index,
                            candidates.len()
                        ),
                    })?;

            let mut candidate = candidate.clone();
            candidate.score = result.relevance_score;
            reranked.push(candidate);
        }

        Ok(reranked)
    }
}
