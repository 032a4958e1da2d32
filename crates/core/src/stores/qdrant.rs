use crate::cache::SemanticCacheStore;
use crate::models::{Answer, DocChunk, HnswParams, RetrievedChunk, META_CATEGORY};
use crate::traits::VectorStore;
use crate::QueryError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Qdrant REST gateway. Payload carries the chunk text plus all metadata
/// fields at the top level so category filtering is an exact-match payload
/// condition.
pub struct QdrantGateway {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantGateway {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    /// Creates the collection with cosine distance if it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), QueryError> {
        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        // 409 means the collection already exists.
        if response.status().is_success() || response.status().as_u16() == 409 {
            return Ok(());
        }

        Err(QueryError::BackendResponse {
            backend: "qdrant".to_string(),
            details: response.status().to_string(),
        })
    }
}

#[async_trait]
impl VectorStore for QdrantGateway {
    async fn add_chunks(
        &self,
        chunks: &[DocChunk],
        embeddings: &[Vec<f32>],
    ) -> Result<(), QueryError> {
        if chunks.len() != embeddings.len() {
            return Err(QueryError::Request(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let points = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, embedding)| {
                if embedding.len() != self.vector_size {
                    return Err(QueryError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        self.vector_size
                    )));
                }

                let mut payload = Map::new();
                payload.insert("text".to_string(), Value::String(chunk.text.clone()));
                payload.insert("chunk_index".to_string(), json!(chunk.chunk_index));
                for (key, value) in &chunk.metadata {
                    payload.insert(key.clone(), Value::String(value.clone()));
                }

                Ok(json!({
                    "id": chunk.chunk_id,
                    "vector": embedding,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        category: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, QueryError> {
        if query_vector.len() != self.vector_size {
            return Err(QueryError::Request(format!(
                "query vector dim {} is not {}",
                query_vector.len(),
                self.vector_size
            )));
        }

        let mut body = json!({
            "vector": query_vector,
            "limit": limit,
            "with_payload": true,
        });

        if let Some(category) = category {
            body["filter"] = json!({
                "must": [{
                    "key": META_CATEGORY,
                    "match": { "value": category },
                }]
            });
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut result = Vec::new();
        for hit in hits {
            let chunk_id = hit
                .pointer("/id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();

            let mut metadata = BTreeMap::new();
            if let Some(payload) = hit.pointer("/payload").and_then(Value::as_object) {
                for (key, value) in payload {
                    if key == "text" {
                        continue;
                    }
                    if let Some(value) = value.as_str() {
                        metadata.insert(key.clone(), value.to_string());
                    }
                }
            }

            result.push(RetrievedChunk {
                chunk_id,
                text,
                score,
                metadata,
            });
        }

        Ok(result)
    }

    async fn build_index(&self, params: &HnswParams) -> Result<(), QueryError> {
        // Qdrant applies hnsw_config changes through its background
        // optimizers; searches keep working on the existing graph meanwhile.
        let response = self
            .client
            .patch(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "hnsw_config": {
                    "m": params.m,
                    "ef_construct": params.ef_construct,
                }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

/// Semantic answer cache in a dedicated Qdrant collection, so cached answers
/// survive process restarts. Entries are append-only; `lookup` lets the
/// store's own nearest-neighbour search apply the similarity threshold.
pub struct QdrantSemanticCache {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantSemanticCache {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    /// Creates the cache collection with cosine distance if it does not
    /// exist yet.
    pub async fn ensure_collection(&self) -> Result<(), QueryError> {
        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, self.collection))
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;

        if response.status().is_success() || response.status().as_u16() == 409 {
            return Ok(());
        }

        Err(QueryError::BackendResponse {
            backend: "qdrant-cache".to_string(),
            details: response.status().to_string(),
        })
    }
}

fn parse_cached_answer(hit: &Value) -> Option<Answer> {
    let payload = hit.pointer("/payload/answer")?;
    serde_json::from_value(payload.clone()).ok()
}

#[async_trait]
impl SemanticCacheStore for QdrantSemanticCache {
    async fn lookup(
        &self,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<Answer>, QueryError> {
        if embedding.len() != self.vector_size {
            return Err(QueryError::Request(format!(
                "cache lookup vector dim {} is not {}",
                embedding.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "vector": embedding,
                "limit": 1,
                "with_payload": true,
                "score_threshold": threshold,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "qdrant-cache".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(parsed.pointer("/result/0").and_then(parse_cached_answer))
    }

    async fn store(&self, embedding: Vec<f32>, answer: Answer) -> Result<(), QueryError> {
        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "points": [{
                    "id": Uuid::new_v4().to_string(),
                    "vector": embedding,
                    "payload": { "answer": answer },
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "qdrant-cache".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_answer_round_trips_through_payload() {
        let answer = Answer {
            text: "Twenty days per year.".to_string(),
            sources: vec!["hr/vacation.md".to_string()],
            contexts: vec!["Employees get twenty vacation days.".to_string()],
        };

        let hit = json!({
            "id": "3f2b7f0e-0000-0000-0000-000000000000",
            "score": 0.99,
            "payload": { "answer": answer },
        });

        let parsed = parse_cached_answer(&hit).expect("payload should parse");
        assert_eq!(parsed.text, answer.text);
        assert_eq!(parsed.sources, answer.sources);
        assert_eq!(parsed.contexts, answer.contexts);
    }

    #[test]
    fn malformed_cache_payload_is_a_miss() {
        let missing = json!({ "id": "x", "score": 0.99, "payload": {} });
        assert!(parse_cached_answer(&missing).is_none());

        let wrong_shape = json!({
            "id": "x",
            "score": 0.99,
            "payload": { "answer": { "text": 7 } },
        });
        assert!(parse_cached_answer(&wrong_shape).is_none());
    }
}
