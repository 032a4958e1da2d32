use crate::error::QueryError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 1536;

/// Text-to-vector contract shared by indexing, query, and cache similarity.
/// Embedding is a long-latency external call, so the trait is async.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QueryError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl<T> Embedder for Arc<T>
where
    T: Embedder + ?Sized,
{
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QueryError> {
        (**self).embed_batch(texts).await
    }
}

/// Client for an OpenAI-compatible `/embeddings` endpoint.
pub struct HttpEmbedder {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    client: Client,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            api_key: None,
            dimensions,
            client: Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    async fn request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, QueryError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "input": input,
        }));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "embeddings".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        parse_embedding_rows(&parsed, input.len(), self.dimensions)
    }
}

/// Rows may arrive in any order; each carries an `index` naming the input it
/// belongs to, and that field is authoritative when pairing vectors with
/// their texts.
fn parse_embedding_rows(
    parsed: &Value,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, QueryError> {
    let invalid = |details: String| QueryError::BackendResponse {
        backend: "embeddings".to_string(),
        details,
    };

    let rows = parsed
        .pointer("/data")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("missing data array".to_string()))?;

    if rows.len() != expected {
        return Err(invalid(format!(
            "expected {expected} embeddings, got {}",
            rows.len()
        )));
    }

    let mut vectors: Vec<Option<Vec<f32>>> = vec![None; expected];
    for (position, row) in rows.iter().enumerate() {
        let index = row
            .pointer("/index")
            .and_then(Value::as_u64)
            .map(|index| index as usize)
            .unwrap_or(position);

        if index >= expected {
            return Err(invalid(format!("embedding index {index} out of range")));
        }

        let values = row
            .pointer("/embedding")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid(format!("row {index} missing embedding")))?;

        let vector: Vec<f32> = values
            .iter()
            .filter_map(Value::as_f64)
            .map(|value| value as f32)
            .collect();

        if vector.len() != dimensions {
            return Err(invalid(format!(
                "embedding dimension {} != configured {dimensions}",
                vector.len()
            )));
        }

        vectors[index] = Some(vector);
    }

    vectors
        .into_iter()
        .enumerate()
        .map(|(index, vector)| {
            vector.ok_or_else(|| invalid(format!("no embedding returned for input {index}")))
        })
        .collect()
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        Ok(vectors.remove(0))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, QueryError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

/// Deterministic signed feature-hashing embedder over word tokens and
/// character 4-grams. No network, stable output; used for offline runs and
/// tests.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    pub dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

impl HashingEmbedder {
    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();

        for word in lowered.split_whitespace() {
            bump(&mut vector, word);
        }

        let chars: Vec<char> = lowered.chars().filter(|c| !c.is_whitespace()).collect();
        for window in chars.windows(4) {
            bump(&mut vector, &window.iter().collect::<String>());
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

/// The hash picks both the bucket and the sign, so colliding features cancel
/// instead of piling up in the same direction.
fn bump(vector: &mut [f32], feature: &str) {
    let hash = feature_hash(feature);
    let bucket = (hash >> 1) as usize % vector.len();
    let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
    vector[bucket] += sign;
}

fn feature_hash(feature: &str) -> u64 {
    let mut hash = 5381u64;
    for byte in feature.bytes() {
        hash = hash.wrapping_mul(33) ^ u64::from(byte);
    }
    hash ^= hash >> 29;
    hash.wrapping_mul(0x9e37_79b9_7f4a_7c15)
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, QueryError> {
        Ok(self.embed_sync(text))
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_embedding_rows, Embedder, HashingEmbedder};
    use crate::error::QueryError;
    use serde_json::json;

    #[tokio::test]
    async fn hashing_embedder_is_deterministic() {
        let embedder = HashingEmbedder::default();
        let first = embedder.embed("remote work policy").await.unwrap();
        let second = embedder.embed("remote work policy").await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn hashing_embedder_outputs_expected_length() {
        let embedder = HashingEmbedder { dimensions: 32 };
        let vector = embedder.embed("abc").await.unwrap();
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn hashing_embedder_normalizes_magnitude() {
        let embedder = HashingEmbedder::default();
        let vector = embedder
            .embed("vacation days and parental leave policy")
            .await
            .unwrap();
        let magnitude: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn different_texts_produce_different_vectors() {
        let embedder = HashingEmbedder::default();
        let left = embedder.embed("vacation day allowance").await.unwrap();
        let right = embedder.embed("on-call rotation schedule").await.unwrap();
        assert_ne!(left, right);
    }

    #[test]
    fn embedding_rows_are_matched_by_index_field() {
        let parsed = json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });

        let vectors = parse_embedding_rows(&parsed, 2, 2).unwrap();

        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn duplicate_index_leaves_an_input_uncovered() {
        let parsed = json!({
            "data": [
                { "index": 0, "embedding": [1.0, 0.0] },
                { "index": 0, "embedding": [0.0, 1.0] },
            ]
        });

        assert!(matches!(
            parse_embedding_rows(&parsed, 2, 2),
            Err(QueryError::BackendResponse { .. })
        ));
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let parsed = json!({
            "data": [
                { "index": 5, "embedding": [1.0, 0.0] },
            ]
        });

        assert!(parse_embedding_rows(&parsed, 1, 2).is_err());
    }
}
