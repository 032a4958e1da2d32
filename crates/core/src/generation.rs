use crate::error::QueryError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

/// The external generation model, consumed as prompt-in text-out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, QueryError>;
}

#[async_trait]
impl<T> ChatModel for Arc<T>
where
    T: ChatModel + ?Sized,
{
    async fn generate(&self, prompt: &str) -> Result<String, QueryError> {
        (**self).generate(prompt).await
    }
}

/// Client for an OpenAI-compatible chat completions endpoint.
pub struct HttpChatModel {
    endpoint: String,
    model: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpChatModel {
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
impl ChatModel for HttpChatModel {
    async fn generate(&self, prompt: &str) -> Result<String, QueryError> {
        let mut request = self.client.post(&self.endpoint).json(&json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt },
            ],
        }));

        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(QueryError::BackendResponse {
                backend: "chat".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let text = parsed
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| QueryError::BackendResponse {
                backend: "chat".to_string(),
                details: "response missing message content".to_string(),
            })?;

        Ok(text.trim().to_string())
    }
}
