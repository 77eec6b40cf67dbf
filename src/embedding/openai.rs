//! OpenAI-compatible embedding client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use super::{EmbeddingError, EmbeddingProvider};
use crate::config::EmbeddingConfig;

/// Embeddings client that talks to OpenAI-compatible `/embeddings` endpoints.
///
/// The API key is read once at construction; a missing key is reported on first use so the
/// process can still start and serve requests that do not need embeddings.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    dimensions: Option<usize>,
    max_retries: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Builds a client from the embedding configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        Self::new(
            api_key,
            config.api_key_env.clone(),
            &config.base_url,
            config.model.clone(),
            config.dimensions,
            Duration::from_secs(config.timeout_secs),
            config.max_retries,
            config.batch_size,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        api_key: Option<String>,
        api_key_env: String,
        base_url: &str,
        model: String,
        dimensions: Option<usize>,
        timeout: Duration,
        max_retries: usize,
        batch_size: usize,
    ) -> Result<Self, EmbeddingError> {
        if model.trim().is_empty() {
            return Err(EmbeddingError::InitializationError(
                "missing embedding model name".to_string(),
            ));
        }
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self {
            client,
            endpoint,
            api_key,
            api_key_env,
            model,
            dimensions,
            max_retries: max_retries.max(1),
            batch_size: batch_size.max(1),
        })
    }

    /// Maximum inputs sent per HTTP request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn request_batch(
        &self,
        api_key: &str,
        inputs: &[String],
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbeddingError::InitializationError("invalid API key".to_string()))?;

        let mut attempt = 0usize;
        loop {
            let request = EmbeddingRequest {
                model: &self.model,
                input: inputs,
                dimensions: self.dimensions,
            };
            let response = self
                .client
                .post(&self.endpoint)
                .header(AUTHORIZATION, auth.clone())
                .json(&request)
                .send()
                .await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let mut parsed: EmbeddingResponse = resp.json().await.map_err(|e| {
                            EmbeddingError::Request(format!(
                                "failed to parse embedding response: {}",
                                e
                            ))
                        })?;
                        parsed.data.sort_by_key(|entry| entry.index);
                        if parsed.data.len() != inputs.len() {
                            return Err(EmbeddingError::CountMismatch {
                                expected: inputs.len(),
                                actual: parsed.data.len(),
                            });
                        }
                        return Ok(parsed
                            .data
                            .into_iter()
                            .map(|entry| entry.embedding)
                            .collect());
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if should_retry(status) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::Request(format!(
                        "embeddings request failed ({}): {}",
                        status, body
                    )));
                }
                Err(err) => {
                    if is_retryable_error(&err) && attempt + 1 < self.max_retries {
                        attempt += 1;
                        tokio::time::sleep(retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(EmbeddingError::Request(err.to_string()));
                }
            }
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| EmbeddingError::MissingCredential(self.api_key_env.clone()))?;

        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            embeddings.extend(self.request_batch(api_key, batch).await?);
        }

        if let Some(first) = embeddings.first() {
            let expected = first.len();
            if let Some(bad) = embeddings.iter().find(|e| e.len() != expected) {
                return Err(EmbeddingError::DimensionMismatch {
                    expected,
                    actual: bad.len(),
                });
            }
        }

        Ok(embeddings)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

fn should_retry(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_body() || err.is_request()
}

fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(250 * (1 << capped))
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn embedder(api_key: Option<String>) -> OpenAiEmbedder {
        OpenAiEmbedder::new(
            api_key,
            "TEST_EMBED_KEY".to_string(),
            "http://127.0.0.1:9/v1/",
            "text-embedding-3-small".to_string(),
            None,
            Duration::from_secs(1),
            1,
            16,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_reported_on_use() {
        let err = embedder(None)
            .embed_batch(&["hello".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EmbeddingError::MissingCredential(var) if var == "TEST_EMBED_KEY"));
    }

    #[tokio::test]
    async fn test_empty_batch_needs_no_key() {
        let result = embedder(None).embed_batch(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_endpoint_normalized() {
        assert_eq!(embedder(None).endpoint, "http://127.0.0.1:9/v1/embeddings");
    }

    #[test]
    fn test_response_sorted_by_index() {
        let mut parsed: EmbeddingResponse = serde_json::from_str(
            r#"{"data":[{"embedding":[0.0,1.0],"index":1},{"embedding":[1.0,0.0],"index":0}]}"#,
        )
        .unwrap();
        parsed.data.sort_by_key(|entry| entry.index);
        assert_eq!(parsed.data[0].embedding, vec![1.0, 0.0]);
    }

    #[test]
    fn test_retry_policy() {
        assert!(should_retry(StatusCode::TOO_MANY_REQUESTS));
        assert!(should_retry(StatusCode::BAD_GATEWAY));
        assert!(!should_retry(StatusCode::UNAUTHORIZED));
        assert!(retry_backoff(10) == retry_backoff(5));
    }
}
