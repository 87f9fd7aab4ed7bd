//! Completion module for Paracad — text generation via a local Ollama server
//!
//! Both pipeline stages that talk to a language model go through the
//! `CompletionBackend` trait: the instruction parser (small general model)
//! and the code generator (coder model). Each stage holds its own client so
//! the two can run different models against the same server.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

// ============================================================================
// CompletionBackend trait
// ============================================================================

/// Abstraction over text-completion providers.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run a single non-streaming completion and return the raw response text.
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;

    /// Model name for logging and result metadata.
    fn model(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Model returned an empty response")]
    EmptyResponse,

    #[error("All {attempts} retry attempts failed")]
    RetryExhausted { attempts: usize },
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    /// Upper bound on generated tokens (`num_predict` in Ollama terms).
    pub num_predict: u32,
    pub timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl CompletionConfig {
    pub fn new(base_url: String, model: String) -> Self {
        Self {
            base_url,
            model,
            temperature: 0.1,
            num_predict: 1500,
            timeout_seconds: 120,
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }
}

// ============================================================================
// Ollama API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaVersionResponse {
    version: String,
}

// ============================================================================
// OllamaCompletionClient
// ============================================================================

/// Ollama completion client — calls `POST /api/generate` with `stream: false`.
#[derive(Debug, Clone)]
pub struct OllamaCompletionClient {
    client: Client,
    config: CompletionConfig,
}

impl OllamaCompletionClient {
    pub fn new(config: CompletionConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    /// Probe the server with `GET /api/version`. Used at startup so a dead
    /// model server is reported before the first request, not during it.
    pub async fn check_server(&self) -> Result<String, CompletionError> {
        let url = format!("{}/api/version", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Api {
                code: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let version: OllamaVersionResponse = response.json().await?;
        Ok(version.version)
    }

    async fn complete_once(&self, prompt: &str) -> Result<String, CompletionError> {
        let url = format!("{}/api/generate", self.config.base_url);

        let request = OllamaGenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.num_predict,
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OllamaErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Ollama generate API error");

            return Err(CompletionError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let generate_response: OllamaGenerateResponse = response.json().await?;

        match generate_response.response {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(CompletionError::EmptyResponse),
        }
    }
}

#[async_trait]
impl CompletionBackend for OllamaCompletionClient {
    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let retry_strategy = ExponentialBackoff::from_millis(self.config.retry_delay_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.config.max_retries);

        let result = Retry::spawn(retry_strategy, || self.complete_once(prompt)).await;

        match result {
            Ok(text) => Ok(text),
            Err(e) => {
                tracing::error!(
                    model = %self.config.model,
                    attempts = self.config.max_retries,
                    error = %e,
                    "All completion retry attempts failed"
                );
                Err(CompletionError::RetryExhausted {
                    attempts: self.config.max_retries,
                })
            }
        }
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> CompletionConfig {
        CompletionConfig {
            base_url: base_url.to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            temperature: 0.1,
            num_predict: 1500,
            timeout_seconds: 10,
            max_retries: 3,
            retry_delay_ms: 50,
        }
    }

    #[tokio::test]
    async fn test_complete_sends_non_streaming_request() {
        let mock_server = MockServer::start().await;
        let client = OllamaCompletionClient::new(test_config(&mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "qwen2.5-coder:7b",
                "stream": false,
                "options": { "temperature": 0.1, "num_predict": 1500 }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "def run(context):\n    pass",
                "done": true
            })))
            .mount(&mock_server)
            .await;

        let result = client.complete("generate something").await;
        assert!(result.is_ok(), "Expected Ok, got: {:?}", result.err());
        assert!(result.unwrap().contains("def run(context)"));
    }

    #[tokio::test]
    async fn test_complete_retries_then_succeeds() {
        let mock_server = MockServer::start().await;
        let client = OllamaCompletionClient::new(test_config(&mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": "model runner has unexpectedly stopped"
            })))
            .up_to_n_times(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "import adsk.core",
                "done": true
            })))
            .mount(&mock_server)
            .await;

        let result = client.complete("prompt").await;
        assert!(result.is_ok(), "Expected success after retries");
    }

    #[tokio::test]
    async fn test_complete_exhausts_retries_on_persistent_failure() {
        let mock_server = MockServer::start().await;
        let client = OllamaCompletionClient::new(test_config(&mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": "model 'qwen2.5-coder:7b' not found"
            })))
            .mount(&mock_server)
            .await;

        let result = client.complete("prompt").await;
        match result {
            Err(CompletionError::RetryExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("Expected RetryExhausted, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_rejects_empty_response() {
        let mock_server = MockServer::start().await;
        let client = OllamaCompletionClient::new(test_config(&mock_server.uri())).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "",
                "done": true
            })))
            .mount(&mock_server)
            .await;

        let result = client.complete("prompt").await;
        assert!(result.is_err(), "Empty response must be an error, not an empty script");
    }

    #[tokio::test]
    async fn test_check_server_returns_version() {
        let mock_server = MockServer::start().await;
        let client = OllamaCompletionClient::new(test_config(&mock_server.uri())).unwrap();

        Mock::given(method("GET"))
            .and(path("/api/version"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "version": "0.5.7"
            })))
            .mount(&mock_server)
            .await;

        let version = client.check_server().await.unwrap();
        assert_eq!(version, "0.5.7");
    }

    #[tokio::test]
    async fn test_check_server_fails_when_unreachable() {
        // Port 1 is never listening
        let config = test_config("http://127.0.0.1:1");
        let client = OllamaCompletionClient::new(config).unwrap();
        assert!(client.check_server().await.is_err());
    }
}
