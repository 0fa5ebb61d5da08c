//! Text-generation backends
//!
//! Every backend exposes a single blocking request/response call. Failures of
//! any kind (connection refused, timeout, HTTP error status, unexpected body)
//! come back as [`LabelerError::ModelUnavailable`]; nothing here retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::{ModelConfig, ModelProvider};
use crate::error::{LabelerError, Result};

/// Trait defining the generative backend so the classifier can be tested
/// without a model server
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one prompt and return the raw completion text
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for Box<T> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.as_ref().generate(prompt).await
    }
}

fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LabelerError::ConfigError(format!("HTTP client error: {}", e)))
}

#[derive(Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

/// Local Ollama server, `/api/generate` endpoint
pub struct OllamaGenerator {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Calling Ollama model {} at {}", self.model, self.endpoint);

        let body = OllamaRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let parsed: OllamaResponse = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(parsed.response)
    }
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

/// Google Gemini, `models/{model}:generateContent` endpoint
pub struct GeminiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiGenerator {
    pub fn new(base_url: &str, model: &str, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                base_url.trim_end_matches('/'),
                model
            ),
            api_key,
        })
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!("Calling Gemini at {}", self.endpoint);

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let parsed: GeminiResponse = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // A response without candidates means the prompt was blocked or the
        // body was not what we expect; either way there is no answer to use.
        parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<String>()
            })
            .ok_or_else(|| {
                LabelerError::ModelUnavailable("Gemini response has no candidates".to_string())
            })
    }
}

/// Build the backend selected in the configuration
pub fn build_generator(config: &ModelConfig) -> Result<Box<dyn TextGenerator>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    match config.provider {
        ModelProvider::Ollama => Ok(Box::new(OllamaGenerator::new(
            config.base_url(),
            &config.model,
            timeout,
        )?)),
        ModelProvider::Gemini => {
            let api_key = std::env::var(&config.api_key_env).map_err(|_| {
                LabelerError::ConfigError(format!("{} not set", config.api_key_env))
            })?;
            Ok(Box::new(GeminiGenerator::new(
                config.base_url(),
                &config.model,
                api_key,
                timeout,
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_ollama_returns_response_field() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.1:8b",
                "stream": false
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": " Finance\n", "done": true })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&server.uri(), "llama3.1:8b", Duration::from_secs(5)).unwrap();
        let text = generator.generate("classify this").await.unwrap();
        assert_eq!(text, " Finance\n");
    }

    #[tokio::test]
    async fn test_ollama_server_error_is_model_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&server.uri(), "llama3.1:8b", Duration::from_secs(5)).unwrap();
        let err = generator.generate("classify this").await.unwrap_err();
        assert!(matches!(err, LabelerError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ollama_malformed_body_is_model_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&server.uri(), "llama3.1:8b", Duration::from_secs(5)).unwrap();
        let err = generator.generate("classify this").await.unwrap_err();
        assert!(matches!(err, LabelerError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ollama_timeout_is_model_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "response": "Work" }))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let generator =
            OllamaGenerator::new(&server.uri(), "llama3.1:8b", Duration::from_millis(50))
                .unwrap();
        let err = generator.generate("classify this").await.unwrap_err();
        assert!(matches!(err, LabelerError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_model_unavailable() {
        // Nothing listens on port 9 (discard) in the test environment
        let generator =
            OllamaGenerator::new("http://127.0.0.1:9", "llama3.1:8b", Duration::from_secs(2))
                .unwrap();
        let err = generator.generate("classify this").await.unwrap_err();
        assert!(matches!(err, LabelerError::ModelUnavailable(_)));
    }

    #[tokio::test]
    async fn test_gemini_joins_candidate_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .and(header("x-goog-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [
                    { "content": { "parts": [{ "text": "Fin" }, { "text": "ance" }] } }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new(
            &server.uri(),
            "gemini-pro",
            "test-key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(generator.generate("prompt").await.unwrap(), "Finance");
    }

    #[tokio::test]
    async fn test_gemini_without_candidates_is_model_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-pro:generateContent"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            )
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new(
            &server.uri(),
            "gemini-pro",
            "test-key".to_string(),
            Duration::from_secs(5),
        )
        .unwrap();
        let err = generator.generate("prompt").await.unwrap_err();
        assert!(matches!(err, LabelerError::ModelUnavailable(_)));
    }

    #[test]
    #[serial]
    fn test_build_gemini_requires_api_key() {
        let config = ModelConfig {
            provider: ModelProvider::Gemini,
            api_key_env: "GMAIL_AI_LABELER_TEST_KEY".to_string(),
            ..ModelConfig::default()
        };

        std::env::remove_var("GMAIL_AI_LABELER_TEST_KEY");
        let err = build_generator(&config).err().unwrap();
        assert!(err.to_string().contains("GMAIL_AI_LABELER_TEST_KEY not set"));

        std::env::set_var("GMAIL_AI_LABELER_TEST_KEY", "secret");
        assert!(build_generator(&config).is_ok());
        std::env::remove_var("GMAIL_AI_LABELER_TEST_KEY");
    }

    #[test]
    fn test_build_ollama() {
        assert!(build_generator(&ModelConfig::default()).is_ok());
    }
}
