use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One classification request: a fixed instruction template plus the
/// role-labeled transcript, with a temperature/length budget.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// External text-classification oracle. Optional and non-deterministic; the
/// classifier treats any error identically to the oracle being absent.
#[async_trait]
pub trait ClassificationOracle: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<String>;
}

/// Request body for an Ollama-style /api/generate endpoint.
#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// HTTP oracle backed by a local Ollama-compatible inference server.
pub struct OllamaOracle {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaOracle {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Default local instance at the standard Ollama port.
    pub fn default_local(model: &str) -> Self {
        Self::new("http://localhost:11434", model, 30)
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ClassificationOracle for OllamaOracle {
    async fn complete(&self, request: &OracleRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt: &request.prompt,
            system: &request.system,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        // The outer timeout bounds the whole exchange; the pipeline must
        // never suspend indefinitely on the oracle.
        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&url).json(&body).send(),
        )
        .await
        .map_err(|_| anyhow!("oracle timed out after {}s", self.timeout.as_secs()))?
        .map_err(|e| {
            if e.is_connect() {
                anyhow!("cannot reach oracle at {}", self.base_url)
            } else {
                anyhow!("oracle transport error: {e}")
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("oracle returned status {status}: {body}");
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("oracle response parsing failed: {e}"))?;

        Ok(parsed.response)
    }
}

/// Canned-response oracle for tests.
pub struct MockOracle {
    response: Option<String>,
}

impl MockOracle {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
        }
    }

    /// An oracle whose every call fails, simulating an unreachable service.
    pub fn failing() -> Self {
        Self { response: None }
    }
}

#[async_trait]
impl ClassificationOracle for MockOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String> {
        match &self.response {
            Some(response) => Ok(response.clone()),
            None => bail!("mock oracle configured to fail"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ollama_oracle_trims_trailing_slash() {
        let oracle = OllamaOracle::new("http://localhost:11434/", "llama3", 10);
        assert_eq!(oracle.base_url, "http://localhost:11434");
        assert_eq!(oracle.model(), "llama3");
    }

    #[test]
    fn test_default_local_uses_standard_port() {
        let oracle = OllamaOracle::default_local("llama3");
        assert_eq!(oracle.base_url, "http://localhost:11434");
        assert_eq!(oracle.timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_mock_oracle_returns_canned_response() {
        let oracle = MockOracle::new("canned");
        let request = OracleRequest {
            system: String::new(),
            prompt: "p".to_string(),
            temperature: 0.2,
            max_tokens: 16,
        };
        assert_eq!(oracle.complete(&request).await.unwrap(), "canned");
    }

    #[tokio::test]
    async fn test_failing_mock_oracle_errors() {
        let oracle = MockOracle::failing();
        let request = OracleRequest {
            system: String::new(),
            prompt: "p".to_string(),
            temperature: 0.2,
            max_tokens: 16,
        };
        assert!(oracle.complete(&request).await.is_err());
    }
}
