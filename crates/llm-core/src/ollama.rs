//! Ollama API client

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Ollama service status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OllamaStatus {
    /// Service answered the probe
    Running,
    /// Service is unreachable or returned a non-success status
    Stopped,
}

/// Model information from Ollama API
#[derive(Debug, Clone, Deserialize)]
pub struct Model {
    pub name: String,
    #[serde(default)]
    pub size: u64,
}

impl Model {
    /// Get human-readable size
    pub fn size_human(&self) -> String {
        let gb = self.size as f64 / (1024.0 * 1024.0 * 1024.0);
        format!("{:.1} GB", gb)
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<Model>,
}

/// Sampling options passed through to the model
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerateOptions {
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    /// Length budget in tokens
    pub num_predict: u32,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: &'a GenerateOptions,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: Option<String>,
}

/// Ollama API client
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    client: reqwest::Client,
}

impl OllamaClient {
    /// Create a new client with default timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check if Ollama is running: `GET /api/tags` must answer 200
    pub async fn health_check(&self, timeout: Duration) -> bool {
        let url = format!("{}/api/tags", self.base_url);

        match self.client.get(&url).timeout(timeout).send().await {
            Ok(resp) => resp.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!(url = %url, error = %e, "Ollama probe failed");
                false
            }
        }
    }

    /// Get current status
    pub async fn status(&self, timeout: Duration) -> OllamaStatus {
        if self.health_check(timeout).await {
            OllamaStatus::Running
        } else {
            OllamaStatus::Stopped
        }
    }

    /// List all available models
    pub async fn list_models(&self) -> Result<Vec<Model>> {
        let url = format!("{}/api/tags", self.base_url);

        let resp: TagsResponse = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to connect to Ollama")?
            .error_for_status()
            .context("Ollama rejected the model listing")?
            .json()
            .await
            .context("Failed to parse models response")?;

        Ok(resp.models)
    }

    /// Run a non-streaming completion and return the generated text
    pub async fn generate(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let req = GenerateRequest {
            model,
            prompt,
            stream: false,
            options,
        };

        debug!(
            model,
            prompt_chars = prompt.len(),
            num_predict = options.num_predict,
            "Sending generate request"
        );

        let resp: GenerateResponse = self
            .client
            .post(&url)
            .json(&req)
            .timeout(timeout)
            .send()
            .await
            .context("Failed to reach Ollama")?
            .error_for_status()
            .context("Ollama generate request failed")?
            .json()
            .await
            .context("Failed to parse generate response")?;

        resp.response
            .context("Ollama response did not contain generated text")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one HTTP request with a canned response, handing the raw
    /// request text back through the returned receiver.
    async fn serve_once(status: &str, body: &str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(idx) = text.find("\r\n\r\n") {
                    let content_length = text[..idx]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= idx + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
            let _ = tx.send(String::from_utf8_lossy(&buf).to_string());
        });

        (format!("http://{}", addr), rx)
    }

    #[tokio::test]
    async fn test_generate_sends_non_streaming_request() {
        let (url, request) = serve_once("200 OK", r#"{"response":"a summary","done":true}"#).await;
        let client = OllamaClient::new(url).unwrap();
        let options = GenerateOptions {
            temperature: 0.7,
            top_p: Some(0.9),
            num_predict: 1500,
        };

        let text = client
            .generate("gemma3:4b", "summarize", &options, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "a summary");

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /api/generate"));
        let body = &raw[raw.find("\r\n\r\n").unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["model"], "gemma3:4b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 1500);
    }

    #[tokio::test]
    async fn test_generate_error_status() {
        let (url, _request) = serve_once("500 Internal Server Error", r#"{"error":"boom"}"#).await;
        let client = OllamaClient::new(url).unwrap();

        let result = client
            .generate("m", "p", &GenerateOptions::default(), Duration::from_secs(5))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_generate_missing_response_field() {
        let (url, _request) = serve_once("200 OK", r#"{"done":true}"#).await;
        let client = OllamaClient::new(url).unwrap();

        let result = client
            .generate("m", "p", &GenerateOptions::default(), Duration::from_secs(5))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_health_check_and_models() {
        let (url, request) =
            serve_once("200 OK", r#"{"models":[{"name":"deepseek-r1:8b","size":5000000000}]}"#).await;
        let client = OllamaClient::new(url).unwrap();
        assert!(client.health_check(Duration::from_secs(5)).await);
        assert!(request.await.unwrap().starts_with("GET /api/tags"));

        let (url, _request) =
            serve_once("200 OK", r#"{"models":[{"name":"deepseek-r1:8b","size":5000000000}]}"#).await;
        let client = OllamaClient::new(url).unwrap();
        let models = client.list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].name, "deepseek-r1:8b");
        assert_eq!(models[0].size_human(), "4.7 GB");
    }

    #[test]
    fn test_tags_with_extra_fields() {
        let body = r#"{"models":[{"name":"gemma3:4b","modified_at":"2026-01-01T00:00:00Z","size":3338801804,"digest":"a2af"},{"name":"bare"}]}"#;
        let tags: TagsResponse = serde_json::from_str(body).unwrap();
        assert_eq!(tags.models.len(), 2);
        assert_eq!(tags.models[0].name, "gemma3:4b");
        assert_eq!(tags.models[1].size, 0);
    }

    #[tokio::test]
    async fn test_health_check_unreachable() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OllamaClient::new(format!("http://{}", addr)).unwrap();
        assert!(!client.health_check(Duration::from_secs(2)).await);
        assert_eq!(
            client.status(Duration::from_secs(2)).await,
            OllamaStatus::Stopped
        );
    }

    #[test]
    fn test_options_skip_missing_top_p() {
        let options = GenerateOptions {
            temperature: 0.3,
            top_p: None,
            num_predict: 700,
        };
        let json = serde_json::to_value(&options).unwrap();
        assert!(json.get("top_p").is_none());
        assert_eq!(json["num_predict"], 700);
    }
}
