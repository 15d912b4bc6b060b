//! Connection settings for the Ollama server

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 11434;
pub const DEFAULT_MODEL: &str = "deepseek-r1:8b";

/// `[ollama]` section of the agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OllamaConfig {
    /// Host name or IP of the Ollama server
    #[serde(default = "default_host")]
    pub host: String,

    /// Port of the Ollama server
    #[serde(default = "default_port")]
    pub port: u16,

    /// Full base URL; takes precedence over host/port when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Model used for both the classification and the summary call
    #[serde(default = "default_model")]
    pub model: String,

    /// Availability probe timeout
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// Timeout of the detail-level classification call
    #[serde(default = "default_classify_timeout")]
    pub classify_timeout_secs: u64,

    /// Timeout of the summary generation call
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout_secs: u64,
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_classify_timeout() -> u64 {
    120
}

fn default_generate_timeout() -> u64 {
    180
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            url: None,
            model: default_model(),
            probe_timeout_secs: default_probe_timeout(),
            classify_timeout_secs: default_classify_timeout(),
            generate_timeout_secs: default_generate_timeout(),
        }
    }
}

impl OllamaConfig {
    /// Get Ollama base URL
    pub fn base_url(&self) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn generate_timeout(&self) -> Duration {
        Duration::from_secs(self.generate_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url(), "http://localhost:11434");
        assert_eq!(config.model, "deepseek-r1:8b");
        assert_eq!(config.generate_timeout(), Duration::from_secs(180));
        assert_eq!(config.classify_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_parse_partial_section() {
        let toml = r#"
host = "10.0.0.7"
model = "gemma3:4b"
generate_timeout_secs = 300
"#;

        let config: OllamaConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.base_url(), "http://10.0.0.7:11434");
        assert_eq!(config.model, "gemma3:4b");
        assert_eq!(config.generate_timeout_secs, 300);
        assert_eq!(config.probe_timeout_secs, 5);
    }

    #[test]
    fn test_url_overrides_host_and_port() {
        let config = OllamaConfig {
            url: Some("http://gpu-box:8080/".to_string()),
            ..Default::default()
        };
        assert_eq!(config.base_url(), "http://gpu-box:8080");
    }
}
