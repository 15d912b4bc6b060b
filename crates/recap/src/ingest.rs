//! Directory scanning and input parsing
//!
//! Input files are JSON documents holding video summaries in one of a few
//! shapes; see [`InputDocument`].

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::state::{content_hash, SummaryState};

/// Summary text the video analyzer writes when its own parsing failed
const UNPARSED_ANALYSIS: &str = "Analysis could not be parsed";

/// A file found in the monitored directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// File name relative to the monitored directory
    pub key: String,
    pub path: PathBuf,
}

/// List input files directly inside `dir`, sorted by key.
///
/// Hidden files and the state file (`exclude`) are skipped.
pub fn scan(dir: &Path, extension: &str, exclude: &Path) -> Result<Vec<Candidate>> {
    let excluded = fs::canonicalize(exclude).ok();
    let mut candidates = Vec::new();

    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory {}", dir.display()))?;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let Some(key) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            continue;
        };
        if key.starts_with('.') {
            continue;
        }

        let matches_ext = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if !matches_ext {
            continue;
        }

        if excluded.is_some() && fs::canonicalize(&path).ok() == excluded {
            continue;
        }

        candidates.push(Candidate { key, path });
    }

    candidates.sort_by(|a, b| a.key.cmp(&b.key));
    debug!(dir = %dir.display(), found = candidates.len(), "Scanned directory");
    Ok(candidates)
}

/// Keep candidates the state has not seen, by name or by content
pub fn select_new(candidates: Vec<Candidate>, state: Option<&SummaryState>) -> Vec<Candidate> {
    let Some(state) = state else {
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|c| !state.is_processed(&c.key, &c.path, |p| content_hash(p).ok()))
        .collect()
}

/// One video summary record; every field is optional
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VideoRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub video_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub ai_summary: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub duration: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Accept strings, numbers and booleans as text; anything else is absent
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| scalar_text(&v)))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.trim().is_empty())
}

impl VideoRecord {
    /// A record holding only a summary text
    pub fn from_summary(text: impl Into<String>) -> Self {
        Self {
            ai_summary: Some(text.into()),
            ..Default::default()
        }
    }

    /// Text fed to the model: summary, then description, then title
    pub fn text(&self) -> Option<String> {
        if let Some(summary) = non_empty(&self.ai_summary) {
            return Some(summary.to_string());
        }
        if let Some(description) = non_empty(&self.description) {
            return Some(description.to_string());
        }
        non_empty(&self.title).map(|title| format!("Title: {}", title))
    }

    fn from_element(value: Value) -> Self {
        match value {
            Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
            other => scalar_text(&other)
                .map(Self::from_summary)
                .unwrap_or_default(),
        }
    }

    /// Convert one entry of a video-analyzer result list
    fn from_analysis(video: &Map<String, Value>) -> Option<Self> {
        let summary = video
            .get("multilingual_summaries")
            .and_then(|m| m.get("English"))
            .and_then(Value::as_str)
            .or_else(|| {
                video
                    .get("analysis")
                    .and_then(|a| a.get("summary"))
                    .and_then(Value::as_str)
            })
            .filter(|s| !s.trim().is_empty() && *s != UNPARSED_ANALYSIS)?;

        let mut metadata = Map::new();
        metadata.insert(
            "uploader".to_string(),
            video.get("uploader").cloned().unwrap_or(Value::Null),
        );
        metadata.insert(
            "view_count".to_string(),
            video.get("view_count").cloned().unwrap_or(Value::Null),
        );

        Some(Self {
            video_id: video.get("id").and_then(scalar_text),
            title: video.get("title").and_then(scalar_text),
            description: None,
            ai_summary: Some(summary.to_string()),
            duration: video
                .get("duration_minutes")
                .and_then(scalar_text)
                .map(|m| format!("{} minutes", m)),
            metadata: Some(Value::Object(metadata)),
        })
    }
}

/// Recognized keys of a wrapping object, in lookup order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperKey {
    /// `top_3_results`: output of the video search analyzer
    AnalysisResults,
    /// `videos`: list of records
    Videos,
    /// `summaries`: list of plain summary strings
    Summaries,
}

impl WrapperKey {
    const ALL: [WrapperKey; 3] = [
        WrapperKey::AnalysisResults,
        WrapperKey::Videos,
        WrapperKey::Summaries,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WrapperKey::AnalysisResults => "top_3_results",
            WrapperKey::Videos => "videos",
            WrapperKey::Summaries => "summaries",
        }
    }
}

/// The accepted shapes of an input file
#[derive(Debug, Clone, PartialEq)]
pub enum InputDocument {
    /// Top-level array of records (non-object elements count as summaries)
    List(Vec<VideoRecord>),
    /// Object carrying the records under a recognized key
    Wrapped {
        key: WrapperKey,
        records: Vec<VideoRecord>,
    },
    /// Any other object, taken as one record
    Single(VideoRecord),
}

impl InputDocument {
    /// Parse raw file content
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value = serde_json::from_slice(bytes).context("Invalid JSON")?;

        match value {
            Value::Array(items) => Ok(Self::List(
                items.into_iter().map(VideoRecord::from_element).collect(),
            )),
            Value::Object(map) => Self::from_object(map),
            other => anyhow::bail!("Unsupported JSON structure: top-level {}", kind(&other)),
        }
    }

    fn from_object(mut map: Map<String, Value>) -> Result<Self> {
        for key in WrapperKey::ALL {
            if let Some(value) = map.remove(key.as_str()) {
                return Self::from_wrapped(key, value);
            }
        }

        let record = serde_json::from_value(Value::Object(map))
            .context("Record has an unexpected shape")?;
        Ok(Self::Single(record))
    }

    fn from_wrapped(key: WrapperKey, value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => anyhow::bail!(
                "\"{}\" must be an array, found {}",
                key.as_str(),
                kind(&other)
            ),
        };

        let records = match key {
            WrapperKey::AnalysisResults => items
                .iter()
                .filter_map(Value::as_object)
                .filter_map(VideoRecord::from_analysis)
                .collect(),
            WrapperKey::Videos | WrapperKey::Summaries => {
                items.into_iter().map(VideoRecord::from_element).collect()
            }
        };

        Ok(Self::Wrapped { key, records })
    }

    pub fn records(&self) -> &[VideoRecord] {
        match self {
            Self::List(records) | Self::Wrapped { records, .. } => records,
            Self::Single(record) => std::slice::from_ref(record),
        }
    }

    /// Extract model input texts, skipping records with nothing usable
    pub fn texts(&self) -> Vec<String> {
        self.records().iter().filter_map(VideoRecord::text).collect()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
