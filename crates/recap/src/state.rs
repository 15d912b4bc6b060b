//! Persistence for the consolidated summary state
//!
//! The whole state lives in one JSON document. Every cycle builds a new
//! value from the previous one and replaces the file atomically.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Accumulated result of every cycle so far
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryState {
    /// Items (videos) summarized across all processed files
    pub total_videos: u64,
    /// Number of processed files
    pub total_files: u64,
    /// Latest consolidated description, or the generation fallback text
    pub overall_ai_description: String,
    /// File keys in the order they were processed
    pub processed_files: Vec<String>,
    /// File key to content hash
    pub file_hashes: BTreeMap<String, String>,
    #[serde(default)]
    pub summary_metadata: SummaryMetadata,
}

/// Free-form metadata; known keys are typed, anything else is kept as-is
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor_directory: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl SummaryMetadata {
    /// Metadata stamped with the current local time
    pub fn now(model: &str, monitor_directory: &Path) -> Self {
        Self {
            model_used: Some(model.to_string()),
            last_updated: Some(chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()),
            monitor_directory: Some(monitor_directory.display().to_string()),
            extra: BTreeMap::new(),
        }
    }
}

/// One file committed by a cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub key: String,
    pub hash: String,
    pub items: usize,
}

impl SummaryState {
    /// Check if a file has been processed, by key or by content.
    ///
    /// `compute_hash` returns `None` when the file cannot be read, in which
    /// case only the key is consulted.
    pub fn is_processed<F>(&self, key: &str, path: &Path, compute_hash: F) -> bool
    where
        F: FnOnce(&Path) -> Option<String>,
    {
        if self.contains_file(key) {
            return true;
        }
        compute_hash(path).is_some_and(|hash| self.contains_hash(&hash))
    }

    pub fn contains_file(&self, key: &str) -> bool {
        self.processed_files.iter().any(|f| f == key)
    }

    pub fn contains_hash(&self, hash: &str) -> bool {
        self.file_hashes.values().any(|h| h == hash)
    }

    /// Build the successor of `previous` after committing `files`.
    ///
    /// File list and hash map only grow; keys already known are ignored.
    pub fn merged(
        previous: Option<&SummaryState>,
        files: &[FileRecord],
        description: String,
        metadata: SummaryMetadata,
    ) -> SummaryState {
        let mut processed_files = previous
            .map(|p| p.processed_files.clone())
            .unwrap_or_default();
        let mut file_hashes = previous.map(|p| p.file_hashes.clone()).unwrap_or_default();
        let mut total_videos = previous.map_or(0, |p| p.total_videos);

        let mut known: HashSet<String> = processed_files.iter().cloned().collect();
        for file in files {
            if !known.insert(file.key.clone()) {
                continue;
            }
            processed_files.push(file.key.clone());
            file_hashes.insert(file.key.clone(), file.hash.clone());
            total_videos += file.items as u64;
        }

        SummaryState {
            total_videos,
            total_files: processed_files.len() as u64,
            overall_ai_description: description,
            processed_files,
            file_hashes,
            summary_metadata: metadata,
        }
    }

    /// Check structural invariants of a loaded state
    pub fn validate(&self) -> Result<()> {
        if self.processed_files.len() as u64 != self.total_files {
            anyhow::bail!(
                "total_files is {} but {} files are listed",
                self.total_files,
                self.processed_files.len()
            );
        }

        let listed: HashSet<&str> = self.processed_files.iter().map(String::as_str).collect();
        if listed.len() != self.processed_files.len() {
            anyhow::bail!("processed_files contains duplicates");
        }
        if let Some(orphan) = self.file_hashes.keys().find(|k| !listed.contains(k.as_str())) {
            anyhow::bail!("hash recorded for unlisted file {}", orphan);
        }

        Ok(())
    }
}

/// SHA-256 of a byte buffer, lowercase hex
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of a file's full content
pub fn content_hash(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(hash_bytes(&bytes))
}

/// Single-file store for [`SummaryState`]
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted state. Missing, unreadable or corrupt files all
    /// yield `None`; only the latter two are logged as warnings.
    pub fn load(&self) -> Option<SummaryState> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No persisted state");
            return None;
        }

        match self.try_load() {
            Ok(state) => {
                debug!(
                    path = %self.path.display(),
                    files = state.total_files,
                    videos = state.total_videos,
                    "Loaded state"
                );
                Some(state)
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %format!("{e:#}"), "Could not load existing state, starting fresh");
                None
            }
        }
    }

    fn try_load(&self) -> Result<SummaryState> {
        let json = fs::read_to_string(&self.path).context("Failed to read state file")?;
        let state: SummaryState = serde_json::from_str(&json).context("Failed to parse state")?;
        state.validate().context("State file is inconsistent")?;
        Ok(state)
    }

    /// Write the state to a sibling temp file, sync it, then rename it over
    /// the target so readers never observe a partial document.
    pub fn save(&self, state: &SummaryState) -> Result<()> {
        let json = serde_json::to_string_pretty(state).context("Failed to serialize state")?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.temp_path();
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(json.as_bytes())
                .context("Failed to write state file")?;
            file.write_all(b"\n")?;
            file.sync_all().context("Failed to sync state file")?;
        }

        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("Failed to replace {}", self.path.display()));
        }

        info!(path = %self.path.display(), files = state.total_files, "Saved state");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state.json".to_string());
        self.path.with_file_name(format!(".{}.tmp", name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(key: &str, hash: &str, items: usize) -> FileRecord {
        FileRecord {
            key: key.to_string(),
            hash: hash.to_string(),
            items,
        }
    }

    fn sample_state() -> SummaryState {
        SummaryState::merged(
            None,
            &[record("a.json", "h1", 2), record("b.json", "h2", 3)],
            "overall".to_string(),
            SummaryMetadata::now("test-model", Path::new("./video_summaries")),
        )
    }

    fn create_test_store() -> (StateStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = StateStore::new(dir.path().join("overall_summary.json"));
        (store, dir)
    }

    #[test]
    fn test_merged_from_nothing() {
        let state = sample_state();
        assert_eq!(state.total_videos, 5);
        assert_eq!(state.total_files, 2);
        assert_eq!(state.processed_files, vec!["a.json", "b.json"]);
        assert_eq!(state.file_hashes.get("b.json").map(String::as_str), Some("h2"));
        assert!(state.validate().is_ok());
    }

    #[test]
    fn test_merged_is_superset() {
        let first = sample_state();
        let second = SummaryState::merged(
            Some(&first),
            &[record("c.json", "h3", 1), record("a.json", "changed", 9)],
            "newer".to_string(),
            SummaryMetadata::default(),
        );

        assert_eq!(second.total_videos, 6);
        assert_eq!(second.total_files, 3);
        assert_eq!(second.processed_files, vec!["a.json", "b.json", "c.json"]);
        assert_eq!(second.file_hashes.get("a.json").map(String::as_str), Some("h1"));
        assert!(second.total_files >= first.total_files);
        assert!(first
            .file_hashes
            .keys()
            .all(|k| second.file_hashes.contains_key(k)));
        // the previous value is untouched
        assert_eq!(first.total_files, 2);
    }

    #[test]
    fn test_is_processed_by_key_or_hash() {
        let state = sample_state();
        let path = Path::new("/nonexistent/whatever.json");

        assert!(state.is_processed("a.json", path, |_| None));
        assert!(state.is_processed("copy.json", path, |_| Some("h2".to_string())));
        assert!(!state.is_processed("copy.json", path, |_| Some("other".to_string())));
        // unreadable file is treated as unprocessed
        assert!(!state.is_processed("copy.json", path, |_| None));
    }

    #[test]
    fn test_validate_rejects_inconsistent_state() {
        let mut state = sample_state();
        state.total_files = 3;
        assert!(state.validate().is_err());

        let mut state = sample_state();
        state.file_hashes.insert("ghost.json".to_string(), "h9".to_string());
        assert!(state.validate().is_err());

        let mut state = sample_state();
        state.processed_files.push("a.json".to_string());
        state.total_files = 3;
        assert!(state.validate().is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let (store, _dir) = create_test_store();
        let mut state = sample_state();
        state
            .summary_metadata
            .extra
            .insert("custom".to_string(), serde_json::json!({"k": [1, 2]}));

        store.save(&state).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, state);

        let before = fs::read_to_string(store.path()).unwrap();
        store.save(&loaded).unwrap();
        let after = fs::read_to_string(store.path()).unwrap();
        assert_eq!(before, after);
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let (store, dir) = create_test_store();
        store.save(&sample_state()).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["overall_summary.json"]);
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let (store, _dir) = create_test_store();
        assert!(store.load().is_none());

        fs::write(store.path(), "{ not json").unwrap();
        assert!(store.load().is_none());

        fs::write(
            store.path(),
            r#"{"total_videos":1,"total_files":2,"overall_ai_description":"x","processed_files":["a.json"],"file_hashes":{}}"#,
        )
        .unwrap();
        assert!(store.load().is_none());
    }

    #[test]
    fn test_load_without_metadata() {
        let (store, _dir) = create_test_store();
        fs::write(
            store.path(),
            r#"{"total_videos":2,"total_files":1,"overall_ai_description":"x","processed_files":["a.json"],"file_hashes":{"a.json":"abc"}}"#,
        )
        .unwrap();

        let state = store.load().unwrap();
        assert_eq!(state.summary_metadata, SummaryMetadata::default());
    }

    #[test]
    fn test_content_hash() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.json");
        let b = dir.path().join("b.json");
        fs::write(&a, "[1,2,3]").unwrap();
        fs::write(&b, "[1,2,3]").unwrap();

        let ha = content_hash(&a).unwrap();
        assert_eq!(ha.len(), 64);
        assert_eq!(ha, content_hash(&b).unwrap());

        fs::write(&b, "[1,2]").unwrap();
        assert_ne!(ha, content_hash(&b).unwrap());
        assert!(content_hash(&dir.path().join("missing.json")).is_err());
    }
}
