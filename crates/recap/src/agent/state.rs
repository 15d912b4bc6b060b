//! Agent phases, cycle outcomes and parse-failure bookkeeping

use std::collections::HashMap;
use std::fmt;

/// Where the agent is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Idle,
    Running,
    Scanning,
    Processing,
    Persisting,
    Sleeping,
    Stopping,
    Stopped,
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentPhase::Idle => "idle",
            AgentPhase::Running => "running",
            AgentPhase::Scanning => "scanning",
            AgentPhase::Processing => "processing",
            AgentPhase::Persisting => "persisting",
            AgentPhase::Sleeping => "sleeping",
            AgentPhase::Stopping => "stopping",
            AgentPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What a single cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Language model unreachable; nothing was read
    CollaboratorUnavailable,
    /// Every candidate was already processed or set aside
    NoNewFiles,
    /// New files were read but yielded no text; state untouched
    NoItems { files: usize },
    /// A batch was summarized and committed
    Processed {
        files: usize,
        items: usize,
        degraded: bool,
    },
}

/// Counts consecutive parse failures per file key.
///
/// A file is set aside once it reaches the attempt limit, until its
/// content hash changes.
#[derive(Debug, Default)]
pub struct ParseFailureTracker {
    failures: HashMap<String, ParseFailure>,
    max_attempts: u32,
}

#[derive(Debug, Clone)]
struct ParseFailure {
    /// `None` when the file could not be read at all
    hash: Option<String>,
    attempts: u32,
}

impl ParseFailureTracker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            failures: HashMap::new(),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Record a failure; returns the consecutive attempt count
    pub fn record_failure(&mut self, key: &str, hash: Option<&str>) -> u32 {
        let entry = self
            .failures
            .entry(key.to_string())
            .or_insert(ParseFailure {
                hash: hash.map(str::to_string),
                attempts: 0,
            });

        if entry.hash.as_deref() != hash {
            entry.hash = hash.map(str::to_string);
            entry.attempts = 0;
        }
        entry.attempts += 1;
        entry.attempts
    }

    pub fn record_success(&mut self, key: &str) {
        self.failures.remove(key);
    }

    /// True once `key` with this exact content has used up its attempts
    pub fn is_set_aside(&self, key: &str, hash: Option<&str>) -> bool {
        self.failures
            .get(key)
            .is_some_and(|f| f.attempts >= self.max_attempts && f.hash.as_deref() == hash)
    }

    pub fn attempts(&self, key: &str) -> u32 {
        self.failures.get(key).map_or(0, |f| f.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_aside_after_max() {
        let mut tracker = ParseFailureTracker::new(3);
        assert_eq!(tracker.record_failure("bad.json", Some("h1")), 1);
        assert_eq!(tracker.record_failure("bad.json", Some("h1")), 2);
        assert!(!tracker.is_set_aside("bad.json", Some("h1")));

        assert_eq!(tracker.record_failure("bad.json", Some("h1")), 3);
        assert!(tracker.is_set_aside("bad.json", Some("h1")));
        assert!(!tracker.is_set_aside("other.json", Some("h1")));
    }

    #[test]
    fn test_changed_content_resets() {
        let mut tracker = ParseFailureTracker::new(2);
        tracker.record_failure("bad.json", Some("h1"));
        tracker.record_failure("bad.json", Some("h1"));
        assert!(tracker.is_set_aside("bad.json", Some("h1")));

        assert!(!tracker.is_set_aside("bad.json", Some("h2")));
        assert_eq!(tracker.record_failure("bad.json", Some("h2")), 1);
    }

    #[test]
    fn test_success_clears() {
        let mut tracker = ParseFailureTracker::new(3);
        tracker.record_failure("a.json", None);
        assert_eq!(tracker.attempts("a.json"), 1);
        tracker.record_success("a.json");
        assert_eq!(tracker.attempts("a.json"), 0);
    }

    #[test]
    fn test_zero_limit_means_one_attempt() {
        let mut tracker = ParseFailureTracker::new(0);
        tracker.record_failure("a.json", None);
        assert!(tracker.is_set_aside("a.json", None));
    }
}
