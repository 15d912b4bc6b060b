//! Console feedback for the agent
//!
//! The agent emits events through [`Reporter`]; tracing carries the
//! structured log, this carries what a person watching the terminal sees.

use crate::state::SummaryState;
use crate::summarizer::Summary;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

const CYAN: &str = "\x1b[96m";
const GREEN: &str = "\x1b[92m";
const YELLOW: &str = "\x1b[93m";
const RED: &str = "\x1b[91m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Agent events worth showing to a user. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait Reporter: Send + Sync {
    fn started(&self, monitor_dir: &Path, output: &Path, model: &str, interval: Duration) {}
    fn cycle_started(&self) {}
    fn collaborator_unavailable(&self) {}
    fn no_new_files(&self) {}
    fn new_files(&self, count: usize) {}
    fn file_read(&self, key: &str, items: usize) {}
    fn duplicate_skipped(&self, key: &str) {}
    fn file_failed(&self, key: &str, error: &anyhow::Error, attempts: u32, set_aside: bool) {}
    fn no_items(&self) {}
    fn generating(&self, items: usize) {}
    fn generated(&self, summary: &Summary) {}
    fn saved(&self, path: &Path, state: &SummaryState) {}
    fn save_failed(&self, path: &Path, error: &anyhow::Error) {}
    fn cycle_failed(&self, error: &anyhow::Error) {}
    fn waiting(&self, interval: Duration) {}
    fn stopping(&self) {}
    fn final_state(&self, state: Option<&SummaryState>) {}
}

/// Silent reporter
#[cfg(test)]
pub struct NullReporter;

#[cfg(test)]
impl Reporter for NullReporter {}

/// Colored terminal output with a spinner around generation
pub struct ConsoleReporter {
    use_unicode: bool,
    spinner: Mutex<Option<ProgressBar>>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            use_unicode: supports_unicode(),
            spinner: Mutex::new(None),
        }
    }

    fn symbol(&self, unicode: &'static str, ascii: &'static str) -> &'static str {
        if self.use_unicode {
            unicode
        } else {
            ascii
        }
    }

    fn emit(&self, text: &str) {
        write_or_log(&mut io::stdout().lock(), text);
    }

    fn line(&self, color: &str, symbol: &str, message: &str) {
        self.emit(&format!("{}{} {}{}\n", color, symbol, message, RESET));
    }

    fn status(&self, message: &str) {
        self.line(DIM, self.symbol("→", ">"), message);
    }

    fn info(&self, message: &str) {
        self.line(CYAN, self.symbol("ℹ", "i"), message);
    }

    fn success(&self, message: &str) {
        self.line(GREEN, self.symbol("✓", "+"), message);
    }

    fn warning(&self, message: &str) {
        self.line(YELLOW, self.symbol("⚠", "!"), message);
    }

    fn error(&self, message: &str) {
        self.line(RED, self.symbol("✗", "x"), message);
    }

    fn start_spinner(&self, message: String) {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(previous) = slot.replace(spinner) {
                previous.finish_and_clear();
            }
        }
    }

    fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(spinner) = slot.take() {
                spinner.finish_and_clear();
            }
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn started(&self, monitor_dir: &Path, output: &Path, model: &str, interval: Duration) {
        let mut banner = format!("{}Video summary agent{}\n", BOLD, RESET);
        banner.push_str(&format!("  {}Directory:{} {}\n", DIM, RESET, monitor_dir.display()));
        banner.push_str(&format!("  {}Output:{}    {}\n", DIM, RESET, output.display()));
        banner.push_str(&format!("  {}Model:{}     {}\n", DIM, RESET, model));
        banner.push_str(&format!("  {}Interval:{}  {}s\n", DIM, RESET, interval.as_secs()));
        banner.push_str(&format!("{}Press Ctrl+C to stop{}\n\n", DIM, RESET));
        self.emit(&banner);
    }

    fn cycle_started(&self) {
        self.status(&format!(
            "Checking for new files at {}",
            chrono::Local::now().format("%H:%M:%S")
        ));
    }

    fn collaborator_unavailable(&self) {
        self.error("Ollama is not reachable, skipping this cycle");
    }

    fn no_new_files(&self) {
        self.status("No new files");
    }

    fn new_files(&self, count: usize) {
        self.info(&format!("Found {} new file(s)", count));
    }

    fn file_read(&self, key: &str, items: usize) {
        self.status(&format!("{}: {} item(s)", key, items));
    }

    fn duplicate_skipped(&self, key: &str) {
        self.status(&format!("{}: same content as another file, skipped", key));
    }

    fn file_failed(&self, key: &str, error: &anyhow::Error, attempts: u32, set_aside: bool) {
        if set_aside {
            self.warning(&format!(
                "{}: giving up after {} attempt(s): {:#}",
                key, attempts, error
            ));
        } else {
            self.warning(&format!("{}: {:#} (will retry)", key, error));
        }
    }

    fn no_items(&self) {
        self.warning("New files contained no usable summaries");
    }

    fn generating(&self, items: usize) {
        self.start_spinner(format!("Generating summary from {} item(s)...", items));
    }

    fn generated(&self, summary: &Summary) {
        self.stop_spinner();
        if summary.degraded {
            self.warning("Summary generation failed, stored fallback text");
        } else {
            self.success(&format!("Generated {} summary", summary.level));
        }
    }

    fn saved(&self, path: &Path, state: &SummaryState) {
        self.success(&format!(
            "Saved {} ({} videos from {} files)",
            path.display(),
            state.total_videos,
            state.total_files
        ));
    }

    fn save_failed(&self, path: &Path, error: &anyhow::Error) {
        self.error(&format!("Could not save {}: {:#}", path.display(), error));
    }

    fn cycle_failed(&self, error: &anyhow::Error) {
        self.stop_spinner();
        self.error(&format!("Cycle failed: {:#}", error));
    }

    fn waiting(&self, interval: Duration) {
        self.status(&format!("Next check in {}s", interval.as_secs()));
    }

    fn stopping(&self) {
        self.stop_spinner();
        self.emit("\n");
        self.info("Stopping");
    }

    fn final_state(&self, state: Option<&SummaryState>) {
        let rendered = match state {
            Some(state) => render_state(state),
            None => "No summary has been generated yet.\n".to_string(),
        };

        self.emit(&format!("\n{}{}{}", BOLD, rendered, RESET));
    }
}

/// Human-readable view of a summary state
pub fn render_state(state: &SummaryState) -> String {
    let rows = [
        ("Total Videos", state.total_videos.to_string()),
        ("Total Files", state.total_files.to_string()),
        ("Model Used", or_unknown(&state.summary_metadata.model_used)),
        ("Last Updated", or_unknown(&state.summary_metadata.last_updated)),
    ];
    let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);

    let mut out = String::from("Overall Summary Information\n");
    for (label, value) in &rows {
        out.push_str(&format!("  {:<width$}  {}\n", label, value, width = width));
    }
    out.push_str("\nOverall AI Description\n");
    out.push_str(&"-".repeat(22));
    out.push('\n');
    out.push_str(state.overall_ai_description.trim_end());
    out.push('\n');
    out
}

/// Write and flush `text`, logging instead of failing when the terminal is
/// gone (a closed pipe, for instance). Returns whether it was written.
fn write_or_log(out: &mut impl Write, text: &str) -> bool {
    match out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Could not write to terminal");
            false
        }
    }
}

fn or_unknown(value: &Option<String>) -> String {
    value.clone().unwrap_or_else(|| "unknown".to_string())
}

fn supports_unicode() -> bool {
    if let Ok(term) = std::env::var("TERM") {
        if term.contains("xterm") || term.contains("256color") || term.contains("kitty") {
            return true;
        }
    }

    ["LC_ALL", "LC_CTYPE", "LANG"].iter().any(|var| {
        std::env::var(var)
            .map(|val| val.to_lowercase().contains("utf"))
            .unwrap_or(false)
    })
}
