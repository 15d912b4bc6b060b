//! Consolidated summary generation
//!
//! Two calls per batch: a cheap classification that picks a detail level,
//! then the summary itself with a length budget sized by that level. Neither
//! call can fail the cycle; the summary degrades to [`GENERATION_FALLBACK`].

use anyhow::Result;
use async_trait::async_trait;
use llm_core::{GenerateOptions, OllamaClient};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Stored in place of a description when generation fails
pub const GENERATION_FALLBACK: &str =
    "Error: Unable to generate summary due to language model connection issues";

/// Fragments sampled for classification
const CLASSIFY_SAMPLE: usize = 3;
/// Characters kept per sampled fragment
const CLASSIFY_EXCERPT_CHARS: usize = 800;
const CLASSIFY_BUDGET: u32 = 700;

/// The language-model endpoint as seen by the agent
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Lightweight availability probe
    async fn is_available(&self) -> bool;

    /// Single non-streaming completion
    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
        timeout: Duration,
    ) -> Result<String>;
}

/// [`TextGenerator`] backed by a local Ollama server
pub struct OllamaGenerator {
    client: OllamaClient,
    probe_timeout: Duration,
}

impl OllamaGenerator {
    pub fn new(client: OllamaClient, probe_timeout: Duration) -> Self {
        Self {
            client,
            probe_timeout,
        }
    }
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn is_available(&self) -> bool {
        self.client.health_check(self.probe_timeout).await
    }

    async fn complete(
        &self,
        model: &str,
        prompt: &str,
        options: &GenerateOptions,
        timeout: Duration,
    ) -> Result<String> {
        self.client.generate(model, prompt, options, timeout).await
    }
}

/// How much detail the consolidated summary should carry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DetailLevel {
    Brief,
    #[default]
    Standard,
    Detailed,
    Extensive,
}

impl DetailLevel {
    /// Increasing detail; also the keyword scan order
    pub const ALL: [DetailLevel; 4] = [
        DetailLevel::Brief,
        DetailLevel::Standard,
        DetailLevel::Detailed,
        DetailLevel::Extensive,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            DetailLevel::Brief => "BRIEF",
            DetailLevel::Standard => "STANDARD",
            DetailLevel::Detailed => "DETAILED",
            DetailLevel::Extensive => "EXTENSIVE",
        }
    }

    /// First level whose keyword occurs in the raw answer, scanning from
    /// least to most detailed
    pub fn from_response(raw: &str) -> Option<Self> {
        let upper = raw.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|level| upper.contains(level.keyword()))
    }

    /// Token budget of the summary call
    pub fn token_budget(&self) -> u32 {
        match self {
            DetailLevel::Brief => 800,
            DetailLevel::Standard => 1500,
            DetailLevel::Detailed => 2500,
            DetailLevel::Extensive => 4000,
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            DetailLevel::Brief => {
                "Write a BRIEF summary, 2-3 sentences per video:\n\
                 - key points only, in plain language\n\
                 - bullet points for easy reading"
            }
            DetailLevel::Standard => {
                "Write a STANDARD summary, 4-6 sentences per video:\n\
                 - common themes and key insights in simple terms\n\
                 - one coherent narrative focused on the big picture"
            }
            DetailLevel::Detailed => {
                "Write a DETAILED summary, 8-10 sentences per video:\n\
                 - thorough analysis with concrete examples\n\
                 - patterns and connections between videos, explained without jargon"
            }
            DetailLevel::Extensive => {
                "Write an EXTENSIVE summary, 12 or more sentences per video:\n\
                 - comprehensive analysis from several angles\n\
                 - background for every key concept\n\
                 - actionable recommendations"
            }
        }
    }
}

impl fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Result of one summary generation
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub text: String,
    pub level: DetailLevel,
    /// True when `text` is the fallback sentinel
    pub degraded: bool,
}

/// Turns a batch of text fragments into one consolidated description
#[derive(Clone)]
pub struct Summarizer {
    generator: Arc<dyn TextGenerator>,
    classify_timeout: Duration,
    generate_timeout: Duration,
}

impl Summarizer {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        classify_timeout: Duration,
        generate_timeout: Duration,
    ) -> Self {
        Self {
            generator,
            classify_timeout,
            generate_timeout,
        }
    }

    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Ask the model which detail level suits the batch
    pub async fn classify(&self, texts: &[String], model: &str) -> DetailLevel {
        let prompt = classification_prompt(texts);
        let options = GenerateOptions {
            temperature: 0.3,
            top_p: None,
            num_predict: CLASSIFY_BUDGET,
        };

        match self
            .generator
            .complete(model, &prompt, &options, self.classify_timeout)
            .await
        {
            Ok(raw) => match DetailLevel::from_response(&raw) {
                Some(level) => {
                    debug!(%level, "Detail level selected");
                    level
                }
                None => {
                    warn!(answer = %raw.trim(), "Unclear detail level answer, using STANDARD");
                    DetailLevel::default()
                }
            },
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Detail level classification failed, using STANDARD");
                DetailLevel::default()
            }
        }
    }

    /// Produce the consolidated description; never fails.
    ///
    /// `previous` is an earlier consolidated description folded into the
    /// prompt as context. It does not count as a video.
    pub async fn generate(
        &self,
        previous: Option<&str>,
        texts: &[String],
        model: &str,
    ) -> Summary {
        let level = self.classify(texts, model).await;
        let prompt = summary_prompt(previous, texts, level);
        let options = GenerateOptions {
            temperature: 0.7,
            top_p: Some(0.9),
            num_predict: level.token_budget(),
        };

        match self
            .generator
            .complete(model, &prompt, &options, self.generate_timeout)
            .await
        {
            Ok(text) if !text.trim().is_empty() => {
                info!(%level, chars = text.len(), "Generated consolidated summary");
                Summary {
                    text,
                    level,
                    degraded: false,
                }
            }
            Ok(_) => {
                warn!("Model returned an empty summary");
                Summary::fallback(level)
            }
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Summary generation failed");
                Summary::fallback(level)
            }
        }
    }
}

impl Summary {
    fn fallback(level: DetailLevel) -> Self {
        Self {
            text: GENERATION_FALLBACK.to_string(),
            level,
            degraded: true,
        }
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

fn classification_prompt(texts: &[String]) -> String {
    let sample = texts
        .iter()
        .take(CLASSIFY_SAMPLE)
        .enumerate()
        .map(|(i, t)| format!("Video {}:\n{}", i + 1, excerpt(t, CLASSIFY_EXCERPT_CHARS)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a content analyst. Decide how much detail a consolidated summary \
of the following video summaries needs.\n\n\
VIDEO CONTENT:\n{sample}\n\n\
Total videos: {total}\n\n\
DETAIL LEVELS:\n\
- BRIEF: simple concepts, quick overviews\n\
- STANDARD: moderate complexity, balanced detail\n\
- DETAILED: technical topics that need in-depth explanation\n\
- EXTENSIVE: highly complex or academic material\n\n\
Be conservative: when in doubt choose BRIEF or STANDARD.\n\
Answer with ONLY one word: BRIEF, STANDARD, DETAILED, or EXTENSIVE.",
        sample = sample,
        total = texts.len()
    )
}

fn summary_prompt(previous: Option<&str>, texts: &[String], level: DetailLevel) -> String {
    let context = previous
        .map(|p| format!("Previously consolidated summary of earlier videos:\n{}\n\n", p.trim()))
        .unwrap_or_default();
    let summaries = texts
        .iter()
        .enumerate()
        .map(|(i, t)| format!("Video {} Summary:\n{}", i + 1, t))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful content analyst. Combine these video summaries into one \
{keyword} overview that is easy to read.\n\n\
{context}{summaries}\n\n\
{instructions}\n\n\
Detail level: {keyword}\n\
Number of videos: {total}\n\n\
Use clear, simple language and structure the result so it is easy to follow.",
        keyword = level.keyword(),
        context = context,
        summaries = summaries,
        instructions = level.instructions(),
        total = texts.len()
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted generator: answers are consumed in call order
    pub(crate) struct ScriptedGenerator {
        pub available: bool,
        answers: Mutex<VecDeque<Result<String>>>,
        pub calls: Mutex<Vec<(String, GenerateOptions)>>,
    }

    impl ScriptedGenerator {
        pub(crate) fn new(available: bool, answers: Vec<Result<String>>) -> Self {
            Self {
                available,
                answers: Mutex::new(answers.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Always answers the same text
        pub(crate) fn echo(text: &str) -> Self {
            Self::new(true, (0..64).map(|_| Ok(text.to_string())).collect())
        }

        /// Available, but every call fails
        pub(crate) fn failing() -> Self {
            Self::new(true, Vec::new())
        }

        pub(crate) fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn is_available(&self) -> bool {
            self.available
        }

        async fn complete(
            &self,
            _model: &str,
            prompt: &str,
            options: &GenerateOptions,
            _timeout: Duration,
        ) -> Result<String> {
            self.calls
                .lock()
                .unwrap()
                .push((prompt.to_string(), options.clone()));
            self.answers
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("connection refused")))
        }
    }

    fn summarizer(generator: Arc<ScriptedGenerator>) -> Summarizer {
        Summarizer::new(generator, Duration::from_secs(1), Duration::from_secs(1))
    }

    fn texts() -> Vec<String> {
        vec!["first".to_string(), "second".to_string()]
    }

    #[test]
    fn test_detail_level_parsing() {
        assert_eq!(
            DetailLevel::from_response("detailed"),
            Some(DetailLevel::Detailed)
        );
        assert_eq!(
            DetailLevel::from_response("<think>maybe EXTENSIVE?</think> BRIEF"),
            Some(DetailLevel::Brief)
        );
        assert_eq!(
            DetailLevel::from_response("EXTENSIVE or STANDARD"),
            Some(DetailLevel::Standard)
        );
        assert_eq!(DetailLevel::from_response("no idea"), None);
        assert!(DetailLevel::Brief < DetailLevel::Extensive);
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé...");
        assert_eq!(excerpt("short", 10), "short");
    }

    #[test]
    fn test_classification_samples_first_three() {
        let texts: Vec<String> = (1..=5).map(|i| format!("text-{}", i)).collect();
        let prompt = classification_prompt(&texts);
        assert!(prompt.contains("text-3"));
        assert!(!prompt.contains("text-4"));
        assert!(prompt.contains("Total videos: 5"));
    }

    #[tokio::test]
    async fn test_generate_uses_classified_budget() {
        let generator = Arc::new(ScriptedGenerator::new(
            true,
            vec![Ok("DETAILED".to_string()), Ok("the summary".to_string())],
        ));
        let summary = summarizer(generator.clone()).generate(None, &texts(), "m").await;

        assert_eq!(summary.text, "the summary");
        assert_eq!(summary.level, DetailLevel::Detailed);
        assert!(!summary.degraded);

        let calls = generator.calls.lock().unwrap();
        assert_eq!(calls[0].1.num_predict, 700);
        assert_eq!(calls[1].1.num_predict, 2500);
        assert_eq!(calls[1].1.top_p, Some(0.9));
        assert!(calls[1].0.contains("Video 2 Summary:\nsecond"));
    }

    #[tokio::test]
    async fn test_previous_summary_is_context_only() {
        let generator = Arc::new(ScriptedGenerator::echo("BRIEF"));
        summarizer(generator.clone())
            .generate(Some("old overview"), &texts(), "m")
            .await;

        let calls = generator.calls.lock().unwrap();
        assert!(!calls[0].0.contains("old overview"));
        assert!(calls[1]
            .0
            .contains("Previously consolidated summary of earlier videos:\nold overview"));
        assert!(calls[1].0.contains("Number of videos: 2"));
    }

    #[tokio::test]
    async fn test_classification_failure_defaults_to_standard() {
        let generator = Arc::new(ScriptedGenerator::new(
            true,
            vec![Err(anyhow::anyhow!("timeout")), Ok("ok".to_string())],
        ));
        let summary = summarizer(generator.clone()).generate(None, &texts(), "m").await;

        assert_eq!(summary.level, DetailLevel::Standard);
        assert_eq!(generator.calls.lock().unwrap()[1].1.num_predict, 1500);
    }

    #[tokio::test]
    async fn test_generation_failure_returns_fallback() {
        let generator = Arc::new(ScriptedGenerator::failing());
        let summary = summarizer(generator.clone()).generate(None, &texts(), "m").await;

        assert_eq!(summary.text, GENERATION_FALLBACK);
        assert!(summary.degraded);
        assert_eq!(generator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_answer_returns_fallback() {
        let generator = Arc::new(ScriptedGenerator::new(
            true,
            vec![Ok("BRIEF".to_string()), Ok("   ".to_string())],
        ));
        let summary = summarizer(generator).generate(None, &texts(), "m").await;
        assert!(summary.degraded);
        assert_eq!(summary.level, DetailLevel::Brief);
    }
}
