//! In-memory forecaster components for testing and offline development.
//!
//! The mock tokenizer maps each character to its code point, so a mock model
//! "generates" a fixed reply by returning that reply's code points.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cityflow_abstraction::{
    ChatMessage, GenerationConfig, Model, ModelError, ModelParameters, ModelResponse, ModelUsage,
    Seq2SeqModel, TextTokenizer,
};
use tracing::debug;

use crate::hub::{ALLOW_PATTERNS, ArtifactBundle, ArtifactSource};
use crate::loader::{LoadedPair, ModelLoader};

/// Token id treated as a special token by [`MockTokenizer`].
pub const MOCK_EOS: u32 = 0;

/// Character-level tokenizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockTokenizer;

impl TextTokenizer for MockTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        let mut ids: Vec<u32> = text.chars().map(u32::from).collect();
        ids.push(MOCK_EOS);
        Ok(ids)
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, ModelError> {
        ids.iter()
            .filter(|id| !(skip_special_tokens && **id == MOCK_EOS))
            .map(|id| {
                char::from_u32(*id)
                    .ok_or_else(|| ModelError::TokenizerError(format!("invalid token id {id}")))
            })
            .collect()
    }
}

/// A model that always generates the same reply, truncated to the token budget.
#[derive(Debug, Clone)]
pub struct MockSeq2SeqModel {
    id: String,
    reply: String,
    fail: bool,
}

impl MockSeq2SeqModel {
    /// Creates a model answering `reply` to every prompt.
    pub fn new(id: impl Into<String>, reply: impl Into<String>) -> Self {
        Self { id: id.into(), reply: reply.into(), fail: false }
    }

    /// Creates a model whose generation always fails.
    pub fn failing(id: impl Into<String>) -> Self {
        Self { id: id.into(), reply: String::new(), fail: true }
    }
}

impl Seq2SeqModel for MockSeq2SeqModel {
    fn generate(&self, input_ids: &[u32], config: &GenerationConfig) -> Result<Vec<u32>, ModelError> {
        if self.fail {
            return Err(ModelError::Other(format!("{} failed to generate", self.id)));
        }
        if input_ids.is_empty() {
            return Err(ModelError::Other("empty encoder input".to_string()));
        }
        let mut ids: Vec<u32> = self.reply.chars().map(u32::from).take(config.max_new_tokens).collect();
        ids.push(MOCK_EOS);
        Ok(ids)
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Artifact source that fabricates bundles and counts fetches.
#[derive(Debug, Default)]
pub struct MockArtifactSource {
    fetches: AtomicUsize,
    delay: Option<Duration>,
    unavailable: Vec<String>,
}

impl MockArtifactSource {
    /// Creates a source that serves every identifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` inside each fetch.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Makes fetches of `identifier` fail.
    #[must_use]
    pub fn with_unavailable(mut self, identifier: &str) -> Self {
        self.unavailable.push(identifier.to_string());
        self
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ArtifactSource for MockArtifactSource {
    fn fetch(&self, identifier: &str) -> Result<ArtifactBundle, ModelError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.unavailable.iter().any(|id| id == identifier) {
            return Err(ModelError::RequestError(format!("{identifier} not found")));
        }
        Ok(ArtifactBundle {
            identifier: identifier.to_string(),
            dir: std::env::temp_dir().join(identifier),
            files: ALLOW_PATTERNS.iter().map(|f| (*f).to_string()).collect(),
        })
    }

    fn revision(&self, identifier: &str) -> Result<Option<String>, ModelError> {
        if self.unavailable.iter().any(|id| id == identifier) {
            Err(ModelError::RequestError(format!("{identifier} not found")))
        } else {
            Ok(Some(format!("mock-{identifier}")))
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Loader producing [`MockSeq2SeqModel`]s, optionally refusing some identifiers.
#[derive(Debug)]
pub struct MockLoader {
    name: &'static str,
    reply: String,
    rejects: Vec<String>,
    reject_all: bool,
    loads: AtomicUsize,
}

impl MockLoader {
    /// Creates a loader whose models reply with `reply`.
    pub fn new(name: &'static str, reply: impl Into<String>) -> Self {
        Self { name, reply: reply.into(), rejects: Vec::new(), reject_all: false, loads: AtomicUsize::new(0) }
    }

    /// Creates a loader that rejects every bundle.
    #[must_use]
    pub fn rejecting(name: &'static str) -> Self {
        Self { reject_all: true, ..Self::new(name, "") }
    }

    /// Rejects bundles for `identifier`.
    #[must_use]
    pub fn with_reject(mut self, identifier: &str) -> Self {
        self.rejects.push(identifier.to_string());
        self
    }

    /// Number of successful loads.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModelLoader for MockLoader {
    fn name(&self) -> &'static str {
        self.name
    }

    fn load(&self, bundle: &ArtifactBundle) -> Result<LoadedPair, ModelError> {
        if self.reject_all || self.rejects.iter().any(|id| *id == bundle.identifier) {
            return Err(ModelError::UnsupportedModelProvider(format!(
                "{} cannot load {}",
                self.name, bundle.identifier
            )));
        }
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok((Arc::new(MockSeq2SeqModel::new(bundle.identifier.clone(), self.reply.clone())), Arc::new(MockTokenizer)))
    }
}

#[derive(Debug, Clone)]
enum Script {
    Summary,
    Reply(String),
    Fail(ModelError),
}

/// A `Model` that answers without a network.
///
/// By default it summarizes the conversation it was given. Every call is
/// recorded so tests can inspect the prompts.
#[derive(Debug)]
pub struct MockModel {
    id: String,
    script: Script,
    delay: Option<Duration>,
    calls: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockModel {
    /// Creates a summarizing mock with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id, script: Script::Summary, delay: None, calls: Mutex::new(Vec::new()) }
    }

    /// Creates a mock that always answers `reply`.
    pub fn replying(id: impl Into<String>, reply: impl Into<String>) -> Self {
        Self { script: Script::Reply(reply.into()), ..Self::new(id.into()) }
    }

    /// Creates a mock that always fails with `error`.
    pub fn failing(id: impl Into<String>, error: ModelError) -> Self {
        Self { script: Script::Fail(error), ..Self::new(id.into()) }
    }

    /// Sleeps for `delay` before answering.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Conversations received so far, oldest first.
    pub fn calls(&self) -> Vec<Vec<ChatMessage>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        self.generate_chat_completion(&[ChatMessage::user(prompt)], parameters).await
    }

    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        use std::fmt::Write;

        debug!(
            model_id = %self.id,
            message_count = messages.len(),
            parameters = ?parameters,
            "MockModel generating chat completion"
        );
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).push(messages.to_vec());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = match &self.script {
            Script::Fail(error) => return Err(error.clone()),
            Script::Reply(reply) => reply.clone(),
            Script::Summary => {
                let mut summary = format!("Mock chat response from {}\n", self.id);
                for message in messages {
                    let _ = writeln!(summary, "  {}: {}", message.role, message.content);
                }
                summary
            }
        };

        let prompt_tokens = messages.iter().map(|m| count_tokens(&m.content)).sum::<u32>();
        let completion_tokens = count_tokens(&content);
        Ok(ModelResponse {
            content,
            model_id: Some(self.id.clone()),
            usage: Some(ModelUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
        })
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Word count, standing in for a real tokenizer.
#[allow(clippy::cast_possible_truncation)]
fn count_tokens(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_model_records_calls() {
        let model = MockModel::replying("llm", "Demand looks steady.");
        let response = model
            .generate_chat_completion(&[ChatMessage::system("sys"), ChatMessage::user("why?")], None)
            .await
            .unwrap();
        assert_eq!(response.content, "Demand looks steady.");
        assert_eq!(response.usage.unwrap().completion_tokens, 3);

        let calls = model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][1].content, "why?");
    }

    #[tokio::test]
    async fn test_mock_model_failure_and_summary() {
        let model = MockModel::failing("llm", ModelError::Timeout("slow".to_string()));
        assert_eq!(model.generate_text("hi", None).await.unwrap_err(), ModelError::Timeout("slow".to_string()));

        let model = MockModel::new("llm".to_string());
        let response = model.generate_text("hello there", None).await.unwrap();
        assert!(response.content.contains("user: hello there"));
    }

    #[test]
    fn test_tokenizer_round_trip_skips_eos() {
        let ids = MockTokenizer.encode("busy").unwrap();
        assert_eq!(ids.last(), Some(&MOCK_EOS));
        assert_eq!(MockTokenizer.decode(&ids, true).unwrap(), "busy");
        assert_eq!(MockTokenizer.decode(&ids, false).unwrap(), "busy\0");
    }

    #[test]
    fn test_model_respects_token_budget() {
        let model = MockSeq2SeqModel::new("m", "0123456789");
        let config = GenerationConfig { max_new_tokens: 4, ..GenerationConfig::default() };
        let ids = model.generate(&[1], &config).unwrap();
        assert_eq!(MockTokenizer.decode(&ids, true).unwrap(), "0123");
    }

    #[test]
    fn test_loader_rejections() {
        let loader = MockLoader::new("primary", "2").with_reject("acme/bar");
        let source = MockArtifactSource::new();
        assert!(loader.load(&source.fetch("acme/bar").unwrap()).is_err());
        assert!(loader.load(&source.fetch("acme/base").unwrap()).is_ok());
        assert_eq!(loader.load_count(), 1);
        assert_eq!(source.fetch_count(), 2);
    }
}
