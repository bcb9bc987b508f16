//! T5 forecaster backed by candle.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use candle_core::{D, DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::t5;
use cityflow_abstraction::{GenerationConfig, ModelError, Seq2SeqModel, TextTokenizer};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use super::{LoadedPair, ModelLoader};
use crate::hub::ArtifactBundle;

fn candle_err(err: candle_core::Error) -> ModelError {
    ModelError::Other(format!("candle: {err}"))
}

/// `tokenizer.json` wrapper.
pub struct T5Tokenizer {
    inner: Tokenizer,
}

impl T5Tokenizer {
    /// Reads a Hugging Face `tokenizer.json`.
    ///
    /// # Errors
    /// Returns `ModelError::TokenizerError` if the file is missing or malformed.
    pub fn from_file(path: &Path) -> Result<Self, ModelError> {
        let inner = Tokenizer::from_file(path).map_err(|e| {
            ModelError::TokenizerError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Ok(Self { inner })
    }
}

impl TextTokenizer for T5Tokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, ModelError> {
        let encoding =
            self.inner.encode(text, true).map_err(|e| ModelError::TokenizerError(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String, ModelError> {
        self.inner.decode(ids, skip_special_tokens).map_err(|e| ModelError::TokenizerError(e.to_string()))
    }
}

/// A T5 encoder-decoder running on the CPU.
///
/// Decoding mutates the model's key/value cache, so calls are serialized.
pub struct T5Seq2Seq {
    identifier: String,
    model: Mutex<t5::T5ForConditionalGeneration>,
    config: t5::Config,
    device: Device,
}

impl T5Seq2Seq {
    /// Loads `model.safetensors` from the bundle with an already parsed config.
    ///
    /// # Errors
    /// Returns a `ModelError` if the weights do not match the config.
    pub fn load(bundle: &ArtifactBundle, config: t5::Config) -> Result<Self, ModelError> {
        let device = Device::Cpu;
        let weights_path = bundle.path("model.safetensors");
        let weights = std::fs::read(&weights_path).map_err(|e| {
            ModelError::Other(format!("Failed to read {}: {e}", weights_path.display()))
        })?;
        let vb = VarBuilder::from_buffered_safetensors(weights, DType::F32, &device).map_err(candle_err)?;
        let model = t5::T5ForConditionalGeneration::load(vb, &config).map_err(candle_err)?;

        Ok(Self { identifier: bundle.identifier.clone(), model: Mutex::new(model), config, device })
    }

    fn decoder_start_token(&self) -> u32 {
        self.config.decoder_start_token_id.unwrap_or(self.config.pad_token_id) as u32
    }

    fn run(
        &self,
        model: &mut t5::T5ForConditionalGeneration,
        input_ids: &[u32],
        generation: &GenerationConfig,
    ) -> candle_core::Result<Vec<u32>> {
        let input = Tensor::new(input_ids, &self.device)?.unsqueeze(0)?;
        let encoder_output = model.encode(&input)?;

        let start = self.decoder_start_token();
        let mut tokens = vec![start];
        let mut sampler = (!generation.deterministic)
            .then(|| LogitsProcessor::new(generation.seed, Some(generation.temperature), None));

        for step in 0..generation.max_new_tokens {
            let decoder_input = if step == 0 || !self.config.use_cache {
                Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?
            } else {
                let last = tokens.last().copied().unwrap_or(start);
                Tensor::new(&[last], &self.device)?.unsqueeze(0)?
            };
            let logits =
                model.decode(&decoder_input, &encoder_output)?.squeeze(0)?.to_dtype(DType::F32)?;
            let next = match sampler.as_mut() {
                Some(processor) => processor.sample(&logits)?,
                None => logits.argmax(D::Minus1)?.to_scalar::<u32>()?,
            };
            if next as usize == self.config.eos_token_id {
                break;
            }
            tokens.push(next);
        }

        Ok(tokens.split_off(1))
    }
}

impl Seq2SeqModel for T5Seq2Seq {
    fn generate(&self, input_ids: &[u32], config: &GenerationConfig) -> Result<Vec<u32>, ModelError> {
        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.clear_kv_cache();
        let result = self.run(&mut model, input_ids, config).map_err(candle_err);
        model.clear_kv_cache();

        if let Ok(tokens) = &result {
            debug!(model_id = %self.identifier, generated = tokens.len(), "T5 generation finished");
        }
        result
    }

    fn model_id(&self) -> &str {
        &self.identifier
    }
}

/// Strict loader for checkpoints whose config is a complete T5 config.
#[derive(Debug, Default, Clone, Copy)]
pub struct T5Loader;

impl T5Loader {
    /// Creates the loader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl ModelLoader for T5Loader {
    fn name(&self) -> &'static str {
        "t5"
    }

    fn load(&self, bundle: &ArtifactBundle) -> Result<LoadedPair, ModelError> {
        let config_path = bundle.path("config.json");
        let raw = std::fs::read_to_string(&config_path).map_err(|e| {
            ModelError::Other(format!("Failed to read {}: {e}", config_path.display()))
        })?;
        let config: t5::Config = serde_json::from_str(&raw)
            .map_err(|e| ModelError::SerializationError(format!("Not a T5 config: {e}")))?;

        let tokenizer = T5Tokenizer::from_file(&bundle.path("tokenizer.json"))?;
        let model = T5Seq2Seq::load(bundle, config)?;
        info!(identifier = %bundle.identifier, loader = self.name(), "Loaded forecaster");

        Ok((Arc::new(model), Arc::new(tokenizer)))
    }
}
