//! Auto-detecting loader for encoder-decoder checkpoints with partial configs.
//!
//! Reads `model_type`/`architectures` from `config.json`, fills in the fields
//! the family defaults imply, and picks up token ids from
//! `generation_config.json` when present.

use std::sync::Arc;

use candle_transformers::models::t5;
use cityflow_abstraction::ModelError;
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use super::t5::{T5Seq2Seq, T5Tokenizer};
use super::{LoadedPair, ModelLoader};
use crate::hub::ArtifactBundle;

/// Encoder-decoder families the auto loader knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// Original T5 and T5 v1.1 checkpoints.
    T5,
    /// Multilingual T5.
    MT5,
}

/// Detects the model family from a parsed `config.json`.
#[must_use]
pub fn detect_architecture(config: &Value) -> Option<Architecture> {
    let from_type = config.get("model_type").and_then(Value::as_str).and_then(|t| {
        match t.to_ascii_lowercase().as_str() {
            "t5" => Some(Architecture::T5),
            "mt5" => Some(Architecture::MT5),
            _ => None,
        }
    });

    from_type.or_else(|| {
        config.get("architectures").and_then(Value::as_array).and_then(|archs| {
            archs.iter().filter_map(Value::as_str).find_map(|arch| {
                if arch.starts_with("MT5") {
                    Some(Architecture::MT5)
                } else if arch.starts_with("T5") {
                    Some(Architecture::T5)
                } else {
                    None
                }
            })
        })
    })
}

fn set_default(map: &mut Map<String, Value>, key: &str, value: Value) {
    if map.get(key).is_none_or(Value::is_null) {
        map.insert(key.to_string(), value);
    }
}

/// Fills family defaults into a raw config so it deserializes as a T5 config.
///
/// `generation` is the optional `generation_config.json`; its token ids win
/// over the ones in `config`.
///
/// # Errors
/// Returns `ModelError::SerializationError` if `config` is not an object or
/// lacks the dimensions no default can supply.
pub fn normalize_config(
    config: &Value,
    architecture: Architecture,
    generation: Option<&Value>,
) -> Result<Value, ModelError> {
    let mut map = config
        .as_object()
        .cloned()
        .ok_or_else(|| ModelError::SerializationError("config.json is not an object".to_string()))?;

    let dim = |map: &Map<String, Value>, key: &str| {
        map.get(key).and_then(Value::as_u64).ok_or_else(|| {
            ModelError::SerializationError(format!("config.json is missing `{key}`"))
        })
    };
    let d_model = dim(&map, "d_model")?;
    let num_heads = dim(&map, "num_heads")?;
    dim(&map, "num_layers")?;
    dim(&map, "vocab_size")?;

    if let Some(generation) = generation.and_then(Value::as_object) {
        for key in ["decoder_start_token_id", "eos_token_id", "pad_token_id"] {
            if let Some(value) = generation.get(key).filter(|v| v.is_u64()) {
                map.insert(key.to_string(), value.clone());
            }
        }
    }
    // Some checkpoints list several eos ids; the decoder stops on the first.
    if let Some(first) = map.get("eos_token_id").and_then(Value::as_array).and_then(|ids| ids.first()).cloned() {
        map.insert("eos_token_id".to_string(), first);
    }

    set_default(&mut map, "d_kv", json!(d_model / num_heads.max(1)));
    set_default(&mut map, "d_ff", json!(d_model * 4));
    set_default(&mut map, "relative_attention_num_buckets", json!(32));
    set_default(&mut map, "dropout_rate", json!(0.1));
    set_default(&mut map, "layer_norm_epsilon", json!(1e-6));
    set_default(&mut map, "initializer_factor", json!(1.0));
    set_default(&mut map, "is_encoder_decoder", json!(true));
    set_default(&mut map, "pad_token_id", json!(0));
    set_default(&mut map, "eos_token_id", json!(1));
    let pad = map.get("pad_token_id").cloned().unwrap_or_else(|| json!(0));
    set_default(&mut map, "decoder_start_token_id", pad);

    if architecture == Architecture::MT5 {
        set_default(&mut map, "feed_forward_proj", json!("gated-gelu"));
        set_default(&mut map, "tie_word_embeddings", json!(false));
    }

    Ok(Value::Object(map))
}

/// Fallback loader that tolerates incomplete or non-T5 family configs.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoLoader;

impl AutoLoader {
    /// Creates the loader.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn read_json(bundle: &ArtifactBundle, file: &str) -> Result<Value, ModelError> {
        let path = bundle.path(file);
        let raw = std::fs::read_to_string(&path)
            .map_err(|e| ModelError::Other(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| ModelError::SerializationError(format!("Invalid {file}: {e}")))
    }
}

impl ModelLoader for AutoLoader {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn load(&self, bundle: &ArtifactBundle) -> Result<LoadedPair, ModelError> {
        let raw = Self::read_json(bundle, "config.json")?;
        let architecture = detect_architecture(&raw).ok_or_else(|| {
            ModelError::UnsupportedModelProvider(format!(
                "Unrecognized architecture in {}/config.json",
                bundle.identifier
            ))
        })?;
        debug!(identifier = %bundle.identifier, ?architecture, "Detected architecture");

        let generation = if bundle.has("generation_config.json") {
            Some(Self::read_json(bundle, "generation_config.json")?)
        } else {
            None
        };
        let normalized = normalize_config(&raw, architecture, generation.as_ref())?;
        let config: t5::Config = serde_json::from_value(normalized)
            .map_err(|e| ModelError::SerializationError(format!("Unusable config: {e}")))?;

        let tokenizer = T5Tokenizer::from_file(&bundle.path("tokenizer.json"))?;
        let model = T5Seq2Seq::load(bundle, config)?;
        info!(identifier = %bundle.identifier, loader = self.name(), ?architecture, "Loaded forecaster");

        Ok((Arc::new(model), Arc::new(tokenizer)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::t5::T5Loader;
    use super::super::t5::fixture::{VOCAB, full_config, write_bundle};
    use super::*;
    use crate::hub::{ArtifactSource, LocalDirSource};
    use cityflow_abstraction::{GenerationConfig, Seq2SeqModel, TextTokenizer};
    use tempfile::TempDir;

    #[test]
    fn test_detect_from_model_type() {
        assert_eq!(detect_architecture(&json!({"model_type": "t5"})), Some(Architecture::T5));
        assert_eq!(detect_architecture(&json!({"model_type": "MT5"})), Some(Architecture::MT5));
        assert_eq!(detect_architecture(&json!({"model_type": "bart"})), None);
    }

    #[test]
    fn test_detect_from_architectures() {
        let config = json!({"architectures": ["MT5ForConditionalGeneration"]});
        assert_eq!(detect_architecture(&config), Some(Architecture::MT5));
        let config = json!({"architectures": ["T5ForConditionalGeneration"]});
        assert_eq!(detect_architecture(&config), Some(Architecture::T5));
        assert_eq!(detect_architecture(&json!({})), None);
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let raw = json!({"d_model": 512, "num_heads": 8, "num_layers": 6, "vocab_size": 32128});
        let config = normalize_config(&raw, Architecture::T5, None).unwrap();
        assert_eq!(config["d_kv"], 64);
        assert_eq!(config["d_ff"], 2048);
        assert_eq!(config["decoder_start_token_id"], 0);
        assert_eq!(config["eos_token_id"], 1);
        assert!(config.get("tie_word_embeddings").is_none());
    }

    #[test]
    fn test_normalize_prefers_generation_config() {
        let raw = json!({
            "d_model": 8, "num_heads": 2, "num_layers": 1, "vocab_size": 100,
            "eos_token_id": [5, 6], "pad_token_id": 3
        });
        let generation = json!({"decoder_start_token_id": 4, "eos_token_id": 7});
        let config = normalize_config(&raw, Architecture::MT5, Some(&generation)).unwrap();
        assert_eq!(config["decoder_start_token_id"], 4);
        assert_eq!(config["eos_token_id"], 7);
        assert_eq!(config["pad_token_id"], 3);
        assert_eq!(config["feed_forward_proj"], "gated-gelu");
        assert_eq!(config["tie_word_embeddings"], false);
    }

    #[test]
    fn test_normalize_collapses_eos_list() {
        let raw = json!({
            "d_model": 8, "num_heads": 2, "num_layers": 1, "vocab_size": 100,
            "eos_token_id": [5, 6]
        });
        let config = normalize_config(&raw, Architecture::T5, None).unwrap();
        assert_eq!(config["eos_token_id"], 5);
    }

    #[test]
    fn test_normalize_rejects_missing_dimensions() {
        let err = normalize_config(&json!({"d_model": 8}), Architecture::T5, None).unwrap_err();
        assert!(err.to_string().contains("num_heads"));
        assert!(normalize_config(&json!([1, 2]), Architecture::T5, None).is_err());
    }

    #[test]
    fn test_normalized_config_deserializes() {
        let raw = json!({"d_model": 8, "num_heads": 2, "num_layers": 1, "vocab_size": 100});
        let normalized = normalize_config(&raw, Architecture::T5, None).unwrap();
        let config: t5::Config = serde_json::from_value(normalized).unwrap();
        assert_eq!(config.eos_token_id, 1);
        assert_eq!(config.decoder_start_token_id, Some(0));
    }

    #[test]
    fn test_auto_loader_runs_partial_checkpoint() {
        let temp = TempDir::new().unwrap();
        let partial = json!({
            "architectures": ["T5ForConditionalGeneration"],
            "d_model": 8, "d_kv": 4, "d_ff": 16, "num_heads": 2, "num_layers": 1,
            "vocab_size": VOCAB.len(), "relative_attention_num_buckets": 8
        });
        let bundle = write_bundle(temp.path(), "acme/partial", &partial);
        assert!(T5Loader::new().load(&bundle).is_err());

        let (model, tokenizer) = AutoLoader::new().load(&bundle).unwrap();
        let input = tokenizer.encode("predict next day").unwrap();
        let generation = GenerationConfig { max_new_tokens: 5, deterministic: true, temperature: 1.0, seed: 0 };
        let tokens = model.generate(&input, &generation).unwrap();

        assert_eq!(model.model_id(), "acme/partial");
        assert!(tokens.len() <= 5);
        assert_eq!(model.generate(&input, &generation).unwrap(), tokens);
    }

    #[test]
    fn test_auto_loader_reads_generation_config() {
        let temp = TempDir::new().unwrap();
        let bundle = write_bundle(temp.path(), "acme/tiny", &full_config());
        std::fs::write(bundle.path("generation_config.json"), "{ broken").unwrap();
        let bundle = LocalDirSource::new(temp.path()).fetch("acme/tiny").unwrap();
        assert!(bundle.has("generation_config.json"));

        let err = AutoLoader::new().load(&bundle).err().unwrap();
        assert!(matches!(
            err,
            ModelError::SerializationError(ref m) if m.starts_with("Invalid generation_config.json")
        ));
    }

    #[test]
    fn test_auto_loader_rejects_unknown_family() {
        let temp = TempDir::new().unwrap();
        let bundle = write_bundle(temp.path(), "acme/bart", &json!({ "model_type": "bart", "d_model": 8 }));

        let err = AutoLoader::new().load(&bundle).err().unwrap();
        assert!(matches!(err, ModelError::UnsupportedModelProvider(ref m) if m.contains("acme/bart")));
    }
}
