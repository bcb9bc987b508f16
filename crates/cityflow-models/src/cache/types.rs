//! Core data types for model caching.

use cityflow_abstraction::{Seq2SeqModel, TextTokenizer};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// A loaded forecaster: model, tokenizer and where they came from.
///
/// Owned by the cache and shared read-only as `Arc<ModelEntry>`.
pub struct ModelEntry {
    /// Identifier the entry was loaded for.
    pub identifier: String,
    /// The loaded model.
    pub model: Arc<dyn Seq2SeqModel>,
    /// Tokenizer matching `model`.
    pub tokenizer: Arc<dyn TextTokenizer>,
    /// Name of the loader that succeeded.
    pub loader: &'static str,
    /// When the load completed.
    pub loaded_at: Instant,
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("identifier", &self.identifier)
            .field("model_id", &self.model.model_id())
            .field("loader", &self.loader)
            .field("loaded_at", &self.loaded_at)
            .finish_non_exhaustive()
    }
}

/// Cache statistics for observability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Lookups served from an already loaded entry.
    pub total_hits: u64,
    /// Lookups that found no loaded entry (including ones that joined an in-flight load).
    pub total_misses: u64,
    /// Fetch-and-load sequences actually started.
    pub total_loads: u64,
    /// Fetch-and-load sequences that failed.
    pub total_failures: u64,
    /// Current number of loaded models.
    pub cache_size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockSeq2SeqModel, MockTokenizer};

    #[test]
    fn test_model_entry_debug_omits_handles() {
        let entry = ModelEntry {
            identifier: "acme/base".to_string(),
            model: Arc::new(MockSeq2SeqModel::new("acme/base", "1")),
            tokenizer: Arc::new(MockTokenizer),
            loader: "t5",
            loaded_at: Instant::now(),
        };
        let debug = format!("{entry:?}");
        assert!(debug.contains("acme/base"));
        assert!(debug.contains("t5"));
    }

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.total_hits, 0);
        assert_eq!(stats.total_misses, 0);
        assert_eq!(stats.total_loads, 0);
        assert_eq!(stats.total_failures, 0);
        assert_eq!(stats.cache_size, 0);
    }
}
