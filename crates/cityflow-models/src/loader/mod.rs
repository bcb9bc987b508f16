//! Loaders that turn an artifact bundle into a runnable forecaster.
//!
//! The cache tries loaders in order and keeps the first success. The
//! production chain is [`T5Loader`] followed by [`AutoLoader`].

#[cfg(feature = "ml-models")]
mod auto;
#[cfg(feature = "ml-models")]
mod t5;

use std::sync::Arc;

use cityflow_abstraction::{ModelError, Seq2SeqModel, TextTokenizer};

use crate::hub::ArtifactBundle;

#[cfg(feature = "ml-models")]
pub use auto::{AutoLoader, detect_architecture, normalize_config};
#[cfg(feature = "ml-models")]
pub use t5::{T5Loader, T5Seq2Seq, T5Tokenizer};

/// A loaded model and its tokenizer.
pub type LoadedPair = (Arc<dyn Seq2SeqModel>, Arc<dyn TextTokenizer>);

/// Builds a forecaster from files on disk.
///
/// Loading is blocking; the cache calls it from the blocking pool.
pub trait ModelLoader: Send + Sync {
    /// Short name recorded on the cache entry and in logs.
    fn name(&self) -> &'static str;

    /// Loads the model and tokenizer from `bundle`.
    ///
    /// # Errors
    /// Returns a `ModelError` if the bundle is not loadable by this loader.
    fn load(&self, bundle: &ArtifactBundle) -> Result<LoadedPair, ModelError>;
}

/// The loader chain used in production: family-specific first, then auto-detection.
#[cfg(feature = "ml-models")]
#[must_use]
pub fn default_loaders() -> Vec<Arc<dyn ModelLoader>> {
    vec![Arc::new(T5Loader::new()), Arc::new(AutoLoader::new())]
}
