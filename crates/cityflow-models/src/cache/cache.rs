//! `ModelCache` implementation with single-flight loading.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::config::{CacheConfig, CacheConfigError};
use super::types::{CacheStats, ModelEntry};
use crate::error::{ForecastError, Result};
use crate::hub::{ArtifactBundle, ArtifactSource};
use crate::loader::ModelLoader;

type Slot = Arc<OnceCell<Arc<ModelEntry>>>;

/// Process-wide cache of loaded forecasters.
///
/// Concurrent first requests for the same identifier share one fetch and one
/// load. Loads run in their own task, so a caller that goes away does not
/// abandon a load in progress. A failed load leaves nothing behind, so the
/// next request retries.
pub struct ModelCache {
    inner: Arc<CacheInner>,
    slots: Mutex<HashMap<String, Slot>>,
}

struct CacheInner {
    source: Arc<dyn ArtifactSource>,
    loaders: Vec<Arc<dyn ModelLoader>>,
    config: CacheConfig,
    stats: RwLock<CacheStats>,
}

impl std::fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let loaders: Vec<&str> = self.inner.loaders.iter().map(|l| l.name()).collect();
        f.debug_struct("ModelCache")
            .field("source", &self.inner.source.name())
            .field("loaders", &loaders)
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ModelCache {
    /// Create a cache that fetches from `source` and tries `loaders` in order.
    ///
    /// # Errors
    /// Returns `CacheConfigError` if the configuration is invalid.
    pub fn new(
        source: Arc<dyn ArtifactSource>,
        loaders: Vec<Arc<dyn ModelLoader>>,
        config: CacheConfig,
    ) -> std::result::Result<Self, CacheConfigError> {
        config.validate()?;

        Ok(Self {
            inner: Arc::new(CacheInner { source, loaders, config, stats: RwLock::new(CacheStats::default()) }),
            slots: Mutex::new(HashMap::new()),
        })
    }

    fn slot(&self, identifier: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(identifier.to_string()).or_default())
    }

    /// Return the loaded forecaster for `identifier`, fetching and loading it
    /// on first use.
    ///
    /// # Errors
    /// Returns `ForecastError::ArtifactFetchFailed` if the artifacts cannot be
    /// obtained and `ForecastError::ModelLoadFailed` if no loader accepts them.
    pub async fn get_or_load(&self, identifier: &str) -> Result<Arc<ModelEntry>> {
        let slot = self.slot(identifier);

        if let Some(entry) = slot.get() {
            self.inner.record(|s| s.total_hits += 1);
            debug!(identifier, "Cache hit");
            return Ok(Arc::clone(entry));
        }

        self.inner.record(|s| s.total_misses += 1);
        debug!(identifier, "Cache miss, waiting for load");

        // The task owns the slot initialisation; dropping the handle does not cancel it.
        let inner = Arc::clone(&self.inner);
        let id = identifier.to_string();
        let task = tokio::spawn(async move {
            slot.get_or_try_init(|| inner.load(&id)).await.map(Arc::clone)
        });

        match task.await {
            Ok(result) => result,
            Err(join) => Err(ForecastError::ModelLoadFailed {
                identifier: identifier.to_string(),
                reason: format!("load task failed: {join}"),
            }),
        }
    }

    /// Whether `identifier` has a loaded entry.
    #[must_use]
    pub fn contains(&self, identifier: &str) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(identifier).is_some_and(|slot| slot.initialized())
    }

    /// Identifiers with a loaded entry, sorted.
    #[must_use]
    pub fn loaded_identifiers(&self) -> Vec<String> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> =
            slots.iter().filter(|(_, slot)| slot.initialized()).map(|(id, _)| id.clone()).collect();
        ids.sort();
        ids
    }

    /// Number of loaded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.values().filter(|slot| slot.initialized()).count()
    }

    /// Whether nothing has been loaded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get current cache statistics.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut result = self.inner.stats.read().unwrap_or_else(PoisonError::into_inner).clone();
        result.cache_size = self.len();
        result
    }
}

impl CacheInner {
    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut stats);
    }

    async fn load(&self, identifier: &str) -> Result<Arc<ModelEntry>> {
        self.record(|s| s.total_loads += 1);
        let started = Instant::now();

        let outcome = match self.fetch(identifier).await {
            Ok(bundle) => self.try_loaders(bundle).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(entry) => {
                info!(
                    identifier,
                    loader = entry.loader,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Model cached"
                );
                Ok(Arc::new(entry))
            }
            Err(e) => {
                self.record(|s| s.total_failures += 1);
                warn!(identifier, error = %e, "Model load failed");
                Err(e)
            }
        }
    }

    async fn fetch(&self, identifier: &str) -> Result<ArtifactBundle> {
        let source = Arc::clone(&self.source);
        let id = identifier.to_string();
        let task = tokio::task::spawn_blocking(move || source.fetch(&id));

        let reason = match tokio::time::timeout(self.config.fetch_timeout(), task).await {
            Ok(Ok(Ok(bundle))) => {
                debug!(identifier, source = self.source.name(), dir = %bundle.dir.display(), "Artifacts ready");
                return Ok(bundle);
            }
            Ok(Ok(Err(e))) => e.to_string(),
            Ok(Err(join)) => format!("fetch task failed: {join}"),
            Err(_) => format!("timed out after {}s", self.config.fetch_timeout_secs),
        };

        Err(ForecastError::ArtifactFetchFailed { identifier: identifier.to_string(), reason })
    }

    async fn try_loaders(&self, bundle: ArtifactBundle) -> Result<ModelEntry> {
        let bundle = Arc::new(bundle);
        let mut failures = Vec::with_capacity(self.loaders.len());

        for loader in &self.loaders {
            let name = loader.name();
            let task = {
                let loader = Arc::clone(loader);
                let bundle = Arc::clone(&bundle);
                tokio::task::spawn_blocking(move || loader.load(&bundle))
            };

            let failure = match tokio::time::timeout(self.config.load_timeout(), task).await {
                Ok(Ok(Ok((model, tokenizer)))) => {
                    return Ok(ModelEntry {
                        identifier: bundle.identifier.clone(),
                        model,
                        tokenizer,
                        loader: name,
                        loaded_at: Instant::now(),
                    });
                }
                Ok(Ok(Err(e))) => e.to_string(),
                Ok(Err(join)) => format!("load task failed: {join}"),
                Err(_) => format!("timed out after {}s", self.config.load_timeout_secs),
            };

            warn!(identifier = %bundle.identifier, loader = name, error = %failure, "Loader failed, trying next");
            failures.push(format!("{name}: {failure}"));
        }

        if failures.is_empty() {
            failures.push("no loaders configured".to_string());
        }

        Err(ForecastError::ModelLoadFailed {
            identifier: bundle.identifier.clone(),
            reason: failures.join("; "),
        })
    }
}
