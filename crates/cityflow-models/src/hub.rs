//! Artifact sources for pretrained forecasters.
//!
//! A source turns a model identifier into a local directory holding the
//! files listed in [`ALLOW_PATTERNS`]. Nothing outside that list is fetched.

use std::path::{Path, PathBuf};

use cityflow_abstraction::ModelError;
use tracing::debug;

/// Files fetched for every model, in download order.
pub const ALLOW_PATTERNS: [&str; 6] = [
    "config.json",
    "generation_config.json",
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "model.safetensors",
];

/// Files without which no loader can succeed.
pub const REQUIRED_FILES: [&str; 3] = ["config.json", "tokenizer.json", "model.safetensors"];

/// A model's files on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    /// Identifier the bundle was fetched for.
    pub identifier: String,
    /// Directory holding the files.
    pub dir: PathBuf,
    /// Allow-listed files that are present in `dir`.
    pub files: Vec<String>,
}

impl ArtifactBundle {
    /// Path of a file inside the bundle, whether or not it exists.
    #[must_use]
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Whether the bundle contains `file`.
    #[must_use]
    pub fn has(&self, file: &str) -> bool {
        self.files.iter().any(|f| f == file)
    }
}

/// Pull-only access to model artifacts.
///
/// Implementations block on I/O; callers run them on the blocking pool.
pub trait ArtifactSource: Send + Sync {
    /// Makes the allow-listed files for `identifier` available locally.
    ///
    /// # Errors
    /// Returns a `ModelError` if a required file cannot be obtained.
    fn fetch(&self, identifier: &str) -> Result<ArtifactBundle, ModelError>;

    /// Current revision of `identifier` at the source, if the source tracks revisions.
    ///
    /// Used as a cheap reachability check; it must not download weights.
    ///
    /// # Errors
    /// Returns a `ModelError` if the source cannot see `identifier`.
    fn revision(&self, identifier: &str) -> Result<Option<String>, ModelError> {
        let _ = identifier;
        Ok(None)
    }

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

fn missing_required(identifier: &str, files: &[String]) -> Result<(), ModelError> {
    let missing: Vec<&str> =
        REQUIRED_FILES.iter().copied().filter(|f| !files.iter().any(|have| have == f)).collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ModelError::RequestError(format!(
            "{identifier} is missing required files: {}",
            missing.join(", ")
        )))
    }
}

/// Serves bundles from `{root}/{identifier}` directories that were populated ahead of time.
#[derive(Debug, Clone)]
pub struct LocalDirSource {
    root: PathBuf,
}

impl LocalDirSource {
    /// Creates a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory of this source.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ArtifactSource for LocalDirSource {
    fn fetch(&self, identifier: &str) -> Result<ArtifactBundle, ModelError> {
        let dir = self.root.join(identifier);
        if !dir.is_dir() {
            return Err(ModelError::RequestError(format!(
                "No local artifacts for {identifier} at {}",
                dir.display()
            )));
        }

        let files: Vec<String> = ALLOW_PATTERNS
            .iter()
            .filter(|f| dir.join(f).is_file())
            .map(|f| (*f).to_string())
            .collect();
        missing_required(identifier, &files)?;

        debug!(identifier, dir = %dir.display(), file_count = files.len(), "Resolved local artifacts");
        Ok(ArtifactBundle { identifier: identifier.to_string(), dir, files })
    }

    fn revision(&self, identifier: &str) -> Result<Option<String>, ModelError> {
        let dir = self.root.join(identifier);
        if dir.join("config.json").is_file() {
            Ok(None)
        } else {
            Err(ModelError::RequestError(format!("No local artifacts for {identifier} at {}", dir.display())))
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

/// Downloads bundles from the Hugging Face Hub into a local cache directory.
#[cfg(feature = "ml-models")]
#[derive(Debug, Clone)]
pub struct HfHubSource {
    token: Option<String>,
    cache_dir: PathBuf,
}

#[cfg(feature = "ml-models")]
impl HfHubSource {
    /// Creates a source using `token` for private repos and `cache_dir` as the content store.
    pub fn new(token: Option<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self { token, cache_dir: cache_dir.into() }
    }

    fn api(&self) -> Result<hf_hub::api::sync::Api, ModelError> {
        hf_hub::api::sync::ApiBuilder::new()
            .with_cache_dir(self.cache_dir.clone())
            .with_token(self.token.clone())
            .with_progress(false)
            .build()
            .map_err(|e| ModelError::RequestError(format!("Failed to initialize Hugging Face API: {e}")))
    }

    /// Checks that the repo is reachable with the configured token.
    ///
    /// Returns the repo's current commit sha.
    ///
    /// # Errors
    /// Returns a `ModelError` if the repo metadata cannot be read.
    pub fn self_check(&self, identifier: &str) -> Result<String, ModelError> {
        let repo = self.api()?.model(identifier.to_string());
        let info = repo
            .info()
            .map_err(|e| ModelError::RequestError(format!("Cannot read {identifier}: {e}")))?;
        Ok(info.sha)
    }
}

#[cfg(feature = "ml-models")]
impl ArtifactSource for HfHubSource {
    fn fetch(&self, identifier: &str) -> Result<ArtifactBundle, ModelError> {
        tracing::info!(identifier, cache_dir = %self.cache_dir.display(), "Fetching model artifacts");
        let repo = self.api()?.model(identifier.to_string());

        let mut dir: Option<PathBuf> = None;
        let mut files = Vec::with_capacity(ALLOW_PATTERNS.len());
        for file in ALLOW_PATTERNS {
            match repo.get(file) {
                Ok(path) => {
                    debug!(identifier, file, "Artifact available");
                    if dir.is_none() {
                        dir = path.parent().map(Path::to_path_buf);
                    }
                    files.push(file.to_string());
                }
                Err(e) if REQUIRED_FILES.contains(&file) => {
                    return Err(ModelError::RequestError(format!(
                        "Failed to download {file} from {identifier}: {e}"
                    )));
                }
                Err(e) => debug!(identifier, file, error = %e, "Optional artifact unavailable"),
            }
        }

        let dir = dir.ok_or_else(|| {
            ModelError::RequestError(format!("Could not locate snapshot directory for {identifier}"))
        })?;
        Ok(ArtifactBundle { identifier: identifier.to_string(), dir, files })
    }

    fn revision(&self, identifier: &str) -> Result<Option<String>, ModelError> {
        self.self_check(identifier).map(Some)
    }

    fn name(&self) -> &'static str {
        "hf-hub"
    }
}
