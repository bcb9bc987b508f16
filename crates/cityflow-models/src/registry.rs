//! Static mapping from (category, model type) to pretrained forecaster artifacts.
//!
//! Every entry carries its display label, so callers never have to infer a
//! label from the identifier string.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{ForecastError, Result};

/// Label used for identifiers that are not in the registry.
pub const DEFAULT_FINETUNE_LABEL: &str = "Finetune model";

/// Which family of forecaster to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Single city-level model, independent of category.
    Baseline,
    /// Category-specific finetuned model.
    Finetune,
}

impl ModelKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Finetune => "finetune",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "baseline" => Ok(Self::Baseline),
            "finetune" => Ok(Self::Finetune),
            other => Err(ForecastError::UnsupportedModelType(other.to_string())),
        }
    }
}

/// One row of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelSpec {
    /// Normalized category key (`baseline` for the baseline row).
    pub key: String,
    /// Artifact source identifier (Hugging Face repo id).
    pub identifier: String,
    /// Human-readable model name shown to users.
    pub label: String,
    /// Kind of model this row describes.
    pub kind: ModelKind,
}

impl ModelSpec {
    /// Creates a finetune row.
    pub fn finetune(key: &str, identifier: &str, label: &str) -> Self {
        Self {
            key: key.to_string(),
            identifier: identifier.to_string(),
            label: label.to_string(),
            kind: ModelKind::Finetune,
        }
    }

    /// Creates the baseline row.
    pub fn baseline(identifier: &str) -> Self {
        Self {
            key: "baseline".to_string(),
            identifier: identifier.to_string(),
            label: "Baseline model".to_string(),
            kind: ModelKind::Baseline,
        }
    }
}

/// Normalizes a category into a registry key: lowercase, whitespace removed.
///
/// `"Coffee Shop"`, `"coffeeshop"` and `"CoffeeShop"` all map to `"coffeeshop"`.
#[must_use]
pub fn normalize_category(category: &str) -> String {
    category.chars().filter(|c| !c.is_whitespace()).flat_map(char::to_lowercase).collect()
}

/// Resolver over the fixed set of forecaster artifacts.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    baseline: ModelSpec,
    finetunes: Vec<ModelSpec>,
}

impl ModelRegistry {
    /// Creates a registry from a baseline row and finetune rows.
    ///
    /// Finetune keys are normalized on insertion.
    #[must_use]
    pub fn new(baseline: ModelSpec, finetunes: Vec<ModelSpec>) -> Self {
        let finetunes = finetunes
            .into_iter()
            .map(|mut spec| {
                spec.key = normalize_category(&spec.key);
                spec
            })
            .collect();
        Self { baseline, finetunes }
    }

    /// The registry of published CityFlow forecasters.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(
            ModelSpec::baseline("Altheaa21/Category-baseline"),
            vec![
                ModelSpec::finetune("bar", "Altheaa21/Category-bar", "Bar finetune model"),
                ModelSpec::finetune(
                    "coffeeshop",
                    "Altheaa21/Category-CoffeeShop",
                    "CoffeeShop finetune model",
                ),
                ModelSpec::finetune(
                    "metrostation",
                    "Altheaa21/Category-MetroStation",
                    "MetroStation finetune model",
                ),
            ],
        )
    }

    /// Resolves a (category, model type) pair to its registry row.
    ///
    /// # Errors
    /// Returns `UnsupportedModelType` for unknown model types and
    /// `UnsupportedCategory` for finetune requests on unknown categories.
    pub fn resolve(&self, category: &str, model_type: &str) -> Result<&ModelSpec> {
        match model_type.parse::<ModelKind>()? {
            ModelKind::Baseline => Ok(&self.baseline),
            ModelKind::Finetune => {
                let key = normalize_category(category);
                self.finetunes
                    .iter()
                    .find(|spec| spec.key == key)
                    .ok_or_else(|| ForecastError::UnsupportedCategory(category.to_string()))
            }
        }
    }

    /// The baseline row.
    #[must_use]
    pub fn baseline(&self) -> &ModelSpec {
        &self.baseline
    }

    /// Display label for an identifier.
    #[must_use]
    pub fn label_for(&self, identifier: &str) -> &str {
        self.specs()
            .find(|spec| spec.identifier == identifier)
            .map_or(DEFAULT_FINETUNE_LABEL, |spec| spec.label.as_str())
    }

    /// All rows, baseline first.
    pub fn specs(&self) -> impl Iterator<Item = &ModelSpec> {
        std::iter::once(&self.baseline).chain(self.finetunes.iter())
    }

    /// Number of distinct identifiers; bounds the model cache size.
    #[must_use]
    pub fn len(&self) -> usize {
        self.finetunes.len() + 1
    }

    /// Always `false`: a registry has at least the baseline row.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_is_category_independent() {
        let registry = ModelRegistry::builtin();
        for category in ["Bar", "Coffee Shop", "Museum", "", "ALL"] {
            let spec = registry.resolve(category, "baseline").unwrap();
            assert_eq!(spec.identifier, "Altheaa21/Category-baseline");
            assert_eq!(spec.kind, ModelKind::Baseline);
        }
    }

    #[test]
    fn test_finetune_normalization() {
        let registry = ModelRegistry::builtin();
        let ids: Vec<_> = ["Coffee Shop", "coffeeshop", "CoffeeShop", "  coffee  shop "]
            .iter()
            .map(|c| registry.resolve(c, "finetune").unwrap().identifier.clone())
            .collect();
        assert!(ids.iter().all(|id| id == "Altheaa21/Category-CoffeeShop"));
    }

    #[test]
    fn test_finetune_unknown_category() {
        let registry = ModelRegistry::builtin();
        let err = registry.resolve("Museum", "finetune").unwrap_err();
        assert_eq!(err, ForecastError::UnsupportedCategory("Museum".to_string()));
    }

    #[test]
    fn test_unknown_model_type() {
        let registry = ModelRegistry::builtin();
        let err = registry.resolve("Bar", "Baseline").unwrap_err();
        assert_eq!(err, ForecastError::UnsupportedModelType("Baseline".to_string()));
    }

    #[test]
    fn test_labels() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.label_for("Altheaa21/Category-baseline"), "Baseline model");
        assert_eq!(registry.label_for("Altheaa21/Category-bar"), "Bar finetune model");
        assert_eq!(
            registry.label_for("Altheaa21/Category-MetroStation"),
            "MetroStation finetune model"
        );
        assert_eq!(registry.label_for("someone/other-model"), DEFAULT_FINETUNE_LABEL);
    }

    #[test]
    fn test_specs_and_len() {
        let registry = ModelRegistry::builtin();
        assert_eq!(registry.len(), 4);
        let keys: Vec<_> = registry.specs().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, ["baseline", "bar", "coffeeshop", "metrostation"]);
    }

    #[test]
    fn test_custom_registry_normalizes_keys() {
        let registry = ModelRegistry::new(
            ModelSpec::baseline("acme/base"),
            vec![ModelSpec::finetune("Metro Station", "acme/metro", "Metro model")],
        );
        assert_eq!(registry.resolve("metro station", "finetune").unwrap().identifier, "acme/metro");
    }

    #[test]
    fn test_model_kind_round_trip() {
        assert_eq!("finetune".parse::<ModelKind>().unwrap(), ModelKind::Finetune);
        assert_eq!(ModelKind::Baseline.to_string(), "baseline");
    }
}
