//! Model artifact configuration
//!
//! The registry file maps each slot name to where its trained artifact
//! lives and which architecture it was trained as:
//!
//! ```yaml
//! version: "1.0"
//! models:
//!   APITracker:
//!     source: { type: local, path: apitracker_model.json }
//!     architecture: { type: random-forest }
//!   DeepAndroScan:
//!     source: { type: local, path: deep_andro_scan.safetensors }
//!     architecture: { type: feed-forward, hidden: [256, 128] }
//!   BERTLogAnalyzer:
//!     source: { type: huggingface, repo: "org/bert-log-analyzer" }
//!     architecture: { type: bert-sequence-classification, num_labels: 2 }
//!     inference: { max_length: 128 }
//! ```

use crate::predictor::InputKind;
use crate::slot::ModelSlot;
use apktriage_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Artifact locations for every slot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistryConfig {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub models: HashMap<String, ArtifactConfig>,

    /// Directory relative local paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl Default for ModelRegistryConfig {
    /// A registry with no artifacts; every slot fails to load
    fn default() -> Self {
        Self {
            version: default_version(),
            models: HashMap::new(),
            base_dir: PathBuf::new(),
        }
    }
}

/// Configuration for a single slot's artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    #[serde(default)]
    pub description: String,

    /// Where to load from
    pub source: ModelSource,

    /// How to interpret the artifact
    pub architecture: ArchitectureConfig,

    /// Inference settings
    #[serde(default)]
    pub inference: InferenceConfig,
}

/// Model source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelSource {
    /// Load from local filesystem
    Local { path: PathBuf },

    /// Download from HuggingFace Hub
    HuggingFace {
        repo: String,
        #[serde(default = "default_revision")]
        revision: String,
    },
}

fn default_revision() -> String {
    "main".to_string()
}

/// Model architecture configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ArchitectureConfig {
    /// Tree ensemble serialized as JSON
    RandomForest,

    /// Dense network in safetensors, `input → hidden… → 1`
    FeedForward {
        #[serde(default = "default_hidden")]
        hidden: Vec<usize>,
    },

    /// BERT for sequence classification
    BertSequenceClassification {
        #[serde(default = "default_num_labels")]
        num_labels: usize,
    },
}

fn default_hidden() -> Vec<usize> {
    vec![256, 128]
}

fn default_num_labels() -> usize {
    2
}

impl ArchitectureConfig {
    /// Whether this architecture can consume the given input view
    pub fn accepts(&self, kind: InputKind) -> bool {
        match self {
            Self::RandomForest | Self::FeedForward { .. } => kind.feature_dim().is_some(),
            Self::BertSequenceClassification { .. } => kind == InputKind::LogText,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomForest => "random-forest",
            Self::FeedForward { .. } => "feed-forward",
            Self::BertSequenceClassification { .. } => "bert-sequence-classification",
        }
    }
}

/// Inference configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Device to run on (cpu, cuda, mps)
    #[serde(default = "default_device")]
    pub device: String,

    /// Maximum token sequence length for text models
    #[serde(default = "default_max_length")]
    pub max_length: usize,

    /// Probability above which a sample is labelled malicious
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_max_length() -> usize {
    128
}

fn default_threshold() -> f32 {
    0.5
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            max_length: default_max_length(),
            threshold: default_threshold(),
        }
    }
}

impl ModelRegistryConfig {
    /// Parse from YAML; relative paths resolve against the working directory
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse model registry: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load model registry from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read model registry {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_yaml(&contents)?;
        config.base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(config)
    }

    /// Get a slot's artifact configuration
    pub fn get_model(&self, slot: ModelSlot) -> Option<&ArtifactConfig> {
        self.models.get(slot.name())
    }

    /// Resolve a configured local path against the registry file's directory
    pub fn resolve_local(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn validate(&self) -> Result<()> {
        for name in self.models.keys() {
            if ModelSlot::from_name(name).is_none() {
                return Err(Error::config(format!(
                    "Unknown model slot '{}' (expected one of: {})",
                    name,
                    ModelSlot::ALL.map(|s| s.name()).join(", ")
                )));
            }
        }
        Ok(())
    }
}
