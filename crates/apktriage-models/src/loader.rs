//! Artifact loading
//!
//! [`ArtifactLoader`] is the seam between the registry and wherever model
//! artifacts come from. [`FileArtifactLoader`] reads the YAML registry and
//! builds Candle-backed predictors from local files or the HuggingFace Hub.

use crate::bert::TransformerSequenceModel;
use crate::dense::SequenceNeuralModel;
use crate::forest::{ForestArtifact, TabularEnsembleModel};
use crate::model_config::{ArchitectureConfig, ArtifactConfig, ModelRegistryConfig, ModelSource};
use crate::predictor::Predictor;
use crate::slot::ModelSlot;
use apktriage_core::{Error, Result};
use async_trait::async_trait;
use candle_core::Device;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Source of loaded predictors for each slot
#[async_trait]
pub trait ArtifactLoader: Send + Sync {
    /// Load the predictor for a slot. Failures are [`Error::ArtifactLoad`].
    async fn load(&self, slot: ModelSlot) -> Result<Arc<dyn Predictor>>;

    /// Slots this loader has an artifact configured for
    fn configured_slots(&self) -> Vec<ModelSlot>;
}

/// Loads artifacts described by a [`ModelRegistryConfig`]
pub struct FileArtifactLoader {
    config: Arc<ModelRegistryConfig>,
    cache_dir: Option<PathBuf>,
}

impl FileArtifactLoader {
    pub fn new(config: ModelRegistryConfig) -> Self {
        Self {
            config: Arc::new(config),
            cache_dir: None,
        }
    }

    /// Create a loader from a registry file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(ModelRegistryConfig::from_file(path)?))
    }

    /// Override the HuggingFace download cache
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &ModelRegistryConfig {
        &self.config
    }
}

#[async_trait]
impl ArtifactLoader for FileArtifactLoader {
    async fn load(&self, slot: ModelSlot) -> Result<Arc<dyn Predictor>> {
        let config = Arc::clone(&self.config);
        let cache_dir = self.cache_dir.clone();

        // Deserializing weights and hub downloads block.
        tokio::task::spawn_blocking(move || load_blocking(&config, cache_dir, slot))
            .await
            .map_err(|e| Error::artifact_load(slot.name(), format!("loader task failed: {}", e)))?
    }

    fn configured_slots(&self) -> Vec<ModelSlot> {
        ModelSlot::ALL
            .into_iter()
            .filter(|slot| self.config.get_model(*slot).is_some())
            .collect()
    }
}

fn load_blocking(
    config: &ModelRegistryConfig,
    cache_dir: Option<PathBuf>,
    slot: ModelSlot,
) -> Result<Arc<dyn Predictor>> {
    let name = slot.name();
    let artifact = config
        .get_model(slot)
        .ok_or_else(|| Error::artifact_load(name, "no artifact configured"))?;

    let input_kind = slot.input_kind();
    if !artifact.architecture.accepts(input_kind) {
        return Err(Error::artifact_load(
            name,
            format!(
                "architecture '{}' cannot consume {} input",
                artifact.architecture.as_str(),
                input_kind.as_str()
            ),
        ));
    }

    tracing::info!(
        model = name,
        architecture = artifact.architecture.as_str(),
        "Loading model artifact"
    );

    let location = resolve_location(config, cache_dir, artifact, slot)?;
    let device = get_device(name, &artifact.inference.device)?;

    match &artifact.architecture {
        ArchitectureConfig::RandomForest => {
            let forest = ForestArtifact::from_file(&location)
                .map_err(|msg| Error::artifact_load(name, msg))?;
            let expected = input_kind.feature_dim().unwrap_or_default();
            if forest.n_features != expected {
                return Err(Error::artifact_load(
                    name,
                    format!(
                        "artifact expects {} features, slot provides {}",
                        forest.n_features, expected
                    ),
                ));
            }
            Ok(Arc::new(TabularEnsembleModel::new(name, input_kind, forest)))
        }
        ArchitectureConfig::FeedForward { hidden } => {
            let input_dim = input_kind.feature_dim().unwrap_or_default();
            let model = SequenceNeuralModel::load(
                name,
                input_kind,
                input_dim,
                hidden,
                &location,
                device,
                artifact.inference.threshold,
            )?;
            Ok(Arc::new(model))
        }
        ArchitectureConfig::BertSequenceClassification { num_labels } => {
            let model = TransformerSequenceModel::load(
                name,
                &location,
                device,
                *num_labels,
                artifact.inference.max_length,
                artifact.inference.threshold,
            )?;
            Ok(Arc::new(model))
        }
    }
}

/// Default file name inside a model directory for each architecture
fn artifact_file_name(architecture: &ArchitectureConfig) -> Option<&'static str> {
    match architecture {
        ArchitectureConfig::RandomForest => Some("model.json"),
        ArchitectureConfig::FeedForward { .. } => Some("model.safetensors"),
        ArchitectureConfig::BertSequenceClassification { .. } => None,
    }
}

/// File for single-file architectures, directory for BERT
fn resolve_location(
    config: &ModelRegistryConfig,
    cache_dir: Option<PathBuf>,
    artifact: &ArtifactConfig,
    slot: ModelSlot,
) -> Result<PathBuf> {
    let name = slot.name();
    let file_name = artifact_file_name(&artifact.architecture);

    match &artifact.source {
        ModelSource::Local { path } => {
            let path = config.resolve_local(path);
            if !path.exists() {
                return Err(Error::artifact_load(
                    name,
                    format!("Model path does not exist: {}", path.display()),
                ));
            }
            match file_name {
                Some(file) if path.is_dir() => Ok(path.join(file)),
                _ => Ok(path),
            }
        }
        ModelSource::HuggingFace { repo, revision } => {
            download_from_huggingface(name, cache_dir, repo, revision, file_name)
        }
    }
}

fn download_from_huggingface(
    name: &str,
    cache_dir: Option<PathBuf>,
    repo: &str,
    revision: &str,
    file_name: Option<&str>,
) -> Result<PathBuf> {
    tracing::info!(model = name, repo, revision, "Downloading model from HuggingFace");

    let mut builder = hf_hub::api::sync::ApiBuilder::new();
    if let Some(dir) = cache_dir.or_else(default_cache_dir) {
        builder = builder.with_cache_dir(dir);
    }
    let api = builder.build().map_err(|e| {
        Error::artifact_load(name, format!("Failed to initialize HuggingFace API: {}", e))
    })?;

    let repo_obj = api.repo(hf_hub::Repo::with_revision(
        repo.to_string(),
        hf_hub::RepoType::Model,
        revision.to_string(),
    ));

    let fetch = |file: &str| {
        repo_obj.get(file).map_err(|e| {
            Error::artifact_load(name, format!("Failed to download {} from {}: {}", file, repo, e))
        })
    };

    if let Some(file) = file_name {
        return fetch(file);
    }

    fetch("model.safetensors")?;
    let config_path = fetch("config.json")?;

    let found_tokenizer = ["tokenizer.json", "vocab.txt"].iter().any(|file| {
        match repo_obj.get(file) {
            Ok(_) => true,
            Err(_) => {
                tracing::debug!(model = name, file, "Tokenizer file not found");
                false
            }
        }
    });
    if !found_tokenizer {
        return Err(Error::artifact_load(
            name,
            "No tokenizer found (tried tokenizer.json, vocab.txt)",
        ));
    }

    let model_dir = config_path
        .parent()
        .ok_or_else(|| Error::artifact_load(name, "Invalid cache path"))?;

    tracing::info!(model = name, path = %model_dir.display(), "Model available");
    Ok(model_dir.to_path_buf())
}

fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("apktriage").join("huggingface"))
}

fn get_device(name: &str, device_str: &str) -> Result<Device> {
    match device_str.to_lowercase().as_str() {
        "cuda" | "cuda:0" => Device::new_cuda(0)
            .map_err(|e| Error::artifact_load(name, format!("Failed to initialize CUDA: {}", e))),
        "mps" | "metal" => Device::new_metal(0)
            .map_err(|e| Error::artifact_load(name, format!("Failed to initialize Metal: {}", e))),
        _ => Ok(Device::Cpu),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::ModelInput;
    use apktriage_core::{COMBINED_DIM, STATIC_DIM};

    fn forest_json(n_features: usize) -> String {
        serde_json::json!({
            "n_features": n_features,
            "trees": [{ "nodes": [{ "leaf": { "value": [1.0, 3.0] } }] }]
        })
        .to_string()
    }

    fn registry(dir: &Path, yaml: &str) -> FileArtifactLoader {
        let path = dir.join("registry.yaml");
        std::fs::write(&path, yaml).unwrap();
        FileArtifactLoader::from_file(&path).unwrap()
    }

    #[tokio::test]
    async fn test_loads_local_forest_relative_to_registry() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("api.json"), forest_json(STATIC_DIM)).unwrap();
        let loader = registry(
            dir.path(),
            "models:\n  APITracker:\n    source: { type: local, path: api.json }\n    architecture: { type: random-forest }\n",
        );

        assert_eq!(loader.configured_slots(), vec![ModelSlot::ApiTracker]);

        let predictor = loader.load(ModelSlot::ApiTracker).await.unwrap();
        assert_eq!(predictor.name(), "APITracker");
        let x = vec![0.0; STATIC_DIM];
        let unit = predictor.predict(&ModelInput::Static(&x)).unwrap();
        assert_eq!(unit.label, 1);
    }

    #[tokio::test]
    async fn test_model_directory_resolves_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let model_dir = dir.path().join("andro");
        std::fs::create_dir(&model_dir).unwrap();
        std::fs::write(model_dir.join("model.json"), forest_json(COMBINED_DIM)).unwrap();
        let loader = registry(
            dir.path(),
            "models:\n  AndroDetector:\n    source: { type: local, path: andro }\n    architecture: { type: random-forest }\n",
        );

        assert!(loader.load(ModelSlot::AndroDetector).await.is_ok());
    }

    #[tokio::test]
    async fn test_width_mismatch_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("andro.json"), forest_json(STATIC_DIM)).unwrap();
        let loader = registry(
            dir.path(),
            "models:\n  AndroDetector:\n    source: { type: local, path: andro.json }\n    architecture: { type: random-forest }\n",
        );

        let err = loader.load(ModelSlot::AndroDetector).await.err().unwrap();
        assert!(matches!(err, Error::ArtifactLoad { .. }));
        assert!(err.to_string().contains("expects 50 features, slot provides 150"));
    }

    #[tokio::test]
    async fn test_unconfigured_and_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let loader = registry(
            dir.path(),
            "models:\n  APITracker:\n    source: { type: local, path: missing.json }\n    architecture: { type: random-forest }\n",
        );

        let err = loader.load(ModelSlot::DeepAndroScan).await.err().unwrap();
        assert!(err.to_string().contains("no artifact configured"));

        let err = loader.load(ModelSlot::ApiTracker).await.err().unwrap();
        assert!(err.to_string().contains("Model path does not exist"));
    }

    #[tokio::test]
    async fn test_architecture_must_fit_slot() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bert.json"), forest_json(STATIC_DIM)).unwrap();
        let loader = registry(
            dir.path(),
            "models:\n  BERTLogAnalyzer:\n    source: { type: local, path: bert.json }\n    architecture: { type: random-forest }\n",
        );

        let err = loader.load(ModelSlot::BertLogAnalyzer).await.err().unwrap();
        assert!(err
            .to_string()
            .contains("architecture 'random-forest' cannot consume log-text input"));
    }
}
