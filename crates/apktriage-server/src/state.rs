//! Shared application state

use crate::config::ServerConfig;
use anyhow::Result;
use apktriage_acquisition::{
    AdbLogCollector, LogCollector, MobsfClient, OcrEngine, ScannerClient, TesseractOcr,
};
use apktriage_core::EvidenceNormalizer;
use apktriage_models::{
    CommandTrainer, EnsembleInferenceEngine, FileArtifactLoader, ModelRegistry,
    ModelRegistryConfig, TrainingOrchestrator,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Process-wide model registry
    pub registry: Arc<ModelRegistry>,

    /// Fans every request out to the four slots
    pub engine: Arc<EnsembleInferenceEngine>,

    pub normalizer: Arc<EvidenceNormalizer>,

    pub scanner: Arc<dyn ScannerClient>,

    pub log_collector: Arc<dyn LogCollector>,

    pub ocr: Arc<dyn OcrEngine>,

    /// Absent when no training program is configured
    pub trainer: Option<Arc<dyn TrainingOrchestrator>>,

    /// Prometheus metrics handle for rendering
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    /// Initialize application state from configuration.
    ///
    /// Models are not loaded here; see [`ModelRegistry::preload`].
    pub fn new(config: ServerConfig, metrics_handle: PrometheusHandle) -> Result<Self> {
        let registry_path = &config.models.registry_path;
        let registry_config = if registry_path.exists() {
            info!("Loading model registry from: {}", registry_path.display());
            ModelRegistryConfig::from_file(registry_path)?
        } else {
            warn!(
                path = %registry_path.display(),
                "Model registry not found; every slot will fail to load until it exists"
            );
            ModelRegistryConfig::default()
        };
        info!("Configured {} model slots", registry_config.models.len());

        let mut loader = FileArtifactLoader::new(registry_config);
        if let Some(cache_dir) = &config.models.cache_dir {
            loader = loader.with_cache_dir(cache_dir);
        }
        let registry = Arc::new(ModelRegistry::new(Arc::new(loader)));

        let scanner = MobsfClient::new(config.scanner.clone())?;
        let log_collector = AdbLogCollector::new(config.log_collector.clone());
        let ocr = TesseractOcr::new(config.ocr.clone());

        let trainer = config.training.as_ref().map(|training| {
            info!("Training program: {}", training.program);
            Arc::new(CommandTrainer::new(
                training.program.clone(),
                training.args.clone(),
                training.timeout(),
            )) as Arc<dyn TrainingOrchestrator>
        });

        Ok(Self {
            engine: Arc::new(EnsembleInferenceEngine::new(Arc::clone(&registry))),
            registry,
            normalizer: Arc::new(EvidenceNormalizer::new(config.normalizer.clone())),
            scanner: Arc::new(scanner),
            log_collector: Arc::new(log_collector),
            ocr: Arc::new(ocr),
            trainer,
            metrics_handle,
            config: Arc::new(config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn test_state_without_registry_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig::default();
        config.models.registry_path = dir.path().join("missing.yaml");

        let handle = PrometheusBuilder::new().build_recorder().handle();
        let state = AppState::new(config, handle).unwrap();

        assert!(state.trainer.is_none());
        assert!(state.registry.loaded_slots().is_empty());
        assert!(state.registry.status().iter().all(|s| !s.configured));
    }

    #[test]
    fn test_invalid_registry_is_startup_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(&path, "models:\n  Unknown:\n    source: { type: local, path: x }\n    architecture: { type: random-forest }\n").unwrap();

        let mut config = ServerConfig::default();
        config.models.registry_path = path;

        let handle = PrometheusBuilder::new().build_recorder().handle();
        assert!(AppState::new(config, handle).is_err());
    }
}
