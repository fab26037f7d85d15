//! apktriage Models
//!
//! The four-slot model ensemble behind apktriage's verdicts.
//!
//! Each slot sees a fixed view of the shared feature vector:
//! - `APITracker`: tree ensemble over the 50 static features
//! - `DeepAndroScan`: dense network over the 100 dynamic features
//! - `AndroDetector`: tree ensemble over all 150 features
//! - `BERTLogAnalyzer`: BERT classifier over the raw log text
//!
//! Artifacts load lazily (or eagerly via [`ModelRegistry::preload`]) and
//! run on CPU by default through Candle.

pub mod bert;
pub mod dense;
pub mod ensemble;
pub mod forest;
pub mod loader;
pub mod model_config;
pub mod predictor;
pub mod registry;
pub mod slot;
pub mod training;

pub use ensemble::EnsembleInferenceEngine;
pub use loader::{ArtifactLoader, FileArtifactLoader};
pub use model_config::{ArchitectureConfig, ArtifactConfig, InferenceConfig, ModelRegistryConfig, ModelSource};
pub use predictor::{InputKind, ModelInput, Predictor};
pub use registry::{ModelRegistry, SlotStatus};
pub use slot::ModelSlot;
pub use training::{CommandTrainer, TrainingOrchestrator, TrainingReport, TrainingRequest};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::ensemble::EnsembleInferenceEngine;
    pub use crate::loader::{ArtifactLoader, FileArtifactLoader};
    pub use crate::predictor::{InputKind, ModelInput, Predictor};
    pub use crate::registry::ModelRegistry;
    pub use crate::slot::ModelSlot;
}
