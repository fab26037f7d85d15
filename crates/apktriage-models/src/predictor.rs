//! Predictor trait and model input views

use apktriage_core::{FeatureVector, PredictionUnit, Result, COMBINED_DIM, DYNAMIC_DIM, STATIC_DIM};
use serde::{Deserialize, Serialize};

/// Trait for all loaded ensemble models.
///
/// Implementations are CPU-bound and synchronous; the ensemble engine runs
/// them on the blocking thread pool.
pub trait Predictor: Send + Sync {
    /// Slot name this predictor was loaded for
    fn name(&self) -> &str;

    /// The input view this predictor accepts
    fn input_kind(&self) -> InputKind;

    /// Predict a label for one input
    fn predict(&self, input: &ModelInput<'_>) -> Result<PredictionUnit>;
}

/// Which part of a [`FeatureVector`] a model consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    /// The 50-length static vector
    Static,
    /// The 100-length dynamic vector
    Dynamic,
    /// Static followed by dynamic, 150 long
    Combined,
    /// The raw log text, tokenized by the model itself
    LogText,
}

impl InputKind {
    /// Build this kind's view over a shared feature vector
    pub fn view<'a>(&self, features: &'a FeatureVector) -> ModelInput<'a> {
        match self {
            Self::Static => ModelInput::Static(features.static_features()),
            Self::Dynamic => ModelInput::Dynamic(features.dynamic_features()),
            Self::Combined => ModelInput::Combined(features.combined()),
            Self::LogText => ModelInput::LogText(features.raw_log_text()),
        }
    }

    /// Width of the numeric input, `None` for text input
    pub fn feature_dim(&self) -> Option<usize> {
        match self {
            Self::Static => Some(STATIC_DIM),
            Self::Dynamic => Some(DYNAMIC_DIM),
            Self::Combined => Some(COMBINED_DIM),
            Self::LogText => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Dynamic => "dynamic",
            Self::Combined => "combined",
            Self::LogText => "log-text",
        }
    }
}

/// One slot's view of the shared feature vector
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput<'a> {
    Static(&'a [f32]),
    Dynamic(&'a [f32]),
    Combined(Vec<f32>),
    LogText(&'a str),
}

impl<'a> ModelInput<'a> {
    pub fn kind(&self) -> InputKind {
        match self {
            Self::Static(_) => InputKind::Static,
            Self::Dynamic(_) => InputKind::Dynamic,
            Self::Combined(_) => InputKind::Combined,
            Self::LogText(_) => InputKind::LogText,
        }
    }

    /// Numeric features, if this is a numeric view
    pub fn features(&self) -> Option<&[f32]> {
        match self {
            Self::Static(values) | Self::Dynamic(values) => Some(*values),
            Self::Combined(values) => Some(values.as_slice()),
            Self::LogText(_) => None,
        }
    }

    /// Raw text, if this is a text view
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::LogText(text) => Some(*text),
            _ => None,
        }
    }
}
