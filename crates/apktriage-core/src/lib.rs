//! apktriage Core
//!
//! Core types, errors, and feature normalization shared across apktriage
//! components.
//!
//! This crate provides:
//! - The evidence and prediction data model
//! - Error types and result handling
//! - The deterministic evidence normalizer that fixes the shape of every
//!   model input

pub mod error;
pub mod normalize;
pub mod types;

pub use error::{Error, Result};
pub use normalize::{EvidenceNormalizer, KeyOrdering, DYNAMIC_FILLER};
pub use types::{
    CompositeResult, ErrorMarker, EvidenceRecord, FailureKind, FeatureVector, PermissionCounts,
    PredictionUnit, RawEvidence, SlotOutcome, COMBINED_DIM, DYNAMIC_DIM, STATIC_DIM,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::normalize::EvidenceNormalizer;
    pub use crate::types::{CompositeResult, FeatureVector, PredictionUnit, RawEvidence, SlotOutcome};
}
