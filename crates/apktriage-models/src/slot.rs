//! The fixed ensemble slot table

use crate::predictor::InputKind;
use std::fmt;

/// One named, independently loadable model within the ensemble.
///
/// The slot, not configuration, decides what part of the feature vector a
/// model sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ModelSlot {
    /// Tabular tree ensemble over the static vector
    ApiTracker,
    /// Feed-forward network over the dynamic vector
    DeepAndroScan,
    /// Tabular tree ensemble over static + dynamic
    AndroDetector,
    /// Transformer sequence classifier over raw log text
    BertLogAnalyzer,
}

impl ModelSlot {
    /// Every slot, in ensemble order
    pub const ALL: [ModelSlot; 4] = [
        ModelSlot::ApiTracker,
        ModelSlot::DeepAndroScan,
        ModelSlot::AndroDetector,
        ModelSlot::BertLogAnalyzer,
    ];

    /// Registry key and result key for this slot
    pub fn name(&self) -> &'static str {
        match self {
            Self::ApiTracker => "APITracker",
            Self::DeepAndroScan => "DeepAndroScan",
            Self::AndroDetector => "AndroDetector",
            Self::BertLogAnalyzer => "BERTLogAnalyzer",
        }
    }

    pub fn input_kind(&self) -> InputKind {
        match self {
            Self::ApiTracker => InputKind::Static,
            Self::DeepAndroScan => InputKind::Dynamic,
            Self::AndroDetector => InputKind::Combined,
            Self::BertLogAnalyzer => InputKind::LogText,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|slot| slot.name() == name)
    }
}

impl fmt::Display for ModelSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apktriage_core::{COMBINED_DIM, DYNAMIC_DIM, STATIC_DIM};

    #[test]
    fn test_slot_input_composition() {
        assert_eq!(ModelSlot::ApiTracker.input_kind().feature_dim(), Some(STATIC_DIM));
        assert_eq!(ModelSlot::DeepAndroScan.input_kind().feature_dim(), Some(DYNAMIC_DIM));
        assert_eq!(ModelSlot::AndroDetector.input_kind().feature_dim(), Some(COMBINED_DIM));
        assert_eq!(ModelSlot::BertLogAnalyzer.input_kind().feature_dim(), None);
    }

    #[test]
    fn test_name_roundtrip() {
        for slot in ModelSlot::ALL {
            assert_eq!(ModelSlot::from_name(slot.name()), Some(slot));
        }
        assert_eq!(ModelSlot::from_name("apitracker"), None);
    }
}
