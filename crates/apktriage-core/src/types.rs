//! Core types for apktriage

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Length of the static (permission) feature vector
pub const STATIC_DIM: usize = 50;

/// Length of the dynamic (runtime log) feature vector
pub const DYNAMIC_DIM: usize = 100;

/// Length of the static + dynamic concatenation
pub const COMBINED_DIM: usize = STATIC_DIM + DYNAMIC_DIM;

/// Permission name → count, in the order the source document listed them.
///
/// Iteration order is part of the feature contract: the static vector is
/// built from the first keys in this order, so it must match whatever order
/// the training pipeline saw.
///
/// Lookups and inserts scan the entry list, so building a mapping of `n`
/// keys is quadratic. Scanner manifests carry at most a few hundred
/// permissions, where a scan beats hashing; this type is not meant for
/// unbounded key sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionCounts {
    entries: Vec<(String, i64)>,
}

impl PermissionCounts {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a count. Re-inserting a key overwrites the count in place.
    pub fn insert(&mut self, name: impl Into<String>, count: i64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some(entry) => entry.1 = count,
            None => self.entries.push((name, count)),
        }
    }

    /// Look up a count by permission name
    pub fn get(&self, name: &str) -> Option<i64> {
        self.entries
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| *v)
    }

    /// Permission names in iteration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in iteration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, i64)> for PermissionCounts {
    fn from_iter<I: IntoIterator<Item = (K, i64)>>(iter: I) -> Self {
        let mut counts = Self::new();
        for (name, count) in iter {
            counts.insert(name, count);
        }
        counts
    }
}

/// Raw evidence gathered for one package, before normalization
#[derive(Debug, Clone, Default)]
pub struct RawEvidence {
    /// Name of the analyzed package (usually the uploaded file name)
    pub subject_name: String,

    /// Declared permissions and their counts
    pub permission_counts: PermissionCounts,

    /// Runtime log snapshot, or a collector sentinel string
    pub log_text: String,
}

impl RawEvidence {
    pub fn new(
        subject_name: impl Into<String>,
        permission_counts: PermissionCounts,
        log_text: impl Into<String>,
    ) -> Self {
        Self {
            subject_name: subject_name.into(),
            permission_counts,
            log_text: log_text.into(),
        }
    }
}

/// Fixed-shape model input shared by every ensemble slot.
///
/// The static vector is always [`STATIC_DIM`] long and the dynamic vector
/// always [`DYNAMIC_DIM`] long.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub(crate) static_features: Vec<f32>,
    pub(crate) dynamic_features: Vec<f32>,
    pub(crate) raw_log_text: String,
}

impl FeatureVector {
    /// Build a feature vector from externally supplied values.
    ///
    /// Rejects vectors of the wrong length and non-finite values.
    pub fn new(
        static_features: Vec<f32>,
        dynamic_features: Vec<f32>,
        raw_log_text: impl Into<String>,
    ) -> Result<Self> {
        check_shape("static_features", &static_features, STATIC_DIM)?;
        check_shape("dynamic_features", &dynamic_features, DYNAMIC_DIM)?;

        Ok(Self {
            static_features,
            dynamic_features,
            raw_log_text: raw_log_text.into(),
        })
    }

    pub fn static_features(&self) -> &[f32] {
        &self.static_features
    }

    pub fn dynamic_features(&self) -> &[f32] {
        &self.dynamic_features
    }

    pub fn raw_log_text(&self) -> &str {
        &self.raw_log_text
    }

    /// Static features followed by dynamic features
    pub fn combined(&self) -> Vec<f32> {
        let mut combined = Vec::with_capacity(COMBINED_DIM);
        combined.extend_from_slice(&self.static_features);
        combined.extend_from_slice(&self.dynamic_features);
        combined
    }
}

fn check_shape(field: &str, values: &[f32], expected: usize) -> Result<()> {
    if values.len() != expected {
        return Err(Error::validation(format!(
            "{} must have exactly {} entries, got {}",
            field,
            expected,
            values.len()
        )));
    }

    if let Some(idx) = values.iter().position(|v| !v.is_finite()) {
        return Err(Error::validation(format!(
            "{}[{}] is not a finite number",
            field, idx
        )));
    }

    Ok(())
}

/// Already-normalized evidence submitted for direct prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    #[serde(alias = "apk_name")]
    pub subject_name: String,

    pub static_features: Vec<f32>,

    #[serde(alias = "dynamic_logs")]
    pub dynamic_features: Vec<f32>,

    #[serde(default, alias = "logcat")]
    pub log_text: String,
}

impl TryFrom<EvidenceRecord> for FeatureVector {
    type Error = Error;

    fn try_from(record: EvidenceRecord) -> Result<Self> {
        FeatureVector::new(
            record.static_features,
            record.dynamic_features,
            record.log_text,
        )
    }
}

/// One model's verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionUnit {
    /// Slot name of the model that produced this prediction
    pub model_name: String,

    /// 1 = malicious, 0 = benign
    pub label: u8,

    /// Malicious-class probability, when the model exposes one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_score: Option<f32>,
}

impl PredictionUnit {
    pub fn new(model_name: impl Into<String>, malicious: bool, raw_score: Option<f32>) -> Self {
        Self {
            model_name: model_name.into(),
            label: u8::from(malicious),
            raw_score,
        }
    }

    /// Label from a probability: malicious when strictly above the threshold
    pub fn from_probability(model_name: impl Into<String>, probability: f32, threshold: f32) -> Self {
        Self::new(model_name, probability > threshold, Some(probability))
    }

    pub fn is_malicious(&self) -> bool {
        self.label == 1
    }
}

/// Why a slot produced no prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ArtifactLoad,
    Inference,
}

/// Placeholder for a slot whose prediction could not be produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub kind: FailureKind,
    pub message: String,
}

/// Per-slot outcome of an ensemble call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SlotOutcome {
    Ok(PredictionUnit),
    Error(ErrorMarker),
}

impl SlotOutcome {
    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Error(ErrorMarker {
            kind,
            message: message.into(),
        })
    }

    pub fn prediction(&self) -> Option<&PredictionUnit> {
        match self {
            Self::Ok(unit) => Some(unit),
            Self::Error(_) => None,
        }
    }

    pub fn marker(&self) -> Option<&ErrorMarker> {
        match self {
            Self::Ok(_) => None,
            Self::Error(marker) => Some(marker),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Result of one ensemble call: exactly one entry per registered slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeResult {
    /// Slot name → prediction or error marker
    pub per_model_predictions: BTreeMap<String, SlotOutcome>,

    /// Wall-clock time for the whole fan-out
    pub latency_us: u64,
}

impl CompositeResult {
    pub fn new(per_model_predictions: BTreeMap<String, SlotOutcome>, latency_us: u64) -> Self {
        Self {
            per_model_predictions,
            latency_us,
        }
    }

    /// Outcome for a slot
    pub fn outcome(&self, model_name: &str) -> Option<&SlotOutcome> {
        self.per_model_predictions.get(model_name)
    }

    /// Successful prediction for a slot
    pub fn prediction(&self, model_name: &str) -> Option<&PredictionUnit> {
        self.outcome(model_name).and_then(SlotOutcome::prediction)
    }

    pub fn success_count(&self) -> usize {
        self.per_model_predictions
            .values()
            .filter(|o| o.is_ok())
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.per_model_predictions.len() - self.success_count()
    }

    pub fn len(&self) -> usize {
        self.per_model_predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_model_predictions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_counts_keep_insertion_order() {
        let mut counts = PermissionCounts::new();
        counts.insert("SEND_SMS", 1);
        counts.insert("INTERNET", 3);
        counts.insert("SEND_SMS", 2);

        let keys: Vec<_> = counts.keys().collect();
        assert_eq!(keys, vec!["SEND_SMS", "INTERNET"]);
        assert_eq!(counts.get("SEND_SMS"), Some(2));
        assert_eq!(counts.get("CAMERA"), None);
    }

    #[test]
    fn test_permission_counts_manifest_sized_collect() {
        let counts: PermissionCounts = (0..1000)
            .map(|i| (format!("PERM_{}", i % 500), i as i64))
            .collect();

        assert_eq!(counts.len(), 500);
        assert_eq!(counts.keys().next(), Some("PERM_0"));
        assert_eq!(counts.keys().last(), Some("PERM_499"));
        assert_eq!(counts.get("PERM_7"), Some(507));
    }

    #[test]
    fn test_feature_vector_rejects_wrong_shape() {
        let err = FeatureVector::new(vec![0.0; 49], vec![0.1; DYNAMIC_DIM], "").unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("static_features"));

        let err = FeatureVector::new(vec![0.0; STATIC_DIM], vec![0.1; 101], "").unwrap_err();
        assert!(err.to_string().contains("dynamic_features"));
    }

    #[test]
    fn test_feature_vector_rejects_non_finite() {
        let mut dynamic = vec![0.1; DYNAMIC_DIM];
        dynamic[7] = f32::NAN;
        let err = FeatureVector::new(vec![0.0; STATIC_DIM], dynamic, "").unwrap_err();
        assert!(err.to_string().contains("dynamic_features[7]"));
    }

    #[test]
    fn test_combined_is_static_then_dynamic() {
        let fv = FeatureVector::new(vec![1.0; STATIC_DIM], vec![0.5; DYNAMIC_DIM], "log").unwrap();
        let combined = fv.combined();
        assert_eq!(combined.len(), COMBINED_DIM);
        assert_eq!(combined[STATIC_DIM - 1], 1.0);
        assert_eq!(combined[STATIC_DIM], 0.5);
    }

    #[test]
    fn test_evidence_record_accepts_legacy_field_names() {
        let json = serde_json::json!({
            "apk_name": "sample.apk",
            "static_features": vec![0; STATIC_DIM],
            "dynamic_logs": vec![0.1; DYNAMIC_DIM],
            "logcat": "boot ok"
        });

        let record: EvidenceRecord = serde_json::from_value(json).unwrap();
        assert_eq!(record.subject_name, "sample.apk");
        assert_eq!(record.log_text, "boot ok");

        let fv = FeatureVector::try_from(record).unwrap();
        assert_eq!(fv.static_features().len(), STATIC_DIM);
    }

    #[test]
    fn test_slot_outcome_serializes_with_status_tag() {
        let ok = SlotOutcome::Ok(PredictionUnit::new("APITracker", true, Some(0.9)));
        let value = serde_json::to_value(&ok).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["label"], 1);

        let err = SlotOutcome::error(FailureKind::ArtifactLoad, "missing");
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "artifact_load");
    }

    #[test]
    fn test_probability_threshold_is_strict() {
        assert_eq!(PredictionUnit::from_probability("m", 0.5, 0.5).label, 0);
        assert_eq!(PredictionUnit::from_probability("m", 0.51, 0.5).label, 1);
    }
}
