//! Evidence normalization
//!
//! Turns raw evidence into the fixed-shape [`FeatureVector`] every model
//! slot consumes. The same transformation must run at training time and at
//! inference time, so everything here is deterministic and total:
//!
//! - Static: counts for up to [`STATIC_DIM`] permission keys, zero-padded.
//! - Dynamic: the first [`DYNAMIC_DIM`] whitespace tokens of the log, each
//!   hashed into `[0, 1)`, padded with [`DYNAMIC_FILLER`].

use crate::types::{FeatureVector, PermissionCounts, RawEvidence, DYNAMIC_DIM, STATIC_DIM};
use serde::{Deserialize, Serialize};

/// Padding value for dynamic vectors shorter than [`DYNAMIC_DIM`]
pub const DYNAMIC_FILLER: f32 = 0.1;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// How the static vector's permission keys are chosen
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum KeyOrdering {
    /// First keys of the source mapping, in its iteration order
    #[default]
    SourceOrder,

    /// An explicit column order pinned by the training pipeline
    Fixed { keys: Vec<String> },
}

/// Converts raw evidence into fixed-length feature vectors
#[derive(Debug, Clone, Default)]
pub struct EvidenceNormalizer {
    ordering: KeyOrdering,
}

impl EvidenceNormalizer {
    pub fn new(ordering: KeyOrdering) -> Self {
        Self { ordering }
    }

    pub fn ordering(&self) -> &KeyOrdering {
        &self.ordering
    }

    /// Normalize one package's raw evidence
    pub fn normalize(&self, evidence: &RawEvidence) -> FeatureVector {
        let keys = self.select_keys(&evidence.permission_counts);

        FeatureVector {
            static_features: normalize_static(&evidence.permission_counts, &keys),
            dynamic_features: normalize_dynamic(&evidence.log_text),
            raw_log_text: evidence.log_text.clone(),
        }
    }

    /// Ordered list of at most [`STATIC_DIM`] keys for the static vector
    pub fn select_keys(&self, counts: &PermissionCounts) -> Vec<String> {
        match &self.ordering {
            KeyOrdering::SourceOrder => {
                if counts.len() > STATIC_DIM {
                    tracing::debug!(
                        keys = counts.len(),
                        kept = STATIC_DIM,
                        "Truncating permission keys"
                    );
                }
                counts.keys().take(STATIC_DIM).map(str::to_string).collect()
            }
            KeyOrdering::Fixed { keys } => keys.iter().take(STATIC_DIM).cloned().collect(),
        }
    }
}

/// Static vector: the count of each key (missing key → 0), zero-padded to
/// [`STATIC_DIM`]. Keys past [`STATIC_DIM`] are ignored.
pub fn normalize_static(counts: &PermissionCounts, keys: &[String]) -> Vec<f32> {
    let mut features: Vec<f32> = keys
        .iter()
        .take(STATIC_DIM)
        .map(|key| counts.get(key).unwrap_or(0) as f32)
        .collect();

    features.resize(STATIC_DIM, 0.0);
    features
}

/// Dynamic vector: one hashed value per whitespace token for the first
/// [`DYNAMIC_DIM`] tokens, padded with [`DYNAMIC_FILLER`].
pub fn normalize_dynamic(log_text: &str) -> Vec<f32> {
    let mut features: Vec<f32> = log_text
        .split_whitespace()
        .take(DYNAMIC_DIM)
        .map(token_feature)
        .collect();

    features.resize(DYNAMIC_DIM, DYNAMIC_FILLER);
    features
}

/// `hash(token) mod 100 / 100`, always in `[0, 1)`
pub fn token_feature(token: &str) -> f32 {
    (token_hash(token) % 100) as f32 / 100.0
}

/// 64-bit FNV-1a over the token's UTF-8 bytes. Stable across processes and
/// platforms.
pub fn token_hash(token: &str) -> u64 {
    token.as_bytes().iter().fold(FNV_OFFSET_BASIS, |hash, &byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn counts(pairs: &[(&str, i64)]) -> PermissionCounts {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(token_hash(""), 0xcbf29ce484222325);
        assert_eq!(token_hash("a"), 0xaf63dc4c8601ec8c);
        assert_eq!(token_hash("foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_end_to_end_example() {
        let evidence = RawEvidence::new(
            "sample.apk",
            counts(&[("INTERNET", 1), ("SEND_SMS", 1)]),
            "boot ok boot ok",
        );

        let fv = EvidenceNormalizer::default().normalize(&evidence);

        let mut expected_static = vec![1.0, 1.0];
        expected_static.resize(STATIC_DIM, 0.0);
        assert_eq!(fv.static_features(), expected_static.as_slice());

        let boot = token_feature("boot");
        let ok = token_feature("ok");
        let dynamic = fv.dynamic_features();
        assert_eq!(dynamic.len(), DYNAMIC_DIM);
        assert_eq!(&dynamic[..4], &[boot, ok, boot, ok]);
        assert!(dynamic[4..].iter().all(|v| *v == DYNAMIC_FILLER));
        assert_eq!(fv.raw_log_text(), "boot ok boot ok");
    }

    #[test]
    fn test_empty_evidence() {
        let fv = EvidenceNormalizer::default().normalize(&RawEvidence::default());

        assert!(fv.static_features().iter().all(|v| *v == 0.0));
        assert!(fv.dynamic_features().iter().all(|v| *v == DYNAMIC_FILLER));
    }

    #[test]
    fn test_source_order_truncates_to_first_keys() {
        let many: PermissionCounts = (0..80).map(|i| (format!("PERM_{i}"), i as i64)).collect();
        let normalizer = EvidenceNormalizer::default();

        let keys = normalizer.select_keys(&many);
        assert_eq!(keys.len(), STATIC_DIM);
        assert_eq!(keys[0], "PERM_0");
        assert_eq!(keys[STATIC_DIM - 1], "PERM_49");

        let features = normalize_static(&many, &keys);
        assert_eq!(features[49], 49.0);
    }

    #[test]
    fn test_fixed_ordering_reads_missing_keys_as_zero() {
        let normalizer = EvidenceNormalizer::new(KeyOrdering::Fixed {
            keys: vec!["SEND_SMS".into(), "CAMERA".into(), "INTERNET".into()],
        });
        let evidence = RawEvidence::new("x", counts(&[("INTERNET", 4), ("SEND_SMS", 2)]), "");

        let fv = normalizer.normalize(&evidence);
        assert_eq!(&fv.static_features()[..4], &[2.0, 0.0, 4.0, 0.0]);
    }

    #[test]
    fn test_non_ascii_and_garbled_tokens() {
        let text = "Активность \u{FFFD}\u{FFFD} 日本語 \u{0}\u{7f}";
        let features = normalize_dynamic(text);

        assert_eq!(features.len(), DYNAMIC_DIM);
        assert!(features[..4].iter().all(|v| (0.0..1.0).contains(v)));
        assert_eq!(features[4], DYNAMIC_FILLER);
    }

    #[test]
    fn test_key_ordering_from_config() {
        let ordering: KeyOrdering = serde_json::from_value(serde_json::json!({
            "mode": "fixed",
            "keys": ["INTERNET", "SEND_SMS"]
        }))
        .unwrap();
        assert_eq!(
            ordering,
            KeyOrdering::Fixed {
                keys: vec!["INTERNET".into(), "SEND_SMS".into()]
            }
        );
    }

    proptest! {
        #[test]
        fn prop_static_is_fixed_length_and_prefix_matches(
            values in proptest::collection::vec(-1000i64..1000, 0..120)
        ) {
            let counts: PermissionCounts = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("P{i}"), *v))
                .collect();
            let keys = EvidenceNormalizer::default().select_keys(&counts);
            let features = normalize_static(&counts, &keys);

            prop_assert_eq!(features.len(), STATIC_DIM);
            let n = values.len().min(STATIC_DIM);
            for i in 0..n {
                prop_assert_eq!(features[i], values[i] as f32);
            }
            for v in &features[n..] {
                prop_assert_eq!(*v, 0.0);
            }
        }

        #[test]
        fn prop_dynamic_is_fixed_length_and_in_range(
            tokens in proptest::collection::vec("\\PC{1,12}", 0..150)
        ) {
            let cleaned: Vec<String> = tokens
                .iter()
                .map(|t| t.split_whitespace().collect::<String>())
                .filter(|t| !t.is_empty())
                .collect();
            let text = cleaned.join(" ");
            let features = normalize_dynamic(&text);

            prop_assert_eq!(features.len(), DYNAMIC_DIM);
            let n = cleaned.len().min(DYNAMIC_DIM);
            for i in 0..n {
                prop_assert!((0.0..1.0).contains(&features[i]));
                prop_assert_eq!(features[i], token_feature(&cleaned[i]));
            }
            for v in &features[n..] {
                prop_assert_eq!(*v, DYNAMIC_FILLER);
            }
        }

        #[test]
        fn prop_normalization_is_idempotent(
            values in proptest::collection::vec(0i64..10, 0..60),
            text in ".{0,400}"
        ) {
            let counts: PermissionCounts = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("android.permission.P{i}"), *v))
                .collect();
            let evidence = RawEvidence::new("subject", counts, text);
            let normalizer = EvidenceNormalizer::default();

            let first = normalizer.normalize(&evidence);
            let second = normalizer.normalize(&evidence);
            prop_assert_eq!(
                first.static_features().iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                second.static_features().iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
            prop_assert_eq!(
                first.dynamic_features().iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                second.dynamic_features().iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );
        }
    }
}
