//! Normalization and ensemble fan-out benchmarks
//!
//! Run with: cargo bench -p apktriage-models

use apktriage_core::{
    EvidenceNormalizer, FeatureVector, PermissionCounts, PredictionUnit, RawEvidence, Result,
};
use apktriage_models::forest::ForestArtifact;
use apktriage_models::{
    ArtifactLoader, EnsembleInferenceEngine, InputKind, ModelInput, ModelRegistry, ModelSlot,
    Predictor,
};
use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn evidence(permissions: usize, tokens: usize) -> RawEvidence {
    let counts: PermissionCounts = (0..permissions)
        .map(|i| (format!("android.permission.P{}", i), (i % 3) as i64))
        .collect();
    let log: Vec<String> = (0..tokens).map(|i| format!("I/ActivityManager:{}", i)).collect();
    RawEvidence::new("bench.apk", counts, log.join(" "))
}

fn benchmark_normalizer(c: &mut Criterion) {
    let normalizer = EvidenceNormalizer::default();
    let cases = [
        ("empty", evidence(0, 0)),
        ("typical", evidence(24, 80)),
        ("oversized", evidence(200, 5_000)),
    ];

    let mut group = c.benchmark_group("Normalizer");
    for (name, raw) in &cases {
        group.bench_with_input(BenchmarkId::new("normalize", name), raw, |b, raw| {
            b.iter(|| normalizer.normalize(black_box(raw)))
        });
    }
    group.finish();
}

/// Slot predictor backed by a small forest so the fan-out does real work
struct ForestPredictor {
    model: apktriage_models::forest::TabularEnsembleModel,
    kind: InputKind,
}

impl Predictor for ForestPredictor {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn input_kind(&self) -> InputKind {
        self.kind
    }

    fn predict(&self, input: &ModelInput<'_>) -> Result<PredictionUnit> {
        match input {
            ModelInput::LogText(text) => {
                Ok(PredictionUnit::new(self.model.name(), text.len() % 2 == 1, None))
            }
            _ => self.model.predict(input),
        }
    }
}

struct BenchLoader;

#[async_trait]
impl ArtifactLoader for BenchLoader {
    async fn load(&self, slot: ModelSlot) -> Result<Arc<dyn Predictor>> {
        let kind = slot.input_kind();
        let n_features = kind.feature_dim().unwrap_or(1);
        let nodes: Vec<serde_json::Value> = (0..63)
            .map(|i| {
                if i < 31 {
                    serde_json::json!({ "split": {
                        "feature": i % n_features,
                        "threshold": 0.5,
                        "left": 2 * i + 1,
                        "right": 2 * i + 2
                    }})
                } else {
                    serde_json::json!({ "leaf": { "value": [(i % 5) as f32, 2.0] } })
                }
            })
            .collect();
        let trees: Vec<_> = (0..50).map(|_| serde_json::json!({ "nodes": nodes })).collect();
        let artifact: ForestArtifact = serde_json::from_value(serde_json::json!({
            "n_features": n_features,
            "trees": trees,
        }))?;

        Ok(Arc::new(ForestPredictor {
            model: apktriage_models::forest::TabularEnsembleModel::new(slot.name(), kind, artifact),
            kind,
        }))
    }

    fn configured_slots(&self) -> Vec<ModelSlot> {
        ModelSlot::ALL.to_vec()
    }
}

fn benchmark_ensemble(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = EnsembleInferenceEngine::new(Arc::new(ModelRegistry::new(Arc::new(BenchLoader))));
    rt.block_on(engine.registry().preload());

    let features: FeatureVector = EvidenceNormalizer::default().normalize(&evidence(24, 80));

    c.bench_function("ensemble_infer_4_slots", |b| {
        b.iter(|| {
            rt.block_on(async { engine.infer(black_box(features.clone())).await.unwrap() })
        })
    });
}

criterion_group!(benches, benchmark_normalizer, benchmark_ensemble);
criterion_main!(benches);
