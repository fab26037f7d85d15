//! Ensemble inference engine
//!
//! Fans one feature vector out to every slot concurrently and gathers a
//! [`CompositeResult`] with exactly one entry per slot. A slot that fails to
//! load, errors, or panics is reported as an error marker; it never takes
//! down the other slots or the request.

use crate::predictor::Predictor;
use crate::registry::ModelRegistry;
use crate::slot::ModelSlot;
use apktriage_core::{
    CompositeResult, Error, FailureKind, FeatureVector, PredictionUnit, Result, SlotOutcome,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub struct EnsembleInferenceEngine {
    registry: Arc<ModelRegistry>,
}

impl EnsembleInferenceEngine {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// Run every slot against `features`.
    ///
    /// Returns [`Error::PipelineUnavailable`] only when no slot could load
    /// its artifact; any other mix of failures yields a partial result.
    pub async fn infer(&self, features: FeatureVector) -> Result<CompositeResult> {
        let start = Instant::now();
        let features = Arc::new(features);

        let futures = ModelSlot::ALL.into_iter().map(|slot| {
            let features = Arc::clone(&features);
            async move { (slot, self.run_slot(slot, features).await) }
        });

        let outcomes = join_all(futures).await;
        let latency_us = start.elapsed().as_micros() as u64;

        let all_unloadable = outcomes.iter().all(|(_, outcome)| {
            matches!(
                outcome,
                SlotOutcome::Error(marker) if marker.kind == FailureKind::ArtifactLoad
            )
        });
        if all_unloadable {
            let reasons: Vec<String> = outcomes
                .iter()
                .filter_map(|(slot, outcome)| {
                    outcome.marker().map(|m| format!("{}: {}", slot, m.message))
                })
                .collect();
            return Err(Error::PipelineUnavailable(format!(
                "no model could be loaded ({})",
                reasons.join("; ")
            )));
        }

        let per_model_predictions: BTreeMap<String, SlotOutcome> = outcomes
            .into_iter()
            .map(|(slot, outcome)| (slot.name().to_string(), outcome))
            .collect();

        let result = CompositeResult::new(per_model_predictions, latency_us);
        debug!(
            ok = result.success_count(),
            failed = result.error_count(),
            latency_us,
            "Ensemble inference complete"
        );
        Ok(result)
    }

    async fn run_slot(&self, slot: ModelSlot, features: Arc<FeatureVector>) -> SlotOutcome {
        let predictor = match self.registry.load_slot(slot).await {
            Ok(predictor) => predictor,
            Err(e) => {
                warn!(model = slot.name(), error = %e, "Model unavailable");
                return SlotOutcome::error(FailureKind::ArtifactLoad, e.to_string());
            }
        };

        let slot_start = Instant::now();
        let task = tokio::task::spawn_blocking(move || predict_slot(slot, predictor, &features));
        let outcome = match task.await {
            Ok(Ok(unit)) => SlotOutcome::Ok(unit),
            Ok(Err(e)) => {
                warn!(model = slot.name(), error = %e, "Inference failed");
                SlotOutcome::error(FailureKind::Inference, e.to_string())
            }
            Err(join_err) => {
                let message = if join_err.is_panic() {
                    format!("{} panicked during inference", slot)
                } else {
                    format!("{} inference task was cancelled", slot)
                };
                warn!(model = slot.name(), "{}", message);
                SlotOutcome::error(FailureKind::Inference, message)
            }
        };

        debug!(
            model = slot.name(),
            ok = outcome.is_ok(),
            latency_us = slot_start.elapsed().as_micros() as u64,
            "Slot finished"
        );
        outcome
    }
}

fn predict_slot(
    slot: ModelSlot,
    predictor: Arc<dyn Predictor>,
    features: &FeatureVector,
) -> Result<PredictionUnit> {
    let expected = slot.input_kind();
    if predictor.input_kind() != expected {
        return Err(Error::inference(
            slot.name(),
            format!(
                "predictor accepts {} input, slot provides {}",
                predictor.input_kind().as_str(),
                expected.as_str()
            ),
        ));
    }

    let mut unit = predictor.predict(&expected.view(features))?;
    if unit.label > 1 {
        return Err(Error::inference(
            slot.name(),
            format!("predictor returned label {}", unit.label),
        ));
    }
    unit.model_name = slot.name().to_string();
    Ok(unit)
}
