//! Request pipelines behind the HTTP handlers

use crate::state::AppState;
use apktriage_acquisition::StagedFile;
use apktriage_core::{CompositeResult, EvidenceRecord, FeatureVector, RawEvidence, Result, SlotOutcome};
use apktriage_models::{TrainingOrchestrator, TrainingReport, TrainingRequest};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Ensemble verdicts for one analyzed package
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResponse {
    pub subject_name: String,

    #[serde(flatten)]
    pub result: CompositeResult,
}

/// Scan an uploaded package, collect the device log, and run the ensemble
pub async fn analyze_package(state: &AppState, package: &StagedFile) -> Result<AnalysisResponse> {
    let report = state
        .scanner
        .scan(package.path(), package.file_name())
        .await?;
    let permission_counts = report.permission_counts()?;
    debug!(
        hash = %report.hash,
        permissions = permission_counts.len(),
        "Scan report received"
    );

    let log_text = state
        .log_collector
        .collect(state.config.log_collector.timeout())
        .await;

    let evidence = RawEvidence::new(package.file_name(), permission_counts, log_text);
    let features = state.normalizer.normalize(&evidence);

    run_ensemble(state, evidence.subject_name, features).await
}

/// Run the ensemble on already-normalized evidence
pub async fn predict_record(state: &AppState, record: EvidenceRecord) -> Result<AnalysisResponse> {
    let subject_name = record.subject_name.clone();
    let features = FeatureVector::try_from(record)?;
    run_ensemble(state, subject_name, features).await
}

async fn run_ensemble(
    state: &AppState,
    subject_name: String,
    features: FeatureVector,
) -> Result<AnalysisResponse> {
    let result = state.engine.infer(features).await?;
    record_outcomes(&result);

    info!(
        subject = %subject_name,
        ok = result.success_count(),
        failed = result.error_count(),
        latency_us = result.latency_us,
        "Ensemble complete"
    );

    Ok(AnalysisResponse {
        subject_name,
        result,
    })
}

fn record_outcomes(result: &CompositeResult) {
    for (slot, outcome) in &result.per_model_predictions {
        let status = match outcome {
            SlotOutcome::Ok(_) => "ok",
            SlotOutcome::Error(_) => "error",
        };
        metrics::counter!(
            "apktriage_slot_outcomes_total",
            "slot" => slot.clone(),
            "status" => status
        )
        .increment(1);
    }

    metrics::histogram!("apktriage_inference_latency_us").record(result.latency_us as f64);
}

/// Run a training job, then reload every slot from the new artifacts
pub async fn retrain(
    state: &AppState,
    trainer: &dyn TrainingOrchestrator,
    request: &TrainingRequest,
) -> Result<TrainingReport> {
    info!(output_dir = %request.output_dir.display(), "Training started");
    let report = trainer.train(request).await?;
    info!(accuracy = ?report.accuracy_report, "Training finished");

    state.registry.unload_all();
    if state.config.models.preload {
        let loaded = state.registry.preload().await;
        if loaded == 0 {
            warn!("No slot could be reloaded after training");
        }
    }

    Ok(report)
}
