//! HTTP routes

use crate::analysis::{self, AnalysisResponse};
use crate::state::AppState;
use apktriage_acquisition::stage_upload;
use apktriage_core::{Error, EvidenceRecord};
use apktriage_models::TrainingReport;
use axum::{
    body::Bytes,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Create the router with all routes
///
/// The POST endpoints answer with and without a trailing slash. Bodies over
/// `max_upload_bytes` are rejected by the extractors with 413.
pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/models", get(list_models))
        .route("/train_from_drebin", post(train))
        .route("/train_from_drebin/", post(train))
        .route("/analyze_apk_real_time", post(analyze_apk))
        .route("/analyze_apk_real_time/", post(analyze_apk))
        .route("/predict", post(predict))
        .route("/predict/", post(predict))
        .route("/ocr_logs", post(ocr_logs))
        .route("/ocr_logs/", post(ocr_logs))
        .fallback(fallback)
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn list_models(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "models": state.registry.status() }))
}

async fn train(State(state): State<AppState>) -> Result<Json<TrainingReport>, AppError> {
    metrics::counter!("apktriage_requests_total", "endpoint" => "train_from_drebin").increment(1);

    let (Some(trainer), Some(training)) = (&state.trainer, &state.config.training) else {
        return Err(AppError::TrainingUnavailable);
    };

    let report = analysis::retrain(&state, trainer.as_ref(), &training.request()).await?;
    Ok(Json(report))
}

async fn analyze_apk(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<AnalysisResponse>, AppError> {
    metrics::counter!("apktriage_requests_total", "endpoint" => "analyze_apk_real_time")
        .increment(1);

    let (file_name, bytes) = read_upload(multipart?).await?;
    info!(file = %file_name, bytes = bytes.len(), "Received package for analysis");

    let package = stage_upload(&state.config.upload_dir, &file_name, &bytes).await?;
    let response = analysis::analyze_package(&state, &package).await?;
    Ok(Json(response))
}

async fn predict(
    State(state): State<AppState>,
    record: Result<Json<EvidenceRecord>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, AppError> {
    metrics::counter!("apktriage_requests_total", "endpoint" => "predict").increment(1);

    let Json(record) = record?;
    let response = analysis::predict_record(&state, record).await?;
    Ok(Json(response))
}

async fn ocr_logs(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<serde_json::Value>, AppError> {
    metrics::counter!("apktriage_requests_total", "endpoint" => "ocr_logs").increment(1);

    let (file_name, bytes) = read_upload(multipart?).await?;

    let image = stage_upload(&state.config.upload_dir, &file_name, &bytes).await?;
    let text = state.ocr.extract_text(image.path()).await?;
    Ok(Json(json!({ "extracted_logcat": text })))
}

async fn fallback() -> AppError {
    AppError::NotFound
}

/// First `file` field of a multipart body
async fn read_upload(mut multipart: Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;
        if bytes.is_empty() {
            return Err(Error::validation("uploaded file is empty").into());
        }
        return Ok((file_name, bytes));
    }

    Err(Error::validation("missing multipart field 'file'").into())
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    Core(Error),
    /// Extractor rejection: 413 for an oversized body, 400 otherwise
    Rejected(StatusCode, String),
    Multipart(MultipartError),
    TrainingUnavailable,
    NotFound,
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Core(err)
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::Multipart(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejected(rejection_status(rejection.status()), rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::Rejected(rejection_status(rejection.status()), rejection.body_text())
    }
}

fn rejection_status(status: StatusCode) -> StatusCode {
    match status {
        StatusCode::PAYLOAD_TOO_LARGE => status,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Core(err) => err.kind(),
            AppError::Rejected(StatusCode::PAYLOAD_TOO_LARGE, _) => "payload_too_large",
            AppError::Multipart(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                "payload_too_large"
            }
            AppError::Rejected(..) | AppError::Multipart(_) => "invalid_request",
            AppError::TrainingUnavailable => "training_unavailable",
            AppError::NotFound => "not_found",
        }
    }
}

fn core_status(err: &Error) -> StatusCode {
    match err {
        Error::PipelineUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::ScanUnavailable(_) | Error::ScanReportInvalid(_) => StatusCode::BAD_GATEWAY,
        Error::OcrExtraction(_) => StatusCode::UNPROCESSABLE_ENTITY,
        Error::ModelNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        metrics::counter!("apktriage_errors_total", "kind" => self.kind()).increment(1);

        let (status, message) = match self {
            AppError::Core(err) => (core_status(&err), err.to_string()),
            AppError::Rejected(status, msg) => (status, msg),
            AppError::Multipart(err) => (rejection_status(err.status()), err.body_text()),
            AppError::TrainingUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no training program configured".to_string(),
            ),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found".to_string()),
        };

        if status.is_server_error() {
            error!(status = %status, "{}", message);
        } else {
            warn!(status = %status, "{}", message);
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
