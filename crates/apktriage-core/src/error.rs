//! Error types for apktriage

/// Result type alias using apktriage's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for apktriage operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// External scanner could not be reached or answered with a failure status
    #[error("scanner unavailable: {0}")]
    ScanUnavailable(String),

    /// External scanner answered, but the report could not be understood
    #[error("invalid scan report: {0}")]
    ScanReportInvalid(String),

    /// OCR engine could not extract text from an image
    #[error("ocr extraction failed: {0}")]
    OcrExtraction(String),

    /// A model slot's trained artifact is missing or corrupt
    #[error("failed to load artifact for '{slot}': {message}")]
    ArtifactLoad { slot: String, message: String },

    /// A loaded model raised during prediction
    #[error("inference failed in '{slot}': {message}")]
    Inference { slot: String, message: String },

    /// No model slot with that name, or the slot is not loaded
    #[error("model '{0}' not found")]
    ModelNotFound(String),

    /// No slot could be loaded at all
    #[error("pipeline unavailable: {0}")]
    PipelineUnavailable(String),

    /// Caller-supplied input has the wrong shape or content
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Training run failed or produced an unusable report
    #[error("training error: {0}")]
    Training(String),

    /// Filesystem/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new scanner-unavailable error
    pub fn scan_unavailable(msg: impl Into<String>) -> Self {
        Self::ScanUnavailable(msg.into())
    }

    /// Create a new invalid-report error
    pub fn scan_report_invalid(msg: impl Into<String>) -> Self {
        Self::ScanReportInvalid(msg.into())
    }

    /// Create a new OCR error
    pub fn ocr(msg: impl Into<String>) -> Self {
        Self::OcrExtraction(msg.into())
    }

    /// Create a new artifact load error for a slot
    pub fn artifact_load(slot: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ArtifactLoad {
            slot: slot.into(),
            message: msg.into(),
        }
    }

    /// Create a new inference error for a slot
    pub fn inference(slot: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Inference {
            slot: slot.into(),
            message: msg.into(),
        }
    }

    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new training error
    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error came from an evidence acquisition adapter
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self,
            Self::ScanUnavailable(_) | Self::ScanReportInvalid(_) | Self::OcrExtraction(_)
        )
    }

    /// Short stable identifier, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ScanUnavailable(_) => "scan_unavailable",
            Self::ScanReportInvalid(_) => "scan_report_invalid",
            Self::OcrExtraction(_) => "ocr_extraction",
            Self::ArtifactLoad { .. } => "artifact_load",
            Self::Inference { .. } => "inference",
            Self::ModelNotFound(_) => "model_not_found",
            Self::PipelineUnavailable(_) => "pipeline_unavailable",
            Self::Validation(_) => "validation",
            Self::Config(_) => "config",
            Self::Training(_) => "training",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_grouping() {
        assert!(Error::scan_unavailable("down").is_acquisition());
        assert!(Error::scan_report_invalid("no hash").is_acquisition());
        assert!(Error::ocr("bad image").is_acquisition());
        assert!(!Error::artifact_load("APITracker", "missing").is_acquisition());
        assert!(!Error::validation("short").is_acquisition());
    }

    #[test]
    fn test_slot_errors_name_the_slot() {
        let err = Error::artifact_load("DeepAndroScan", "file not found");
        assert_eq!(
            err.to_string(),
            "failed to load artifact for 'DeepAndroScan': file not found"
        );
        assert_eq!(err.kind(), "artifact_load");
    }
}
