//! apktriage Acquisition
//!
//! Adapters that gather raw evidence about a package from outside the
//! process: the static scanner, the emulator log, and OCR. Each sits behind
//! a trait so the service can be driven by mocks in tests.

pub mod logcat;
pub mod ocr;
pub mod scanner;
pub mod staging;

pub use logcat::{error_sentinel, AdbLogCollector, LogCollector, LogCollectorConfig, TIMEOUT_SENTINEL};
pub use ocr::{OcrConfig, OcrEngine, TesseractOcr};
pub use scanner::{MobsfClient, RawScanReport, ScannerClient, ScannerConfig};
pub use staging::{sanitize_file_name, stage_upload, StagedFile};
