//! Static scanner client
//!
//! Uploads a package to a MobSF instance and pulls back its static-analysis
//! report. Only the permissions section feeds the ensemble; the rest of the
//! report is kept as-is for callers that want it.

use apktriage_core::{Error, PermissionCounts, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;

/// Report returned by the scanner for one package
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawScanReport {
    /// Content hash the scanner keyed the upload by
    pub hash: String,

    pub file_name: String,

    /// Full scan report document
    pub report: Value,
}

impl RawScanReport {
    pub fn new(hash: impl Into<String>, file_name: impl Into<String>, report: Value) -> Self {
        Self {
            hash: hash.into(),
            file_name: file_name.into(),
            report,
        }
    }

    /// Permission name → count, in report document order.
    ///
    /// A missing or null section is empty. Entry values:
    /// - object/array: a declared permission, count 1
    /// - bool: 0 or 1
    /// - null: 0
    /// - number: integer part
    /// - string: parsed as a number, anything else is invalid
    pub fn permission_counts(&self) -> Result<PermissionCounts> {
        let section = match self.report.get("permissions") {
            None | Some(Value::Null) => return Ok(PermissionCounts::new()),
            Some(Value::Object(map)) => map,
            Some(other) => {
                return Err(Error::scan_report_invalid(format!(
                    "permissions section must be an object, got {}",
                    json_type(other)
                )))
            }
        };

        section
            .iter()
            .map(|(name, value)| Ok::<_, Error>((name.as_str(), permission_count(name, value)?)))
            .collect()
    }
}

fn permission_count(name: &str, value: &Value) -> Result<i64> {
    match value {
        Value::Object(_) | Value::Array(_) => Ok(1),
        Value::Bool(b) => Ok(i64::from(*b)),
        Value::Null => Ok(0),
        Value::Number(n) => number_to_count(name, n.as_i64(), n.as_f64()),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(i) = s.parse::<i64>() {
                return Ok(i);
            }
            match s.parse::<f64>() {
                Ok(f) => number_to_count(name, None, Some(f)),
                Err(_) => Err(Error::scan_report_invalid(format!(
                    "permission '{}' has non-numeric value '{}'",
                    name, s
                ))),
            }
        }
    }
}

fn number_to_count(name: &str, int: Option<i64>, float: Option<f64>) -> Result<i64> {
    if let Some(i) = int {
        return Ok(i);
    }
    match float {
        Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(f.trunc() as i64),
        _ => Err(Error::scan_report_invalid(format!(
            "permission '{}' count is out of range",
            name
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// External static scanner
#[async_trait]
pub trait ScannerClient: Send + Sync {
    /// Upload and scan a package. `file_name` is the name the scanner
    /// records for the upload, independent of where the bytes are staged.
    async fn scan(&self, package_path: &Path, file_name: &str) -> Result<RawScanReport>;
}

/// Scanner connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Base URL of the MobSF instance
    #[serde(default = "default_url")]
    pub url: String,

    /// Value sent in the `Authorization` header
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Deserialize)]
struct UploadResponse {
    hash: Option<String>,
    file_name: Option<String>,
}

/// MobSF REST API client
pub struct MobsfClient {
    http_client: reqwest::Client,
    config: ScannerConfig,
}

impl MobsfClient {
    pub fn new(config: ScannerConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::config(format!("Failed to build scanner HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            config,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn upload(&self, package_path: &Path, file_name: &str) -> Result<(String, String)> {
        let bytes = tokio::fs::read(package_path).await.map_err(|e| {
            Error::scan_unavailable(format!(
                "package {} could not be read: {}",
                package_path.display(),
                e
            ))
        })?;

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http_client
            .post(self.endpoint("/api/v1/upload"))
            .header(reqwest::header::AUTHORIZATION, &self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::scan_unavailable(format!("upload failed: {}", e)))?;

        let upload: UploadResponse = read_json(response, "upload").await?;
        let hash = upload
            .hash
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::scan_report_invalid("upload response has no hash"))?;

        let file_name = upload
            .file_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| file_name.to_string());
        Ok((hash, file_name))
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    stage: &str,
) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::scan_unavailable(format!(
            "{} returned {}: {}",
            stage,
            status,
            body.chars().take(200).collect::<String>()
        )));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::scan_unavailable(format!("{} response could not be read: {}", stage, e)))?;

    serde_json::from_str(&body)
        .map_err(|e| Error::scan_report_invalid(format!("{} response is not valid JSON: {}", stage, e)))
}

#[async_trait]
impl ScannerClient for MobsfClient {
    async fn scan(&self, package_path: &Path, file_name: &str) -> Result<RawScanReport> {
        let (hash, file_name) = self.upload(package_path, file_name).await?;
        tracing::info!(hash = %hash, file = %file_name, "Package uploaded to scanner");

        let response = self
            .http_client
            .post(self.endpoint("/api/v1/scan"))
            .header(reqwest::header::AUTHORIZATION, &self.config.api_key)
            .form(&[("hash", hash.as_str())])
            .send()
            .await
            .map_err(|e| Error::scan_unavailable(format!("scan failed: {}", e)))?;

        let report: Value = read_json(response, "scan").await?;
        if !report.is_object() {
            return Err(Error::scan_report_invalid(format!(
                "scan report must be an object, got {}",
                json_type(&report)
            )));
        }

        let report = RawScanReport::new(hash, file_name, report);
        // Surface a malformed permissions section here rather than mid-pipeline.
        let permissions = report.permission_counts()?;
        tracing::debug!(hash = %report.hash, permissions = permissions.len(), "Scan report received");

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(permissions: Value) -> RawScanReport {
        RawScanReport::new("abc", "sample.apk", json!({ "permissions": permissions }))
    }

    #[test]
    fn test_permission_counts_keep_document_order() {
        let counts = report(json!({
            "android.permission.SEND_SMS": { "status": "dangerous" },
            "android.permission.INTERNET": 3,
            "android.permission.CAMERA": ["declared"]
        }))
        .permission_counts()
        .unwrap();

        let keys: Vec<_> = counts.keys().collect();
        assert_eq!(
            keys,
            vec![
                "android.permission.SEND_SMS",
                "android.permission.INTERNET",
                "android.permission.CAMERA"
            ]
        );
        assert_eq!(counts.get("android.permission.SEND_SMS"), Some(1));
        assert_eq!(counts.get("android.permission.INTERNET"), Some(3));
    }

    #[test]
    fn test_permission_value_coercion() {
        let counts = report(json!({
            "A": true,
            "B": false,
            "C": null,
            "D": 2.9,
            "E": "4",
            "F": " 1.5 ",
            "G": -3
        }))
        .permission_counts()
        .unwrap();

        let values: Vec<_> = counts.iter().map(|(_, v)| v).collect();
        assert_eq!(values, vec![1, 0, 0, 2, 4, 1, -3]);
    }

    #[test]
    fn test_missing_section_is_empty() {
        let raw = RawScanReport::new("abc", "x.apk", json!({ "app_name": "x" }));
        assert!(raw.permission_counts().unwrap().is_empty());
        assert!(report(Value::Null).permission_counts().unwrap().is_empty());
    }

    #[test]
    fn test_malformed_section_is_invalid() {
        let err = report(json!(["INTERNET"])).permission_counts().unwrap_err();
        assert!(matches!(err, Error::ScanReportInvalid(_)));
        assert!(err.to_string().contains("got array"));

        let err = report(json!({ "INTERNET": "granted" })).permission_counts().unwrap_err();
        assert!(matches!(err, Error::ScanReportInvalid(_)));
    }

    #[tokio::test]
    async fn test_unreachable_scanner_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let apk = dir.path().join("sample.apk");
        std::fs::write(&apk, b"PK\x03\x04").unwrap();

        let client = MobsfClient::new(ScannerConfig {
            url: "http://127.0.0.1:9".to_string(),
            api_key: "key".to_string(),
            timeout_secs: 2,
        })
        .unwrap();

        let err = client.scan(&apk, "sample.apk").await.unwrap_err();
        assert!(matches!(err, Error::ScanUnavailable(_)));
    }
}
