//! Upload staging
//!
//! Uploaded packages and images are written to a staging directory under a
//! server-chosen name, never the client's path. The file is removed when the
//! [`StagedFile`] handle is dropped.

use apktriage_core::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A staged upload, deleted on drop
#[derive(Debug)]
pub struct StagedFile {
    path: PathBuf,
    file_name: String,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sanitized client file name
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Failed to remove staged file");
        }
    }
}

/// Client file name reduced to a safe basename.
///
/// Directory components are dropped and anything outside `[A-Za-z0-9._-]`
/// becomes `_`. Leading dots are stripped so the result is never hidden or
/// a relative path.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.chars().take(128).collect()
    }
}

/// Write `bytes` to `dir` as `{sha256}-{nonce}-{basename}`
pub async fn stage_upload(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<StagedFile> {
    tokio::fs::create_dir_all(dir).await?;

    let file_name = sanitize_file_name(file_name);
    let digest = format!("{:x}", Sha256::digest(bytes));
    let nonce = uuid::Uuid::new_v4().simple().to_string();
    let path = dir.join(format!("{}-{}-{}", digest, &nonce[..8], file_name));

    tokio::fs::write(&path, bytes).await?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), "Staged upload");

    Ok(StagedFile { path, file_name })
}
