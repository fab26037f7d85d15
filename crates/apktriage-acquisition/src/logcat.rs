//! Runtime log collection
//!
//! Collection never fails: a timeout or collector error degrades to a
//! sentinel string, which the normalizer hashes like any other log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;

/// Returned when the collector exceeds its timeout
pub const TIMEOUT_SENTINEL: &str = "[LOG] Genymotion adb logcat timed out.";

/// Text returned when the collector fails for any other reason
pub fn error_sentinel(message: impl std::fmt::Display) -> String {
    format!("[ERROR] {}", message)
}

#[async_trait]
pub trait LogCollector: Send + Sync {
    /// Capture a log snapshot, or a sentinel string
    async fn collect(&self, timeout: Duration) -> String;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogCollectorConfig {
    #[serde(default = "default_program")]
    pub program: String,

    #[serde(default = "default_args")]
    pub args: Vec<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Output beyond this many bytes is dropped
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,
}

fn default_program() -> String {
    "adb".to_string()
}

fn default_args() -> Vec<String> {
    vec!["logcat".to_string(), "-d".to_string()]
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_bytes() -> usize {
    4 * 1024 * 1024
}

impl Default for LogCollectorConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            timeout_secs: default_timeout_secs(),
            max_bytes: default_max_bytes(),
        }
    }
}

impl LogCollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Dumps the device log through `adb logcat -d` (or a configured command)
#[derive(Debug, Clone)]
pub struct AdbLogCollector {
    config: LogCollectorConfig,
}

impl AdbLogCollector {
    pub fn new(config: LogCollectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LogCollectorConfig {
        &self.config
    }

    async fn run(&self) -> std::result::Result<String, String> {
        let program = &self.config.program;
        let mut child = Command::new(program)
            .args(&self.config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to start {}: {}", program, e))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| format!("{} stdout was not captured", program))?;

        let limit = self.config.max_bytes as u64;
        let mut buf = Vec::new();
        (&mut stdout)
            .take(limit)
            .read_to_end(&mut buf)
            .await
            .map_err(|e| format!("failed to read {} output: {}", program, e))?;

        if buf.len() as u64 >= limit {
            tracing::debug!(max_bytes = limit, "Log output truncated");
            drop(stdout);
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }

        let status = child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for {}: {}", program, e))?;
        if !status.success() {
            return Err(format!("{} exited with {}", program, status));
        }

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[async_trait]
impl LogCollector for AdbLogCollector {
    async fn collect(&self, timeout: Duration) -> String {
        match tokio::time::timeout(timeout, self.run()).await {
            Ok(Ok(text)) => {
                tracing::debug!(bytes = text.len(), "Collected runtime log");
                text
            }
            Ok(Err(message)) => {
                tracing::warn!(error = %message, "Log collection failed");
                error_sentinel(message)
            }
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Log collection timed out");
                TIMEOUT_SENTINEL.to_string()
            }
        }
    }
}
