//! Training orchestration contract
//!
//! Training itself happens outside this service. An orchestrator takes the
//! two datasets, writes one artifact per slot into the output directory the
//! model registry points at, and reports a held-out accuracy per slot.

use crate::slot::ModelSlot;
use apktriage_core::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Inputs for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingRequest {
    /// Tabular dataset (permission features + labels)
    pub primary_dataset: PathBuf,

    /// Runtime log dataset
    pub log_dataset: PathBuf,

    /// Where artifacts are written
    pub output_dir: PathBuf,
}

/// Outcome of a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub status: String,

    /// Slot name → held-out accuracy in [0, 1]
    pub accuracy_report: BTreeMap<String, f64>,
}

#[async_trait]
pub trait TrainingOrchestrator: Send + Sync {
    async fn train(&self, request: &TrainingRequest) -> Result<TrainingReport>;
}

/// Runs an external training program.
///
/// The program is invoked as `<program> <args…> --primary <path> --logs
/// <path> --output <dir>` and must print a JSON object on its last
/// non-empty stdout line, either `{"accuracy_report": {...}}` or the bare
/// slot → accuracy mapping.
#[derive(Debug, Clone)]
pub struct CommandTrainer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TrainerOutput {
    Wrapped {
        #[serde(default)]
        status: Option<String>,
        accuracy_report: BTreeMap<String, f64>,
    },
    Bare(BTreeMap<String, f64>),
}

impl CommandTrainer {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    fn parse_report(stdout: &str) -> Result<TrainingReport> {
        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .ok_or_else(|| Error::training("trainer produced no output"))?;

        let output: TrainerOutput = serde_json::from_str(line)
            .map_err(|e| Error::training(format!("unparseable trainer report: {}", e)))?;

        let (status, accuracy_report) = match output {
            TrainerOutput::Wrapped {
                status,
                accuracy_report,
            } => (status.unwrap_or_else(|| "success".to_string()), accuracy_report),
            TrainerOutput::Bare(report) => ("success".to_string(), report),
        };

        for (name, accuracy) in &accuracy_report {
            if ModelSlot::from_name(name).is_none() {
                return Err(Error::training(format!(
                    "trainer reported unknown model '{}'",
                    name
                )));
            }
            if !accuracy.is_finite() || !(0.0..=1.0).contains(accuracy) {
                return Err(Error::training(format!(
                    "accuracy for {} out of range: {}",
                    name, accuracy
                )));
            }
        }

        Ok(TrainingReport {
            status,
            accuracy_report,
        })
    }
}

#[async_trait]
impl TrainingOrchestrator for CommandTrainer {
    async fn train(&self, request: &TrainingRequest) -> Result<TrainingReport> {
        tracing::info!(
            program = %self.program,
            primary = %request.primary_dataset.display(),
            logs = %request.log_dataset.display(),
            "Starting training run"
        );

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg("--primary")
            .arg(&request.primary_dataset)
            .arg("--logs")
            .arg(&request.log_dataset)
            .arg("--output")
            .arg(&request.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::training(format!("failed to start {}: {}", self.program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                Error::training(format!("training timed out after {:?}", self.timeout))
            })?
            .map_err(|e| Error::training(format!("training process failed: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::training(format!(
                "trainer exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let report = Self::parse_report(&String::from_utf8_lossy(&output.stdout))?;
        tracing::info!(models = report.accuracy_report.len(), "Training run finished");
        Ok(report)
    }
}
