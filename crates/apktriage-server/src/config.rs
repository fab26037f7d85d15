//! Server configuration
//!
//! Resolution order: built-in defaults, then the YAML file (if present),
//! then `MOBSF_URL` / `MOBSF_API_KEY`, then command-line flags.

use apktriage_acquisition::{LogCollectorConfig, OcrConfig, ScannerConfig};
use apktriage_core::KeyOrdering;
use apktriage_models::TrainingRequest;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub models: ModelsConfig,

    /// Which permission keys feed the static vector
    #[serde(default)]
    pub normalizer: KeyOrdering,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub log_collector: LogCollectorConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    /// Training trigger; `POST /train_from_drebin` answers 503 without it
    #[serde(default)]
    pub training: Option<TrainingConfig>,

    /// Where uploads are staged while they are analyzed
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Largest accepted request body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Model registry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// Path to the model registry YAML
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Load every slot at startup instead of on first use
    #[serde(default = "default_true")]
    pub preload: bool,

    /// Hugging Face download cache
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            preload: true,
            cache_dir: None,
        }
    }
}

/// External training program settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Permission feature dataset with labels
    pub primary_dataset: PathBuf,

    /// Runtime log dataset
    pub log_dataset: PathBuf,

    /// Where the trainer writes artifacts; normally the registry's directory
    pub output_dir: PathBuf,

    #[serde(default = "default_training_timeout_secs")]
    pub timeout_secs: u64,
}

impl TrainingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request(&self) -> TrainingRequest {
        TrainingRequest {
            primary_dataset: self.primary_dataset.clone(),
            log_dataset: self.log_dataset.clone(),
            output_dir: self.output_dir.clone(),
        }
    }
}

/// Values taken from the command line, applied last
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub listen: Option<String>,
    pub port: Option<u16>,
    pub models: Option<PathBuf>,
    pub no_preload: bool,
}

impl ServerConfig {
    /// Load configuration from file, environment and CLI overrides
    pub fn load(config_path: impl AsRef<Path>, overrides: &ConfigOverrides) -> anyhow::Result<Self> {
        let config_path = config_path.as_ref();

        // Try to load from file, or use defaults
        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            Self::from_yaml(&content)?
        } else {
            tracing::info!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply scanner environment overrides
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("MOBSF_URL") {
            self.scanner.url = url;
        }

        if let Some(api_key) = lookup("MOBSF_API_KEY") {
            self.scanner.api_key = api_key;
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(listen) = &overrides.listen {
            self.listen = listen.clone();
        }

        if let Some(port) = overrides.port {
            self.port = port;
        }

        if let Some(models) = &overrides.models {
            self.models.registry_path = models.clone();
        }

        if overrides.no_preload {
            self.models.preload = false;
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_port(),
            models: ModelsConfig::default(),
            normalizer: KeyOrdering::default(),
            scanner: ScannerConfig::default(),
            log_collector: LogCollectorConfig::default(),
            ocr: OcrConfig::default(),
            training: None,
            upload_dir: default_upload_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("models/registry.yaml")
}

fn default_upload_dir() -> PathBuf {
    std::env::temp_dir().join("apktriage-uploads")
}

fn default_max_upload_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_training_timeout_secs() -> u64 {
    6 * 60 * 60
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml(
            r#"
port: 9000
scanner:
  url: "http://mobsf:8000"
log_collector:
  timeout_secs: 3
normalizer:
  mode: fixed
  keys: ["android.permission.INTERNET"]
"#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.listen, "0.0.0.0");
        assert_eq!(config.scanner.url, "http://mobsf:8000");
        assert_eq!(config.scanner.timeout_secs, 300);
        assert_eq!(config.log_collector.timeout(), Duration::from_secs(3));
        assert_eq!(config.log_collector.program, "adb");
        assert!(config.models.preload);
        assert!(config.training.is_none());
        assert_eq!(
            config.normalizer,
            KeyOrdering::Fixed {
                keys: vec!["android.permission.INTERNET".to_string()]
            }
        );
    }

    #[test]
    fn test_env_then_cli_overrides() {
        let mut config = ServerConfig::default();
        config.apply_env(|key| match key {
            "MOBSF_URL" => Some("http://scanner:8000".to_string()),
            "MOBSF_API_KEY" => Some("k3y".to_string()),
            _ => None,
        });
        config.apply_overrides(&ConfigOverrides {
            listen: Some("127.0.0.1".to_string()),
            port: Some(8080),
            models: Some(PathBuf::from("/srv/models/registry.yaml")),
            no_preload: true,
        });

        assert_eq!(config.scanner.url, "http://scanner:8000");
        assert_eq!(config.scanner.api_key, "k3y");
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
        assert_eq!(
            config.models.registry_path,
            PathBuf::from("/srv/models/registry.yaml")
        );
        assert!(!config.models.preload);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(
            dir.path().join("absent.yaml"),
            &ConfigOverrides::default(),
        )
        .unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.models.registry_path, PathBuf::from("models/registry.yaml"));
    }

    #[test]
    fn test_training_section() {
        let config = ServerConfig::from_yaml(
            r#"
training:
  program: python3
  args: ["train.py"]
  primary_dataset: data/drebin.csv
  log_dataset: data/logs.csv
  output_dir: models
"#,
        )
        .unwrap();

        let training = config.training.unwrap();
        assert_eq!(training.timeout(), Duration::from_secs(21600));
        let request = training.request();
        assert_eq!(request.primary_dataset, PathBuf::from("data/drebin.csv"));
        assert_eq!(request.output_dir, PathBuf::from("models"));
    }
}
