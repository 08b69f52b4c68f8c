//! Configuration loader and validator for the page post scheduler.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub graph: Graph,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Interval between worker sweeps, in milliseconds.
    pub sweep_interval_ms: u64,
    /// Per-file upload size cap, in megabytes.
    pub max_upload_mb: u64,
}

/// Remote publishing API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Graph {
    pub api_base: String,
    pub version: String,
    pub image_timeout_seconds: u64,
    pub video_timeout_seconds: u64,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` and the
    /// media directory under it if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.media_dir())
    }

    /// Directory holding uploaded media blobs.
    pub fn media_dir(&self) -> String {
        format!("{}/media", self.app.data_dir.trim_end_matches('/'))
    }

    /// Upload size cap in bytes.
    pub fn max_upload_bytes(&self) -> u64 {
        self.app.max_upload_mb * 1024 * 1024
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.sweep_interval_ms == 0 {
        return Err(ConfigError::Invalid("app.sweep_interval_ms must be > 0"));
    }
    if cfg.app.max_upload_mb == 0 {
        return Err(ConfigError::Invalid("app.max_upload_mb must be > 0"));
    }

    if cfg.graph.api_base.trim().is_empty() {
        return Err(ConfigError::Invalid("graph.api_base must be non-empty"));
    }
    if !cfg.graph.api_base.starts_with("http") {
        return Err(ConfigError::Invalid("graph.api_base must be an http(s) URL"));
    }
    if cfg.graph.version.trim().is_empty() {
        return Err(ConfigError::Invalid("graph.version must be non-empty"));
    }
    if cfg.graph.image_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "graph.image_timeout_seconds must be > 0",
        ));
    }
    if cfg.graph.video_timeout_seconds == 0 {
        return Err(ConfigError::Invalid(
            "graph.video_timeout_seconds must be > 0",
        ));
    }

    Ok(())
}

/// Example YAML configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  sweep_interval_ms: 10000
  max_upload_mb: 10

graph:
  api_base: "https://graph.facebook.com/"
  version: "v20.0"
  image_timeout_seconds: 30
  video_timeout_seconds: 120
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.graph.version, "v20.0");
    }

    #[test]
    fn invalid_data_dir() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")),
            _ => panic!("wrong error"),
        }
    }

    #[test]
    fn invalid_sweep_interval() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.sweep_interval_ms = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_graph_settings() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.graph.api_base = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("api_base")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.graph.api_base = "ftp://example.com".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.graph.version = "".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.graph.video_timeout_seconds = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn upload_cap_in_bytes() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        assert_eq!(cfg.max_upload_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn ensure_dirs_creates_media_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.join("media").exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.sweep_interval_ms, 10000);
    }
}
