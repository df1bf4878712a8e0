use crate::decision::{AccessPolicy, LoopTiming};
use crate::detector::DEFAULT_CONFIDENCE_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_VAR: &str = "FACEGATE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Runtime configuration shared by the daemon and the CLI.
///
/// Defaults, then an optional TOML file named by `FACEGATE_CONFIG`, then
/// `FACEGATE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Maximum descriptor distance for access to be granted. Smaller is stricter.
    pub access_threshold: f32,
    /// Minimum SCRFD score for a face candidate.
    pub detector_confidence: f32,
    /// Backoff after a failed frame read or a frame with no face.
    pub frame_retry_ms: u64,
    /// Delay between decisions.
    pub decision_interval_ms: u64,
    /// Backoff after the gallery could not be read.
    pub store_retry_ms: u64,
    /// Frames discarded at startup while camera exposure settles.
    pub warmup_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            access_threshold: 0.6,
            detector_confidence: DEFAULT_CONFIDENCE_THRESHOLD,
            frame_retry_ms: 200,
            decision_interval_ms: 700,
            store_retry_ms: 1000,
            warmup_frames: 4,
        }
    }
}

impl Config {
    /// Load the layered configuration.
    pub fn load() -> Result<Self, ConfigError> {
        let config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(config.with_env_overrides())
    }

    /// Parse a TOML file; keys it omits keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Apply `FACEGATE_*` variables over the current values.
    pub fn with_env_overrides(self) -> Self {
        Self {
            camera_device: std::env::var("FACEGATE_CAMERA_DEVICE").unwrap_or(self.camera_device),
            access_threshold: env_or("FACEGATE_ACCESS_THRESHOLD", self.access_threshold),
            detector_confidence: env_or("FACEGATE_DETECTOR_CONFIDENCE", self.detector_confidence),
            frame_retry_ms: env_or("FACEGATE_FRAME_RETRY_MS", self.frame_retry_ms),
            decision_interval_ms: env_or("FACEGATE_DECISION_INTERVAL_MS", self.decision_interval_ms),
            store_retry_ms: env_or("FACEGATE_STORE_RETRY_MS", self.store_retry_ms),
            warmup_frames: env_or("FACEGATE_WARMUP_FRAMES", self.warmup_frames),
        }
    }

    pub fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            threshold: self.access_threshold,
        }
    }

    pub fn timing(&self) -> LoopTiming {
        LoopTiming {
            frame_retry: Duration::from_millis(self.frame_retry_ms),
            decision_interval: Duration::from_millis(self.decision_interval_ms),
            store_retry: Duration::from_millis(self.store_retry_ms),
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
