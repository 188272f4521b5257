use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate threshold ({duplicate}) must be positive and strictly below the recognition threshold ({recognition})")]
    ThresholdOrder { duplicate: f32, recognition: f32 },
}

/// The two matcher thresholds, always passed explicitly to the call site
/// that needs them.
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    /// Loose bound for attendance recognition.
    pub recognition: f32,
    /// Strict bound for registration-time duplicate rejection.
    pub duplicate: f32,
}

/// Service configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance below which a probe is accepted at attendance time.
    pub recognition_threshold: f32,
    /// Stricter distance below which a registration candidate is refused.
    pub duplicate_threshold: f32,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        Self {
            db_path,
            recognition_threshold: env_f32("ROLLCALL_RECOGNITION_THRESHOLD", 15.0),
            duplicate_threshold: env_f32("ROLLCALL_DUPLICATE_THRESHOLD", 3.0),
        }
    }

    /// System invariant: 0 < duplicate < recognition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.duplicate_threshold > 0.0 && self.duplicate_threshold < self.recognition_threshold
        {
            Ok(())
        } else {
            Err(ConfigError::ThresholdOrder {
                duplicate: self.duplicate_threshold,
                recognition: self.recognition_threshold,
            })
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            recognition: self.recognition_threshold,
            duplicate: self.duplicate_threshold,
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
