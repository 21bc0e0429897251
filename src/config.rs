use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::DEFAULT_TRUST_THRESHOLD;
use crate::error::{PipelineError, Result};

pub const DEFAULT_CONFIG_PATH: &str = "trust-pipeline.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub storage: StorageSettings,
    pub pipeline: PipelineSettings,
    pub http: HttpSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Root directory holding `raw/` and `processed/`
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Aggregate score below which the feedback pass runs
    pub trust_threshold: f64,
    /// Feedback passes per run. Only a single pass is supported.
    pub max_feedback_passes: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Records kept from an API response when no date window is given
    pub api_record_limit: usize,
    /// Records kept from a scraped page
    pub html_record_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub dir: PathBuf,
    pub file_prefix: String,
    pub console: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            trust_threshold: DEFAULT_TRUST_THRESHOLD,
            max_feedback_passes: 1,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36".to_string(),
            api_record_limit: 15,
            html_record_limit: 100,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_prefix: "pipeline.log".to_string(),
            console: true,
        }
    }
}

impl StorageSettings {
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }
}

impl Settings {
    /// Load settings from `path` (or the default config file if it exists),
    /// then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut settings = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        settings.apply_env_overrides()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let settings: Settings = toml::from_str(&content)?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("TRUST_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("TRUST_LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var("TRUST_THRESHOLD") {
            self.pipeline.trust_threshold = raw.parse().map_err(|_| {
                PipelineError::Config(format!("TRUST_THRESHOLD is not a number: {raw}"))
            })?;
        }
        if let Ok(raw) = std::env::var("TRUST_HTTP_TIMEOUT_SECS") {
            self.http.timeout_secs = raw.parse().map_err(|_| {
                PipelineError::Config(format!("TRUST_HTTP_TIMEOUT_SECS is not an integer: {raw}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=100.0).contains(&self.pipeline.trust_threshold) {
            return Err(PipelineError::Config(format!(
                "trust_threshold must be within 0..=100, got {}",
                self.pipeline.trust_threshold
            )));
        }
        if self.pipeline.max_feedback_passes > 1 {
            return Err(PipelineError::Config(
                "max_feedback_passes cannot exceed 1".to_string(),
            ));
        }
        if self.http.timeout_secs == 0 {
            return Err(PipelineError::Config(
                "http.timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings rooted at a specific data directory, used by tests and embedders
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut settings = Self::default();
        settings.storage.data_dir = data_dir.into();
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.pipeline.trust_threshold, 95.0);
        assert_eq!(settings.http.timeout_secs, 10);
        assert_eq!(settings.storage.raw_dir(), PathBuf::from("data").join("raw"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let settings: Settings = toml::from_str(
            r#"
            [pipeline]
            trust_threshold = 90.0

            [storage]
            data_dir = "/tmp/trust"
            "#,
        )
        .unwrap();
        assert_eq!(settings.pipeline.trust_threshold, 90.0);
        assert_eq!(settings.pipeline.max_feedback_passes, 1);
        assert_eq!(settings.storage.data_dir, PathBuf::from("/tmp/trust"));
        assert_eq!(settings.http.api_record_limit, 15);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut settings = Settings::default();
        settings.pipeline.trust_threshold = 120.0;
        assert!(matches!(settings.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn rejects_extra_feedback_passes() {
        let mut settings = Settings::default();
        settings.pipeline.max_feedback_passes = 3;
        assert!(settings.validate().is_err());
    }
}
