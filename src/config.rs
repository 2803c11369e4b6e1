//! Service configuration.
//!
//! Layered from lowest to highest priority:
//! 1. Built-in defaults
//! 2. TOML file (`--config` or `FACE_VOTE_CONFIG`)
//! 3. `FACE_VOTE_*` environment variables
//! 4. CLI flags

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::models::ModelId;
use crate::resolution::DEFAULT_MIN_DIMENSION;

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";
pub const DEFAULT_MODEL_DIR: &str = "models";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Local inference on ONNX models.
    Onnx,
    /// Remote DeepFace REST service.
    DeepfaceApi,
}

/// Resolved configuration handed to the server at construction time.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind: String,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub low_res_threshold: u32,
    pub models: Vec<ModelId>,
    pub backend: Backend,
    pub model_dir: PathBuf,
    pub api_url: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            low_res_threshold: DEFAULT_MIN_DIMENSION,
            models: ModelId::ALL.to_vec(),
            backend: Backend::Onnx,
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            api_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Shape of the TOML file and of the CLI overrides; every field optional.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PartialConfig {
    pub bind: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub max_upload_bytes: Option<usize>,
    pub low_res_threshold: Option<u32>,
    pub models: Option<Vec<ModelId>>,
    pub backend: Option<Backend>,
    pub model_dir: Option<PathBuf>,
    pub api_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl PartialConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads `FACE_VOTE_*` variables through `lookup`.
    pub fn from_env(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            bind: lookup("FACE_VOTE_BIND"),
            upload_dir: lookup("FACE_VOTE_UPLOAD_DIR").map(PathBuf::from),
            max_upload_bytes: parse_env(&lookup, "FACE_VOTE_MAX_UPLOAD_BYTES")?,
            low_res_threshold: parse_env(&lookup, "FACE_VOTE_LOW_RES_THRESHOLD")?,
            models: lookup("FACE_VOTE_MODELS")
                .map(|v| parse_models(&v))
                .transpose()?,
            backend: lookup("FACE_VOTE_BACKEND")
                .map(|v| parse_backend(&v))
                .transpose()?,
            model_dir: lookup("FACE_VOTE_MODEL_DIR").map(PathBuf::from),
            api_url: lookup("FACE_VOTE_API_URL"),
            request_timeout_secs: parse_env(&lookup, "FACE_VOTE_REQUEST_TIMEOUT_SECS")?,
        })
    }

    /// Values from `other` win when present.
    pub fn merge(&mut self, other: Self) {
        self.bind = other.bind.or(self.bind.take());
        self.upload_dir = other.upload_dir.or(self.upload_dir.take());
        self.max_upload_bytes = other.max_upload_bytes.or(self.max_upload_bytes);
        self.low_res_threshold = other.low_res_threshold.or(self.low_res_threshold);
        self.models = other.models.or(self.models.take());
        self.backend = other.backend.or(self.backend);
        self.model_dir = other.model_dir.or(self.model_dir.take());
        self.api_url = other.api_url.or(self.api_url.take());
        self.request_timeout_secs = other.request_timeout_secs.or(self.request_timeout_secs);
    }
}

impl AppConfig {
    /// Load from the optional file, the process environment and `overrides`.
    pub fn load(file: Option<&Path>, overrides: PartialConfig) -> Result<Self, ConfigError> {
        let env_file = std::env::var("FACE_VOTE_CONFIG").ok().map(PathBuf::from);
        let file = file.map(Path::to_path_buf).or(env_file);

        let file_config = match file {
            Some(path) => {
                info!(path = %path.display(), "loading config file");
                Some(PartialConfig::from_file(&path)?)
            }
            None => {
                debug!("no config file given");
                None
            }
        };

        Self::resolve(file_config, |key| std::env::var(key).ok(), overrides)
    }

    pub fn resolve(
        file: Option<PartialConfig>,
        env: impl Fn(&str) -> Option<String>,
        overrides: PartialConfig,
    ) -> Result<Self, ConfigError> {
        let mut layered = file.unwrap_or_default();
        layered.merge(PartialConfig::from_env(env)?);
        layered.merge(overrides);

        let defaults = Self::default();
        let config = Self {
            bind: layered.bind.unwrap_or(defaults.bind),
            upload_dir: layered.upload_dir.unwrap_or(defaults.upload_dir),
            max_upload_bytes: layered.max_upload_bytes.unwrap_or(defaults.max_upload_bytes),
            low_res_threshold: layered.low_res_threshold.unwrap_or(defaults.low_res_threshold),
            models: layered.models.unwrap_or(defaults.models),
            backend: layered.backend.unwrap_or(defaults.backend),
            model_dir: layered.model_dir.unwrap_or(defaults.model_dir),
            api_url: layered.api_url.or(defaults.api_url),
            request_timeout_secs: layered
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.models.is_empty() {
            return Err(ConfigError::Invalid {
                key: "models",
                message: "at least one model is required".to_string(),
            });
        }
        if self.low_res_threshold == 0 {
            return Err(ConfigError::Invalid {
                key: "low_res_threshold",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "max_upload_bytes",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.backend == Backend::DeepfaceApi && self.api_url.is_none() {
            return Err(ConfigError::Invalid {
                key: "api_url",
                message: "required when backend is deepface-api".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_env<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|v| {
            v.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                key,
                message: format!("{v:?}: {e}"),
            })
        })
        .transpose()
}

/// Comma-separated model list, e.g. `ArcFace,Facenet`.
pub fn parse_models(value: &str) -> Result<Vec<ModelId>, ConfigError> {
    value
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.parse::<ModelId>().map_err(|message| ConfigError::Invalid {
                key: "models",
                message,
            })
        })
        .collect()
}

fn parse_backend(value: &str) -> Result<Backend, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "onnx" => Ok(Backend::Onnx),
        "deepface-api" | "deepface_api" => Ok(Backend::DeepfaceApi),
        other => Err(ConfigError::Invalid {
            key: "backend",
            message: format!("unknown backend '{other}'"),
        }),
    }
}
