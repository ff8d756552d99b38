use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::env_vars::expand_env_vars;
use crate::constants::{
    DEFAULT_CHECKSUM_ALGORITHM, DEFAULT_COLLECTION_TIMEOUT_SECS, DEFAULT_COMPRESSION,
    DEFAULT_MAX_ARTIFACT_SIZE, DEFAULT_REDACTION_PATTERNS,
};
use crate::error::ConfigError;

/// Operating systems the collector can run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
}

impl Platform {
    /// Parse a platform name; anything outside {windows, linux} is unsupported.
    pub fn from_name(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_lowercase().as_str() {
            "windows" => Ok(Platform::Windows),
            "linux" => Ok(Platform::Linux),
            _ => Err(ConfigError::UnsupportedPlatform(name.to_string())),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => write!(f, "windows"),
            Platform::Linux => write!(f, "linux"),
        }
    }
}

/// Per-artifact collection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub enabled: bool,
    /// Size cap in bytes
    pub max_size: u64,
    /// Timeout in seconds
    pub timeout: u64,
    pub output_path: String,
}

/// Process-wide settings, built once by the
/// [`ConfigLoader`](crate::config::ConfigLoader) and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    pub log_level: String,
    pub log_format: String,
    /// Empty means standard output
    pub log_file: String,
    /// Seconds
    pub collection_timeout: u64,
    /// Bytes
    pub max_artifact_size: u64,
    pub temp_dir: PathBuf,
    pub rules_dir: PathBuf,
    pub sigma_rules_dir: PathBuf,
    pub output_dir: PathBuf,
    pub compression: String,
    pub checksum_algorithm: String,
    pub redaction_enabled: bool,
    pub redaction_patterns: Vec<String>,
    pub platform: Platform,
    pub allow_network: bool,
    #[serde(default)]
    pub artifacts: BTreeMap<String, ArtifactConfig>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            log_file: String::new(),
            collection_timeout: DEFAULT_COLLECTION_TIMEOUT_SECS,
            max_artifact_size: DEFAULT_MAX_ARTIFACT_SIZE,
            temp_dir: std::env::temp_dir().join("redtriage"),
            rules_dir: PathBuf::from("rules"),
            sigma_rules_dir: PathBuf::from("rules").join("sigma"),
            output_dir: PathBuf::from("output"),
            compression: DEFAULT_COMPRESSION.to_string(),
            checksum_algorithm: DEFAULT_CHECKSUM_ALGORITHM.to_string(),
            redaction_enabled: true,
            redaction_patterns: DEFAULT_REDACTION_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            platform: Platform::default(),
            allow_network: false,
            artifacts: BTreeMap::new(),
        }
    }
}

impl Configuration {
    /// Settings for an artifact, falling back to the global limits when the
    /// artifact has no entry of its own.
    pub fn get_artifact_config(&self, name: &str) -> ArtifactConfig {
        self.artifacts
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.default_artifact_config())
    }

    pub fn is_artifact_enabled(&self, name: &str) -> bool {
        self.get_artifact_config(name).enabled
    }

    /// The settings an artifact without its own entry inherits.
    pub fn default_artifact_config(&self) -> ArtifactConfig {
        ArtifactConfig {
            enabled: true,
            max_size: self.max_artifact_size,
            timeout: self.collection_timeout,
            output_path: String::new(),
        }
    }

    pub fn collection_timeout(&self) -> Duration {
        Duration::from_secs(self.collection_timeout)
    }

    pub fn log_file(&self) -> Option<&Path> {
        if self.log_file.trim().is_empty() {
            None
        } else {
            Some(Path::new(&self.log_file))
        }
    }

    /// Reject numeric limits that would make collection impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collection_timeout == 0 {
            return Err(invalid("collection_timeout", "must be greater than zero"));
        }
        if self.max_artifact_size == 0 {
            return Err(invalid("max_artifact_size", "must be greater than zero"));
        }
        for (name, artifact) in &self.artifacts {
            if artifact.max_size == 0 {
                return Err(invalid(
                    &format!("artifacts.{}.max_size", name),
                    "must be greater than zero",
                ));
            }
            if artifact.timeout == 0 {
                return Err(invalid(
                    &format!("artifacts.{}.timeout", name),
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }

    /// Expand `$VAR`, `${VAR}` and `%VAR%` references in path settings.
    pub fn expand_paths<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.log_file = expand_env_vars(&self.log_file, &lookup);
        for dir in [
            &mut self.temp_dir,
            &mut self.rules_dir,
            &mut self.sigma_rules_dir,
            &mut self.output_dir,
        ] {
            let expanded = expand_env_vars(&dir.to_string_lossy(), &lookup);
            *dir = PathBuf::from(expanded);
        }
        for artifact in self.artifacts.values_mut() {
            artifact.output_path = expand_env_vars(&artifact.output_path, &lookup);
        }
    }

    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Parse {
            origin: "configuration".to_string(),
            message: e.to_string(),
        })
    }

    /// Write the built-in defaults to `path`, refusing to replace an existing file.
    pub fn write_default_file(path: &Path) -> Result<(), ConfigError> {
        let yaml = Configuration::default().to_yaml()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|source| {
                if source.kind() == ErrorKind::AlreadyExists {
                    ConfigError::AlreadyExists(path.to_path_buf())
                } else {
                    ConfigError::Write {
                        path: path.to_path_buf(),
                        source,
                    }
                }
            })?;
        file.write_all(yaml.as_bytes())
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;

        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
