//! Layered configuration loading.
//!
//! Precedence, lowest to highest: built-in defaults, the first `redtriage`
//! config file found in the search paths, then environment variables. The
//! layers are merged as YAML trees before the result is deserialized into a
//! [`Configuration`], so a key missing from every layer keeps its default.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use crate::config::env_vars::{env_var_name, expand_windows_vars};
use crate::config::settings::{Configuration, Platform};
use crate::constants::{
    CONFIG_BASE_NAME, CONFIG_EXTENSIONS, LINUX_CONFIG_DIRS, WINDOWS_LOCAL_APPDATA_DIR,
    WINDOWS_PROGRAM_DATA_DIR,
};
use crate::error::ConfigError;

const ARTIFACTS_KEY: &str = "artifacts";
const ARTIFACT_ENV_PREFIX: &str = "ARTIFACTS_";

/// Artifact fields reachable from the environment, with their variable suffix.
const ARTIFACT_ENV_FIELDS: &[(&str, &str)] = &[
    ("_ENABLED", "enabled"),
    ("_MAX_SIZE", "max_size"),
    ("_TIMEOUT", "timeout"),
    ("_OUTPUT_PATH", "output_path"),
];

/// Builds a [`Configuration`] from defaults, a config file and environment.
///
/// The environment is captured as a map when the loader is built, so tests
/// can supply their own variables without touching the process environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    search_paths: Vec<PathBuf>,
    explicit_file: Option<PathBuf>,
    env: BTreeMap<String, String>,
    host_os: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// A loader with no search paths and an empty environment.
    pub fn new() -> Self {
        Self {
            search_paths: Vec::new(),
            explicit_file: None,
            env: BTreeMap::new(),
            host_os: std::env::consts::OS.to_string(),
        }
    }

    /// A loader bound to the process environment and the standard search paths.
    ///
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn from_host() -> Self {
        let loader = Self::new().with_env(host_env());
        let paths = default_search_paths(&loader.host_os, |name| loader.env.get(name).cloned());
        loader.with_search_paths(paths)
    }

    pub fn with_search_paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.search_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Use this file instead of searching. A missing explicit file is an error.
    pub fn with_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_file = path;
        self
    }

    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Override the host OS used when the platform setting is empty.
    pub fn with_host_os(mut self, os: &str) -> Self {
        self.host_os = os.to_string();
        self
    }

    /// Load, merge and validate the configuration.
    pub fn load(&self) -> Result<Configuration, ConfigError> {
        let mut tree = defaults_tree()?;

        if let Some((path, content)) = self.read_config_file()? {
            let file_tree: Value =
                serde_yaml::from_str(&content).map_err(|e| ConfigError::Parse {
                    origin: path.display().to_string(),
                    message: e.to_string(),
                })?;
            match file_tree {
                Value::Null => debug!("Config file {} is empty", path.display()),
                Value::Mapping(_) => merge_values(&mut tree, file_tree),
                _ => {
                    return Err(ConfigError::Parse {
                        origin: path.display().to_string(),
                        message: "top level must be a mapping".to_string(),
                    })
                }
            }
            info!("Loaded configuration from {}", path.display());
        } else {
            debug!("No config file found, using defaults");
        }

        self.apply_env(&mut tree)?;
        fill_artifact_defaults(&mut tree)?;
        self.resolve_platform(&mut tree)?;

        let mut config: Configuration =
            serde_yaml::from_value(tree).map_err(|e| ConfigError::Parse {
                origin: "merged configuration".to_string(),
                message: e.to_string(),
            })?;
        config.expand_paths(|name| self.env.get(name).cloned());
        config.validate()?;

        debug!(
            "Configuration ready: platform={}, artifacts={}",
            config.platform,
            config.artifacts.len()
        );
        Ok(config)
    }

    /// Return the first config file that exists, with its contents.
    fn read_config_file(&self) -> Result<Option<(PathBuf, String)>, ConfigError> {
        if let Some(path) = &self.explicit_file {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            return Ok(Some((path.clone(), content)));
        }

        for dir in &self.search_paths {
            for ext in CONFIG_EXTENSIONS {
                let candidate = dir.join(format!("{}.{}", CONFIG_BASE_NAME, ext));
                match fs::read_to_string(&candidate) {
                    Ok(content) => return Ok(Some((candidate, content))),
                    Err(e) if e.kind() == ErrorKind::NotFound => continue,
                    Err(source) => {
                        return Err(ConfigError::Read {
                            path: candidate,
                            source,
                        })
                    }
                }
            }
        }
        Ok(None)
    }

    fn apply_env(&self, tree: &mut Value) -> Result<(), ConfigError> {
        let mut leaves = Vec::new();
        collect_leaf_keys(tree, &mut Vec::new(), &mut leaves);

        for key_path in leaves {
            if key_path.first().map(String::as_str) == Some(ARTIFACTS_KEY) {
                continue;
            }
            let var = env_var_name(&key_path);
            let Some(raw) = self.env.get(&var) else {
                continue;
            };
            if let Some(slot) = lookup_mut(tree, &key_path) {
                *slot = typed_env_value(&var, raw, slot)?;
                debug!("Configuration key {} overridden by {}", key_path.join("."), var);
            }
        }

        self.apply_artifact_env(tree)
    }

    /// `ARTIFACTS_<NAME>_<FIELD>` variables may name artifacts the file never mentioned.
    fn apply_artifact_env(&self, tree: &mut Value) -> Result<(), ConfigError> {
        let artifacts = artifacts_mapping(tree)?;

        for (var, raw) in &self.env {
            let Some(rest) = var.strip_prefix(ARTIFACT_ENV_PREFIX) else {
                continue;
            };
            let Some((name_upper, field)) = ARTIFACT_ENV_FIELDS.iter().find_map(|(suffix, field)| {
                rest.strip_suffix(suffix)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name, *field))
            }) else {
                continue;
            };

            let name = artifacts
                .keys()
                .filter_map(Value::as_str)
                .find(|existing| existing.to_uppercase() == name_upper)
                .map(str::to_string)
                .unwrap_or_else(|| name_upper.to_lowercase());

            let entry = artifacts
                .entry(Value::String(name.clone()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if entry.is_null() {
                *entry = Value::Mapping(Mapping::new());
            }
            let Some(entry) = entry.as_mapping_mut() else {
                return Err(ConfigError::Parse {
                    origin: format!("{}.{}", ARTIFACTS_KEY, name),
                    message: "artifact settings must be a mapping".to_string(),
                });
            };

            let template = match field {
                "enabled" => Value::Bool(true),
                "output_path" => Value::String(String::new()),
                _ => Value::Number(0u64.into()),
            };
            entry.insert(
                Value::String(field.to_string()),
                typed_env_value(var, raw, &template)?,
            );
            debug!("Artifact {} field {} overridden by {}", name, field, var);
        }
        Ok(())
    }

    fn resolve_platform(&self, tree: &mut Value) -> Result<(), ConfigError> {
        let requested = match &tree["platform"] {
            Value::Null => String::new(),
            Value::String(s) => s.trim().to_string(),
            other => {
                return Err(ConfigError::Parse {
                    origin: "platform".to_string(),
                    message: format!("expected a string, got {:?}", other),
                })
            }
        };
        let name = if requested.is_empty() {
            self.host_os.clone()
        } else {
            requested
        };
        let platform = Platform::from_name(&name)?;

        if let Some(map) = tree.as_mapping_mut() {
            map.insert(
                Value::String("platform".to_string()),
                Value::String(platform.to_string()),
            );
        }
        Ok(())
    }
}

/// Load the configuration for this process from the standard locations.
pub fn load_config(explicit: Option<&Path>) -> Result<Configuration, ConfigError> {
    ConfigLoader::from_host()
        .with_file(explicit.map(Path::to_path_buf))
        .load()
}

/// The process environment as UTF-8 pairs.
fn host_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(name, value)| match (name.into_string(), value.into_string()) {
            (Ok(name), Ok(value)) => Some((name, value)),
            (name, _) => {
                debug!("Skipping non-Unicode environment variable {:?}", name);
                None
            }
        })
        .collect()
}

/// Directories searched for `redtriage.yaml`, in order.
pub fn default_search_paths<F>(host_os: &str, lookup: F) -> Vec<PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    let mut paths = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }
    if let Some(home) = dirs::home_dir() {
        paths.push(home);
    }
    match host_os {
        "windows" => {
            paths.push(PathBuf::from(WINDOWS_PROGRAM_DATA_DIR));
            paths.push(PathBuf::from(expand_windows_vars(
                WINDOWS_LOCAL_APPDATA_DIR,
                lookup,
            )));
        }
        "linux" => paths.extend(LINUX_CONFIG_DIRS.iter().map(PathBuf::from)),
        _ => {}
    }
    paths
}

/// Defaults as a YAML tree. The platform is left empty so the loader can
/// resolve it against the host.
fn defaults_tree() -> Result<Value, ConfigError> {
    let mut tree = serde_yaml::to_value(Configuration::default()).map_err(|e| ConfigError::Parse {
        origin: "defaults".to_string(),
        message: e.to_string(),
    })?;
    if let Some(map) = tree.as_mapping_mut() {
        map.insert(
            Value::String("platform".to_string()),
            Value::String(String::new()),
        );
    }
    Ok(tree)
}

/// Recursively merge `overlay` into `base`. Null overlay values leave the base untouched.
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        if !value.is_null() {
                            base_map.insert(key, value);
                        }
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Collect the dotted paths of every non-mapping value in the tree.
fn collect_leaf_keys(value: &Value, prefix: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                if let Some(key) = key.as_str() {
                    prefix.push(key.to_string());
                    collect_leaf_keys(child, prefix, out);
                    prefix.pop();
                }
            }
        }
        _ if !prefix.is_empty() => out.push(prefix.clone()),
        _ => {}
    }
}

fn lookup_mut<'a>(tree: &'a mut Value, key_path: &[String]) -> Option<&'a mut Value> {
    key_path
        .iter()
        .try_fold(tree, |node, key| node.get_mut(key.as_str()))
}

fn artifacts_mapping(tree: &mut Value) -> Result<&mut Mapping, ConfigError> {
    let root = tree.as_mapping_mut().ok_or_else(|| ConfigError::Parse {
        origin: "configuration".to_string(),
        message: "top level must be a mapping".to_string(),
    })?;
    let node = root
        .entry(Value::String(ARTIFACTS_KEY.to_string()))
        .or_insert_with(|| Value::Mapping(Mapping::new()));
    if node.is_null() {
        *node = Value::Mapping(Mapping::new());
    }
    node.as_mapping_mut().ok_or_else(|| ConfigError::Parse {
        origin: ARTIFACTS_KEY.to_string(),
        message: "artifacts must be a mapping of name to settings".to_string(),
    })
}

/// Fill every artifact entry's missing fields from the global limits.
fn fill_artifact_defaults(tree: &mut Value) -> Result<(), ConfigError> {
    let max_size = tree["max_artifact_size"].clone();
    let timeout = tree["collection_timeout"].clone();
    let artifacts = artifacts_mapping(tree)?;

    for (name, entry) in artifacts.iter_mut() {
        if entry.is_null() {
            *entry = Value::Mapping(Mapping::new());
        }
        let Some(entry) = entry.as_mapping_mut() else {
            return Err(ConfigError::Parse {
                origin: format!("{}.{}", ARTIFACTS_KEY, name.as_str().unwrap_or("?")),
                message: "artifact settings must be a mapping".to_string(),
            });
        };
        let defaults = [
            ("enabled", Value::Bool(true)),
            ("max_size", max_size.clone()),
            ("timeout", timeout.clone()),
            ("output_path", Value::String(String::new())),
        ];
        for (field, default) in defaults {
            let key = Value::String(field.to_string());
            if entry.get(&key).map_or(true, Value::is_null) {
                entry.insert(key, default);
            }
        }
    }
    Ok(())
}

/// Convert a raw environment string to the type of the value it overrides.
fn typed_env_value(var: &str, raw: &str, current: &Value) -> Result<Value, ConfigError> {
    let bad = |expected: &str| ConfigError::Parse {
        origin: format!("environment variable {}", var),
        message: format!("expected {}, got '{}'", expected, raw),
    };

    match current {
        Value::Bool(_) => parse_bool(raw).map(Value::Bool).ok_or_else(|| bad("a boolean")),
        Value::Number(_) => raw
            .trim()
            .parse::<u64>()
            .map(|n| Value::Number(n.into()))
            .map_err(|_| bad("a non-negative integer")),
        Value::Sequence(_) => Ok(Value::Sequence(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        )),
        Value::Null => serde_yaml::from_str(raw).or_else(|_| Ok(Value::String(raw.to_string()))),
        _ => Ok(Value::String(raw.to_string())),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
