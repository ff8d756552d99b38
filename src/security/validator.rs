//! Validation of command invocations and of the host they run on.
//!
//! [`CommandValidator`] vets a command name, its positional arguments and
//! its typed flags before anything is dispatched to a collector, and checks
//! that the working directory and system clock are usable. It holds no state
//! besides the strict-mode switch, so every check is a pure function of its
//! inputs and the host filesystem or clock.
//!
//! ```
//! use std::collections::BTreeMap;
//! use redtriage::security::{CommandValidator, FlagValue};
//!
//! let validator = CommandValidator::new(false);
//! let mut flags = BTreeMap::new();
//! flags.insert("timeout".to_string(), FlagValue::Int(60));
//! flags.insert("output".to_string(), FlagValue::from("/tmp/out"));
//!
//! assert!(validator
//!     .validate_command("collect", &["/tmp/out".to_string()], &flags)
//!     .is_ok());
//! assert!(validator.validate_command("help", &[], &BTreeMap::new()).is_err());
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::constants::{
    ENV_PROBE_FILE, MAX_PORT, MAX_SYSTEM_TIME, MIN_PORT, MIN_SYSTEM_TIME, PORT_FLAG,
    POSITIVE_INT_FLAGS, RESERVED_COMMANDS, STRICT_SUSPICIOUS_PATTERNS, SUSPICIOUS_PATTERNS,
    WRITE_PROBE_FILE,
};
use crate::error::{CommandError, ValidationError};
use crate::security::path_validator::{contains_traversal, is_path_flag, validate_file_path};
use crate::security::probe::ProbeFile;

lazy_static! {
    static ref NAME_PATTERN: Regex = Regex::new(r"^[A-Za-z0-9_-]+$").expect("name pattern");
    static ref TIME_WINDOW: (DateTime<Utc>, DateTime<Utc>) =
        (parse_bound(MIN_SYSTEM_TIME), parse_bound(MAX_SYSTEM_TIME));
}

fn parse_bound(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .expect("system time bound is RFC 3339")
}

/// The accepted system clock range, inclusive.
pub fn system_time_window() -> (DateTime<Utc>, DateTime<Utc>) {
    *TIME_WINDOW
}

/// A typed flag value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlagValue {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
    /// Parsed but never accepted by the validator
    Float(f64),
}

impl FlagValue {
    /// Type a raw command-line value: booleans, then integers, then
    /// decimals, otherwise a string.
    pub fn infer(raw: &str) -> FlagValue {
        match raw {
            "true" => return FlagValue::Bool(true),
            "false" => return FlagValue::Bool(false),
            _ => {}
        }
        if let Ok(n) = raw.parse::<i64>() {
            return FlagValue::Int(n);
        }
        if raw.contains('.') && !raw.contains("..") {
            if let Ok(f) = raw.parse::<f64>() {
                if f.is_finite() {
                    return FlagValue::Float(f);
                }
            }
        }
        FlagValue::String(raw.to_string())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FlagValue::String(_) => "string",
            FlagValue::Int(_) => "integer",
            FlagValue::Bool(_) => "boolean",
            FlagValue::List(_) => "string list",
            FlagValue::Float(_) => "float",
        }
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagValue::String(s) => write!(f, "{}", s),
            FlagValue::Int(n) => write!(f, "{}", n),
            FlagValue::Bool(b) => write!(f, "{}", b),
            FlagValue::List(items) => write!(f, "{}", items.join(",")),
            FlagValue::Float(x) => write!(f, "{}", x),
        }
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        FlagValue::String(value.to_string())
    }
}

impl From<String> for FlagValue {
    fn from(value: String) -> Self {
        FlagValue::String(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        FlagValue::Int(value)
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        FlagValue::Bool(value)
    }
}

impl From<f64> for FlagValue {
    fn from(value: f64) -> Self {
        FlagValue::Float(value)
    }
}

impl From<Vec<String>> for FlagValue {
    fn from(value: Vec<String>) -> Self {
        FlagValue::List(value)
    }
}

impl From<Vec<&str>> for FlagValue {
    fn from(value: Vec<&str>) -> Self {
        FlagValue::List(value.into_iter().map(str::to_string).collect())
    }
}

/// Flags keyed by name. Ordered, so validation reports the same failure
/// on every run.
pub type Flags = BTreeMap<String, FlagValue>;

/// Operations accepted by [`CommandValidator::validate_file_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
}

impl FromStr for FileOperation {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(FileOperation::Read),
            "write" => Ok(FileOperation::Write),
            other => Err(ValidationError::UnknownOperation(other.to_string())),
        }
    }
}

/// Validates command invocations and the execution environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandValidator {
    strict_mode: bool,
}

impl CommandValidator {
    /// Strict mode additionally rejects shell-injection patterns and control
    /// characters in positional arguments.
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    /// Check the name, then each argument, then each flag, stopping at the
    /// first failure.
    pub fn validate_command(
        &self,
        command: &str,
        args: &[String],
        flags: &Flags,
    ) -> Result<(), CommandError> {
        self.validate_command_name(command)
            .map_err(CommandError::Name)?;

        for (i, arg) in args.iter().enumerate() {
            self.validate_argument(arg)
                .map_err(|source| CommandError::Argument {
                    index: i + 1,
                    source,
                })?;
        }

        for (name, value) in flags {
            self.validate_flag(name, value)
                .map_err(|source| CommandError::Flag {
                    flag: name.clone(),
                    source,
                })?;
        }

        Ok(())
    }

    pub fn validate_command_name(&self, command: &str) -> Result<(), ValidationError> {
        if !NAME_PATTERN.is_match(command) {
            return Err(ValidationError::InvalidCommandName(command.to_string()));
        }
        if RESERVED_COMMANDS.contains(&command) {
            return Err(ValidationError::ReservedCommand(command.to_string()));
        }
        Ok(())
    }

    pub fn validate_argument(&self, arg: &str) -> Result<(), ValidationError> {
        if arg.is_empty() {
            return Err(ValidationError::EmptyArgument);
        }
        if contains_traversal(arg) {
            return Err(ValidationError::PathTraversalArgument(arg.to_string()));
        }

        let lowered = arg.to_lowercase();
        if let Some(pattern) = SUSPICIOUS_PATTERNS.iter().find(|p| lowered.contains(*p)) {
            return Err(suspicious(pattern, arg));
        }

        if self.strict_mode {
            if let Some(pattern) = STRICT_SUSPICIOUS_PATTERNS.iter().find(|p| arg.contains(*p)) {
                return Err(suspicious(pattern, arg));
            }
            if let Some(c) = arg.chars().find(|c| c.is_control()) {
                return Err(suspicious(&c.escape_default().to_string(), arg));
            }
        }
        Ok(())
    }

    /// Check a flag name and dispatch on the value's type.
    pub fn validate_flag(&self, name: &str, value: &FlagValue) -> Result<(), ValidationError> {
        if !NAME_PATTERN.is_match(name) {
            return Err(ValidationError::InvalidFlagName(name.to_string()));
        }

        match value {
            FlagValue::String(s) => validate_string_flag(name, s),
            FlagValue::Int(n) => validate_int_flag(name, *n),
            FlagValue::Bool(_) => Ok(()),
            FlagValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    validate_string_flag(name, item).map_err(|source| {
                        ValidationError::ListElement {
                            index: i + 1,
                            source: Box::new(source),
                        }
                    })?;
                }
                Ok(())
            }
            other => Err(ValidationError::UnsupportedFlagType(other.type_name())),
        }
    }

    pub fn validate_file_path(&self, path: &str) -> Result<(), ValidationError> {
        validate_file_path(path)
    }

    /// Check that the working directory is usable and the clock is sane.
    pub fn validate_execution_environment(&self) -> Result<(), ValidationError> {
        let cwd = env::current_dir().map_err(ValidationError::WorkingDirUnavailable)?;
        self.validate_directory(&cwd)?;
        self.validate_system_time()
    }

    /// Enumerate `dir`, then write and remove a probe file in it.
    pub fn validate_directory(&self, dir: &Path) -> Result<(), ValidationError> {
        let unreadable = |source| ValidationError::WorkingDirUnreadable {
            path: dir.to_path_buf(),
            source,
        };
        for entry in fs::read_dir(dir).map_err(unreadable)? {
            entry.map_err(unreadable)?;
        }

        let unwritable = |source| ValidationError::WorkingDirUnwritable {
            path: dir.to_path_buf(),
            source,
        };
        let probe = ProbeFile::create(dir, ENV_PROBE_FILE).map_err(unwritable)?;
        probe.remove().map_err(unwritable)
    }

    pub fn validate_system_time(&self) -> Result<(), ValidationError> {
        self.validate_time_at(Utc::now())
    }

    /// Check an instant against the accepted clock window.
    pub fn validate_time_at(&self, now: DateTime<Utc>) -> Result<(), ValidationError> {
        let (earliest, latest) = system_time_window();
        if now < earliest || now > latest {
            return Err(ValidationError::SystemTimeOutOfRange { now });
        }
        Ok(())
    }

    /// `read` requires `path` to be stat-able; `write` requires its parent
    /// directory to accept a probe file.
    pub fn validate_file_access(&self, path: &Path, operation: &str) -> Result<(), ValidationError> {
        match operation.parse::<FileOperation>()? {
            FileOperation::Read => fs::metadata(path).map(|_| ()).map_err(|source| {
                ValidationError::FileNotAccessible {
                    path: path.to_path_buf(),
                    source,
                }
            }),
            FileOperation::Write => {
                let parent = parent_dir(path);
                let not_writable = |source| ValidationError::DirectoryNotWritable {
                    path: parent.to_path_buf(),
                    source,
                };
                fs::metadata(parent).map_err(not_writable)?;
                let probe = ProbeFile::create(parent, WRITE_PROBE_FILE).map_err(not_writable)?;
                probe.remove().map_err(not_writable)
            }
        }
    }
}

fn validate_string_flag(name: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyFlagValue);
    }
    if contains_traversal(value) {
        return Err(ValidationError::PathTraversalFlagValue(value.to_string()));
    }
    if is_path_flag(name) {
        validate_file_path(value)?;
    }
    Ok(())
}

fn validate_int_flag(name: &str, value: i64) -> Result<(), ValidationError> {
    let out_of_range = |expected: String| ValidationError::IntFlagOutOfRange {
        flag: name.to_string(),
        value,
        expected,
    };

    if POSITIVE_INT_FLAGS.contains(&name) && value <= 0 {
        return Err(out_of_range("a value greater than 0".to_string()));
    }
    if name == PORT_FLAG && !(MIN_PORT..=MAX_PORT).contains(&value) {
        return Err(out_of_range(format!("between {} and {}", MIN_PORT, MAX_PORT)));
    }
    Ok(())
}

fn suspicious(pattern: &str, arg: &str) -> ValidationError {
    ValidationError::SuspiciousPatternArgument {
        pattern: pattern.to_string(),
        value: arg.to_string(),
    }
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        Some(_) => Path::new("."),
        None => path,
    }
}
