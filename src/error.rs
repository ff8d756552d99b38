//! Error types for configuration loading and input validation.
//!
//! Library code returns these typed errors; the binary wraps them in
//! `anyhow` and maps them back to process exit codes with [`exit_code_for`].
//! Every message renders on a single line so it can go straight to stderr.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::constants::{
    EXIT_CONFIG_ERROR, EXIT_ENVIRONMENT_ERROR, EXIT_FAILURE, EXIT_VALIDATION_ERROR,
};

/// Failures while building a [`Configuration`](crate::config::Configuration).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("failed to parse configuration from {origin}: {message}")]
    Parse { origin: String, message: String },

    #[error("unsupported platform '{0}' (expected windows or linux)")]
    UnsupportedPlatform(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("config file {} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to write config file {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
}

/// Failures while registering the process-wide logger.
#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("failed to set global subscriber: {0}")]
    SetSubscriber(#[from] tracing::dispatcher::SetGlobalDefaultError),

    #[error("failed to route log records: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// A single failed check performed by the
/// [`CommandValidator`](crate::security::CommandValidator).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("command name '{0}' must be non-empty and match [A-Za-z0-9_-]+")]
    InvalidCommandName(String),

    #[error("command '{0}' is reserved")]
    ReservedCommand(String),

    #[error("argument cannot be empty")]
    EmptyArgument,

    #[error("path traversal detected in argument '{0}'")]
    PathTraversalArgument(String),

    #[error("suspicious pattern '{pattern}' in argument '{value}'")]
    SuspiciousPatternArgument { pattern: String, value: String },

    #[error("flag name '{0}' must be non-empty and match [A-Za-z0-9_-]+")]
    InvalidFlagName(String),

    #[error("flag value cannot be empty")]
    EmptyFlagValue,

    #[error("path traversal detected in flag value '{0}'")]
    PathTraversalFlagValue(String),

    #[error("path traversal detected in path '{0}'")]
    PathTraversal(String),

    #[error("invalid character '{character}' in path '{path}'")]
    InvalidPathCharacter { character: char, path: String },

    #[error("malformed absolute path '{0}'")]
    MalformedAbsolutePath(String),

    #[error("value {value} for '{flag}' is out of range (expected {expected})")]
    IntFlagOutOfRange {
        flag: String,
        value: i64,
        expected: String,
    },

    #[error("unsupported flag value type: {0}")]
    UnsupportedFlagType(&'static str),

    #[error("element {index}: {source}")]
    ListElement {
        index: usize,
        source: Box<ValidationError>,
    },

    #[error("cannot determine working directory: {0}")]
    WorkingDirUnavailable(#[source] io::Error),

    #[error("cannot read working directory {}: {source}", .path.display())]
    WorkingDirUnreadable { path: PathBuf, source: io::Error },

    #[error("working directory {} is not writable: {source}", .path.display())]
    WorkingDirUnwritable { path: PathBuf, source: io::Error },

    #[error("system time {now} is outside the accepted range")]
    SystemTimeOutOfRange { now: DateTime<Utc> },

    #[error("unknown file operation '{0}' (expected read or write)")]
    UnknownOperation(String),

    #[error("file {} is not accessible: {source}", .path.display())]
    FileNotAccessible { path: PathBuf, source: io::Error },

    #[error("directory {} is not writable: {source}", .path.display())]
    DirectoryNotWritable { path: PathBuf, source: io::Error },
}

impl ValidationError {
    /// The innermost failure, looking through list-element wrappers.
    pub fn root(&self) -> &ValidationError {
        match self {
            ValidationError::ListElement { source, .. } => source.root(),
            other => other,
        }
    }

    /// True for failures of the host rather than of the caller's input.
    pub fn is_environmental(&self) -> bool {
        matches!(
            self.root(),
            ValidationError::WorkingDirUnavailable(_)
                | ValidationError::WorkingDirUnreadable { .. }
                | ValidationError::WorkingDirUnwritable { .. }
                | ValidationError::SystemTimeOutOfRange { .. }
                | ValidationError::FileNotAccessible { .. }
                | ValidationError::DirectoryNotWritable { .. }
        )
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_environmental() {
            EXIT_ENVIRONMENT_ERROR
        } else {
            EXIT_VALIDATION_ERROR
        }
    }
}

/// A [`ValidationError`] tagged with the part of the invocation that failed.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Name(#[source] ValidationError),

    #[error("invalid arguments: argument {index}: {source}")]
    Argument {
        index: usize,
        source: ValidationError,
    },

    #[error("flag --{flag}: {source}")]
    Flag {
        flag: String,
        source: ValidationError,
    },
}

impl CommandError {
    /// The wrapped validation failure.
    pub fn kind(&self) -> &ValidationError {
        match self {
            CommandError::Name(source)
            | CommandError::Argument { source, .. }
            | CommandError::Flag { source, .. } => source,
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.kind().exit_code()
    }
}

/// Map an error chain to the process exit code documented for the CLI.
pub fn exit_code_for(err: &anyhow::Error) -> u8 {
    for cause in err.chain() {
        if cause.downcast_ref::<ConfigError>().is_some() {
            return EXIT_CONFIG_ERROR;
        }
        if let Some(e) = cause.downcast_ref::<CommandError>() {
            return e.exit_code();
        }
        if let Some(e) = cause.downcast_ref::<ValidationError>() {
            return e.exit_code();
        }
    }
    EXIT_FAILURE
}
