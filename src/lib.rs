//! # redtriage
//!
//! The front end of a cross-platform incident-response triage collector.
//!
//! ## Overview
//!
//! redtriage decides *what* a collection run is allowed to do before any
//! artifact is touched. It loads layered configuration, sets up leveled
//! logging, and vets every command invocation and the host it runs on.
//!
//! ## Features
//!
//! - **Layered configuration**: built-in defaults, then a YAML file, then
//!   environment variables
//! - **Leveled logging**: text or structured (JSON) lines from a `tracing`
//!   subscriber, record-atomic across threads, bridged to the `log` macros
//! - **Command validation**: name, argument and typed-flag checks with path
//!   syntax rules for path-carrying flags
//! - **Environment checks**: working-directory access and clock sanity
//!
//! ## Usage
//!
//! ```no_run
//! use redtriage::config::load_config;
//! use redtriage::logging::LogFacade;
//! use redtriage::security::{CommandValidator, Flags};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = load_config(None)?;
//! let logger = LogFacade::from_config(&config);
//! logger.install()?;
//!
//! let validator = CommandValidator::new(false);
//! validator.validate_command("collect", &["/tmp/out".to_string()], &Flags::new())?;
//! validator.validate_execution_environment()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line arguments and invocation tokenizing
//! - [`config`]: Configuration model and layered loader
//! - [`logging`]: Leveled logging facade
//! - [`security`]: Command and environment validation
//! - [`error`]: Error types and exit-code mapping
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Configuration model and layered loading
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Error types shared across the crate
pub mod error;

/// Leveled logging with text or structured output
pub mod logging;

/// Command, path and environment validation
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
