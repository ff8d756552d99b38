//! Security validation for command invocations.
//!
//! This module provides:
//! - Command name, argument and flag validation
//! - Path syntax checks for path-carrying flags
//! - Execution-environment and file-access checks
//! - Audit logging of rejected invocations

pub mod events;
pub mod path_validator;
mod probe;
pub mod validator;

pub use events::{log_security_event, SecurityEvent};
pub use path_validator::{contains_traversal, is_path_flag, validate_file_path};
pub use validator::{system_time_window, CommandValidator, FileOperation, FlagValue, Flags};
