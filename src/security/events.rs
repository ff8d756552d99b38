use std::path::Path;

use log::warn;

use crate::error::{CommandError, ValidationError};

/// Security-relevant outcomes worth an audit line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityEvent {
    /// An invocation failed validation
    CommandRejected { command: String, reason: String },

    /// The host failed the execution-environment check
    EnvironmentRejected { reason: String },

    /// A read or write access check failed
    AccessDenied {
        path: String,
        operation: String,
        reason: String,
    },
}

impl SecurityEvent {
    pub fn command_rejected(command: &str, err: &CommandError) -> Self {
        SecurityEvent::CommandRejected {
            command: command.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn environment_rejected(err: &ValidationError) -> Self {
        SecurityEvent::EnvironmentRejected {
            reason: err.to_string(),
        }
    }

    pub fn access_denied(path: &Path, operation: &str, err: &ValidationError) -> Self {
        SecurityEvent::AccessDenied {
            path: path.display().to_string(),
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }

    /// The audit line written for this event.
    pub fn message(&self) -> String {
        match self {
            SecurityEvent::CommandRejected { command, reason } => {
                format!("Security: Command '{}' rejected: {}", command, reason)
            }
            SecurityEvent::EnvironmentRejected { reason } => {
                format!("Security: Execution environment rejected: {}", reason)
            }
            SecurityEvent::AccessDenied {
                path,
                operation,
                reason,
            } => format!(
                "Security: Access denied - Operation: '{}' Path: '{}': {}",
                operation, path, reason
            ),
        }
    }
}

/// Log a security event.
pub fn log_security_event(event: &SecurityEvent) {
    warn!("{}", event.message());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_rejected_message() {
        let err = CommandError::Name(ValidationError::ReservedCommand("help".to_string()));
        let event = SecurityEvent::command_rejected("help", &err);
        assert_eq!(
            event.message(),
            "Security: Command 'help' rejected: invalid command: command 'help' is reserved"
        );
    }

    #[test]
    fn test_access_denied_message() {
        let err = ValidationError::UnknownOperation("append".to_string());
        let event = SecurityEvent::access_denied(Path::new("/root/secret"), "append", &err);
        assert!(event.message().contains("Operation: 'append'"));
        assert!(event.message().contains("Path: '/root/secret'"));
        assert!(event.message().ends_with(&err.to_string()));
    }

    #[test]
    fn test_log_without_logger_is_noop() {
        log_security_event(&SecurityEvent::EnvironmentRejected {
            reason: "clock skew".to_string(),
        });
    }
}
