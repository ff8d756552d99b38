//! Syntactic path checks for values passed on the command line.
//!
//! The same rules apply on every platform: characters Windows reserves are
//! rejected on Linux too, so an invocation accepted on one host is accepted
//! on the other.

use std::path::Path;

use crate::constants::{INVALID_PATH_CHARS, PATH_FLAG_TOKENS};
use crate::error::ValidationError;

/// True when `value` contains a parent-directory or doubled-separator sequence.
pub fn contains_traversal(value: &str) -> bool {
    value.contains("..") || value.contains("//")
}

/// True when a flag carries a filesystem path. Substring match, case-sensitive,
/// so `reconfigure` counts as a `config` flag.
pub fn is_path_flag(flag: &str) -> bool {
    PATH_FLAG_TOKENS.iter().any(|token| flag.contains(token))
}

/// Validates the syntax of a filesystem path.
///
/// # Errors
///
/// * `MalformedAbsolutePath` - absolute and starting with `\`
/// * `PathTraversal` - contains `..` or `//`
/// * `InvalidPathCharacter` - contains any of `< > : " | ? *`
///
/// When several characters offend, the first one by position is reported,
/// except that a drive-letter colon (`C:`) is reported only if nothing else
/// in the path is invalid. Either way the path is rejected.
pub fn validate_file_path(path: &str) -> Result<(), ValidationError> {
    if Path::new(path).is_absolute() && path.starts_with('\\') {
        return Err(ValidationError::MalformedAbsolutePath(path.to_string()));
    }

    if contains_traversal(path) {
        return Err(ValidationError::PathTraversal(path.to_string()));
    }

    let drive_prefix = drive_prefix_len(path);
    let offending = path[drive_prefix..]
        .chars()
        .find(|c| INVALID_PATH_CHARS.contains(c))
        .or_else(|| (drive_prefix > 0).then_some(':'));

    match offending {
        Some(character) => Err(ValidationError::InvalidPathCharacter {
            character,
            path: path.to_string(),
        }),
        None => Ok(()),
    }
}

/// Length of a leading `X:` drive designator, or 0.
fn drive_prefix_len(path: &str) -> usize {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        2
    } else {
        0
    }
}
