//! Integration tests for command and environment validation.
//!
//! The quantified properties run under proptest; the concrete invocation
//! scenarios are plain tests.

use std::collections::BTreeMap;
use std::env;
use std::fs;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tempfile::TempDir;

use redtriage::constants::{ENV_PROBE_FILE, POSITIVE_INT_FLAGS, RESERVED_COMMANDS};
use redtriage::error::{CommandError, ValidationError};
use redtriage::security::{validate_file_path, CommandValidator, FlagValue, Flags};

fn flags(entries: Vec<(&str, FlagValue)>) -> Flags {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

#[test]
fn test_collect_invocation_accepted() {
    let validator = CommandValidator::new(false);
    let result = validator.validate_command(
        "collect",
        &["/tmp/out".to_string()],
        &flags(vec![
            ("timeout", FlagValue::Int(60)),
            ("output", FlagValue::from("/tmp/out")),
        ]),
    );
    assert!(result.is_ok());
}

#[test]
fn test_reserved_help_rejected() {
    let validator = CommandValidator::new(false);
    let err = validator
        .validate_command("help", &[], &BTreeMap::new())
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Name(ValidationError::ReservedCommand(ref name)) if name == "help"
    ));
    assert_eq!(err.exit_code(), 3);
}

#[test]
fn test_traversal_argument_reported_at_first_position() {
    let validator = CommandValidator::new(false);
    let err = validator
        .validate_command("run", &["../etc/passwd".to_string()], &Flags::new())
        .unwrap_err();
    assert!(matches!(
        err,
        CommandError::Argument {
            index: 1,
            source: ValidationError::PathTraversalArgument(_)
        }
    ));
}

#[test]
fn test_port_out_of_range() {
    let validator = CommandValidator::new(false);
    let err = validator
        .validate_command("run", &[], &flags(vec![("port", FlagValue::Int(70000))]))
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "flag --port: value 70000 for 'port' is out of range (expected between 1 and 65535)"
    );
}

#[test]
fn test_windows_output_path_with_pipe() {
    let validator = CommandValidator::new(false);
    let err = validator
        .validate_command(
            "run",
            &[],
            &flags(vec![("output", FlagValue::from("C:\\logs\\out|.zip"))]),
        )
        .unwrap_err();
    assert!(matches!(
        err.kind(),
        ValidationError::InvalidPathCharacter { character: '|', .. }
    ));
}

#[test]
fn test_list_flag_second_element() {
    let validator = CommandValidator::new(false);
    let err = validator
        .validate_command(
            "run",
            &[],
            &flags(vec![("tags", FlagValue::from(vec!["ok", "bad//thing"]))]),
        )
        .unwrap_err();
    match err.kind() {
        ValidationError::ListElement { index: 2, source } => {
            assert!(matches!(**source, ValidationError::PathTraversalFlagValue(_)))
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_clock_before_window() {
    let validator = CommandValidator::new(false);
    let now = Utc.with_ymd_and_hms(2019, 12, 31, 0, 0, 0).unwrap();
    let err = validator.validate_time_at(now).unwrap_err();
    assert!(matches!(err, ValidationError::SystemTimeOutOfRange { .. }));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn test_reserved_names_are_exact() {
    let validator = CommandValidator::new(false);
    for name in RESERVED_COMMANDS {
        assert!(validator.validate_command_name(name).is_err());
        assert!(validator.validate_command_name(&format!("{}-all", name)).is_ok());
    }
}

#[test]
fn test_healthy_host_passes_environment_checks() {
    let validator = CommandValidator::new(false);
    let cwd = env::current_dir().unwrap();

    // Test runs happen inside the clock window in a writable checkout
    validator.validate_system_time().unwrap();
    validator.validate_execution_environment().unwrap();
    assert!(!cwd.join(ENV_PROBE_FILE).exists());
}

#[cfg(unix)]
#[test]
fn test_read_only_directory_leaves_no_stray_file() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let locked = temp_dir.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o555)).unwrap();

    let validator = CommandValidator::new(false);
    let result = validator.validate_directory(&locked);

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
    assert!(!locked.join(ENV_PROBE_FILE).exists());
    // Root bypasses permission bits
    if let Err(err) = result {
        assert!(matches!(err, ValidationError::WorkingDirUnwritable { .. }));
        assert!(err.is_environmental());
    }
}

fn name_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_-]{1,24}".prop_filter("reserved", |s| !RESERVED_COMMANDS.contains(&s.as_str()))
}

fn traversal_strategy() -> impl Strategy<Value = String> {
    ("[a-z/]{0,8}", prop_oneof![Just(".."), Just("//")], "[a-z/]{0,8}")
        .prop_map(|(head, marker, tail)| format!("{}{}{}", head, marker, tail))
}

proptest! {
    #[test]
    fn valid_names_accepted(name in name_strategy()) {
        let validator = CommandValidator::new(false);
        prop_assert!(validator.validate_command_name(&name).is_ok());
    }

    #[test]
    fn traversal_rejected_everywhere(value in traversal_strategy()) {
        let validator = CommandValidator::new(false);
        prop_assert!(validator.validate_argument(&value).is_err());
        prop_assert!(validator.validate_flag("name", &FlagValue::from(value.as_str())).is_err());
        prop_assert!(validate_file_path(&value).is_err());
    }

    #[test]
    fn invalid_path_characters_rejected(
        head in "[a-z]{0,6}",
        bad in prop::sample::select(vec!['<', '>', ':', '"', '|', '?', '*']),
        tail in "[a-z]{0,6}",
    ) {
        let path = format!("{}{}{}", head, bad, tail);
        prop_assert!(validate_file_path(&path).is_err());
    }

    #[test]
    fn non_positive_limits_rejected(
        flag in prop::sample::select(POSITIVE_INT_FLAGS.to_vec()),
        n in i64::MIN..=0,
    ) {
        let validator = CommandValidator::new(false);
        prop_assert!(validator.validate_flag(flag, &FlagValue::Int(n)).is_err());
    }

    #[test]
    fn ports_outside_range_rejected(
        n in prop_oneof![i64::MIN..=0, 65536..=i64::MAX],
    ) {
        let validator = CommandValidator::new(false);
        prop_assert!(validator.validate_flag("port", &FlagValue::Int(n)).is_err());
    }

    #[test]
    fn validation_is_idempotent(
        name in "[A-Za-z0-9_./-]{0,12}",
        arg in "\\PC{0,16}",
        value in "\\PC{0,16}",
        strict in any::<bool>(),
    ) {
        let validator = CommandValidator::new(strict);
        let flags = flags(vec![("output", FlagValue::from(value.as_str()))]);
        let first = validator
            .validate_command(&name, &[arg.clone()], &flags)
            .map_err(|e| e.to_string());
        let second = validator
            .validate_command(&name, &[arg], &flags)
            .map_err(|e| e.to_string());
        prop_assert_eq!(first, second);
    }
}
