//! Global constants for the redtriage application.
//!
//! The reserved command set and the path-flag tokens are part of the
//! external command-line contract. Changing either one is a breaking change.

// Command-line contract
/// Command names owned by the framework; user subcommands may not use them.
pub const RESERVED_COMMANDS: &[&str] = &["help", "version", "config", "init", "setup"];

/// Flag names containing any of these tokens carry filesystem paths.
pub const PATH_FLAG_TOKENS: &[&str] = &[
    "output", "input", "config", "rules", "template", "log", "cache", "temp", "work", "data",
    "backup", "archive", "export",
];

/// Substrings rejected in positional arguments (matched case-insensitively).
pub const SUSPICIOUS_PATTERNS: &[&str] = &[
    "<script>",
    "javascript:",
    "data:",
    "vbscript:",
    "onload=",
    "onerror=",
    "onclick=",
];

/// Extra argument patterns rejected when the validator runs in strict mode
pub const STRICT_SUSPICIOUS_PATTERNS: &[&str] = &["$(", "${", "`", "%00"];

/// Characters Windows forbids in paths; rejected on every platform.
pub const INVALID_PATH_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

/// Integer flags that must be strictly positive
pub const POSITIVE_INT_FLAGS: &[&str] = &["timeout", "max-size", "max-files"];

/// Integer flag constrained to the TCP/UDP port range
pub const PORT_FLAG: &str = "port";
pub const MIN_PORT: i64 = 1;
pub const MAX_PORT: i64 = 65535;

/// Flag naming the collection destination, checked for write access
pub const OUTPUT_FLAG: &str = "output";

// Probe files
/// Probe written into the working directory by environment validation
pub const ENV_PROBE_FILE: &str = ".validation_test";

/// Probe written into a target's parent directory by write-access checks
pub const WRITE_PROBE_FILE: &str = ".write_test";

pub const PROBE_CONTENT: &[u8] = b"test";

/// Unix permission bits for probe files
pub const PROBE_FILE_MODE: u32 = 0o644;

// System clock sanity window (inclusive, UTC)
pub const MIN_SYSTEM_TIME: &str = "2020-01-01T00:00:00Z";
pub const MAX_SYSTEM_TIME: &str = "2030-12-31T23:59:59Z";

// Configuration
/// Base name of the configuration file
pub const CONFIG_BASE_NAME: &str = "redtriage";

/// Config file extensions tried in each search directory, in order
pub const CONFIG_EXTENSIONS: &[&str] = &["yaml", "yml"];

pub const LINUX_CONFIG_DIRS: &[&str] = &["/etc/redtriage", "/usr/local/etc/redtriage"];

pub const WINDOWS_PROGRAM_DATA_DIR: &str = "C:\\ProgramData\\RedTriage";

/// `%USERNAME%` is expanded against the environment at load time
pub const WINDOWS_LOCAL_APPDATA_DIR: &str = "C:\\Users\\%USERNAME%\\AppData\\Local\\RedTriage";

/// Default collection timeout (5 minutes)
pub const DEFAULT_COLLECTION_TIMEOUT_SECS: u64 = 300;

/// Default maximum artifact size (100MB)
pub const DEFAULT_MAX_ARTIFACT_SIZE: u64 = 100 * 1024 * 1024;

pub const DEFAULT_COMPRESSION: &str = "zip";
pub const DEFAULT_CHECKSUM_ALGORITHM: &str = "sha256";

pub const DEFAULT_REDACTION_PATTERNS: &[&str] = &[
    r"(?i)password\s*[=:]\s*\S+",
    r"(?i)api[_-]?key\s*[=:]\s*\S+",
    r"(?i)secret\s*[=:]\s*\S+",
    r"(?i)token\s*[=:]\s*\S+",
];

// Exit codes
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_VALIDATION_ERROR: u8 = 3;
pub const EXIT_ENVIRONMENT_ERROR: u8 = 4;
