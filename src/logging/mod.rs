//! Leveled logging with text or structured output.
//!
//! [`LogFacade`] is a handle to a `tracing` subscriber built from a
//! reloadable level filter and a reloadable `fmt` layer. Every clone and
//! every derived [`Entry`] shares the subscriber and its sink. The `fmt`
//! layer renders a full record before it takes the sink, so concurrent
//! writers never split each other's lines.
//!
//! The facade never reports errors: unknown levels and formats fall back to
//! `info` and `text`, and a log file that cannot be opened falls back to
//! standard error.
//!
//! ```no_run
//! use redtriage::config::Configuration;
//! use redtriage::logging::LogFacade;
//!
//! let logger = LogFacade::from_config(&Configuration::default());
//! logger.install().ok();
//!
//! logger
//!     .with_field("artifact", "processes")
//!     .with_field("pid", 4242)
//!     .info("collector started");
//! log::debug!("routed through the facade as well");
//! ```

mod format;
mod writer;

pub use format::Format;

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tracing::Dispatch;
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{reload, Layer, Registry};

use crate::config::Configuration;
use crate::constants::EXIT_FAILURE;
use crate::error::LoggingError;
use writer::SharedWriter;

/// Target of ordinary facade records.
const EVENT_TARGET: &str = "redtriage";
/// `tracing` has no level above error; these targets set fatal and panic
/// records apart for filtering.
const FATAL_TARGET: &str = "redtriage::fatal";
const PANIC_TARGET: &str = "redtriage::panic";

type Filtered = Layered<reload::Layer<Targets, Registry>, Registry>;
type FilterHandle = reload::Handle<Targets, Registry>;
type FormatHandle = reload::Handle<Box<dyn Layer<Filtered> + Send + Sync>, Filtered>;

/// Severity, in increasing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
    /// Emits, then exits the process
    Fatal,
    /// Emits, then panics
    Panic,
}

impl Level {
    /// Parse a level name; anything unrecognised is `Info`.
    pub fn parse_lenient(name: &str) -> Level {
        match name.trim().to_lowercase().as_str() {
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            "panic" => Level::Panic,
            _ => Level::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
            Level::Panic => "panic",
        }
    }

    /// The subscriber filter admitting this level and everything above it.
    fn filter(self) -> Targets {
        let threshold = match self {
            Level::Debug => LevelFilter::DEBUG,
            Level::Info => LevelFilter::INFO,
            Level::Warn => LevelFilter::WARN,
            Level::Error => LevelFilter::ERROR,
            Level::Fatal => {
                return Targets::new()
                    .with_target(FATAL_TARGET, LevelFilter::ERROR)
                    .with_target(PANIC_TARGET, LevelFilter::ERROR)
                    .with_default(LevelFilter::OFF)
            }
            Level::Panic => {
                return Targets::new()
                    .with_target(PANIC_TARGET, LevelFilter::ERROR)
                    .with_default(LevelFilter::OFF)
            }
        };
        Targets::new().with_default(threshold)
    }
}

#[derive(Debug, Clone, Copy)]
struct Settings {
    level: Level,
    format: Format,
}

/// Handle to the process logger. Clones share level, format and sink.
#[derive(Clone)]
pub struct LogFacade {
    dispatch: Dispatch,
    filter: FilterHandle,
    layer: FormatHandle,
    writer: SharedWriter,
    settings: Arc<Mutex<Settings>>,
}

impl Default for LogFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for LogFacade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let settings = *self.settings();
        f.debug_struct("LogFacade")
            .field("level", &settings.level)
            .field("format", &settings.format)
            .finish()
    }
}

/// Emit one event at a fixed `tracing` level and target.
macro_rules! emit_event {
    ($target:expr, $level:expr, $message:expr, $fields:expr $(, $key:ident = $value:expr)*) => {
        match $fields {
            Some(fields) => tracing::event!(
                target: $target,
                $level,
                $($key = $value,)*
                fields = %fields,
                "{}",
                $message
            ),
            None => tracing::event!(target: $target, $level, $($key = $value,)* "{}", $message),
        }
    };
}

impl LogFacade {
    /// Info level, text format, standard output.
    pub fn new() -> Self {
        let settings = Settings {
            level: Level::Info,
            format: Format::Text,
        };
        let writer = SharedWriter::new(io::stdout());
        let (filter_layer, filter) = reload::Layer::new(settings.level.filter());
        let (format_layer, layer) =
            reload::Layer::new(format::layer::<Filtered>(settings.format, writer.clone()));
        let subscriber = tracing_subscriber::registry()
            .with(filter_layer)
            .with(format_layer);

        Self {
            dispatch: Dispatch::new(subscriber),
            filter,
            layer,
            writer,
            settings: Arc::new(Mutex::new(settings)),
        }
    }

    /// Apply `log_level`, `log_format` and `log_file` from the configuration.
    pub fn from_config(config: &Configuration) -> Self {
        let facade = Self::new();
        facade.set_level(&config.log_level);
        facade.set_format(&config.log_format);

        if let Some(path) = config.log_file() {
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(file) => facade.set_output(file),
                Err(e) => {
                    facade.set_output(io::stderr());
                    facade
                        .with_field("log_file", path.display().to_string())
                        .warn(&format!("Cannot open log file, logging to stderr: {}", e));
                }
            }
        }
        facade
    }

    /// Make this facade the global `tracing` subscriber and route the `log`
    /// macros into it.
    pub fn install(&self) -> Result<(), LoggingError> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())?;
        tracing_log::LogTracer::init()?;
        Ok(())
    }

    pub fn set_level(&self, level: &str) {
        let level = Level::parse_lenient(level);
        let mut settings = self.settings();
        settings.level = level;
        // The subscriber lives as long as this handle
        let _ = self.filter.reload(level.filter());
    }

    pub fn set_format(&self, format: &str) {
        let format = Format::parse_lenient(format);
        let mut settings = self.settings();
        settings.format = format;
        let _ = self
            .layer
            .reload(format::layer::<Filtered>(format, self.writer.clone()));
    }

    /// Rebind the sink. Lines already written stay where they were.
    pub fn set_output<W: Write + Send + 'static>(&self, writer: W) {
        self.writer.replace(writer);
    }

    pub fn level(&self) -> Level {
        self.settings().level
    }

    pub fn format(&self) -> Format {
        self.settings().format
    }

    /// A record that tags every message with `key=value`.
    pub fn with_field<K: Into<String>, V: Into<Value>>(&self, key: K, value: V) -> Entry {
        Entry {
            facade: self.clone(),
            fields: BTreeMap::new(),
        }
        .with_field(key, value)
    }

    pub fn with_fields<I, K, V>(&self, fields: I) -> Entry
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Entry {
            facade: self.clone(),
            fields: BTreeMap::new(),
        }
        .with_fields(fields)
    }

    pub fn debug(&self, message: &str) {
        self.emit(Level::Debug, &BTreeMap::new(), message);
    }

    pub fn info(&self, message: &str) {
        self.emit(Level::Info, &BTreeMap::new(), message);
    }

    pub fn warn(&self, message: &str) {
        self.emit(Level::Warn, &BTreeMap::new(), message);
    }

    pub fn error(&self, message: &str) {
        self.emit(Level::Error, &BTreeMap::new(), message);
    }

    pub fn fatal(&self, message: &str) -> ! {
        self.emit(Level::Fatal, &BTreeMap::new(), message);
        std::process::exit(i32::from(EXIT_FAILURE))
    }

    pub fn panic(&self, message: &str) -> ! {
        self.emit(Level::Panic, &BTreeMap::new(), message);
        panic!("{}", message)
    }

    fn settings(&self) -> MutexGuard<'_, Settings> {
        self.settings.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, level: Level, fields: &BTreeMap<String, Value>, message: &str) {
        let (message, fields) = format::render(self.format(), message, fields);
        let fields = fields.as_deref();

        tracing::dispatcher::with_default(&self.dispatch, || match level {
            Level::Debug => emit_event!(EVENT_TARGET, tracing::Level::DEBUG, message, fields),
            Level::Info => emit_event!(EVENT_TARGET, tracing::Level::INFO, message, fields),
            Level::Warn => emit_event!(EVENT_TARGET, tracing::Level::WARN, message, fields),
            Level::Error => emit_event!(EVENT_TARGET, tracing::Level::ERROR, message, fields),
            Level::Fatal => emit_event!(
                FATAL_TARGET,
                tracing::Level::ERROR,
                message,
                fields,
                severity = "fatal"
            ),
            Level::Panic => emit_event!(
                PANIC_TARGET,
                tracing::Level::ERROR,
                message,
                fields,
                severity = "panic"
            ),
        });
    }
}

/// A log record carrying key/value fields, derived from a [`LogFacade`].
#[derive(Clone, Debug)]
pub struct Entry {
    facade: LogFacade,
    fields: BTreeMap<String, Value>,
}

impl Entry {
    pub fn with_field<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Entry {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_fields<I, K, V>(mut self, fields: I) -> Entry
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn debug(&self, message: &str) {
        self.facade.emit(Level::Debug, &self.fields, message);
    }

    pub fn info(&self, message: &str) {
        self.facade.emit(Level::Info, &self.fields, message);
    }

    pub fn warn(&self, message: &str) {
        self.facade.emit(Level::Warn, &self.fields, message);
    }

    pub fn error(&self, message: &str) {
        self.facade.emit(Level::Error, &self.fields, message);
    }

    pub fn fatal(&self, message: &str) -> ! {
        self.facade.emit(Level::Fatal, &self.fields, message);
        std::process::exit(i32::from(EXIT_FAILURE))
    }

    pub fn panic(&self, message: &str) -> ! {
        self.facade.emit(Level::Panic, &self.fields, message);
        panic!("{}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SharedBuffer;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::thread;

    fn capture(facade: &LogFacade) -> SharedBuffer {
        let buffer = SharedBuffer::default();
        facade.set_output(buffer.clone());
        buffer
    }

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    /// The `fields` object of a structured line.
    fn fields_of(record: &Value) -> Value {
        serde_json::from_str(record["fields"].as_str().unwrap()).unwrap()
    }

    #[test]
    fn test_level_parsing_is_lenient() {
        assert_eq!(Level::parse_lenient("debug"), Level::Debug);
        assert_eq!(Level::parse_lenient("WARN"), Level::Warn);
        assert_eq!(Level::parse_lenient("panic"), Level::Panic);
        assert_eq!(Level::parse_lenient("verbose"), Level::Info);
        assert_eq!(Level::parse_lenient(""), Level::Info);
        assert!(Level::Debug < Level::Info && Level::Fatal < Level::Panic);
    }

    #[test]
    fn test_level_filtering() {
        let facade = LogFacade::new();
        let buffer = capture(&facade);

        facade.debug("hidden");
        facade.info("shown");
        facade.set_level("error");
        facade.warn("hidden too");
        facade.error("also shown");
        facade.set_level("nonsense");
        assert_eq!(facade.level(), Level::Info);

        let lines = buffer.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("INFO") && lines[0].ends_with("shown"));
        assert!(lines[1].contains("ERROR") && lines[1].ends_with("also shown"));
    }

    #[test]
    fn test_unknown_format_falls_back_to_text() {
        let facade = LogFacade::new();
        facade.set_format("structured");
        assert_eq!(facade.format(), Format::Structured);
        facade.set_format("xml");
        assert_eq!(facade.format(), Format::Text);
    }

    #[test]
    fn test_fields_are_attached() {
        let facade = LogFacade::new();
        facade.set_format("structured");
        let buffer = capture(&facade);

        let entry = facade
            .with_field("command", "collect")
            .with_fields([("timeout", 60), ("retries", 2)]);
        entry.info("first");
        entry.warn("second");
        facade.info("bare");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 3);
        let first = parse(&lines[0]);
        assert_eq!(first["message"], "first");
        assert_eq!(first["level"], "INFO");
        assert!(first.get("timestamp").is_some());
        let fields = fields_of(&first);
        assert_eq!(fields["command"], "collect");
        assert_eq!(fields["timeout"], 60);
        assert_eq!(parse(&lines[1])["level"], "WARN");
        assert!(parse(&lines[2]).get("fields").is_none());
    }

    #[test]
    fn test_text_fields_follow_message() {
        let facade = LogFacade::new();
        let buffer = capture(&facade);

        facade
            .with_fields([("artifact", "processes"), ("user", "alice smith")])
            .warn("slow collector");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("slow collector artifact=processes user=\"alice smith\""));
    }

    #[test]
    fn test_multiline_message_is_one_record() {
        let facade = LogFacade::new();
        let buffer = capture(&facade);

        facade.info("line one\nline two");

        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("line one\\nline two"));
    }

    #[test]
    fn test_set_output_rebinds_sink() {
        let facade = LogFacade::new();
        let first = capture(&facade);
        facade.info("one");
        let second = capture(&facade);
        facade.info("two");

        assert_eq!(first.lines().len(), 1);
        assert_eq!(second.lines().len(), 1);
        assert!(second.contents().contains("two"));
    }

    #[test]
    fn test_concurrent_records_stay_whole() {
        let facade = LogFacade::new();
        facade.set_format("structured");
        let buffer = capture(&facade);

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let entry = facade.with_field("worker", worker);
                thread::spawn(move || {
                    for seq in 0..50 {
                        entry.clone().with_field("seq", seq).info("tick");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lines = buffer.lines();
        assert_eq!(lines.len(), 400);
        let records: Vec<Value> = lines.iter().map(|l| fields_of(&parse(l))).collect();
        for worker in 0..8 {
            let seqs: Vec<i64> = records
                .iter()
                .filter(|v| v["worker"] == worker)
                .map(|v| v["seq"].as_i64().unwrap())
                .collect();
            assert_eq!(seqs, (0..50).collect::<Vec<_>>(), "worker {} out of order", worker);
        }
    }

    #[test]
    fn test_panic_emits_before_panicking() {
        let facade = LogFacade::new();
        let buffer = capture(&facade);
        let entry = facade.with_field("stage", "init");

        let result = catch_unwind(AssertUnwindSafe(|| {
            entry.panic("unrecoverable");
        }));

        assert!(result.is_err());
        let contents = buffer.contents();
        assert!(contents.contains("unrecoverable stage=init"));
        assert!(contents.contains("severity=\"panic\""));
    }

    #[test]
    fn test_fatal_threshold_hides_errors() {
        let facade = LogFacade::new();
        facade.set_level("fatal");
        let buffer = capture(&facade);

        facade.error("hidden");
        let result = catch_unwind(AssertUnwindSafe(|| {
            facade.panic("shown");
        }));

        assert!(result.is_err());
        let lines = buffer.lines();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("shown"));
    }

    #[test]
    fn test_from_config_opens_log_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let log_path = temp_dir.path().join("redtriage.log");

        let mut config = Configuration::default();
        config.log_level = "debug".to_string();
        config.log_format = "structured".to_string();
        config.log_file = log_path.to_string_lossy().to_string();

        let facade = LogFacade::from_config(&config);
        assert_eq!(facade.level(), Level::Debug);
        facade.debug("to file");

        let written = std::fs::read_to_string(&log_path).unwrap();
        let record = parse(written.trim_end());
        assert_eq!(record["message"], "to file");
        assert_eq!(record["level"], "DEBUG");
    }

    #[test]
    fn test_from_config_falls_back_when_log_file_unusable() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let mut config = Configuration::default();
        // A directory cannot be opened for appending
        config.log_file = temp_dir.path().to_string_lossy().to_string();

        let facade = LogFacade::from_config(&config);
        assert_eq!(facade.level(), Level::Info);
    }
}
