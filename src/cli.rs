use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

use crate::security::{FlagValue, Flags};

/// Command-line arguments for redtriage.
///
/// Global options come first. Everything from the command name onward is
/// kept as raw tokens and split by [`Invocation::from_tokens`], so user
/// commands can carry arbitrary flags that clap knows nothing about.
#[derive(Parser, Debug)]
#[clap(
    name = "redtriage",
    version,
    about = "Incident-response triage collector"
)]
pub struct Args {
    /// Path to configuration YAML file
    #[clap(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Verbose logging (same as --log-level debug)
    #[clap(short, long)]
    pub verbose: bool,

    /// Log level override (debug, info, warn, error)
    #[clap(long)]
    pub log_level: Option<String>,

    /// Log format override (text, structured)
    #[clap(long)]
    pub log_format: Option<String>,

    /// Also reject shell metacharacters and control characters in arguments
    #[clap(long)]
    pub strict: bool,

    /// Skip the working-directory and clock checks
    #[clap(long)]
    pub skip_env_check: bool,

    /// Command followed by its arguments and flags
    #[clap(trailing_var_arg = true, allow_hyphen_values = true)]
    pub invocation: Vec<String>,
}

impl Args {
    /// The effective log level override, `--log-level` winning over `--verbose`.
    pub fn log_level_override(&self) -> Option<&str> {
        match (&self.log_level, self.verbose) {
            (Some(level), _) => Some(level.as_str()),
            (None, true) => Some("debug"),
            (None, false) => None,
        }
    }
}

/// A command with its positional arguments and typed flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
    pub flags: Flags,
}

impl Invocation {
    /// Split raw tokens into command, arguments and flags.
    ///
    /// Accepts `--name=value`, `--name value` and bare `--name` (true).
    /// A flag given more than once becomes a string list. After a bare `--`
    /// every token is positional. Returns `None` for an empty token list.
    pub fn from_tokens(tokens: &[String]) -> Option<Invocation> {
        let (command, rest) = tokens.split_first()?;
        let mut args = Vec::new();
        let mut flags = Flags::new();
        let mut positional_only = false;
        let mut iter = rest.iter().peekable();

        while let Some(token) = iter.next() {
            if positional_only {
                args.push(token.clone());
                continue;
            }
            if token == "--" {
                positional_only = true;
                continue;
            }

            let Some(flag) = token.strip_prefix("--") else {
                args.push(token.clone());
                continue;
            };

            let (name, value) = match flag.split_once('=') {
                Some((name, raw)) => (name, FlagValue::infer(raw)),
                None => match iter.next_if(|next| !next.starts_with("--")) {
                    Some(raw) => (flag, FlagValue::infer(raw)),
                    None => (flag, FlagValue::Bool(true)),
                },
            };
            insert_flag(&mut flags, name, value);
        }

        Some(Invocation {
            command: command.clone(),
            args,
            flags,
        })
    }
}

fn insert_flag(flags: &mut Flags, name: &str, value: FlagValue) {
    match flags.remove(name) {
        None => {
            flags.insert(name.to_string(), value);
        }
        Some(FlagValue::List(mut items)) => {
            items.push(value.to_string());
            flags.insert(name.to_string(), FlagValue::List(items));
        }
        Some(previous) => {
            let items = vec![previous.to_string(), value.to_string()];
            flags.insert(name.to_string(), FlagValue::List(items));
        }
    }
}
