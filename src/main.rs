use std::env;
use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::{debug, info};

use redtriage::cli::{Args, Invocation};
use redtriage::config::{load_config, Configuration};
use redtriage::constants::{CONFIG_BASE_NAME, OUTPUT_FLAG};
use redtriage::error::exit_code_for;
use redtriage::logging::LogFacade;
use redtriage::security::{
    log_security_event, system_time_window, CommandValidator, FlagValue, SecurityEvent,
};

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = load_config(args.config.as_deref()).context("Failed to load configuration")?;
    let logger = initialize_logging(&config, &args)?;

    let Some(invocation) = Invocation::from_tokens(&args.invocation) else {
        print_usage()?;
        return Ok(());
    };

    let validator = CommandValidator::new(args.strict);
    match invocation.command.as_str() {
        "help" => print_usage(),
        "version" => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "config" => {
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        "init" => init_config(),
        "setup" => run_setup(&validator),
        _ => run_command(&validator, &invocation, &args, &logger),
    }
}

/// Build the logger from configuration, apply command-line overrides and
/// route the `log` macros through it.
fn initialize_logging(config: &Configuration, args: &Args) -> Result<LogFacade> {
    let logger = LogFacade::from_config(config);
    if config.log_file().is_none() {
        // stdout carries command output
        logger.set_output(io::stderr());
    }
    if let Some(level) = args.log_level_override() {
        logger.set_level(level);
    }
    if let Some(format) = &args.log_format {
        logger.set_format(format);
    }
    logger.install().context("Failed to initialize logger")?;
    Ok(logger)
}

fn print_usage() -> Result<()> {
    Args::command()
        .print_help()
        .context("Failed to print usage")?;
    println!();
    Ok(())
}

/// Write the default configuration into the working directory.
fn init_config() -> Result<()> {
    let path = env::current_dir()
        .context("Failed to determine working directory")?
        .join(format!("{}.yaml", CONFIG_BASE_NAME));
    Configuration::write_default_file(&path)?;
    println!("Created {}", path.display());
    Ok(())
}

fn run_setup(validator: &CommandValidator) -> Result<()> {
    if let Err(e) = validator.validate_execution_environment() {
        log_security_event(&SecurityEvent::environment_rejected(&e));
        return Err(e.into());
    }

    let (earliest, latest) = system_time_window();
    println!("Working directory is readable and writable");
    println!("System clock is within {} .. {}", earliest, latest);
    info!("Execution environment validated");
    Ok(())
}

/// Vet the invocation and the host, then hand the plan to the collection
/// subsystem as JSON on stdout.
fn run_command(
    validator: &CommandValidator,
    invocation: &Invocation,
    args: &Args,
    logger: &LogFacade,
) -> Result<()> {
    let entry = logger.with_field("command", invocation.command.as_str());

    if let Err(e) = validator.validate_command(&invocation.command, &invocation.args, &invocation.flags) {
        log_security_event(&SecurityEvent::command_rejected(&invocation.command, &e));
        return Err(e.into());
    }
    entry
        .clone()
        .with_field("args", invocation.args.len())
        .with_field("flags", invocation.flags.len())
        .debug("Invocation validated");

    if args.skip_env_check {
        debug!("Skipping execution environment check");
    } else {
        if let Err(e) = validator.validate_execution_environment() {
            log_security_event(&SecurityEvent::environment_rejected(&e));
            return Err(e).context("Execution environment check failed");
        }
        if let Some(FlagValue::String(output)) = invocation.flags.get(OUTPUT_FLAG) {
            let path = Path::new(output);
            if let Err(e) = validator.validate_file_access(path, "write") {
                log_security_event(&SecurityEvent::access_denied(path, "write", &e));
                return Err(e).context("Output location is not writable");
            }
        }
    }

    let plan = serde_json::to_string_pretty(invocation).context("Failed to encode invocation")?;
    println!("{}", plan);
    entry.info("Invocation accepted");
    Ok(())
}
