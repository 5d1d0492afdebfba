//! CLI argument parsing and validation module
//!
//! Handles command-line interface using clap, including:
//! - Configuration file selection
//! - Output format selection (human/JSON)
//! - Session length
//! - Quiet mode

use anyhow::{anyhow, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use std::time::Duration;

/// Default length of a demonstration session in seconds
const DEFAULT_DURATION_SECS: f64 = 5.0;

/// Options for one monitoring session
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub config_path: Option<PathBuf>,
    pub json_output: bool,
    pub duration: Duration,
    pub quiet_mode: bool,
}

fn version() -> &'static str {
    concat!(env!("DEVBRIDGE_BUILD_VERSION"), " (", env!("GIT_HASH"), ")")
}

pub fn command() -> Command {
    Command::new("devbridge")
        .version(version())
        .about("Stream console, IPC and performance events from a host and its renderers to one monitor")
        .long_about(
            "Runs a host context and a simulated renderer context, captures their console output, \
             IPC traffic and resource usage, and prints the unified event stream.",
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (defaults to the user config directory)")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("json")
                .short('j')
                .long("json")
                .help("Output events as JSON lines")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("How long to run the session")
                .default_value("5")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .help("Suppress console echo and bridge diagnostics")
                .action(ArgAction::SetTrue),
        )
}

fn from_matches(matches: &ArgMatches) -> Result<RunConfig> {
    let config_path = matches.get_one::<PathBuf>("config").cloned();
    if let Some(path) = &config_path {
        if !path.exists() {
            return Err(anyhow!("Config file does not exist: {}", path.display()));
        }
    }

    let seconds = matches
        .get_one::<f64>("duration")
        .copied()
        .unwrap_or(DEFAULT_DURATION_SECS);
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(anyhow!("Duration must be a positive number of seconds, got {}", seconds));
    }

    Ok(RunConfig {
        config_path,
        json_output: matches.get_flag("json"),
        duration: Duration::from_secs_f64(seconds),
        quiet_mode: matches.get_flag("quiet"),
    })
}

/// Parse command line arguments and return the session options
pub fn parse_args() -> Result<RunConfig> {
    from_matches(&command().get_matches())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<RunConfig> {
        let matches = command().try_get_matches_from(args)?;
        from_matches(&matches)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["devbridge"]).unwrap();
        assert_eq!(config.config_path, None);
        assert!(!config.json_output);
        assert!(!config.quiet_mode);
        assert_eq!(config.duration, Duration::from_secs(5));
    }

    #[test]
    fn test_flags() {
        let config = parse(&["devbridge", "--json", "-q", "--duration", "0.5"]).unwrap();
        assert!(config.json_output);
        assert!(config.quiet_mode);
        assert_eq!(config.duration, Duration::from_millis(500));
    }

    #[test]
    fn test_rejects_non_positive_duration() {
        assert!(parse(&["devbridge", "--duration", "0"]).is_err());
        assert!(parse(&["devbridge", "--duration", "-1"]).is_err());
    }

    #[test]
    fn test_rejects_missing_config_file() {
        let err = parse(&["devbridge", "--config", "/nonexistent/devbridge.toml"]).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_command_is_well_formed() {
        command().debug_assert();
    }
}
