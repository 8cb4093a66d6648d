// src/cli.rs

//! Root `tools` command and its global options, parsed with `clap`.
//!
//! Groups and commands are added at runtime from the registry, so the root is
//! built with the builder API and the global options are a derived [`Args`]
//! struct flattened into it.

use std::ffi::OsString;
use std::time::Duration;

use clap::{ArgMatches, Args, Command, FromArgMatches};

use crate::dispatch::RunDefaults;
use crate::errors::{Result, ToolsError};
use crate::logging::LogOptions;
use crate::types::Verbosity;

/// Options accepted before the group name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Args)]
pub struct GlobalArgs {
    /// Prefix log lines with `[HH:MM:SS]`. Default when `CI` is set.
    #[arg(
        long,
        visible_alias = "ts",
        conflicts_with = "no_timestamps",
        help_heading = "Logging"
    )]
    pub timestamps: bool,

    /// Never prefix log lines with timestamps.
    #[arg(long, visible_alias = "nts", help_heading = "Logging")]
    pub no_timestamps: bool,

    /// Only show warnings and errors.
    #[arg(short, long, conflicts_with = "debug", help_heading = "Logging")]
    pub quiet: bool,

    /// Show debug logs.
    #[arg(short, long, help_heading = "Logging")]
    pub debug: bool,

    /// Terminate any subprocess running longer than this.
    #[arg(
        long,
        visible_alias = "timeout-secs",
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Run Subprocess Options"
    )]
    pub timeout: Option<u64>,

    /// Terminate any subprocess that prints nothing for this long.
    #[arg(
        long = "no-output-timeout-secs",
        visible_alias = "nots",
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..),
        help_heading = "Run Subprocess Options"
    )]
    pub no_output_timeout: Option<u64>,
}

impl GlobalArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        GlobalArgs::from_arg_matches(matches).map_err(|e| ToolsError::Config(e.to_string()))
    }

    /// `None` when neither flag was given.
    pub fn timestamps(&self) -> Option<bool> {
        if self.timestamps {
            Some(true)
        } else if self.no_timestamps {
            Some(false)
        } else {
            None
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }

    pub fn log_options(&self) -> LogOptions {
        LogOptions::new(self.verbosity(), self.timestamps())
    }

    pub fn run_defaults(&self) -> RunDefaults {
        RunDefaults {
            timeout: self.timeout.map(Duration::from_secs),
            no_output_timeout: self.no_output_timeout.map(Duration::from_secs),
        }
    }
}

/// The `tools` command without any groups.
pub fn root_command() -> Command {
    let cmd = Command::new("tools")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Project developer tools.")
        .long_about(
            "Project developer tools.\n\n\
             Commands are organised in groups: `tools <group> <command> [ARGS]`.",
        );
    GlobalArgs::augment_args(cmd)
}

/// Read the logging flags ahead of the full parse.
///
/// Logging has to be configured before tool modules are registered, and the
/// CLI cannot be built until they are. Only the leading global options are
/// looked at; anything unrecognised is left for clap to report.
pub fn prescan_logging(args: &[OsString]) -> LogOptions {
    let mut global = GlobalArgs::default();
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let Some(arg) = arg.to_str() else { break };
        match arg {
            "--timestamps" | "--ts" => global.timestamps = true,
            "--no-timestamps" | "--nts" => global.no_timestamps = true,
            "-q" | "--quiet" => global.quiet = true,
            "-d" | "--debug" => global.debug = true,
            "--timeout" | "--timeout-secs" | "--no-output-timeout-secs" | "--nots" => {
                iter.next();
            }
            flag if flag.starts_with('-') => {}
            _ => break,
        }
    }
    global.log_options()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    fn globals(args: &[&str]) -> std::result::Result<GlobalArgs, clap::Error> {
        let matches = root_command().try_get_matches_from(args)?;
        Ok(GlobalArgs::from_matches(&matches).unwrap())
    }

    #[test]
    fn timeouts_become_run_defaults() {
        let args = globals(&["tools", "--timeout-secs", "30", "--nots", "5"]).unwrap();
        let defaults = args.run_defaults();
        assert_eq!(defaults.timeout, Some(Duration::from_secs(30)));
        assert_eq!(defaults.no_output_timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn zero_timeout_is_a_usage_error() {
        assert!(globals(&["tools", "--timeout", "0"]).is_err());
    }

    #[test]
    fn conflicting_flags_are_rejected() {
        assert!(globals(&["tools", "-q", "-d"]).is_err());
        assert!(globals(&["tools", "--ts", "--nts"]).is_err());
    }

    #[test]
    fn prescan_stops_at_the_first_group() {
        let opts = prescan_logging(&argv(&["tools", "--timeout", "5", "-d", "ci", "-q"]));
        assert_eq!(opts.verbosity, Verbosity::Debug);

        let opts = prescan_logging(&argv(&["tools", "--nts", "ci"]));
        assert!(!opts.timestamps);
        let opts = prescan_logging(&argv(&["tools", "--ts"]));
        assert!(opts.timestamps);
    }
}
