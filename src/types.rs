use std::str::FromStr;
use serde::Deserialize;

/// How a new virtual environment is created.
///
/// - `Auto`: use the `virtualenv` binary when it is on `PATH`, otherwise fall
///   back to `python -m venv` (default behaviour).
/// - `Virtualenv`: always use `virtualenv --python=<python>`.
/// - `Venv`: always use `<python> -m venv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenvCreator {
    Auto,
    Virtualenv,
    Venv,
}

impl Default for VenvCreator {
    fn default() -> Self {
        VenvCreator::Auto
    }
}

impl FromStr for VenvCreator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(VenvCreator::Auto),
            "virtualenv" => Ok(VenvCreator::Virtualenv),
            "venv" => Ok(VenvCreator::Venv),
            other => Err(format!(
                "invalid creator: {other} (expected \"auto\", \"virtualenv\" or \"venv\")"
            )),
        }
    }
}

/// Output verbosity selected by `--quiet` / `--debug`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::Normal
    }
}

impl Verbosity {
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }

    pub fn level(self) -> tracing::Level {
        match self {
            Verbosity::Quiet => tracing::Level::WARN,
            Verbosity::Normal => tracing::Level::INFO,
            Verbosity::Debug => tracing::Level::DEBUG,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creator_parses_case_insensitively() {
        assert_eq!("VENV".parse::<VenvCreator>(), Ok(VenvCreator::Venv));
        assert_eq!(" auto ".parse::<VenvCreator>(), Ok(VenvCreator::Auto));
        assert!("conda".parse::<VenvCreator>().is_err());
    }

    #[test]
    fn quiet_wins_over_debug() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true).level(), tracing::Level::DEBUG);
    }
}
