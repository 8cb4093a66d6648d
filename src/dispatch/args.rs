// src/dispatch/args.rs

//! Declarative argument descriptors and typed access to parsed values.

use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::{Arg, ArgAction, ArgMatches, value_parser};
use regex::Regex;

use crate::errors::{Result, ToolsError};

const ARG_NAME: &str = r"^[A-Za-z_][A-Za-z0-9_-]*$";

/// How an argument appears on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// `tools group cmd VALUE`
    Positional,
    /// `--name VALUE`
    Option,
    /// `--name` (boolean switch)
    Flag,
    /// Everything left over, hyphens included.
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgType {
    #[default]
    String,
    Int,
    Float,
    Path,
    Bool,
}

/// One declared command argument.
#[derive(Debug, Clone, PartialEq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub value_type: ArgType,
    pub help: Option<String>,
    pub flags: Vec<String>,
    pub default: Option<String>,
    pub choices: Vec<String>,
    pub required: bool,
    pub metavar: Option<String>,
}

impl ArgSpec {
    fn with_kind(name: impl Into<String>, kind: ArgKind) -> Self {
        Self {
            name: name.into(),
            kind,
            value_type: if kind == ArgKind::Flag {
                ArgType::Bool
            } else {
                ArgType::String
            },
            help: None,
            flags: Vec::new(),
            default: None,
            choices: Vec::new(),
            required: false,
            metavar: None,
        }
    }

    pub fn positional(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgKind::Positional)
    }

    pub fn option(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgKind::Option)
    }

    pub fn flag(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgKind::Flag)
    }

    pub fn trailing(name: impl Into<String>) -> Self {
        Self::with_kind(name, ArgKind::Trailing)
    }

    pub fn value_type(mut self, value_type: ArgType) -> Self {
        self.value_type = value_type;
        self
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Replace the default `--<name>` spelling, e.g. `["-n", "--name"]`.
    pub fn flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    pub fn default_value(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = choices.into_iter().map(Into::into).collect();
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn metavar(mut self, metavar: impl Into<String>) -> Self {
        self.metavar = Some(metavar.into());
        self
    }

    /// Flags as spelled on the command line, defaulting to `--kebab-name`.
    pub fn effective_flags(&self) -> Vec<String> {
        if self.flags.is_empty() {
            vec![format!("--{}", self.name.replace('_', "-"))]
        } else {
            self.flags.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: String| Err(ToolsError::Config(format!("argument '{}': {msg}", self.name)));

        let pattern = Regex::new(ARG_NAME).map_err(|e| ToolsError::Config(e.to_string()))?;
        if !pattern.is_match(&self.name) {
            return fail("names must start with a letter or '_' and use [A-Za-z0-9_-]".into());
        }
        let positional = matches!(self.kind, ArgKind::Positional | ArgKind::Trailing);
        if positional && !self.flags.is_empty() {
            return fail("positional arguments cannot declare flags".into());
        }
        for flag in &self.flags {
            let short = flag.len() == 2 && flag.starts_with('-') && flag != "--";
            let long = flag.len() > 2 && flag.starts_with("--");
            if !short && !long {
                return fail(format!("invalid flag '{flag}' (expected '-x' or '--name')"));
            }
        }
        if self.kind == ArgKind::Flag {
            if self.value_type != ArgType::Bool {
                return fail("flags are always boolean".into());
            }
            if let Some(default) = &self.default {
                if default.parse::<bool>().is_err() {
                    return fail(format!("flag default must be true or false, got '{default}'"));
                }
            }
        }
        if !self.choices.is_empty() {
            if self.value_type != ArgType::String {
                return fail("choices are only supported for string arguments".into());
            }
            if let Some(default) = &self.default {
                if !self.choices.contains(default) {
                    return fail(format!("default '{default}' is not one of the choices"));
                }
            }
        }
        if self.required && self.default.is_some() {
            return fail("a required argument cannot have a default".into());
        }
        if self.kind == ArgKind::Trailing && self.default.is_some() {
            return fail("trailing arguments cannot have a default".into());
        }
        Ok(())
    }

    /// Build the clap argument. Call [`ArgSpec::validate`] first.
    pub fn to_clap(&self) -> Arg {
        let mut arg = Arg::new(self.name.clone());
        if let Some(help) = &self.help {
            arg = arg.help(help.clone());
        }
        if let Some(metavar) = &self.metavar {
            arg = arg.value_name(metavar.clone());
        }

        match self.kind {
            ArgKind::Positional => {
                arg = self.typed(arg.action(ArgAction::Set));
                arg = arg.required(self.default.is_none());
            }
            ArgKind::Option => {
                arg = self.typed(self.spelled(arg).action(ArgAction::Set));
                arg = arg.required(self.required);
            }
            ArgKind::Flag => {
                let default_on = self
                    .default
                    .as_deref()
                    .and_then(|d| d.parse::<bool>().ok())
                    .unwrap_or(false);
                let action = if default_on {
                    ArgAction::SetFalse
                } else {
                    ArgAction::SetTrue
                };
                return self.spelled(arg).action(action);
            }
            ArgKind::Trailing => {
                arg = self
                    .typed(arg.action(ArgAction::Append))
                    .num_args(0..)
                    .trailing_var_arg(true)
                    .allow_hyphen_values(true)
                    .required(self.required);
                return arg;
            }
        }

        if let Some(default) = &self.default {
            arg = arg.default_value(default.clone());
        }
        arg
    }

    fn spelled(&self, mut arg: Arg) -> Arg {
        let mut has_long = false;
        for flag in self.effective_flags() {
            if let Some(long) = flag.strip_prefix("--") {
                arg = if has_long {
                    arg.visible_alias(long.to_string())
                } else {
                    arg.long(long.to_string())
                };
                has_long = true;
            } else if let Some(short) = flag.strip_prefix('-').and_then(|s| s.chars().next()) {
                arg = arg.short(short);
            }
        }
        arg
    }

    fn typed(&self, arg: Arg) -> Arg {
        if !self.choices.is_empty() {
            return arg.value_parser(PossibleValuesParser::new(self.choices.clone()));
        }
        match self.value_type {
            ArgType::String => arg.value_parser(value_parser!(String)),
            ArgType::Int => arg.value_parser(value_parser!(i64)),
            ArgType::Float => arg.value_parser(value_parser!(f64)),
            ArgType::Path => arg.value_parser(value_parser!(PathBuf)),
            ArgType::Bool => arg.value_parser(value_parser!(bool)),
        }
    }
}

/// Parsed values of one command invocation.
#[derive(Debug, Clone)]
pub struct Arguments {
    matches: ArgMatches,
}

impl Arguments {
    pub fn new(matches: ArgMatches) -> Self {
        Self { matches }
    }

    pub fn empty() -> Self {
        Self::new(ArgMatches::default())
    }

    /// Typed value, failing when `name` was declared with another type.
    pub fn value<T>(&self, name: &str) -> Result<Option<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.matches
            .try_get_one::<T>(name)
            .map(|v| v.cloned())
            .map_err(|e| ToolsError::Config(format!("argument '{name}': {e}")))
    }

    pub fn get_str(&self, name: &str) -> Option<String> {
        self.value::<String>(name).ok().flatten()
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.value::<i64>(name).ok().flatten()
    }

    pub fn get_float(&self, name: &str) -> Option<f64> {
        self.value::<f64>(name).ok().flatten()
    }

    pub fn get_path(&self, name: &str) -> Option<PathBuf> {
        self.value::<PathBuf>(name).ok().flatten()
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.value::<bool>(name).ok().flatten()
    }

    /// Switch state; `false` when the flag is unknown.
    pub fn get_flag(&self, name: &str) -> bool {
        self.get_bool(name).unwrap_or(false)
    }

    /// All values of a trailing (or repeated) string argument.
    pub fn get_many(&self, name: &str) -> Vec<String> {
        match self.matches.try_get_many::<String>(name) {
            Ok(Some(values)) => values.cloned().collect(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Command;

    use super::*;

    fn parse(specs: &[ArgSpec], argv: &[&str]) -> Arguments {
        let mut cmd = Command::new("t");
        for spec in specs {
            spec.validate().unwrap();
            cmd = cmd.arg(spec.to_clap());
        }
        Arguments::new(cmd.try_get_matches_from(argv).unwrap())
    }

    #[test]
    fn typed_values_are_extracted() {
        let specs = [
            ArgSpec::positional("target").value_type(ArgType::Path),
            ArgSpec::option("jobs").value_type(ArgType::Int).default_value("2"),
            ArgSpec::option("ratio").value_type(ArgType::Float),
            ArgSpec::flag("dry_run"),
        ];
        let args = parse(&specs, &["t", "out", "--ratio", "0.5", "--dry-run"]);
        assert_eq!(args.get_path("target"), Some(PathBuf::from("out")));
        assert_eq!(args.get_int("jobs"), Some(2));
        assert_eq!(args.get_float("ratio"), Some(0.5));
        assert!(args.get_flag("dry_run"));
        // wrong type is an error, not a panic
        assert!(args.value::<String>("jobs").is_err());
    }

    #[test]
    fn trailing_collects_hyphenated_values() {
        let specs = [ArgSpec::trailing("args")];
        let args = parse(&specs, &["t", "file", "-x", "--verbose"]);
        assert_eq!(args.get_many("args"), vec!["file", "-x", "--verbose"]);
    }

    #[test]
    fn short_and_long_flags() {
        let specs = [ArgSpec::option("name").flags(["-n", "--name", "--nom"])];
        assert_eq!(parse(&specs, &["t", "-n", "a"]).get_str("name").as_deref(), Some("a"));
        assert_eq!(parse(&specs, &["t", "--nom", "b"]).get_str("name").as_deref(), Some("b"));
    }

    #[test]
    fn flag_defaulting_to_true_is_cleared() {
        let specs = [ArgSpec::flag("color").default_value("true").flags(["--no-color"])];
        assert!(parse(&specs, &["t"]).get_flag("color"));
        assert!(!parse(&specs, &["t", "--no-color"]).get_flag("color"));
    }

    #[test]
    fn invalid_descriptors_are_rejected() {
        assert!(ArgSpec::positional("x").flags(["--x"]).validate().is_err());
        assert!(ArgSpec::option("x").flags(["x"]).validate().is_err());
        assert!(ArgSpec::option("1x").validate().is_err());
        assert!(ArgSpec::option("x").choices(["a"]).default_value("b").validate().is_err());
        assert!(ArgSpec::flag("x").default_value("maybe").validate().is_err());
        assert!(
            ArgSpec::option("x")
                .value_type(ArgType::Int)
                .choices(["1"])
                .validate()
                .is_err()
        );
    }
}
