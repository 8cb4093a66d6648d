// src/dispatch/registry.rs

//! Explicit registry of command groups and the commands inside them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use clap::ArgMatches;
use regex::Regex;

use super::args::{ArgKind, ArgSpec, Arguments};
use super::context::Context;
use crate::errors::{Result, ToolsError};
use crate::venv::VirtualEnvConfig;

const NAME_PATTERN: &str = r"^[a-z0-9][a-z0-9-]*$";

/// Body of a command.
pub type Handler = Box<dyn Fn(&mut Context, &Arguments) -> Result<()>>;

/// `tools` sub-command names are kebab-case.
pub fn cli_name(name: &str) -> String {
    name.trim().replace('_', "-").to_lowercase()
}

fn check_name(what: &str, name: &str) -> Result<()> {
    let pattern = Regex::new(NAME_PATTERN).map_err(|e| ToolsError::Config(e.to_string()))?;
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(ToolsError::Config(format!(
            "invalid {what} name '{name}': use letters, digits, '-' or '_'"
        )))
    }
}

/// A named set of commands, optionally nested under another group.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandGroup {
    pub name: String,
    pub help: String,
    pub description: Option<String>,
    pub parent: Vec<String>,
    pub venv_config: Option<VirtualEnvConfig>,
}

impl CommandGroup {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            description: None,
            parent: Vec::new(),
            venv_config: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Path of the parent group, e.g. `["ci"]` for `tools ci <this>`.
    pub fn parent<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parent = path.into_iter().map(Into::into).collect();
        self
    }

    /// Environment every command of this group runs in (unless the command
    /// declares its own). Unnamed configs take the group's name.
    pub fn venv(mut self, config: VirtualEnvConfig) -> Self {
        self.venv_config = Some(config);
        self
    }

    pub fn path(&self) -> Vec<String> {
        let mut path = self.parent.clone();
        path.push(self.name.clone());
        path
    }
}

/// One runnable command.
pub struct CommandSpec {
    pub name: String,
    pub help: Option<String>,
    pub description: Option<String>,
    pub args: Vec<ArgSpec>,
    pub venv_config: Option<VirtualEnvConfig>,
    handler: Handler,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("help", &self.help)
            .field("args", &self.args)
            .field("venv_config", &self.venv_config)
            .finish_non_exhaustive()
    }
}

impl CommandSpec {
    pub fn new<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut Context, &Arguments) -> Result<()> + 'static,
    {
        Self {
            name: name.into(),
            help: None,
            description: None,
            args: Vec::new(),
            venv_config: None,
            handler: Box::new(handler),
        }
    }

    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Long help; its first line doubles as the short help when none is set.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    /// Environment this command runs in. Unnamed configs take the command's
    /// name.
    pub fn venv(mut self, config: VirtualEnvConfig) -> Self {
        self.venv_config = Some(config);
        self
    }

    pub fn invoke(&self, ctx: &mut Context, args: &Arguments) -> Result<()> {
        (self.handler)(ctx, args)
    }

    fn short_help(&self) -> Option<String> {
        self.help.clone().or_else(|| {
            self.description
                .as_deref()
                .and_then(|d| d.lines().next())
                .map(str::to_string)
        })
    }

    fn validate(&self) -> Result<()> {
        let mut names = BTreeSet::new();
        let mut flags = BTreeSet::new();
        let mut trailing_seen = false;
        for arg in &self.args {
            arg.validate()?;
            if !names.insert(arg.name.as_str()) {
                return Err(ToolsError::Config(format!(
                    "command '{}' declares argument '{}' twice",
                    self.name, arg.name
                )));
            }
            if matches!(arg.kind, ArgKind::Option | ArgKind::Flag) {
                for flag in arg.effective_flags() {
                    if flag == "-h" || flag == "--help" || !flags.insert(flag.clone()) {
                        return Err(ToolsError::Config(format!(
                            "command '{}': flag '{flag}' is already taken",
                            self.name
                        )));
                    }
                }
            }
            if matches!(arg.kind, ArgKind::Positional | ArgKind::Trailing) && trailing_seen {
                return Err(ToolsError::Config(format!(
                    "command '{}': the trailing argument must be the last positional",
                    self.name
                )));
            }
            trailing_seen |= arg.kind == ArgKind::Trailing;
        }
        Ok(())
    }

    fn to_clap(&self) -> clap::Command {
        let mut cmd = clap::Command::new(self.name.clone());
        if let Some(help) = self.short_help() {
            cmd = cmd.about(help);
        }
        if let Some(description) = &self.description {
            cmd = cmd.long_about(description.clone());
        }
        for arg in &self.args {
            cmd = cmd.arg(arg.to_clap());
        }
        cmd
    }
}

#[derive(Debug)]
struct GroupEntry {
    group: CommandGroup,
    commands: Vec<CommandSpec>,
    subgroups: Vec<String>,
}

/// What the parsed command line points at.
#[derive(Debug)]
pub enum Resolution<'a> {
    Command {
        group: &'a CommandGroup,
        command: &'a CommandSpec,
        matches: &'a ArgMatches,
    },
    NoCommand,
}

/// Groups keyed by their full path (`["ci", "docs"]`).
#[derive(Debug, Default)]
pub struct CommandRegistry {
    groups: BTreeMap<Vec<String>, GroupEntry>,
    roots: Vec<String>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a group; its parent must already be registered.
    ///
    /// Returns the group's full path.
    pub fn add_group(&mut self, mut group: CommandGroup) -> Result<Vec<String>> {
        group.name = cli_name(&group.name);
        group.parent = group.parent.iter().map(|p| cli_name(p)).collect();
        check_name("group", &group.name)?;

        if let Some(config) = &group.venv_config {
            group.venv_config = Some(config.with_default_name(&group.name));
        }

        let path = group.path();
        if self.groups.contains_key(&path) {
            return Err(ToolsError::Config(format!(
                "command group '{}' is already registered",
                path.join(" ")
            )));
        }

        if group.parent.is_empty() {
            self.roots.push(group.name.clone());
        } else {
            let parent = self.groups.get_mut(&group.parent).ok_or_else(|| {
                ToolsError::Config(format!(
                    "command group '{}' has unknown parent '{}'",
                    group.name,
                    group.parent.join(" ")
                ))
            })?;
            if parent.commands.iter().any(|c| c.name == group.name) {
                return Err(ToolsError::Config(format!(
                    "'{}' is already a command of group '{}'",
                    group.name,
                    group.parent.join(" ")
                )));
            }
            parent.subgroups.push(group.name.clone());
        }

        self.groups.insert(
            path.clone(),
            GroupEntry {
                group,
                commands: Vec::new(),
                subgroups: Vec::new(),
            },
        );
        Ok(path)
    }

    /// Register `command` inside the group at `group_path`.
    pub fn add_command<S: AsRef<str>>(
        &mut self,
        group_path: &[S],
        mut command: CommandSpec,
    ) -> Result<()> {
        command.name = cli_name(&command.name);
        check_name("command", &command.name)?;
        command.validate()?;
        if let Some(config) = &command.venv_config {
            command.venv_config = Some(config.with_default_name(&command.name));
        }

        let key: Vec<String> = group_path.iter().map(|s| cli_name(s.as_ref())).collect();
        let entry = self.groups.get_mut(&key).ok_or_else(|| {
            ToolsError::Config(format!(
                "command '{}' refers to unknown group '{}'",
                command.name,
                key.join(" ")
            ))
        })?;
        if entry.commands.iter().any(|c| c.name == command.name)
            || entry.subgroups.contains(&command.name)
        {
            return Err(ToolsError::Config(format!(
                "'{}' is already registered in group '{}'",
                command.name,
                key.join(" ")
            )));
        }
        entry.commands.push(command);
        Ok(())
    }

    pub fn group(&self, path: &[String]) -> Option<&CommandGroup> {
        self.groups.get(path).map(|e| &e.group)
    }

    pub fn command(&self, path: &[String], name: &str) -> Option<&CommandSpec> {
        self.groups
            .get(path)
            .and_then(|e| e.commands.iter().find(|c| c.name == name))
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Add every registered group as a sub-command of `root`.
    pub fn augment(&self, mut root: clap::Command) -> clap::Command {
        for name in &self.roots {
            if let Some(sub) = self.group_command(&[name.clone()]) {
                root = root.subcommand(sub);
            }
        }
        root
    }

    fn group_command(&self, path: &[String]) -> Option<clap::Command> {
        let entry = self.groups.get(path)?;
        let group = &entry.group;
        let mut cmd = clap::Command::new(group.name.clone()).about(group.help.clone());
        if let Some(description) = &group.description {
            cmd = cmd.long_about(description.clone());
        }
        for sub in &entry.subgroups {
            let mut sub_path = path.to_vec();
            sub_path.push(sub.clone());
            if let Some(sub_cmd) = self.group_command(&sub_path) {
                cmd = cmd.subcommand(sub_cmd);
            }
        }
        for command in &entry.commands {
            cmd = cmd.subcommand(command.to_clap());
        }
        Some(cmd)
    }

    /// Walk the parsed sub-commands down to the selected command.
    pub fn resolve<'a>(&'a self, matches: &'a ArgMatches) -> Resolution<'a> {
        let mut path = Vec::new();
        let mut current = matches;
        while let Some((name, sub)) = current.subcommand() {
            path.push(name.to_string());
            if self.groups.contains_key(&path) {
                current = sub;
                continue;
            }
            path.pop();
            let Some(entry) = self.groups.get(&path) else {
                break;
            };
            if let Some(command) = entry.commands.iter().find(|c| c.name == name) {
                return Resolution::Command {
                    group: &entry.group,
                    command,
                    matches: sub,
                };
            }
            break;
        }
        Resolution::NoCommand
    }
}
