// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{
    CommandDecl, CommandLine, GroupDecl, RawRequirements, RawToolsFile, RawVenv, Settings, ToolsFile,
};
use crate::errors::{Result, ToolsError};
use crate::venv::paths::is_reserved_name;
use crate::venv::{DependencySpec, PipRequirements, VirtualEnvConfig};

const NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_-]*$";

impl TryFrom<RawToolsFile> for ToolsFile {
    type Error = ToolsError;

    fn try_from(raw: RawToolsFile) -> std::result::Result<Self, Self::Error> {
        let names = Regex::new(NAME_PATTERN).map_err(|e| ToolsError::Config(e.to_string()))?;

        let settings = Settings {
            python: raw.settings.python.clone(),
            lock_timeout: seconds("[settings].lock_timeout_secs", raw.settings.lock_timeout_secs)?,
            creator: raw.settings.creator,
        };

        let default_requirements = raw
            .default_requirements
            .as_ref()
            .map(|deps| dependency_spec("[default_requirements]", deps))
            .transpose()?;

        let default_venv = raw
            .default_venv
            .as_ref()
            .map(|venv| venv_config("[default_venv]", "default", venv))
            .transpose()?;

        let mut venvs = BTreeMap::new();
        for (name, venv) in &raw.venv {
            check_name(&names, "venv", name)?;
            if is_reserved_name(name) {
                return Err(ToolsError::Config(format!(
                    "[venv.{name}]: the name '{name}' is reserved for lock files"
                )));
            }
            venvs.insert(
                name.clone(),
                venv_config(&format!("[venv.{name}]"), name, venv)?,
            );
        }

        let groups = validate_groups(&raw, &names, &venvs)?;
        let commands = validate_commands(&raw, &names, &venvs, &groups)?;

        Ok(ToolsFile {
            settings,
            default_requirements,
            default_venv,
            venvs,
            groups,
            commands,
        })
    }
}

fn check_name(pattern: &Regex, what: &str, name: &str) -> Result<()> {
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(ToolsError::Config(format!(
            "invalid {what} name '{name}': use letters, digits, '-' or '_'"
        )))
    }
}

fn seconds(field: &str, value: Option<u64>) -> Result<Option<Duration>> {
    match value {
        Some(0) => Err(ToolsError::Config(format!("{field} must be >= 1 (got 0)"))),
        other => Ok(other.map(Duration::from_secs)),
    }
}

fn dependency_spec(section: &str, raw: &RawRequirements) -> Result<DependencySpec> {
    let mut builder = DependencySpec::builder();
    if raw.declares_pip() {
        builder = builder.pip(PipRequirements {
            requirements: raw.requirements.clone(),
            requirements_files: raw.requirements_files.clone(),
            install_args: raw.install_args.clone(),
        });
    }
    if let Some(poetry) = &raw.poetry {
        builder = builder.poetry(poetry.clone());
    }
    builder.build().map_err(|e| match e {
        ToolsError::Config(msg) => ToolsError::Config(format!("{section}: {msg}")),
        other => other,
    })
}

fn venv_config(section: &str, name: &str, raw: &RawVenv) -> Result<VirtualEnvConfig> {
    let mut builder = VirtualEnvConfig::builder()
        .name(name)
        .dependencies(dependency_spec(section, &raw.dependencies)?)
        .system_site_packages(raw.system_site_packages)
        .add_as_extra_site_packages(raw.add_as_extra_site_packages);
    for (key, value) in &raw.env {
        builder = builder.env(key.clone(), value.clone());
    }
    if let Some(pip) = &raw.pip_requirement {
        builder = builder.pip_requirement(pip.clone());
    }
    if let Some(setuptools) = &raw.setuptools_requirement {
        builder = builder.setuptools_requirement(setuptools.clone());
    }
    if let Some(creator) = raw.creator {
        builder = builder.creator(creator);
    }
    if let Some(timeout) = seconds(&format!("{section}.lock_timeout_secs"), raw.lock_timeout_secs)? {
        builder = builder.lock_timeout(timeout);
    }
    builder.build()
}

fn lookup_venv(
    venvs: &BTreeMap<String, VirtualEnvConfig>,
    owner: &str,
    name: Option<&String>,
) -> Result<Option<VirtualEnvConfig>> {
    match name {
        None => Ok(None),
        Some(name) => venvs.get(name).cloned().map(Some).ok_or_else(|| {
            ToolsError::Config(format!("{owner} refers to unknown venv '{name}'"))
        }),
    }
}

fn validate_groups(
    raw: &RawToolsFile,
    names: &Regex,
    venvs: &BTreeMap<String, VirtualEnvConfig>,
) -> Result<Vec<GroupDecl>> {
    // Edge direction: parent -> child, so a toposort lists parents first.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for (key, group) in &raw.group {
        check_name(names, "group", key)?;
        graph.add_node(key.as_str());
        if let Some(parent) = &group.parent {
            if !raw.group.contains_key(parent) {
                return Err(ToolsError::Config(format!(
                    "group '{key}' has unknown parent '{parent}'"
                )));
            }
            graph.add_edge(parent.as_str(), key.as_str(), ());
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        ToolsError::Config(format!(
            "cycle detected in group parents involving group '{}'",
            cycle.node_id()
        ))
    })?;

    let mut paths: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut groups = Vec::with_capacity(order.len());
    for key in order {
        let Some(group) = raw.group.get(key) else {
            continue;
        };
        let mut path = group
            .parent
            .as_deref()
            .and_then(|p| paths.get(p).cloned())
            .unwrap_or_default();
        path.push(key.to_string());
        paths.insert(key, path.clone());

        groups.push(GroupDecl {
            key: key.to_string(),
            path,
            help: group.help.clone().unwrap_or_default(),
            description: group.description.clone(),
            venv: lookup_venv(venvs, &format!("group '{key}'"), group.venv.as_ref())?,
        });
    }
    Ok(groups)
}

fn validate_commands(
    raw: &RawToolsFile,
    names: &Regex,
    venvs: &BTreeMap<String, VirtualEnvConfig>,
    groups: &[GroupDecl],
) -> Result<Vec<CommandDecl>> {
    let mut commands = Vec::new();
    for (group_key, entries) in &raw.command {
        let group = groups.iter().find(|g| &g.key == group_key).ok_or_else(|| {
            ToolsError::Config(format!(
                "[command.{group_key}.*] refers to unknown group '{group_key}'"
            ))
        })?;
        for (name, command) in entries {
            check_name(names, "command", name)?;
            let section = format!("[command.{group_key}.{name}]");

            let empty = match &command.cmd {
                CommandLine::Argv(argv) => argv.is_empty(),
                CommandLine::Shell(script) => script.trim().is_empty(),
            };
            if empty {
                return Err(ToolsError::Config(format!("{section}: `cmd` is empty")));
            }

            commands.push(CommandDecl {
                group_path: group.path.clone(),
                name: name.clone(),
                cmd: command.cmd.clone(),
                help: command.help.clone(),
                description: command.description.clone(),
                venv: lookup_venv(venvs, &section, command.venv.as_ref())?,
                timeout: seconds(&format!("{section}.timeout_secs"), command.timeout_secs)?,
                no_output_timeout: seconds(
                    &format!("{section}.no_output_timeout_secs"),
                    command.no_output_timeout_secs,
                )?,
                interactive: command.interactive,
                check: command.check,
                cwd: command.cwd.clone(),
                env: command.env.clone(),
            });
        }
    }
    Ok(commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_text: &str) -> Result<ToolsFile> {
        let raw: RawToolsFile = toml::from_str(toml_text)?;
        ToolsFile::try_from(raw)
    }

    #[test]
    fn empty_file_is_valid() {
        let file = parse("").unwrap();
        assert!(file.groups.is_empty());
        assert!(file.commands.is_empty());
        assert!(file.default_venv.is_none());
    }

    #[test]
    fn nested_groups_are_ordered_parents_first() {
        let file = parse(
            r#"
            [group.docs]
            parent = "ci"
            [group.ci]
            help = "CI"
            "#,
        )
        .unwrap();
        let keys: Vec<_> = file.groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["ci", "docs"]);
        assert_eq!(file.groups[1].path, vec!["ci", "docs"]);
    }

    #[test]
    fn parent_cycles_are_rejected() {
        let err = parse(
            r#"
            [group.a]
            parent = "b"
            [group.b]
            parent = "a"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    #[test]
    fn unknown_references_are_rejected() {
        assert!(parse("[group.a]\nparent = \"zzz\"").is_err());
        assert!(parse("[group.a]\nvenv = \"zzz\"").is_err());
        assert!(parse("[command.nope.x]\ncmd = \"true\"").is_err());
        assert!(parse("[group.a]\n[command.a.x]\ncmd = \"true\"\nvenv = \"zzz\"").is_err());
    }

    #[test]
    fn both_backends_are_rejected() {
        let err = parse(
            r#"
            [venv.docs]
            requirements = ["sphinx"]
            poetry = { groups = ["docs"] }
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("[venv.docs]"), "{err}");
    }

    #[test]
    fn zero_timeouts_and_empty_commands_are_rejected() {
        assert!(parse("[group.a]\n[command.a.x]\ncmd = \"true\"\ntimeout_secs = 0").is_err());
        assert!(parse("[group.a]\n[command.a.x]\ncmd = []").is_err());
        assert!(parse("[settings]\nlock_timeout_secs = 0").is_err());
    }

    #[test]
    fn invalid_names_are_rejected() {
        assert!(parse("[group.\"bad name\"]").is_err());
        assert!(parse("[venv.\"-x\"]").is_err());
        let err = parse("[venv.locks]\nrequirements = [\"rich\"]").unwrap_err();
        assert!(err.to_string().contains("reserved"), "{err}");
    }

    #[test]
    fn named_venvs_carry_their_section_name() {
        let file = parse(
            r#"
            [venv.docs]
            requirements = ["sphinx"]
            lock_timeout_secs = 5
            [group.ci]
            venv = "docs"
            [command.ci.build]
            cmd = ["sphinx-build", "docs", "out"]
            "#,
        )
        .unwrap();
        let venv = file.groups[0].venv.as_ref().unwrap();
        assert_eq!(venv.name.as_deref(), Some("docs"));
        assert_eq!(venv.lock_timeout, Some(Duration::from_secs(5)));
        assert_eq!(file.commands[0].group_path, vec!["ci"]);
        assert!(file.commands[0].check);
    }
}
