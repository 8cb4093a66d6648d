// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::VenvCreator;
use crate::venv::{DependencySpec, PoetryExport, VirtualEnvConfig};

/// `tools.toml` exactly as written.
///
/// ```toml
/// [settings]
/// python = "python3.11"
/// lock_timeout_secs = 120
///
/// [default_requirements]
/// requirements = ["rich"]
///
/// [venv.docs]
/// requirements_files = ["docs/requirements.txt"]
///
/// [group.ci]
/// help = "Continuous integration tasks"
///
/// [command.ci.docs]
/// cmd = ["sphinx-build", "docs", "build/docs"]
/// venv = "docs"
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawToolsFile {
    #[serde(default)]
    pub settings: RawSettings,

    /// Installed into the base interpreter before any command runs.
    #[serde(default)]
    pub default_requirements: Option<RawRequirements>,

    /// Environment active for every command.
    #[serde(default)]
    pub default_venv: Option<RawVenv>,

    /// Named environments from `[venv.<name>]`.
    #[serde(default)]
    pub venv: BTreeMap<String, RawVenv>,

    /// Command groups from `[group.<name>]`.
    #[serde(default)]
    pub group: BTreeMap<String, RawGroup>,

    /// Commands from `[command.<group>.<name>]`.
    #[serde(default)]
    pub command: BTreeMap<String, BTreeMap<String, RawCommand>>,
}

/// `[settings]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawSettings {
    /// Base interpreter: a name looked up on `PATH` or a path.
    #[serde(default)]
    pub python: Option<String>,

    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,

    #[serde(default)]
    pub creator: Option<VenvCreator>,
}

/// A dependency declaration: pip fields, or a `poetry` table, never both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRequirements {
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub requirements_files: Vec<PathBuf>,
    #[serde(default)]
    pub install_args: Vec<String>,
    #[serde(default)]
    pub poetry: Option<PoetryExport>,
}

impl RawRequirements {
    pub fn declares_pip(&self) -> bool {
        !self.requirements.is_empty()
            || !self.requirements_files.is_empty()
            || !self.install_args.is_empty()
    }
}

/// `[venv.<name>]` and `[default_venv]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawVenv {
    #[serde(flatten)]
    pub dependencies: RawRequirements,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub system_site_packages: bool,
    #[serde(default)]
    pub pip_requirement: Option<String>,
    #[serde(default)]
    pub setuptools_requirement: Option<String>,
    #[serde(default)]
    pub add_as_extra_site_packages: bool,
    #[serde(default)]
    pub creator: Option<VenvCreator>,
    #[serde(default)]
    pub lock_timeout_secs: Option<u64>,
}

/// `[group.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawGroup {
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Key of the enclosing group.
    #[serde(default)]
    pub parent: Option<String>,
    /// Key of a `[venv.<name>]` section.
    #[serde(default)]
    pub venv: Option<String>,
}

/// `cmd = ["prog", "arg"]` or `cmd = "prog arg | other"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandLine {
    Argv(Vec<String>),
    Shell(String),
}

/// `[command.<group>.<name>]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawCommand {
    pub cmd: CommandLine,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub venv: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub no_output_timeout_secs: Option<u64>,
    #[serde(default)]
    pub interactive: bool,
    #[serde(default = "default_check")]
    pub check: bool,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn default_check() -> bool {
    true
}

/// Validated `tools.toml`. Built only through `TryFrom<RawToolsFile>`.
#[derive(Debug, Clone, Default)]
pub struct ToolsFile {
    pub settings: Settings,
    pub default_requirements: Option<DependencySpec>,
    pub default_venv: Option<VirtualEnvConfig>,
    /// Named environments; each config carries its section name.
    pub venvs: BTreeMap<String, VirtualEnvConfig>,
    /// Parents before children.
    pub groups: Vec<GroupDecl>,
    pub commands: Vec<CommandDecl>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub python: Option<String>,
    pub lock_timeout: Option<Duration>,
    pub creator: Option<VenvCreator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupDecl {
    pub key: String,
    /// Keys from the root group down to this one.
    pub path: Vec<String>,
    pub help: String,
    pub description: Option<String>,
    pub venv: Option<VirtualEnvConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandDecl {
    pub group_path: Vec<String>,
    pub name: String,
    pub cmd: CommandLine,
    pub help: Option<String>,
    pub description: Option<String>,
    pub venv: Option<VirtualEnvConfig>,
    pub timeout: Option<Duration>,
    pub no_output_timeout: Option<Duration>,
    pub interactive: bool,
    pub check: bool,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}
