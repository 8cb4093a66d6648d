// src/venv/config.rs

//! Declarative configuration of a virtual environment and its dependencies.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{Result, ToolsError};
use crate::types::VenvCreator;

pub const DEFAULT_PIP_REQUIREMENT: &str = "pip>=22.3.1,<23.0";
pub const DEFAULT_SETUPTOOLS_REQUIREMENT: &str = "setuptools>=65.6.3,<66";
pub const DEFAULT_POETRY_LOCKFILE: &str = "poetry.lock";

/// Requirements installed directly with pip.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipRequirements {
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub requirements_files: Vec<PathBuf>,
    #[serde(default)]
    pub install_args: Vec<String>,
}

impl PipRequirements {
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty() && self.requirements_files.is_empty()
    }
}

/// Requirements exported from a poetry project and installed with pip.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoetryExport {
    #[serde(default = "default_true")]
    pub no_root: bool,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub export_args: Vec<String>,
    #[serde(default)]
    pub install_args: Vec<String>,
    #[serde(default = "default_lockfile")]
    pub lockfile: PathBuf,
}

impl Default for PoetryExport {
    fn default() -> Self {
        Self {
            no_root: true,
            groups: Vec::new(),
            export_args: Vec::new(),
            install_args: Vec::new(),
            lockfile: default_lockfile(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lockfile() -> PathBuf {
    PathBuf::from(DEFAULT_POETRY_LOCKFILE)
}

/// Which installer backend provides an environment's dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencySpec {
    Pip(PipRequirements),
    Poetry(PoetryExport),
}

impl Default for DependencySpec {
    fn default() -> Self {
        DependencySpec::Pip(PipRequirements::default())
    }
}

impl DependencySpec {
    pub fn builder() -> DependencySpecBuilder {
        DependencySpecBuilder::default()
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            DependencySpec::Pip(_) => "pip",
            DependencySpec::Poetry(_) => "poetry",
        }
    }
}

/// Builder that refuses to mix the pip and poetry backends.
#[derive(Debug, Default)]
pub struct DependencySpecBuilder {
    pip: Option<PipRequirements>,
    poetry: Option<PoetryExport>,
}

impl DependencySpecBuilder {
    pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
        self.pip
            .get_or_insert_with(Default::default)
            .requirements
            .push(requirement.into());
        self
    }

    pub fn requirements_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.pip
            .get_or_insert_with(Default::default)
            .requirements_files
            .push(path.into());
        self
    }

    pub fn pip_install_arg(mut self, arg: impl Into<String>) -> Self {
        self.pip
            .get_or_insert_with(Default::default)
            .install_args
            .push(arg.into());
        self
    }

    pub fn pip(mut self, pip: PipRequirements) -> Self {
        self.pip = Some(pip);
        self
    }

    pub fn poetry(mut self, poetry: PoetryExport) -> Self {
        self.poetry = Some(poetry);
        self
    }

    pub fn build(self) -> Result<DependencySpec> {
        match (self.pip, self.poetry) {
            (Some(_), Some(_)) => Err(ToolsError::Config(
                "an environment can declare pip requirements or a poetry export, not both"
                    .to_string(),
            )),
            (_, Some(poetry)) => Ok(DependencySpec::Poetry(poetry)),
            (pip, None) => Ok(DependencySpec::Pip(pip.unwrap_or_default())),
        }
    }
}

/// Everything needed to provision one named virtual environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualEnvConfig {
    pub name: Option<String>,
    pub dependencies: DependencySpec,
    pub env: BTreeMap<String, String>,
    pub system_site_packages: bool,
    pub pip_requirement: String,
    pub setuptools_requirement: String,
    pub add_as_extra_site_packages: bool,
    pub creator: Option<VenvCreator>,
    pub lock_timeout: Option<Duration>,
}

impl Default for VirtualEnvConfig {
    fn default() -> Self {
        Self {
            name: None,
            dependencies: DependencySpec::default(),
            env: BTreeMap::new(),
            system_site_packages: false,
            pip_requirement: DEFAULT_PIP_REQUIREMENT.to_string(),
            setuptools_requirement: DEFAULT_SETUPTOOLS_REQUIREMENT.to_string(),
            add_as_extra_site_packages: false,
            creator: None,
            lock_timeout: None,
        }
    }
}

impl VirtualEnvConfig {
    pub fn builder() -> VirtualEnvConfigBuilder {
        VirtualEnvConfigBuilder::default()
    }

    /// A copy of `self` named `name` unless it already has a name.
    pub fn with_default_name(&self, name: &str) -> Self {
        let mut config = self.clone();
        if config.name.is_none() {
            config.name = Some(name.to_string());
        }
        config
    }

    pub fn name_or_default(&self) -> &str {
        self.name.as_deref().unwrap_or("default")
    }
}

#[derive(Debug, Default)]
pub struct VirtualEnvConfigBuilder {
    config: VirtualEnvConfig,
    deps: DependencySpecBuilder,
    explicit_deps: Option<DependencySpec>,
}

impl VirtualEnvConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    pub fn requirement(mut self, requirement: impl Into<String>) -> Self {
        self.deps = self.deps.requirement(requirement);
        self
    }

    pub fn requirements_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.deps = self.deps.requirements_file(path);
        self
    }

    pub fn pip_install_arg(mut self, arg: impl Into<String>) -> Self {
        self.deps = self.deps.pip_install_arg(arg);
        self
    }

    pub fn poetry(mut self, poetry: PoetryExport) -> Self {
        self.deps = self.deps.poetry(poetry);
        self
    }

    pub fn dependencies(mut self, spec: DependencySpec) -> Self {
        self.explicit_deps = Some(spec);
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    pub fn system_site_packages(mut self, yes: bool) -> Self {
        self.config.system_site_packages = yes;
        self
    }

    pub fn pip_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.config.pip_requirement = requirement.into();
        self
    }

    pub fn setuptools_requirement(mut self, requirement: impl Into<String>) -> Self {
        self.config.setuptools_requirement = requirement.into();
        self
    }

    pub fn add_as_extra_site_packages(mut self, yes: bool) -> Self {
        self.config.add_as_extra_site_packages = yes;
        self
    }

    pub fn creator(mut self, creator: VenvCreator) -> Self {
        self.config.creator = Some(creator);
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.config.lock_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<VirtualEnvConfig> {
        let mut config = self.config;
        config.dependencies = match self.explicit_deps {
            Some(spec) => {
                if self.deps.pip.is_some() || self.deps.poetry.is_some() {
                    return Err(ToolsError::Config(
                        "dependencies were declared both explicitly and piecemeal".to_string(),
                    ));
                }
                spec
            }
            None => self.deps.build()?,
        };
        if let Some(name) = &config.name {
            if name.trim().is_empty() {
                return Err(ToolsError::Config(
                    "virtualenv name cannot be empty".to_string(),
                ));
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pip_and_poetry_cannot_be_mixed() {
        let err = DependencySpec::builder()
            .requirement("requests")
            .poetry(PoetryExport::default())
            .build()
            .unwrap_err();
        assert!(matches!(err, ToolsError::Config(_)));
    }

    #[test]
    fn empty_builder_is_an_empty_pip_spec() {
        let spec = DependencySpec::builder().build().unwrap();
        assert_eq!(spec, DependencySpec::Pip(PipRequirements::default()));
    }

    #[test]
    fn default_name_does_not_touch_the_original() {
        let config = VirtualEnvConfig::default();
        let named = config.with_default_name("docs");
        assert_eq!(config.name, None);
        assert_eq!(named.name.as_deref(), Some("docs"));

        let already = VirtualEnvConfig::builder().name("ci").build().unwrap();
        assert_eq!(already.with_default_name("docs").name.as_deref(), Some("ci"));
    }

    #[test]
    fn defaults_pin_pip_and_setuptools() {
        let config = VirtualEnvConfig::default();
        assert_eq!(config.pip_requirement, "pip>=22.3.1,<23.0");
        assert_eq!(config.setuptools_requirement, "setuptools>=65.6.3,<66");
        assert!(!config.add_as_extra_site_packages);
    }
}
