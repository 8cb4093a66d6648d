// src/venv/provisioner.rs

//! Create, cache and use named virtual environments.

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use super::backend::PackageInstaller;
use super::config::VirtualEnvConfig;
use super::lock::EnvLock;
use super::paths::{EnvLayout, is_reserved_name};
use crate::errors::{Result, ToolsError};
use crate::exec::{self, ExecOutput, ExecRequest};
use crate::types::VenvCreator;
use crate::workspace::Workspace;

const SITE_PACKAGES_PROBE: &str = "import json,site; print(json.dumps(site.getsitepackages()))";

/// A named environment under the workspace's `.tools-venvs` directory.
///
/// Nothing touches the disk until [`VirtualEnv::ensure_ready`] (or
/// [`VirtualEnv::enter`]) is called.
#[derive(Debug, Clone)]
pub struct VirtualEnv {
    name: String,
    config: VirtualEnvConfig,
    workspace: Workspace,
    layout: EnvLayout,
    lock_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PackageInfo {
    name: String,
    version: String,
}

impl VirtualEnv {
    pub fn new(config: &VirtualEnvConfig, workspace: &Workspace) -> Result<Self> {
        let name = config.name_or_default().to_string();
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(ToolsError::Config(format!(
                "invalid virtualenv name '{name}'"
            )));
        }
        if is_reserved_name(&name) {
            return Err(ToolsError::Config(format!(
                "virtualenv name '{name}' is reserved for lock files"
            )));
        }
        let paths = workspace.paths()?;
        Ok(Self {
            layout: EnvLayout::new(paths.venv_dir(&name)),
            lock_path: paths.lock_path(&name),
            name,
            config: config.clone(),
            workspace: workspace.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &VirtualEnvConfig {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.layout.dir
    }

    pub fn python(&self) -> &Path {
        &self.layout.python
    }

    pub fn bin_dir(&self) -> &Path {
        &self.layout.bin_dir
    }

    /// Make sure the environment exists and its requirements match the
    /// declared dependencies.
    ///
    /// The fingerprint is computed before anything on disk is touched, so a
    /// missing requirements file fails without side effects.
    pub fn ensure_ready(&self) -> Result<()> {
        let fingerprint = self
            .workspace
            .fingerprinter()
            .fingerprint(&self.config.dependencies, self.workspace.repo_root())?;

        let timeout = self
            .config
            .lock_timeout
            .unwrap_or_else(|| self.workspace.lock_timeout());
        let _lock = EnvLock::acquire(&self.lock_path, &self.name, timeout)?;

        self.create()?;
        match self.install_requirements(&fingerprint) {
            Ok(()) => Ok(()),
            Err(err) if err.is_missing_file() => {
                warn!(
                    venv = %self.name,
                    error = %err,
                    "virtualenv is missing files, recreating it"
                );
                fs::remove_dir_all(&self.layout.dir)?;
                self.create()?;
                self.install_requirements(&fingerprint)
            }
            Err(err) => Err(err),
        }
    }

    /// Provision and activate: opted-in site-packages are added to the
    /// workspace search path until the returned guard is dropped.
    pub fn enter(&self) -> Result<ActiveVirtualEnv> {
        self.ensure_ready()?;
        let added = if self.config.add_as_extra_site_packages {
            let dirs = self.site_packages()?;
            let added = self.workspace.search_path().append_unique(dirs);
            debug!(venv = %self.name, ?added, "added extra site packages");
            added
        } else {
            Vec::new()
        };
        Ok(ActiveVirtualEnv {
            venv: self.clone(),
            added,
        })
    }

    /// Run a command with this environment's executables first on `PATH`.
    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let mut env = self.config.env.clone();
        env.extend(
            request
                .env_overlay()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );

        let inherited = env.get("PATH").cloned().or_else(|| std::env::var("PATH").ok());
        let mut entries = vec![self.layout.bin_dir.clone()];
        if let Some(existing) = inherited {
            entries.extend(std::env::split_paths(&existing));
        }
        let path = std::env::join_paths(entries)
            .map_err(|e| ToolsError::Config(format!("cannot build PATH: {e}")))?;
        env.insert("PATH".to_string(), path.to_string_lossy().into_owned());

        exec::run(
            request
                .set_env_overlay(env)
                .with_default_cwd(self.workspace.repo_root()),
        )
    }

    /// `pip install <args>` inside the environment.
    pub fn install<I, S>(&self, args: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run(self.pip_request().arg("install").args(args))
    }

    /// `pip uninstall -y <args>` inside the environment.
    pub fn uninstall<I, S>(&self, args: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run(self.pip_request().args(["uninstall", "-y"]).args(args))
    }

    /// Request running a (dedented) code snippet with `-c`.
    ///
    /// `python` defaults to the environment's interpreter.
    pub fn code_request(&self, code: &str, python: Option<&Path>) -> ExecRequest {
        let code = dedent(code);
        debug!("Code to run passed to python:\n>>>>>>>>>>\n{code}\n<<<<<<<<<<");
        ExecRequest::new(python.unwrap_or(self.layout.python.as_path()))
            .arg("-c")
            .arg(code)
    }

    pub fn run_code(&self, code: &str, python: Option<&Path>) -> Result<ExecOutput> {
        self.run(self.code_request(code, python))
    }

    /// Installed distributions as `name -> version`.
    pub fn installed_packages(&self) -> Result<BTreeMap<String, String>> {
        let output = self.run(
            self.pip_request()
                .args(["list", "--format", "json"])
                .capture(true),
        )?;
        let packages: Vec<PackageInfo> = serde_json::from_slice(output.stdout.trim_ascii())
            .map_err(|e| {
                ToolsError::Other(anyhow::Error::from(e).context(format!(
                    "parsing `pip list` output of virtualenv({})",
                    self.name
                )))
            })?;
        Ok(packages.into_iter().map(|p| (p.name, p.version)).collect())
    }

    /// Site-packages directories reported by the environment's interpreter.
    pub fn site_packages(&self) -> Result<Vec<PathBuf>> {
        let output = self.run(
            self.code_request(SITE_PACKAGES_PROBE, None)
                .capture(true)
                .check(false),
        )?;
        if !output.success() {
            return Err(ToolsError::SitePackages {
                name: self.name.clone(),
                message: output.stderr_lossy().trim().to_string(),
            });
        }
        serde_json::from_slice(output.stdout.trim_ascii()).map_err(|e| ToolsError::SitePackages {
            name: self.name.clone(),
            message: e.to_string(),
        })
    }

    fn pip_request(&self) -> ExecRequest {
        ExecRequest::new(&self.layout.python).args(["-m", "pip"])
    }

    fn create(&self) -> Result<()> {
        if self.layout.dir.exists() {
            if !self.layout.is_corrupted() {
                debug!(venv = %self.name, "Virtual environment path already exists");
                return Ok(());
            }
            warn!(
                "The virtual environment path '{}' exists but the python binary '{}' does not. \
                 Deleting the virtual environment.",
                self.relative(&self.layout.dir).display(),
                self.relative(&self.layout.python).display(),
            );
            fs::remove_dir_all(&self.layout.dir)?;
        }

        self.create_fresh().map_err(|source| ToolsError::VenvCreation {
            name: self.name.clone(),
            source: Box::new(source),
        })
    }

    fn create_fresh(&self) -> Result<()> {
        let base = self.workspace.interpreter()?;
        let creator = self.config.creator.unwrap_or_else(|| self.workspace.creator());
        let virtualenv = match creator {
            VenvCreator::Venv => None,
            VenvCreator::Auto => which::which("virtualenv").ok(),
            VenvCreator::Virtualenv => Some(which::which("virtualenv").map_err(|_| {
                ToolsError::MissingTool {
                    tool: "virtualenv".to_string(),
                    hint: "Install virtualenv or set `creator = \"venv\"`.".to_string(),
                }
            })?),
        };

        let mut request = match virtualenv {
            Some(binary) => {
                ExecRequest::new(binary).arg(format!("--python={}", base.path.display()))
            }
            None => ExecRequest::new(&base.path).args(["-m", "venv"]),
        };
        if self.config.system_site_packages {
            request = request.arg("--system-site-packages");
        }

        let parent = self
            .layout
            .dir
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workspace.repo_root().to_path_buf());
        fs::create_dir_all(&parent)?;

        info!(
            "Creating virtualenv({}) in {}",
            self.name,
            self.relative(&self.layout.dir).display()
        );
        self.run(request.arg(&self.layout.dir).cwd(parent))?;
        self.install([
            "-U",
            "wheel",
            self.config.pip_requirement.as_str(),
            self.config.setuptools_requirement.as_str(),
        ])?;
        Ok(())
    }

    fn install_requirements(&self, fingerprint: &str) -> Result<()> {
        if self.layout.read_hash().as_deref() == Some(fingerprint) {
            debug!("Requirements for virtualenv({}) haven't changed.", self.name);
            return Ok(());
        }
        let label = format!("virtualenv({})", self.name);
        self.config
            .dependencies
            .install(self, self.workspace.repo_root(), &label)?;
        fs::write(&self.layout.hash_file, fingerprint)?;
        debug!(
            hash_file = %self.layout.hash_file.display(),
            hash = fingerprint,
            "persisted requirements fingerprint"
        );
        Ok(())
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(self.workspace.repo_root()).unwrap_or(path)
    }
}

impl PackageInstaller for VirtualEnv {
    fn python(&self) -> &Path {
        &self.layout.python
    }

    fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        VirtualEnv::run(self, request)
    }
}

/// An entered environment. Dropping it removes the site-packages entries it
/// added to the search path.
#[derive(Debug)]
pub struct ActiveVirtualEnv {
    venv: VirtualEnv,
    added: Vec<PathBuf>,
}

impl ActiveVirtualEnv {
    pub fn added_site_packages(&self) -> &[PathBuf] {
        &self.added
    }
}

impl Deref for ActiveVirtualEnv {
    type Target = VirtualEnv;

    fn deref(&self) -> &VirtualEnv {
        &self.venv
    }
}

impl Drop for ActiveVirtualEnv {
    fn drop(&mut self) {
        if !self.added.is_empty() {
            self.venv.workspace.search_path().remove(&self.added);
        }
    }
}

/// Strip one leading newline, the common indentation and trailing
/// whitespace.
pub fn dedent(code: &str) -> String {
    let code = code.strip_prefix('\n').unwrap_or(code);
    let indent = code
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    code.lines()
        .map(|l| l.get(indent..).unwrap_or_else(|| l.trim_start()))
        .collect::<Vec<_>>()
        .join("\n")
        .trim_end()
        .to_string()
}
