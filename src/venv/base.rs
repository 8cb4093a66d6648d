// src/venv/base.rs

//! Requirements installed into the base interpreter itself.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::backend::PackageInstaller;
use super::config::DependencySpec;
use super::lock::EnvLock;
use crate::errors::Result;
use crate::exec::{self, ExecOutput, ExecRequest};
use crate::workspace::Workspace;

const LOCK_NAME: &str = "default-config";

/// The base tools requirements, cached by `.default-config.hash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRequirements {
    spec: DependencySpec,
}

struct BaseInterpreter<'a> {
    python: PathBuf,
    repo_root: &'a Path,
}

impl PackageInstaller for BaseInterpreter<'_> {
    fn python(&self) -> &Path {
        &self.python
    }

    fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        exec::run(request.with_default_cwd(self.repo_root))
    }
}

impl BaseRequirements {
    pub fn new(spec: DependencySpec) -> Self {
        Self { spec }
    }

    pub fn spec(&self) -> &DependencySpec {
        &self.spec
    }

    /// Install unless the persisted hash already matches. Returns whether an
    /// install happened.
    pub fn install(&self, workspace: &Workspace) -> Result<bool> {
        let fingerprint = workspace
            .fingerprinter()
            .fingerprint(&self.spec, workspace.repo_root())?;
        let paths = workspace.paths()?;
        let hash_file = paths.default_config_hash_file();

        let _lock = EnvLock::acquire(
            &paths.lock_path(LOCK_NAME),
            LOCK_NAME,
            workspace.lock_timeout(),
        )?;

        let current = fs::read_to_string(&hash_file).ok();
        if current.as_deref().map(str::trim) == Some(fingerprint.as_str()) {
            debug!(
                "Base tools requirements haven't changed. Hash file: '{}'; Hash: '{}'",
                hash_file.display(),
                fingerprint
            );
            return Ok(false);
        }

        let installer = BaseInterpreter {
            python: workspace.interpreter()?.path.clone(),
            repo_root: workspace.repo_root(),
        };
        self.spec
            .install(&installer, workspace.repo_root(), "the base tools")?;

        if let Some(parent) = hash_file.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&hash_file, &fingerprint)?;
        debug!("Wrote '{}' with contents: '{}'", hash_file.display(), fingerprint);
        Ok(true)
    }
}
