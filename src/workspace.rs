// src/workspace.rs

//! Process-wide provisioning context, constructed once and passed around
//! explicitly.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::errors::Result;
use crate::types::VenvCreator;
use crate::venv::fingerprint::Fingerprinter;
use crate::venv::interpreter::Interpreter;
use crate::venv::paths::{ToolsPaths, base_from_env};
use crate::venv::site_packages::SearchPath;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(300);

/// Shared handle: cloning is cheap and every clone sees the same
/// interpreter, search path and settings.
#[derive(Debug, Clone)]
pub struct Workspace {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    repo_root: PathBuf,
    base_path: PathBuf,
    python: Option<String>,
    interpreter: OnceLock<Interpreter>,
    fingerprinter: Fingerprinter,
    search_path: SearchPath,
    lock_timeout: Duration,
    creator: VenvCreator,
}

impl Workspace {
    pub fn builder(repo_root: impl Into<PathBuf>) -> WorkspaceBuilder {
        WorkspaceBuilder::new(repo_root.into())
    }

    pub fn repo_root(&self) -> &Path {
        &self.inner.repo_root
    }

    pub fn base_path(&self) -> &Path {
        &self.inner.base_path
    }

    /// The base interpreter, discovered on first use.
    pub fn interpreter(&self) -> Result<&Interpreter> {
        if let Some(found) = self.inner.interpreter.get() {
            return Ok(found);
        }
        let found = Interpreter::discover(self.inner.python.as_deref())?;
        Ok(self.inner.interpreter.get_or_init(|| found))
    }

    pub fn paths(&self) -> Result<ToolsPaths> {
        let version = self.interpreter()?.version;
        Ok(ToolsPaths::new(&self.inner.base_path, version))
    }

    pub fn fingerprinter(&self) -> &Fingerprinter {
        &self.inner.fingerprinter
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.inner.search_path
    }

    pub fn lock_timeout(&self) -> Duration {
        self.inner.lock_timeout
    }

    pub fn creator(&self) -> VenvCreator {
        self.inner.creator
    }
}

#[derive(Debug)]
pub struct WorkspaceBuilder {
    repo_root: PathBuf,
    base_path: Option<PathBuf>,
    python: Option<String>,
    interpreter: Option<Interpreter>,
    fingerprinter: Option<Fingerprinter>,
    lock_timeout: Duration,
    creator: VenvCreator,
}

impl WorkspaceBuilder {
    fn new(repo_root: PathBuf) -> Self {
        Self {
            repo_root,
            base_path: None,
            python: None,
            interpreter: None,
            fingerprinter: None,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            creator: VenvCreator::default(),
        }
    }

    /// Directory that receives `.tools-venvs` (default: `TOOLS_SCRIPTS_PATH`
    /// or the repository root).
    pub fn base_path(mut self, base: impl Into<PathBuf>) -> Self {
        self.base_path = Some(base.into());
        self
    }

    /// Interpreter name or path to discover lazily.
    pub fn python(mut self, python: impl Into<String>) -> Self {
        self.python = Some(python.into());
        self
    }

    /// Use an already known interpreter instead of discovering one.
    pub fn interpreter(mut self, interpreter: Interpreter) -> Self {
        self.interpreter = Some(interpreter);
        self
    }

    pub fn fingerprinter(mut self, fingerprinter: Fingerprinter) -> Self {
        self.fingerprinter = Some(fingerprinter);
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn creator(mut self, creator: VenvCreator) -> Self {
        self.creator = creator;
        self
    }

    pub fn build(self) -> Workspace {
        let base_path = self
            .base_path
            .unwrap_or_else(|| base_from_env(&self.repo_root));
        let interpreter = OnceLock::new();
        if let Some(known) = self.interpreter {
            let _ = interpreter.set(known);
        }
        Workspace {
            inner: Arc::new(Inner {
                repo_root: self.repo_root,
                base_path,
                python: self.python,
                interpreter,
                fingerprinter: self.fingerprinter.unwrap_or_else(Fingerprinter::from_env),
                search_path: SearchPath::new(),
                lock_timeout: self.lock_timeout,
                creator: self.creator,
            }),
        }
    }
}
