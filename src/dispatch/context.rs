// src/dispatch/context.rs

//! The object handed to every command body.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::errors::{Result, ToolsError};
use crate::exec::{self, ExecOutput, ExecRequest};
use crate::venv::{ActiveVirtualEnv, VirtualEnv, VirtualEnvConfig};
use crate::workspace::Workspace;

const PYTHONPATH: &str = "PYTHONPATH";

/// Timeouts applied to every [`Context::run`] that does not set its own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunDefaults {
    pub timeout: Option<Duration>,
    pub no_output_timeout: Option<Duration>,
}

/// Runner and provisioner access for command bodies.
///
/// Calls go through the active environment when there is one, so a command
/// registered with a virtualenv sees that environment's executables first on
/// `PATH`.
#[derive(Debug)]
pub struct Context {
    workspace: Workspace,
    defaults: RunDefaults,
    venv: Option<VirtualEnv>,
}

impl Context {
    pub fn new(workspace: Workspace, defaults: RunDefaults) -> Self {
        Self {
            workspace,
            defaults,
            venv: None,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn defaults(&self) -> RunDefaults {
        self.defaults
    }

    pub(crate) fn set_defaults(&mut self, defaults: RunDefaults) {
        self.defaults = defaults;
    }

    pub(crate) fn set_active(&mut self, venv: Option<VirtualEnv>) -> Option<VirtualEnv> {
        std::mem::replace(&mut self.venv, venv)
    }

    /// The environment commands currently run in, if any.
    pub fn active_virtualenv(&self) -> Option<&VirtualEnv> {
        self.venv.as_ref()
    }

    pub fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
        let mut request = request
            .with_default_timeouts(self.defaults.timeout, self.defaults.no_output_timeout)
            .with_default_cwd(self.workspace.repo_root());

        let search_path = self.workspace.search_path();
        if !search_path.is_empty() {
            let existing = request
                .env_overlay()
                .get(PYTHONPATH)
                .or_else(|| {
                    self.venv
                        .as_ref()
                        .and_then(|venv| venv.config().env.get(PYTHONPATH))
                })
                .map(OsString::from)
                .or_else(|| std::env::var_os(PYTHONPATH));
            if let Some(value) = search_path.pythonpath(existing) {
                request = request.env(PYTHONPATH, value.to_string_lossy());
            }
        }

        debug!("Running '{}'", request.display_argv());
        match &self.venv {
            Some(venv) => venv.run(request),
            None => exec::run(request),
        }
    }

    /// Shorthand for [`Context::run`] with a plain argv and default options.
    pub fn run_cmd<I, S>(&self, argv: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run(ExecRequest::from_argv(argv))
    }

    /// Provision and enter an environment. Unnamed configs are called
    /// `default`.
    pub fn virtualenv(&self, config: &VirtualEnvConfig) -> Result<ActiveVirtualEnv> {
        VirtualEnv::new(config, &self.workspace)?.enter()
    }

    /// Run `f` with `config`'s environment active, restoring the previous one
    /// afterwards.
    pub fn with_virtualenv<T, F>(&mut self, config: &VirtualEnvConfig, f: F) -> Result<T>
    where
        F: FnOnce(&mut Context) -> Result<T>,
    {
        let active = self.virtualenv(config)?;
        let previous = self.set_active(Some((*active).clone()));
        let result = f(self);
        self.venv = previous;
        drop(active);
        result
    }

    /// Change the process working directory until the guard is dropped.
    pub fn chdir(&self, path: impl AsRef<Path>) -> Result<ChdirGuard> {
        let previous = std::env::current_dir()?;
        let target = self.workspace.repo_root().join(path.as_ref());
        std::env::set_current_dir(&target)?;
        debug!(cwd = %target.display(), "changed working directory");
        Ok(ChdirGuard { previous })
    }

    /// Write a line to stdout, bypassing the log filters.
    pub fn print(&self, msg: impl AsRef<str>) {
        println!("{}", msg.as_ref());
    }

    pub fn debug(&self, msg: impl AsRef<str>) {
        debug!(target: "tools", "{}", msg.as_ref());
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        info!(target: "tools", "{}", msg.as_ref());
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        warn!(target: "tools", "{}", msg.as_ref());
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        error!(target: "tools", "{}", msg.as_ref());
    }

    /// Error that ends the program with `code`, printing `msg` if given.
    ///
    /// Return it from a command body: `return Err(ctx.exit(2, Some("bad input")))`.
    pub fn exit(&self, code: i32, msg: Option<&str>) -> ToolsError {
        ToolsError::Exit {
            code,
            message: msg.map(str::to_string),
        }
    }
}

/// Restores the previous working directory on drop.
#[derive(Debug)]
#[must_use = "the directory is restored as soon as the guard is dropped"]
pub struct ChdirGuard {
    previous: PathBuf,
}

impl Drop for ChdirGuard {
    fn drop(&mut self) {
        if let Err(err) = std::env::set_current_dir(&self.previous) {
            warn!(
                cwd = %self.previous.display(),
                error = %err,
                "failed to restore working directory"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venv::interpreter::{Interpreter, PythonVersion};

    fn context(root: &Path) -> Context {
        let workspace = Workspace::builder(root)
            .interpreter(Interpreter {
                path: PathBuf::from("python3"),
                version: PythonVersion::new(3, 11),
            })
            .build();
        Context::new(workspace, RunDefaults::default())
    }

    #[test]
    fn exit_carries_code_and_message() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        match ctx.exit(3, Some("boom")) {
            ToolsError::Exit { code, message } => {
                assert_eq!(code, 3);
                assert_eq!(message.as_deref(), Some("boom"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(ctx.exit(4, None).exit_code(), 4);
    }

    #[cfg(unix)]
    #[test]
    #[serial_test::serial]
    fn run_uses_repo_root_and_exports_search_path() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path());
        ctx.workspace()
            .search_path()
            .append_unique(vec![PathBuf::from("/extra/site")]);

        let out = ctx
            .run(
                ExecRequest::new("sh")
                    .args(["-c", "pwd; echo \"$PYTHONPATH\""])
                    .env(PYTHONPATH, "/first")
                    .capture(true),
            )
            .unwrap();
        let stdout = out.stdout_lossy();
        let mut lines = stdout.lines();
        let cwd = PathBuf::from(lines.next().unwrap());
        assert_eq!(cwd.canonicalize().unwrap(), dir.path().canonicalize().unwrap());
        assert_eq!(lines.next(), Some("/first:/extra/site"));
    }
}
