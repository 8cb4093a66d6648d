// src/exec/request.rs

//! Inputs and outputs of a single subprocess invocation.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{Result, ToolsError};

/// Everything needed to run one external program.
///
/// Built per call with the builder-style setters and consumed by
/// [`crate::exec::run`]. Defaults: `check = true`, streamed output,
/// non-interactive, no timeouts, inherited cwd and environment.
#[derive(Debug, Clone)]
pub struct ExecRequest {
    argv: Vec<OsString>,
    check: bool,
    timeout: Option<Duration>,
    no_output_timeout: Option<Duration>,
    capture: bool,
    interactive: bool,
    env: BTreeMap<String, String>,
    cwd: Option<PathBuf>,
}

impl ExecRequest {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            argv: vec![program.as_ref().to_os_string()],
            check: true,
            timeout: None,
            no_output_timeout: None,
            capture: false,
            interactive: false,
            env: BTreeMap::new(),
            cwd: None,
        }
    }

    /// Build a request from a full argv (program first).
    pub fn from_argv<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut argv = argv.into_iter();
        let program = argv.next().map(|p| p.as_ref().to_os_string()).unwrap_or_default();
        Self::new(program).args(argv)
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.argv.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.argv
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn check(mut self, check: bool) -> Self {
        self.check = check;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_secs(self, secs: u64) -> Self {
        self.timeout(Duration::from_secs(secs))
    }

    pub fn no_output_timeout(mut self, timeout: Duration) -> Self {
        self.no_output_timeout = Some(timeout);
        self
    }

    pub fn no_output_timeout_secs(self, secs: u64) -> Self {
        self.no_output_timeout(Duration::from_secs(secs))
    }

    pub fn capture(mut self, capture: bool) -> Self {
        self.capture = capture;
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Fill in timeouts that the caller left unset.
    pub fn with_default_timeouts(
        mut self,
        timeout: Option<Duration>,
        no_output_timeout: Option<Duration>,
    ) -> Self {
        if self.timeout.is_none() {
            self.timeout = timeout;
        }
        if self.no_output_timeout.is_none() {
            self.no_output_timeout = no_output_timeout;
        }
        self
    }

    /// Fill in the working directory if the caller left it unset.
    pub fn with_default_cwd(mut self, cwd: &Path) -> Self {
        if self.cwd.is_none() {
            self.cwd = Some(cwd.to_path_buf());
        }
        self
    }

    /// Replace the whole environment overlay.
    pub(crate) fn set_env_overlay(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    pub fn program(&self) -> &OsStr {
        self.argv.first().map(OsString::as_os_str).unwrap_or_default()
    }

    pub fn is_check(&self) -> bool {
        self.check
    }

    pub fn timeout_limit(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn no_output_timeout_limit(&self) -> Option<Duration> {
        self.no_output_timeout
    }

    pub fn is_capture(&self) -> bool {
        self.capture
    }

    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    pub fn env_overlay(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Human readable command line, used in logs and error messages.
    pub fn display_argv(&self) -> String {
        display_argv(&self.argv)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.program().is_empty() {
            return Err(ToolsError::Config(
                "cannot run an empty command line".to_string(),
            ));
        }
        for (label, limit) in [
            ("timeout", self.timeout),
            ("no-output timeout", self.no_output_timeout),
        ] {
            if let Some(limit) = limit {
                if limit < Duration::from_secs(1) {
                    return Err(ToolsError::Config(format!(
                        "{label} must be at least 1 second (got {limit:?})"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Result of one finished subprocess.
///
/// `stdout`/`stderr` are only populated when the request captured output.
/// On Unix a child killed by a signal reports the negated signal number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    pub argv: Vec<OsString>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub returncode: i32,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Turn a nonzero return code into [`ToolsError::Process`].
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(ToolsError::Process {
                argv: display_argv(&self.argv),
                code: self.returncode,
            })
        }
    }
}

fn display_argv(argv: &[OsString]) -> String {
    argv.iter()
        .map(|a| a.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_only_fill_gaps() {
        let req = ExecRequest::new("true")
            .timeout_secs(5)
            .with_default_timeouts(Some(Duration::from_secs(60)), Some(Duration::from_secs(7)));
        assert_eq!(req.timeout_limit(), Some(Duration::from_secs(5)));
        assert_eq!(req.no_output_timeout_limit(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn sub_second_timeouts_are_rejected() {
        let req = ExecRequest::new("true").timeout(Duration::from_millis(200));
        assert!(matches!(req.validate(), Err(ToolsError::Config(_))));
        assert!(ExecRequest::from_argv(Vec::<String>::new()).validate().is_err());
    }

    #[test]
    fn check_reports_argv_and_code() {
        let out = ExecOutput {
            argv: vec!["sh".into(), "-c".into(), "exit 4".into()],
            stdout: Vec::new(),
            stderr: Vec::new(),
            returncode: 4,
        };
        match out.check() {
            Err(ToolsError::Process { argv, code }) => {
                assert_eq!(argv, "sh -c exit 4");
                assert_eq!(code, 4);
            }
            other => panic!("expected process error, got {other:?}"),
        }
    }
}
