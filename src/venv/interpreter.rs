// src/venv/interpreter.rs

//! Base Python interpreter discovery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::debug;

use crate::errors::{Result, ToolsError};
use crate::exec::{self, ExecRequest};

const VERSION_PROBE: &str = "import sys; print('%d.%d' % sys.version_info[:2])";
const CANDIDATES: &[&str] = &["python3", "python"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
}

impl PythonVersion {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for PythonVersion {
    type Err = ToolsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ToolsError::Config(format!("cannot parse python version from '{s}'"));
        let mut parts = s.trim().split('.');
        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        Ok(Self { major, minor })
    }
}

/// The interpreter environments are created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub path: PathBuf,
    pub version: PythonVersion,
}

impl Interpreter {
    /// Locate `spec` (a name looked up on `PATH`, or a path), or the first of
    /// `python3`/`python` when no spec is given, and ask it for its version.
    pub fn discover(spec: Option<&str>) -> Result<Self> {
        let path = match spec {
            Some(spec) => locate(spec)?,
            None => CANDIDATES
                .iter()
                .find_map(|name| which::which(name).ok())
                .ok_or_else(|| ToolsError::MissingTool {
                    tool: "python3".to_string(),
                    hint: "Install Python 3 or set `python` under [settings] in tools.toml."
                        .to_string(),
                })?,
        };
        Self::probe(&path)
    }

    /// Query the version of the interpreter at `path`.
    pub fn probe(path: &Path) -> Result<Self> {
        let output = exec::run(
            ExecRequest::new(path)
                .arg("-c")
                .arg(VERSION_PROBE)
                .capture(true),
        )?;
        let version = output.stdout_lossy().parse()?;
        debug!(python = %path.display(), %version, "discovered base interpreter");
        Ok(Self {
            path: path.to_path_buf(),
            version,
        })
    }
}

fn locate(spec: &str) -> Result<PathBuf> {
    let candidate = Path::new(spec);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return Ok(candidate.to_path_buf());
    }
    which::which(spec).map_err(|_| ToolsError::MissingTool {
        tool: spec.to_string(),
        hint: "Check the `python` setting in tools.toml.".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn versions_parse_from_probe_output() {
        assert_eq!("3.11\n".parse::<PythonVersion>().unwrap(), PythonVersion::new(3, 11));
        assert!("three".parse::<PythonVersion>().is_err());
        assert_eq!(PythonVersion::new(3, 9).to_string(), "3.9");
    }

    #[test]
    fn paths_are_used_verbatim() {
        assert_eq!(locate("/opt/py/bin/python3").unwrap(), Path::new("/opt/py/bin/python3"));
        assert_eq!(locate("./py").unwrap(), Path::new("./py"));
    }
}
