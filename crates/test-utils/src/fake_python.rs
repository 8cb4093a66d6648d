//! A shell script that behaves just enough like `python` for provisioning
//! tests, recording every invocation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

/// Fake interpreter written to `<dir>/bin/python3`.
///
/// - `-m venv [...] DIR` copies the script to `DIR/bin/python`.
/// - `-m pip list ...` prints a fixed JSON package list.
/// - `-m pip ...` sleeps for the configured delay, then succeeds (or fails).
/// - `-m pip install -U ...` (the bootstrap step) deletes the environment's
///   interpreter while vanishing rounds are left, so the next spawn of it
///   fails with `NotFound`.
/// - `-c CODE` prints `3.11` for a version probe, otherwise a JSON list with
///   one site-packages directory next to the interpreter.
///
/// Copies share the invocation log, so calls made through a provisioned
/// environment are recorded too.
#[derive(Debug, Clone)]
pub struct FakePython {
    path: PathBuf,
    log: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct FakePythonBuilder {
    pip_delay: Option<Duration>,
    pip_exit_code: i32,
    vanish_rounds: u32,
}

impl FakePythonBuilder {
    pub fn pip_delay(mut self, delay: Duration) -> Self {
        self.pip_delay = Some(delay);
        self
    }

    pub fn pip_exit_code(mut self, code: i32) -> Self {
        self.pip_exit_code = code;
        self
    }

    /// Make the provisioned interpreter disappear after the first `rounds`
    /// bootstrap installs.
    pub fn vanish_after_bootstrap(mut self, rounds: u32) -> Self {
        self.vanish_rounds = rounds;
        self
    }

    pub fn write(self, dir: &Path) -> Result<FakePython> {
        let bin = dir.join("bin");
        fs::create_dir_all(&bin).with_context(|| format!("creating {}", bin.display()))?;
        let path = bin.join("python3");
        let log = dir.join("python-invocations.log");
        fs::write(&log, "")?;
        let vanish = dir.join("vanish-rounds");
        fs::write(&vanish, self.vanish_rounds.to_string())?;

        let delay = self
            .pip_delay
            .map(|d| format!("sleep {}", d.as_secs_f64()))
            .unwrap_or_else(|| ":".to_string());
        let script = SCRIPT
            .replace("@LOG@", &log.display().to_string())
            .replace("@PIP_DELAY@", &delay)
            .replace("@PIP_EXIT@", &self.pip_exit_code.to_string())
            .replace("@VANISH@", &vanish.display().to_string());
        fs::write(&path, script)?;
        make_executable(&path)?;

        Ok(FakePython { path, log })
    }
}

const SCRIPT: &str = r#"#!/bin/sh
echo "$0 $*" >> "@LOG@"
case "$1" in
  -m)
    case "$2" in
      venv)
        for target; do :; done
        mkdir -p "$target/bin"
        cp "$0" "$target/bin/python"
        chmod 755 "$target/bin/python"
        exit 0
        ;;
      pip)
        if [ "$3" = "list" ]; then
          echo '[{"name": "pip", "version": "22.3.1"}, {"name": "rich", "version": "13.7.0"}]'
          exit 0
        fi
        if [ "$3" = "install" ] && [ "$4" = "-U" ]; then
          left=$(cat "@VANISH@")
          if [ "$left" -gt 0 ]; then
            echo $((left - 1)) > "@VANISH@"
            rm -f "$0"
          fi
        fi
        @PIP_DELAY@
        exit @PIP_EXIT@
        ;;
    esac
    ;;
  -c)
    case "$2" in
      *version_info*)
        echo "3.11"
        ;;
      *)
        root=$(cd "$(dirname "$0")/.." && pwd)
        echo "[\"$root/lib/site-packages\"]"
        ;;
    esac
    exit 0
    ;;
esac
exit 0
"#;

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

impl FakePython {
    pub fn builder() -> FakePythonBuilder {
        FakePythonBuilder::default()
    }

    pub fn write(dir: &Path) -> Result<Self> {
        Self::builder().write(dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every recorded call as `"<argv0> <args>"`.
    pub fn invocations(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of recorded calls containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.invocations()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        let _ = fs::write(&self.log, "");
    }
}
