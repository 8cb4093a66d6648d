// src/venv/paths.rs

//! On-disk layout of provisioned environments.
//!
//! ```text
//! <base>/.tools-venvs/py<major>.<minor>/
//!     .default-config.hash
//!     locks/<name>.lock
//!     <name>/bin/python
//!     <name>/.requirements.hash
//! ```

use std::path::{Path, PathBuf};

use super::interpreter::PythonVersion;

/// Overrides the directory under which `.tools-venvs` is created.
pub const SCRIPTS_PATH_ENV: &str = "TOOLS_SCRIPTS_PATH";

const VENVS_DIR: &str = ".tools-venvs";
const LOCKS_DIR: &str = "locks";
const DEFAULT_CONFIG_HASH: &str = ".default-config.hash";
const REQUIREMENTS_HASH: &str = ".requirements.hash";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsPaths {
    venvs_root: PathBuf,
}

impl ToolsPaths {
    pub fn new(base: &Path, version: PythonVersion) -> Self {
        Self {
            venvs_root: base
                .join(VENVS_DIR)
                .join(format!("py{}.{}", version.major, version.minor)),
        }
    }

    pub fn venvs_root(&self) -> &Path {
        &self.venvs_root
    }

    pub fn venv_dir(&self, name: &str) -> PathBuf {
        self.venvs_root.join(name)
    }

    pub fn lock_path(&self, name: &str) -> PathBuf {
        self.venvs_root.join(LOCKS_DIR).join(format!("{name}.lock"))
    }

    pub fn default_config_hash_file(&self) -> PathBuf {
        self.venvs_root.join(DEFAULT_CONFIG_HASH)
    }
}

/// Names an environment cannot take because the directory holds lock files.
pub fn is_reserved_name(name: &str) -> bool {
    name.eq_ignore_ascii_case(LOCKS_DIR)
}

/// Base directory for `.tools-venvs`: `TOOLS_SCRIPTS_PATH` when set, the
/// repository root otherwise.
pub fn base_from_env(repo_root: &Path) -> PathBuf {
    match std::env::var(SCRIPTS_PATH_ENV) {
        Ok(value) if !value.trim().is_empty() => {
            let expanded = expand_tilde(value.trim());
            if expanded.is_absolute() {
                expanded
            } else {
                repo_root.join(expanded)
            }
        }
        _ => repo_root.to_path_buf(),
    }
}

fn expand_tilde(value: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (value, home) {
        ("~", Some(home)) => home,
        (v, Some(home)) if v.starts_with("~/") => home.join(&v[2..]),
        (v, _) => PathBuf::from(v),
    }
}

/// Paths inside one environment directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvLayout {
    pub dir: PathBuf,
    pub python: PathBuf,
    pub bin_dir: PathBuf,
    pub hash_file: PathBuf,
}

impl EnvLayout {
    pub fn new(dir: PathBuf) -> Self {
        let bin_dir = if cfg!(windows) {
            dir.join("Scripts")
        } else {
            dir.join("bin")
        };
        let python = if cfg!(windows) {
            bin_dir.join("python.exe")
        } else {
            bin_dir.join("python")
        };
        Self {
            hash_file: dir.join(REQUIREMENTS_HASH),
            dir,
            python,
            bin_dir,
        }
    }

    /// Directory present but interpreter gone.
    pub fn is_corrupted(&self) -> bool {
        self.dir.exists() && !self.python.exists()
    }

    pub fn read_hash(&self) -> Option<String> {
        std::fs::read_to_string(&self.hash_file)
            .ok()
            .map(|s| s.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_directory_name_is_reserved() {
        assert!(is_reserved_name("locks"));
        assert!(is_reserved_name("LOCKS"));
        assert!(!is_reserved_name("locks-ci"));
    }

    #[test]
    fn layout_follows_python_version() {
        let paths = ToolsPaths::new(Path::new("/repo"), PythonVersion::new(3, 11));
        assert_eq!(paths.venv_dir("docs"), Path::new("/repo/.tools-venvs/py3.11/docs"));
        assert_eq!(
            paths.lock_path("docs"),
            Path::new("/repo/.tools-venvs/py3.11/locks/docs.lock")
        );
        assert_eq!(
            paths.default_config_hash_file(),
            Path::new("/repo/.tools-venvs/py3.11/.default-config.hash")
        );
    }

    #[cfg(unix)]
    #[test]
    fn env_layout_uses_bin_python() {
        let layout = EnvLayout::new(PathBuf::from("/v/docs"));
        assert_eq!(layout.python, Path::new("/v/docs/bin/python"));
        assert_eq!(layout.hash_file, Path::new("/v/docs/.requirements.hash"));
    }

    #[test]
    fn corrupted_means_dir_without_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        let layout = EnvLayout::new(dir.path().join("docs"));
        assert!(!layout.is_corrupted());
        std::fs::create_dir_all(&layout.dir).unwrap();
        assert!(layout.is_corrupted());
        std::fs::create_dir_all(&layout.bin_dir).unwrap();
        std::fs::write(&layout.python, "").unwrap();
        assert!(!layout.is_corrupted());
    }
}
