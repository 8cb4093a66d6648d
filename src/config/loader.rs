// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawToolsFile, ToolsFile};
use crate::errors::{Result, ToolsError};

pub const CONFIG_ENV: &str = "TOOLS_CONFIG";
pub const CONFIG_FILE_NAME: &str = "tools.toml";

/// Where the tools file lives and which directory counts as the repository
/// root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigLocation {
    pub path: PathBuf,
    pub repo_root: PathBuf,
    /// Named through `TOOLS_CONFIG`; such a file must exist.
    pub explicit: bool,
}

/// Resolve the tools file starting from `cwd`.
///
/// - `TOOLS_CONFIG` wins (relative to `cwd`); its directory is the repo root.
/// - Otherwise the nearest `tools.toml` in `cwd` or an ancestor.
/// - Otherwise `cwd/tools.toml`, which need not exist.
pub fn locate(cwd: &Path) -> ConfigLocation {
    if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        let path = cwd.join(path);
        let repo_root = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());
        return ConfigLocation {
            path,
            repo_root,
            explicit: true,
        };
    }

    let found = cwd
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file());
    match found {
        Some(path) => ConfigLocation {
            repo_root: path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf()),
            path,
            explicit: false,
        },
        None => ConfigLocation {
            path: cwd.join(CONFIG_FILE_NAME),
            repo_root: cwd.to_path_buf(),
            explicit: false,
        },
    }
}

/// Read and deserialize a tools file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawToolsFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    let raw: RawToolsFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Read and validate a tools file.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ToolsFile> {
    let raw = load_from_path(&path)?;
    ToolsFile::try_from(raw)
}

/// Load the located file; a missing implicit file yields an empty config.
pub fn load(location: &ConfigLocation) -> Result<ToolsFile> {
    if !location.path.is_file() {
        if location.explicit {
            return Err(ToolsError::Config(format!(
                "{CONFIG_ENV} points at '{}', which does not exist",
                location.path.display()
            )));
        }
        debug!(path = %location.path.display(), "no tools file, no declared commands");
        return Ok(ToolsFile::default());
    }
    debug!(path = %location.path.display(), "loading tools file");
    load_and_validate(&location.path)
}
