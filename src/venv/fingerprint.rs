// src/venv/fingerprint.rs

//! Content fingerprint of an environment's declared dependencies.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use blake3::Hasher;
use tracing::debug;

use super::config::{DependencySpec, PipRequirements, PoetryExport};
use crate::errors::{Result, ToolsError};

/// Environment variable mixed into every fingerprint.
pub const CACHE_SEED_ENV: &str = "TOOLS_VIRTUALENV_CACHE_SEED";

/// Separator fed between items so `["ab", "c"]` and `["a", "bc"]` differ.
const SEP: &[u8] = b"\0";

/// Computes fingerprints for one `tools` executable and cache seed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprinter {
    executable: String,
    seed: String,
}

impl Fingerprinter {
    pub fn new(executable: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            seed: seed.into(),
        }
    }

    /// Executable from `argv[0]`, seed from [`CACHE_SEED_ENV`].
    pub fn from_env() -> Self {
        let executable = std::env::args_os()
            .next()
            .map(|a| a.to_string_lossy().into_owned())
            .unwrap_or_default();
        let seed = std::env::var(CACHE_SEED_ENV).unwrap_or_default();
        Self::new(executable, seed)
    }

    pub fn fingerprint(&self, spec: &DependencySpec, project_root: &Path) -> Result<String> {
        let mut hasher = Hasher::new();
        feed(&mut hasher, self.executable.as_bytes());
        if !self.seed.is_empty() {
            feed(&mut hasher, self.seed.as_bytes());
        }
        let backend = match spec {
            DependencySpec::Pip(pip) => pip_digest(pip, project_root)?,
            DependencySpec::Poetry(poetry) => poetry_digest(poetry, project_root)?,
        };
        feed(&mut hasher, backend.as_bytes());

        let hash = hasher.finalize().to_hex().to_string();
        debug!(hash = %hash, backend = spec.backend_name(), "computed dependency fingerprint");
        Ok(hash)
    }
}

fn feed(hasher: &mut Hasher, item: &[u8]) {
    hasher.update(item);
    hasher.update(SEP);
}

fn pip_digest(pip: &PipRequirements, root: &Path) -> Result<blake3::Hash> {
    let mut hasher = Hasher::new();
    feed(&mut hasher, b"pip");
    for arg in &pip.install_args {
        feed(&mut hasher, arg.as_bytes());
    }

    let mut requirements: Vec<&String> = pip.requirements.iter().collect();
    requirements.sort();
    for requirement in requirements {
        feed(&mut hasher, requirement.as_bytes());
    }

    let mut files: Vec<PathBuf> = pip
        .requirements_files
        .iter()
        .map(|p| resolve(root, p))
        .collect();
    files.sort();
    for path in files {
        feed(&mut hasher, compute_file_hash(&path)?.as_bytes());
    }
    Ok(hasher.finalize())
}

fn poetry_digest(poetry: &PoetryExport, root: &Path) -> Result<blake3::Hash> {
    let mut hasher = Hasher::new();
    feed(&mut hasher, b"poetry");
    feed(&mut hasher, if poetry.no_root { b"True" } else { b"False" });
    for arg in &poetry.export_args {
        feed(&mut hasher, arg.as_bytes());
    }
    for arg in &poetry.install_args {
        feed(&mut hasher, arg.as_bytes());
    }
    for group in &poetry.groups {
        feed(&mut hasher, group.as_bytes());
    }
    let lockfile = resolve(root, &poetry.lockfile);
    feed(&mut hasher, compute_file_hash(&lockfile)?.as_bytes());
    Ok(hasher.finalize())
}

pub(crate) fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Compute the hash of a single file.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let requirements_err = |source| ToolsError::RequirementsFile {
        path: path.to_path_buf(),
        source,
    };
    let mut hasher = Hasher::new();
    let mut file = File::open(path).map_err(requirements_err)?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).map_err(requirements_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}
