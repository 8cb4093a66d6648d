#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use toolbelt::config::{RawToolsFile, ToolsFile};
use toolbelt::types::VenvCreator;
use toolbelt::venv::Fingerprinter;
use toolbelt::venv::interpreter::{Interpreter, PythonVersion};
use toolbelt::workspace::Workspace;

use crate::fake_python::{FakePython, FakePythonBuilder};

/// A scratch repository with a fake base interpreter.
///
/// Environments are created with `python -m venv` (never a real
/// `virtualenv` from `PATH`) under `<repo>/.tools-venvs`.
pub struct TestRepo {
    dir: TempDir,
    python: FakePython,
}

impl TestRepo {
    pub fn new() -> Self {
        Self::with_python(FakePython::builder())
    }

    pub fn with_python(python: FakePythonBuilder) -> Self {
        let dir = tempfile::tempdir().expect("creating scratch repo");
        let python = python
            .write(&dir.path().join("base-python"))
            .expect("writing fake python");
        Self { dir, python }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn python(&self) -> &FakePython {
        &self.python
    }

    /// Write `contents` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("creating parent dir");
        }
        std::fs::write(&path, contents).expect("writing file");
        path
    }

    pub fn workspace(&self) -> Workspace {
        self.workspace_builder().build()
    }

    pub fn workspace_builder(&self) -> toolbelt::workspace::WorkspaceBuilder {
        Workspace::builder(self.root())
            .base_path(self.root())
            .interpreter(Interpreter {
                path: self.python.path().to_path_buf(),
                version: PythonVersion::new(3, 11),
            })
            .fingerprinter(Fingerprinter::new("tools-test", ""))
            .creator(VenvCreator::Venv)
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse and validate a `tools.toml` body.
pub fn tools_file(toml_text: &str) -> ToolsFile {
    let raw: RawToolsFile = toml::from_str(toml_text).expect("valid TOML");
    ToolsFile::try_from(raw).expect("valid tools file")
}
