// src/venv/backend.rs

//! Installer backends: pip requirements and poetry exports.

use std::ffi::OsString;
use std::path::Path;

use tracing::info;

use super::config::{DependencySpec, PipRequirements, PoetryExport};
use super::fingerprint::resolve;
use crate::errors::{Result, ToolsError};
use crate::exec::{ExecOutput, ExecRequest};

/// Something that can run pip against a particular interpreter.
///
/// Implemented by provisioned environments and by the base interpreter.
pub trait PackageInstaller {
    fn python(&self) -> &Path;

    fn run(&self, request: ExecRequest) -> Result<ExecOutput>;

    /// `<python> -m pip <args>`
    fn pip(&self, args: Vec<OsString>) -> Result<ExecOutput> {
        self.run(
            ExecRequest::new(self.python())
                .args(["-m", "pip"])
                .args(args),
        )
    }
}

impl DependencySpec {
    /// Install these dependencies through `installer`.
    ///
    /// `root` anchors relative requirement files and the poetry lockfile.
    pub fn install(&self, installer: &dyn PackageInstaller, root: &Path, label: &str) -> Result<()> {
        match self {
            DependencySpec::Pip(pip) => install_pip(pip, installer, root, label),
            DependencySpec::Poetry(poetry) => install_poetry(poetry, installer, root, label),
        }
    }
}

fn install_pip(
    pip: &PipRequirements,
    installer: &dyn PackageInstaller,
    root: &Path,
    label: &str,
) -> Result<()> {
    if pip.is_empty() {
        return Ok(());
    }

    let mut args: Vec<OsString> = vec!["install".into()];
    args.extend(pip.install_args.iter().map(OsString::from));

    let mut files: Vec<_> = pip
        .requirements_files
        .iter()
        .map(|p| resolve(root, p))
        .collect();
    files.sort();
    for file in files {
        args.push("-r".into());
        args.push(file.into_os_string());
    }

    let mut requirements: Vec<&String> = pip.requirements.iter().collect();
    requirements.sort();
    args.extend(requirements.into_iter().map(OsString::from));

    info!("Installing requirements for {label} ...");
    installer.pip(args)?;
    Ok(())
}

fn install_poetry(
    poetry: &PoetryExport,
    installer: &dyn PackageInstaller,
    root: &Path,
    label: &str,
) -> Result<()> {
    let binary = which::which("poetry").map_err(|_| ToolsError::MissingTool {
        tool: "poetry".to_string(),
        hint: "Install poetry (https://python-poetry.org) or declare pip requirements instead."
            .to_string(),
    })?;

    let exported = tempfile::Builder::new()
        .prefix("reqs-")
        .suffix(".txt")
        .tempfile()?;

    let group_flag = if poetry.no_root { "only" } else { "with" };
    let export = ExecRequest::new(&binary)
        .arg("export")
        .args(&poetry.export_args)
        .args(poetry.groups.iter().map(|g| format!("--{group_flag}={g}")))
        .arg(format!("--output={}", exported.path().display()))
        .cwd(root);

    info!("Exporting requirements from poetry for {label} ...");
    installer.run(export)?;

    let mut args: Vec<OsString> = vec!["install".into()];
    args.extend(poetry.install_args.iter().map(OsString::from));
    args.push("-r".into());
    args.push(exported.path().as_os_str().to_os_string());

    info!("Installing requirements for {label} ...");
    installer.pip(args)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use super::*;

    struct Recorder {
        python: PathBuf,
        calls: RefCell<Vec<Vec<String>>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                python: PathBuf::from("/venv/bin/python"),
                calls: RefCell::new(Vec::new()),
            }
        }
    }

    impl PackageInstaller for Recorder {
        fn python(&self) -> &Path {
            &self.python
        }

        fn run(&self, request: ExecRequest) -> Result<ExecOutput> {
            let argv: Vec<String> = request
                .argv()
                .iter()
                .map(|a| a.to_string_lossy().into_owned())
                .collect();
            self.calls.borrow_mut().push(argv);
            Ok(ExecOutput {
                argv: request.argv().to_vec(),
                stdout: Vec::new(),
                stderr: Vec::new(),
                returncode: 0,
            })
        }
    }

    #[test]
    fn empty_pip_spec_installs_nothing() {
        let rec = Recorder::new();
        DependencySpec::default()
            .install(&rec, Path::new("/repo"), "virtualenv(x)")
            .unwrap();
        assert!(rec.calls.borrow().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn pip_files_come_before_sorted_requirements() {
        let rec = Recorder::new();
        let spec = DependencySpec::Pip(PipRequirements {
            requirements: vec!["rich".into(), "attrs".into()],
            requirements_files: vec![PathBuf::from("reqs/docs.txt")],
            install_args: vec!["--pre".into()],
        });
        spec.install(&rec, Path::new("/repo"), "virtualenv(docs)").unwrap();

        let calls = rec.calls.borrow();
        assert_eq!(
            calls[0],
            vec![
                "/venv/bin/python",
                "-m",
                "pip",
                "install",
                "--pre",
                "-r",
                "/repo/reqs/docs.txt",
                "attrs",
                "rich",
            ]
        );
    }
}
