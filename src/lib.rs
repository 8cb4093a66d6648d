// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;
pub mod venv;
pub mod workspace;

use std::ffi::OsString;

use tracing::{debug, error};

use crate::config::ConfigLocation;
use crate::dispatch::Dispatcher;
use crate::errors::{Result, ToolsError};
use crate::workspace::Workspace;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - locating and validating `tools.toml`
/// - the workspace (repository root, base interpreter, environments root)
/// - the dispatcher with the declared groups and commands
///
/// Logging must already be initialised.
pub fn run(args: Vec<OsString>) -> Result<()> {
    run_with(args, |_| Ok(()))
}

/// Like [`run`], letting the caller register tool modules written in Rust
/// next to the ones declared in `tools.toml`.
pub fn run_with<F>(args: Vec<OsString>, register: F) -> Result<()>
where
    F: FnOnce(&mut Dispatcher) -> Result<()>,
{
    let cwd = std::env::current_dir()?;
    let location = config::locate(&cwd);
    let file = config::load(&location)?;

    let workspace = build_workspace(&location, &file.settings);
    debug!(
        repo_root = %workspace.repo_root().display(),
        base_path = %workspace.base_path().display(),
        "workspace ready"
    );

    let mut dispatcher = Dispatcher::new(workspace);
    config::register_tools_file(&file, &mut dispatcher)?;
    register(&mut dispatcher)?;
    dispatcher.run(args)
}

fn build_workspace(location: &ConfigLocation, settings: &config::Settings) -> Workspace {
    let mut builder = Workspace::builder(location.repo_root.clone());
    if let Some(python) = &settings.python {
        builder = builder.python(python.clone());
    }
    if let Some(timeout) = settings.lock_timeout {
        builder = builder.lock_timeout(timeout);
    }
    if let Some(creator) = settings.creator {
        builder = builder.creator(creator);
    }
    builder.build()
}

/// Report a failed run and return the process exit code.
///
/// Exit requests print their message (if any) as is; everything else is
/// logged at error level.
pub fn report_error(err: &ToolsError) -> i32 {
    match err {
        ToolsError::Exit { message, .. } => {
            if let Some(message) = message {
                eprintln!("{message}");
            }
        }
        other => {
            if tracing::dispatcher::has_been_set() {
                error!("{other}");
            } else {
                eprintln!("tools error: {other}");
            }
        }
    }
    err.exit_code()
}
