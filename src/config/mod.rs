// src/config/mod.rs

//! `tools.toml`: declared environments, groups and commands.
//!
//! - `model.rs`: raw TOML shape and the validated [`ToolsFile`].
//! - `loader.rs`: locating and reading the file.
//! - `validate.rs`: reference, cycle and value checks.

pub mod loader;
pub mod model;
pub mod validate;

use std::path::Path;

pub use loader::{ConfigLocation, load, load_and_validate, load_from_path, locate};
pub use model::{CommandDecl, CommandLine, GroupDecl, RawToolsFile, Settings, ToolsFile};

use crate::dispatch::{ArgSpec, Arguments, CommandGroup, CommandSpec, Context, Dispatcher};
use crate::errors::{Result, ToolsError};
use crate::exec::ExecRequest;
use crate::venv::BaseRequirements;

const TRAILING_ARGS: &str = "args";

/// Add everything `file` declares to `dispatcher`.
pub fn register_tools_file(file: &ToolsFile, dispatcher: &mut Dispatcher) -> Result<()> {
    if let Some(spec) = &file.default_requirements {
        dispatcher.set_base_requirements(BaseRequirements::new(spec.clone()));
    }
    if let Some(config) = &file.default_venv {
        dispatcher.set_default_venv(config.clone());
    }

    let registry = dispatcher.registry_mut();
    for decl in &file.groups {
        let parent = decl.path.split_last().map(|(_, p)| p).unwrap_or_default();
        let mut group =
            CommandGroup::new(decl.key.clone(), decl.help.clone()).parent(parent.iter().cloned());
        if let Some(description) = &decl.description {
            group = group.description(description.clone());
        }
        if let Some(venv) = &decl.venv {
            group = group.venv(venv.clone());
        }
        registry.add_group(group)?;
    }

    for decl in &file.commands {
        let command = declared_command(decl.clone());
        registry.add_command(&decl.group_path, command)?;
    }
    Ok(())
}

fn declared_command(decl: CommandDecl) -> CommandSpec {
    let name = decl.name.clone();
    let help = decl.help.clone();
    let description = decl.description.clone();
    let venv = decl.venv.clone();

    let mut spec = CommandSpec::new(name, move |ctx: &mut Context, args: &Arguments| {
        run_declared(ctx, &decl, args.get_many(TRAILING_ARGS))
    })
    .arg(ArgSpec::trailing(TRAILING_ARGS).help("Extra arguments passed to the command."));
    if let Some(help) = help {
        spec = spec.help(help);
    }
    if let Some(description) = description {
        spec = spec.description(description);
    }
    if let Some(venv) = venv {
        spec = spec.venv(venv);
    }
    spec
}

/// Build the request for a declared command.
///
/// Shell strings run through `sh -c` (`cmd /C` on Windows); trailing
/// arguments become `$1`, `$2`, ... of the script.
pub fn declared_request(decl: &CommandDecl, repo_root: &Path, extra: &[String]) -> ExecRequest {
    let mut request = match &decl.cmd {
        CommandLine::Argv(argv) => ExecRequest::from_argv(argv).args(extra),
        CommandLine::Shell(script) if cfg!(windows) => {
            ExecRequest::new("cmd").args(["/C", script.as_str()]).args(extra)
        }
        CommandLine::Shell(script) => ExecRequest::new("sh")
            .args(["-c", script.as_str(), "tools"])
            .args(extra),
    };
    request = request
        .check(decl.check)
        .interactive(decl.interactive)
        .envs(decl.env.clone());
    if let Some(timeout) = decl.timeout {
        request = request.timeout(timeout);
    }
    if let Some(timeout) = decl.no_output_timeout {
        request = request.no_output_timeout(timeout);
    }
    if let Some(cwd) = &decl.cwd {
        request = request.cwd(repo_root.join(cwd));
    }
    request
}

fn run_declared(ctx: &mut Context, decl: &CommandDecl, extra: Vec<String>) -> Result<()> {
    let request = declared_request(decl, ctx.workspace().repo_root(), &extra);
    let output = ctx.run(request)?;
    if output.success() {
        Ok(())
    } else {
        // `check = false`: no error log, but the exit status still propagates.
        Err(ToolsError::Exit {
            code: output.returncode.max(1),
            message: None,
        })
    }
}
