// src/dispatch/mod.rs

//! Command dispatch: registry, argument descriptors, the per-run
//! [`Context`] and the [`Dispatcher`] tying them to the CLI.

pub mod args;
pub mod context;
pub mod registry;

use std::ffi::OsString;

use tracing::{debug, warn};

pub use args::{ArgKind, ArgSpec, ArgType, Arguments};
pub use context::{ChdirGuard, Context, RunDefaults};
pub use registry::{CommandGroup, CommandRegistry, CommandSpec, Handler, Resolution};

use crate::cli::{self, GlobalArgs};
use crate::errors::{Result, ToolsError};
use crate::venv::{BaseRequirements, VirtualEnvConfig};
use crate::workspace::Workspace;

const DEBUG_IMPORTS_ENV: &str = "TOOLS_DEBUG_IMPORTS";
const IGNORE_IMPORT_ERRORS_ENV: &str = "TOOLS_IGNORE_IMPORT_ERRORS";

/// Registers a tool module's groups and commands.
pub type Registrar = Box<dyn FnOnce(&mut CommandRegistry, &mut Context) -> Result<()>>;

struct ToolModule {
    name: String,
    venv_config: Option<VirtualEnvConfig>,
    registrar: Registrar,
}

/// Owns the registry and runs one `tools` invocation.
pub struct Dispatcher {
    workspace: Workspace,
    registry: CommandRegistry,
    modules: Vec<ToolModule>,
    base_requirements: Option<BaseRequirements>,
    default_venv: Option<VirtualEnvConfig>,
}

impl Dispatcher {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            registry: CommandRegistry::new(),
            modules: Vec::new(),
            base_requirements: None,
            default_venv: None,
        }
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut CommandRegistry {
        &mut self.registry
    }

    /// Queue a tool module. Its registrar runs at the start of
    /// [`Dispatcher::run`], inside `venv_config`'s environment when given
    /// (unnamed configs take the module name).
    pub fn register_module<F>(
        &mut self,
        name: impl Into<String>,
        venv_config: Option<VirtualEnvConfig>,
        registrar: F,
    ) where
        F: FnOnce(&mut CommandRegistry, &mut Context) -> Result<()> + 'static,
    {
        let name = name.into();
        let venv_config = venv_config.map(|c| c.with_default_name(&name));
        self.modules.push(ToolModule {
            name,
            venv_config,
            registrar: Box::new(registrar),
        });
    }

    /// Requirements installed into the base interpreter before anything
    /// else.
    pub fn set_base_requirements(&mut self, requirements: BaseRequirements) {
        self.base_requirements = Some(requirements);
    }

    /// Environment active for every command, named `default` unless the
    /// config says otherwise.
    pub fn set_default_venv(&mut self, config: VirtualEnvConfig) {
        self.default_venv = Some(config.with_default_name("default"));
    }

    /// The full CLI for the currently registered groups.
    pub fn cli(&self) -> clap::Command {
        self.registry.augment(cli::root_command())
    }

    /// Run `tools` with `args` (program name first).
    pub fn run<I, T>(mut self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        if let Some(base) = &self.base_requirements {
            base.install(&self.workspace)?;
        }

        let mut ctx = Context::new(self.workspace.clone(), RunDefaults::default());
        let _default_venv = match &self.default_venv {
            Some(config) => {
                let active = ctx.virtualenv(config)?;
                ctx.set_active(Some((*active).clone()));
                Some(active)
            }
            None => None,
        };

        let modules = std::mem::take(&mut self.modules);
        for module in modules {
            self.load_module(module, &mut ctx)?;
        }

        let matches = match self.cli().try_get_matches_from(args) {
            Ok(matches) => matches,
            Err(err) => {
                let code = err.exit_code();
                err.print()?;
                return if code == 0 {
                    Ok(())
                } else {
                    Err(ToolsError::Exit {
                        code,
                        message: None,
                    })
                };
            }
        };

        let globals = GlobalArgs::from_matches(&matches)?;
        ctx.set_defaults(globals.run_defaults());

        match self.registry.resolve(&matches) {
            Resolution::NoCommand => Err(ToolsError::Exit {
                code: 1,
                message: Some("No command was passed.".to_string()),
            }),
            Resolution::Command {
                group,
                command,
                matches,
            } => {
                debug!(group = ?group.path(), command = %command.name, "dispatching");
                let args = Arguments::new(matches.clone());
                match command.venv_config.as_ref().or(group.venv_config.as_ref()) {
                    Some(config) => {
                        ctx.with_virtualenv(config, |ctx| command.invoke(ctx, &args))
                    }
                    None => command.invoke(&mut ctx, &args),
                }
            }
        }
    }

    fn load_module(&mut self, module: ToolModule, ctx: &mut Context) -> Result<()> {
        let ToolModule {
            name,
            venv_config,
            registrar,
        } = module;
        debug!(module = %name, "registering tool module");

        let registry = &mut self.registry;
        let result = match &venv_config {
            Some(config) => ctx.with_virtualenv(config, |ctx| registrar(registry, ctx)),
            None => registrar(registry, ctx),
        };

        match result {
            Ok(()) => Ok(()),
            Err(err) if env_flag(DEBUG_IMPORTS_ENV) => Err(err),
            Err(err) => {
                if !env_flag(IGNORE_IMPORT_ERRORS_ENV) {
                    warn!(
                        "Failed to register tool module '{name}': {err}. \
                         Set {DEBUG_IMPORTS_ENV}=1 to make this fatal or \
                         {IGNORE_IMPORT_ERRORS_ENV}=1 to silence it."
                    );
                }
                Ok(())
            }
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}
