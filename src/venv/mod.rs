// src/venv/mod.rs

//! Virtual environment provisioning.
//!
//! - [`config`]: `VirtualEnvConfig` and the pip / poetry `DependencySpec`.
//! - [`fingerprint`]: BLAKE3 digest deciding when to reinstall.
//! - [`provisioner`]: `VirtualEnv` (create, install, run inside).
//! - [`base`]: requirements installed into the base interpreter.
//! - [`lock`], [`paths`], [`interpreter`], [`site_packages`]: plumbing.

pub mod backend;
pub mod base;
pub mod config;
pub mod fingerprint;
pub mod interpreter;
pub mod lock;
pub mod paths;
pub mod provisioner;
pub mod site_packages;

pub use backend::PackageInstaller;
pub use base::BaseRequirements;
pub use config::{DependencySpec, PipRequirements, PoetryExport, VirtualEnvConfig};
pub use fingerprint::Fingerprinter;
pub use provisioner::{ActiveVirtualEnv, VirtualEnv};
pub use site_packages::SearchPath;
