// src/exec/mod.rs

//! Process execution layer.
//!
//! Runs external programs with `tokio::process::Command` on a per-call
//! current-thread runtime, relaying their output live or capturing it.
//!
//! - [`request`] holds the per-call inputs (`ExecRequest`) and the result
//!   (`ExecOutput`).
//! - [`runner`] owns the spawn / wait / terminate loop.
//! - [`relay`] pumps stdout/stderr chunks to the terminal, to tracing or into
//!   a capture buffer.
//! - [`watchers`] enforces the absolute and no-output timeouts.
//! - [`signals`] forwards SIGINT/SIGTERM to the child while it runs.

pub mod relay;
pub mod request;
pub mod runner;
pub mod signals;
pub mod watchers;

pub use request::{ExecOutput, ExecRequest};
pub use runner::{run, run_async};
