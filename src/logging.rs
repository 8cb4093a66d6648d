// src/logging.rs

//! Logging setup for `tools` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter of general logs:
//! 1. `TOOLS_LOG` environment variable (any `EnvFilter` directive)
//! 2. `--quiet` (warn) / `--debug` (debug)
//! 3. default to `info`
//!
//! General logs go to STDERR. Relayed child output uses its own targets
//! ([`STDOUT_TARGET`], [`STDERR_TARGET`]) and is routed to STDOUT/STDERR by
//! dedicated layers, so quiet mode never hides what a command prints.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::filter::{EnvFilter, Targets};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{Layer, Registry};

use crate::errors::{Result, ToolsError};
use crate::types::Verbosity;

/// Target used to relay a child's stdout.
pub const STDOUT_TARGET: &str = "tools::stdout";
/// Target used to relay a child's stderr.
pub const STDERR_TARGET: &str = "tools::stderr";

const LOG_ENV: &str = "TOOLS_LOG";

static TIMESTAMPS: AtomicBool = AtomicBool::new(false);

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// True when running under a CI system.
pub fn ci_detected() -> bool {
    std::env::var_os("CI").is_some()
}

/// Whether child output should be relayed as tracing events instead of raw
/// writes.
pub fn structured_relay() -> bool {
    TIMESTAMPS.load(Ordering::Relaxed) || ci_detected()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    pub verbosity: Verbosity,
    pub timestamps: bool,
}

impl LogOptions {
    /// `timestamps = None` means "not chosen on the command line": on in CI.
    pub fn new(verbosity: Verbosity, timestamps: Option<bool>) -> Self {
        Self {
            verbosity,
            timestamps: timestamps.unwrap_or_else(ci_detected),
        }
    }
}

impl Default for LogOptions {
    fn default() -> Self {
        Self::new(Verbosity::Normal, None)
    }
}

/// Initialise the global subscriber.
///
/// Safe to call once at startup; a second call fails.
pub fn init_logging(options: LogOptions) -> Result<()> {
    TIMESTAMPS.store(options.timestamps, Ordering::Relaxed);

    let clock = options.timestamps.then(CompactClock::default);
    let show_meta = options.verbosity == Verbosity::Debug;

    let general = fmt_layer(std::io::stderr, clock.clone(), show_meta)
        .with_filter(general_filter(options.verbosity)?)
        .boxed();
    let stdout = fmt_layer(std::io::stdout, clock.clone(), false)
        .with_filter(Targets::new().with_target(STDOUT_TARGET, Level::TRACE))
        .boxed();
    let stderr = fmt_layer(std::io::stderr, clock, false)
        .with_filter(Targets::new().with_target(STDERR_TARGET, Level::TRACE))
        .boxed();

    tracing_subscriber::registry()
        .with(vec![general, stdout, stderr])
        .try_init()
        .map_err(|e| ToolsError::Other(anyhow::Error::from(e)))
}

fn general_filter(verbosity: Verbosity) -> Result<EnvFilter> {
    let base = match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => directives,
        _ => verbosity.level().as_str().to_lowercase(),
    };
    let directives = format!("{base},{STDOUT_TARGET}=off,{STDERR_TARGET}=off");
    EnvFilter::try_new(&directives)
        .map_err(|e| ToolsError::Config(format!("invalid {LOG_ENV} value '{base}': {e}")))
}

fn fmt_layer<W>(writer: W, clock: Option<CompactClock>, show_meta: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(show_meta)
        .with_level(show_meta)
        .with_thread_ids(false)
        .with_thread_names(false);
    match clock {
        Some(clock) => layer.with_timer(clock).boxed(),
        None => layer.without_time().boxed(),
    }
}

/// `[HH:MM:SS]` timer that blanks a timestamp equal to the previous one.
#[derive(Debug, Clone, Default)]
pub struct CompactClock {
    last: Arc<Mutex<String>>,
}

impl CompactClock {
    fn render(&self, now: String) -> String {
        let repeated = match self.last.lock() {
            Ok(last) if *last == now => true,
            Ok(mut last) => {
                last.clone_from(&now);
                false
            }
            Err(_) => false,
        };
        if repeated { " ".repeat(now.len()) } else { now }
    }
}

impl FormatTime for CompactClock {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = chrono::Local::now().format("[%H:%M:%S]").to_string();
        write!(w, "{}", self.render(now))
    }
}
