// src/exec/runner.rs

//! Run one external program to completion.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::relay::{ActivityClock, Stream, drain_stop, pump};
use super::request::{ExecOutput, ExecRequest};
use super::signals::{SignalAction, SignalState, forward_signals};
use super::watchers::{TerminateRequest, Watchers};
use crate::errors::{Result, ToolsError};

/// How long the pumps may keep reading after a terminated child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Run `request` on a private current-thread runtime and block until the
/// child has exited and its output has been drained.
///
/// Must not be called from inside a tokio runtime; use [`run_async`] there.
pub fn run(request: ExecRequest) -> Result<ExecOutput> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(run_async(&request));
    drop(runtime);
    result
}

/// Async flavour of [`run`] for callers that already own a runtime.
pub async fn run_async(request: &ExecRequest) -> Result<ExecOutput> {
    request.validate()?;
    let output = execute(request).await?;
    if request.is_check() {
        output.check()
    } else {
        Ok(output)
    }
}

async fn execute(request: &ExecRequest) -> Result<ExecOutput> {
    let mut cmd = Command::new(request.program());
    cmd.args(request.argv().iter().skip(1))
        .envs(request.env_overlay())
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = request.working_dir() {
        cmd.current_dir(dir);
    }
    if !request.is_interactive() {
        detach(&mut cmd);
    }

    let mut forwarder = forward_signals()?;

    debug!(
        argv = %request.display_argv(),
        cwd = ?request.working_dir(),
        capture = request.is_capture(),
        interactive = request.is_interactive(),
        "running command"
    );
    let mut child = cmd.spawn().map_err(|source| ToolsError::Spawn {
        program: request.program().to_string_lossy().into_owned(),
        source,
    })?;

    let target = Target::new(&child, !request.is_interactive());
    let clock = ActivityClock::new();
    let capture = request.is_capture();
    let (drain, stop) = drain_stop();
    let stdout = tokio::spawn(pump(
        child.stdout.take(),
        Stream::Stdout,
        capture,
        clock.clone(),
        stop.clone(),
    ));
    let stderr = tokio::spawn(pump(
        child.stderr.take(),
        Stream::Stderr,
        capture,
        clock.clone(),
        stop,
    ));

    let (tx, mut rx) = mpsc::channel::<TerminateRequest>(2);
    let mut watchers = Watchers::spawn(
        request.timeout_limit(),
        request.no_output_timeout_limit(),
        clock,
        tx,
    );

    let mut state = SignalState::default();
    let mut stopping = false;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status?,

            Some(fired) = rx.recv() => {
                watchers.on_fired(fired);
                debug!(?fired, pid = ?child.id(), "timeout reached, terminating child");
                target.terminate(&mut child);
                stopping = true;
            }

            signal = forwarder.recv() => {
                match state.on_signal(signal) {
                    SignalAction::Terminate => target.terminate(&mut child),
                    SignalAction::Kill => target.kill(&mut child),
                    SignalAction::Ignore => {}
                }
                stopping = true;
            }
        }
    };

    drop(forwarder);
    watchers.shutdown().await;

    // Leftovers of a stopped child may still hold the pipes.
    let grace = stopping.then(|| {
        tokio::spawn(async move {
            tokio::time::sleep(DRAIN_GRACE).await;
            debug!("output pipes still open after the child exited, giving up on them");
            drain.stop();
        })
    });
    let stdout = join_pump(stdout).await;
    let stderr = join_pump(stderr).await;
    if let Some(grace) = grace {
        grace.abort();
    }
    let (stdout, stderr) = (stdout?, stderr?);
    let returncode = return_code(status);
    debug!(argv = %request.display_argv(), returncode, "command finished");

    Ok(ExecOutput {
        argv: request.argv().to_vec(),
        stdout,
        stderr,
        returncode,
    })
}

async fn join_pump(handle: JoinHandle<std::io::Result<Vec<u8>>>) -> Result<Vec<u8>> {
    let bytes = handle
        .await
        .map_err(|e| ToolsError::Other(anyhow::Error::from(e)))??;
    Ok(bytes)
}

#[cfg(unix)]
fn detach(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(windows)]
fn detach(cmd: &mut Command) {
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut Command) {}

/// Who gets the terminate and kill signals: the child alone, or the whole
/// process group it leads when it was detached.
#[derive(Debug, Clone, Copy)]
struct Target {
    pid: Option<u32>,
    group: bool,
}

impl Target {
    fn new(child: &Child, detached: bool) -> Self {
        Self {
            pid: child.id(),
            group: detached && cfg!(unix),
        }
    }

    /// Ask the child to exit (SIGTERM on Unix).
    #[cfg(unix)]
    fn terminate(&self, child: &mut Child) {
        use nix::sys::signal::Signal;

        // No pid: already reaped.
        if child.id().is_none() {
            return;
        }
        self.send(Signal::SIGTERM);
    }

    #[cfg(not(unix))]
    fn terminate(&self, child: &mut Child) {
        self.kill(child);
    }

    fn kill(&self, child: &mut Child) {
        #[cfg(unix)]
        if self.group && child.id().is_some() {
            self.send(nix::sys::signal::Signal::SIGKILL);
        }
        if let Err(err) = child.start_kill() {
            // Exited between the signal and the kill.
            debug!(error = %err, "kill skipped");
        }
    }

    #[cfg(unix)]
    fn send(&self, sig: nix::sys::signal::Signal) {
        use nix::errno::Errno;
        use nix::sys::signal;
        use nix::unistd::Pid;

        let Some(pid) = self.pid else {
            return;
        };
        let pid = Pid::from_raw(pid as i32);
        let sent = if self.group {
            signal::killpg(pid, sig)
        } else {
            signal::kill(pid, sig)
        };
        match sent {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(err) => warn!(%pid, group = self.group, error = %err, "failed to signal child"),
        }
    }
}

fn return_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}
