// src/exec/signals.rs

//! SIGINT/SIGTERM forwarding for the duration of a `run()` call.
//!
//! On Unix the forwarder swaps in a recording handler with `sigaction` and
//! restores the previous dispositions when the last concurrent forwarder is
//! dropped. The handler bumps a counter and writes a byte to every
//! registered wakeup pipe; the runner drives [`SignalState`] from there.

use tracing::info;

use crate::errors::Result;

/// A signal delivered to us while a child was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardedSignal {
    Interrupt,
    Terminate,
}

impl ForwardedSignal {
    pub fn name(self) -> &'static str {
        match self {
            ForwardedSignal::Interrupt => "SIGINT",
            ForwardedSignal::Terminate => "SIGTERM",
        }
    }
}

/// What the runner should do to the child after a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Terminate,
    Kill,
    Ignore,
}

/// Per-call signal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalState {
    #[default]
    NoneSeen,
    OneSeen,
    Killed,
}

impl SignalState {
    pub fn on_signal(&mut self, signal: ForwardedSignal) -> SignalAction {
        match *self {
            SignalState::NoneSeen => {
                info!(
                    "Caught {name}, terminating process ....\nSend {name} again to kill the process.",
                    name = signal.name()
                );
                *self = SignalState::OneSeen;
                SignalAction::Terminate
            }
            SignalState::OneSeen => {
                info!("Caught {} again, killing the process ...", signal.name());
                *self = SignalState::Killed;
                SignalAction::Kill
            }
            SignalState::Killed => SignalAction::Ignore,
        }
    }
}

pub use imp::SignalForwarder;

#[cfg(unix)]
mod imp {
    use std::io::ErrorKind;
    use std::os::fd::AsRawFd;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
    use std::time::Duration;

    use nix::errno::Errno;
    use nix::libc;
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use tokio::net::unix::pipe;
    use tokio::time::{MissedTickBehavior, interval};
    use tracing::debug;

    use super::ForwardedSignal;
    use crate::errors::{Result, ToolsError};

    /// Fallback polling period for forwarders that found no free wakeup slot.
    const POLL: Duration = Duration::from_millis(100);
    const WAKE_SLOTS: usize = 16;

    static INTERRUPTS: AtomicUsize = AtomicUsize::new(0);
    static TERMINATES: AtomicUsize = AtomicUsize::new(0);
    static WAKE_FDS: [AtomicI32; WAKE_SLOTS] = [const { AtomicI32::new(-1) }; WAKE_SLOTS];

    struct Installed {
        users: usize,
        previous: Option<(SigAction, SigAction)>,
    }

    static INSTALLED: Mutex<Installed> = Mutex::new(Installed {
        users: 0,
        previous: None,
    });

    extern "C" fn record(signum: libc::c_int) {
        if signum == libc::SIGINT {
            INTERRUPTS.fetch_add(1, Ordering::SeqCst);
        } else {
            TERMINATES.fetch_add(1, Ordering::SeqCst);
        }
        let saved = Errno::last_raw();
        for slot in &WAKE_FDS {
            let fd = slot.load(Ordering::SeqCst);
            if fd >= 0 {
                // SAFETY: write(2) is async-signal-safe; the pipe is non-blocking
                // so a full pipe drops the byte instead of blocking.
                unsafe {
                    libc::write(fd, [1u8].as_ptr().cast(), 1);
                }
            }
        }
        Errno::set_raw(saved);
    }

    /// Self-pipe registered in [`WAKE_FDS`] for one forwarder.
    #[derive(Debug)]
    struct Wakeup {
        slot: usize,
        rx: pipe::Receiver,
        _tx: pipe::Sender,
    }

    impl Wakeup {
        fn register() -> Option<Self> {
            let (tx, rx) = match pipe::pipe() {
                Ok(ends) => ends,
                Err(err) => {
                    debug!(error = %err, "no signal wakeup pipe, falling back to polling");
                    return None;
                }
            };
            let fd = tx.as_raw_fd();
            let slot = WAKE_FDS.iter().position(|slot| {
                slot.compare_exchange(-1, fd, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            })?;
            Some(Self { slot, rx, _tx: tx })
        }

        /// Wait until the handler has written at least one byte, then drain.
        async fn wait(&self) {
            if self.rx.readable().await.is_err() {
                tokio::time::sleep(POLL).await;
                return;
            }
            let mut buf = [0u8; 64];
            loop {
                match self.rx.try_read(&mut buf) {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                    Err(err) => {
                        debug!(error = %err, "signal wakeup pipe read failed");
                        tokio::time::sleep(POLL).await;
                        break;
                    }
                }
            }
        }
    }

    impl Drop for Wakeup {
        fn drop(&mut self) {
            // Unregister before the pipe ends close.
            WAKE_FDS[self.slot].store(-1, Ordering::SeqCst);
        }
    }

    /// Guard that keeps the recording handlers installed.
    #[derive(Debug)]
    pub struct SignalForwarder {
        interrupts: usize,
        terminates: usize,
        wakeup: Option<Wakeup>,
    }

    impl SignalForwarder {
        /// Must be called from within a tokio runtime with IO enabled.
        pub fn install() -> Result<Self> {
            let mut installed = INSTALLED
                .lock()
                .map_err(|_| ToolsError::Config("signal handler state poisoned".to_string()))?;

            if installed.users == 0 {
                let action = SigAction::new(
                    SigHandler::Handler(record),
                    SaFlags::SA_RESTART,
                    SigSet::empty(),
                );
                // SAFETY: `record` only touches atomics and write(2).
                let old_int = unsafe { signal::sigaction(Signal::SIGINT, &action) }
                    .map_err(|e| ToolsError::Io(e.into()))?;
                let old_term = match unsafe { signal::sigaction(Signal::SIGTERM, &action) } {
                    Ok(old) => old,
                    Err(e) => {
                        // SAFETY: restoring what we just replaced.
                        let _ = unsafe { signal::sigaction(Signal::SIGINT, &old_int) };
                        return Err(ToolsError::Io(e.into()));
                    }
                };
                installed.previous = Some((old_int, old_term));
                debug!("installed SIGINT/SIGTERM forwarding handlers");
            }
            installed.users += 1;

            Ok(Self {
                interrupts: INTERRUPTS.load(Ordering::SeqCst),
                terminates: TERMINATES.load(Ordering::SeqCst),
                wakeup: Wakeup::register(),
            })
        }

        pub fn has_wakeup(&self) -> bool {
            self.wakeup.is_some()
        }

        /// Wait for the next signal delivered after this forwarder was made.
        ///
        /// Cancel safe: the baseline only moves when a signal is returned.
        pub async fn recv(&mut self) -> ForwardedSignal {
            let mut ticker = interval(POLL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                if let Some(signal) = self.take_pending() {
                    return signal;
                }
                match &self.wakeup {
                    Some(wakeup) => wakeup.wait().await,
                    None => {
                        ticker.tick().await;
                    }
                }
            }
        }

        fn take_pending(&mut self) -> Option<ForwardedSignal> {
            if INTERRUPTS.load(Ordering::SeqCst) > self.interrupts {
                self.interrupts += 1;
                return Some(ForwardedSignal::Interrupt);
            }
            if TERMINATES.load(Ordering::SeqCst) > self.terminates {
                self.terminates += 1;
                return Some(ForwardedSignal::Terminate);
            }
            None
        }
    }

    impl Drop for SignalForwarder {
        fn drop(&mut self) {
            self.wakeup.take();
            let Ok(mut installed) = INSTALLED.lock() else {
                return;
            };
            installed.users = installed.users.saturating_sub(1);
            if installed.users > 0 {
                return;
            }
            if let Some((old_int, old_term)) = installed.previous.take() {
                // SAFETY: reinstalling the dispositions saved at install time.
                unsafe {
                    let _ = signal::sigaction(Signal::SIGINT, &old_int);
                    let _ = signal::sigaction(Signal::SIGTERM, &old_term);
                }
                debug!("restored previous SIGINT/SIGTERM handlers");
            }
        }
    }
}

#[cfg(not(unix))]
mod imp {
    use super::ForwardedSignal;
    use crate::errors::Result;

    #[derive(Debug)]
    pub struct SignalForwarder;

    impl SignalForwarder {
        pub fn install() -> Result<Self> {
            Ok(Self)
        }

        pub async fn recv(&mut self) -> ForwardedSignal {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
            ForwardedSignal::Interrupt
        }
    }
}

/// Install the forwarder for one call.
pub fn forward_signals() -> Result<SignalForwarder> {
    SignalForwarder::install()
}
