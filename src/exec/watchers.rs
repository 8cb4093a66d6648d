// src/exec/watchers.rs

//! Absolute and idle timeout watchers.
//!
//! Watchers never touch the child directly; they send a [`TerminateRequest`]
//! to the runner loop, which owns the `Child`.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, warn};

use super::relay::ActivityClock;

const IDLE_POLL: Duration = Duration::from_secs(1);

/// Why a watcher asked for the child to be terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateRequest {
    Timeout,
    IdleTimeout,
}

/// Handles to the (at most two) watcher tasks of one invocation.
#[derive(Debug, Default)]
pub struct Watchers {
    absolute: Option<JoinHandle<()>>,
    idle: Option<JoinHandle<()>>,
}

impl Watchers {
    pub fn spawn(
        timeout: Option<Duration>,
        no_output_timeout: Option<Duration>,
        clock: ActivityClock,
        tx: mpsc::Sender<TerminateRequest>,
    ) -> Self {
        let absolute = timeout.map(|limit| tokio::spawn(watch_absolute(limit, tx.clone())));
        let idle = no_output_timeout.map(|limit| tokio::spawn(watch_idle(limit, clock, tx)));
        Self { absolute, idle }
    }

    /// One watcher fired: the other one has nothing left to do.
    pub fn on_fired(&mut self, request: TerminateRequest) {
        let other = match request {
            TerminateRequest::Timeout => self.idle.as_ref(),
            TerminateRequest::IdleTimeout => self.absolute.as_ref(),
        };
        if let Some(handle) = other {
            handle.abort();
        }
    }

    /// Cancel both watchers and wait for them to wind down.
    pub async fn shutdown(self) {
        for handle in [self.absolute, self.idle].into_iter().flatten() {
            handle.abort();
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    debug!(error = %err, "timeout watcher ended abnormally");
                }
            }
        }
    }
}

async fn watch_absolute(limit: Duration, tx: mpsc::Sender<TerminateRequest>) {
    sleep(limit).await;
    warn!(
        "The command has been running for more than {} second(s). Terminating process.",
        limit.as_secs()
    );
    let _ = tx.send(TerminateRequest::Timeout).await;
}

async fn watch_idle(limit: Duration, clock: ActivityClock, tx: mpsc::Sender<TerminateRequest>) {
    let mut ticker = interval(IDLE_POLL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if clock.idle_for() >= limit {
            warn!(
                "No output has been seen for over {} second(s). Terminating process.",
                limit.as_secs()
            );
            let _ = tx.send(TerminateRequest::IdleTimeout).await;
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn absolute_watcher_fires_after_limit() {
        let (tx, mut rx) = mpsc::channel(4);
        let watchers = Watchers::spawn(Some(Duration::from_secs(3)), None, ActivityClock::new(), tx);

        let got = rx.recv().await;
        assert_eq!(got, Some(TerminateRequest::Timeout));
        watchers.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_watchers() {
        let (tx, mut rx) = mpsc::channel(4);
        let watchers = Watchers::spawn(
            Some(Duration::from_secs(600)),
            Some(Duration::from_secs(600)),
            ActivityClock::new(),
            tx,
        );
        watchers.shutdown().await;
        // Every sender was dropped with its task.
        assert_eq!(rx.recv().await, None);
    }
}
