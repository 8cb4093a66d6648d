// src/exec/relay.rs

//! Child output pumping: capture or live relay of stdout/stderr chunks.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use crate::logging::{STDERR_TARGET, STDOUT_TARGET, structured_relay};

const CHUNK_SIZE: usize = 8192;

/// Which pipe a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

/// Timestamp of the most recent output chunk on either stream.
///
/// Starts at creation time so the idle watcher measures from spawn when the
/// child has not printed anything yet.
#[derive(Debug, Clone)]
pub struct ActivityClock {
    last: Arc<Mutex<Instant>>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn touch(&self) {
        if let Ok(mut last) = self.last.lock() {
            *last = Instant::now();
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last
            .lock()
            .map(|last| last.elapsed())
            .unwrap_or_default()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending half of [`drain_stop`]. Dropping it without calling
/// [`DrainHandle::stop`] lets the pumps run to EOF.
#[derive(Debug)]
pub struct DrainHandle {
    tx: watch::Sender<bool>,
}

impl DrainHandle {
    pub fn stop(&self) {
        // No receivers left: the pumps are already done.
        let _ = self.tx.send(true);
    }
}

/// Lets the runner cut a pump short when a stray grandchild keeps the
/// pipe open after the child itself is gone.
#[derive(Debug, Clone)]
pub struct DrainStop {
    rx: watch::Receiver<bool>,
}

impl DrainStop {
    /// A stop that never fires.
    pub fn never() -> Self {
        drain_stop().1
    }

    async fn stopped(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn drain_stop() -> (DrainHandle, DrainStop) {
    let (tx, rx) = watch::channel(false);
    (DrainHandle { tx }, DrainStop { rx })
}

/// Incremental UTF-8 decoder that keeps an incomplete trailing sequence
/// around until the next chunk completes it.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        let keep_from = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            // error_len() == None: the input ends mid-sequence.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => self.pending.len(),
        };
        let rest = self.pending.split_off(keep_from);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        text
    }

    /// Flush whatever is left once the stream ends.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Read `reader` to EOF (or until `stop` fires), relaying or capturing each
/// chunk.
///
/// Returns the captured bytes (empty when relaying).
pub async fn pump<R>(
    reader: Option<R>,
    stream: Stream,
    capture: bool,
    clock: ActivityClock,
    mut stop: DrainStop,
) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };

    let mut captured = Vec::new();
    let mut decoder = Utf8Carry::default();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = tokio::select! {
            biased;
            read = reader.read(&mut buf) => read?,
            () = stop.stopped() => break,
        };
        if n == 0 {
            break;
        }
        clock.touch();
        if capture {
            captured.extend_from_slice(&buf[..n]);
        } else {
            emit(stream, &decoder.decode(&buf[..n]));
        }
    }

    if !capture {
        emit(stream, &decoder.finish());
    }
    Ok(captured)
}

fn emit(stream: Stream, text: &str) {
    if text.is_empty() {
        return;
    }
    if structured_relay() {
        if text.trim().is_empty() {
            return;
        }
        let text = text.trim_end();
        match stream {
            Stream::Stdout => tracing::info!(target: STDOUT_TARGET, "{}", text),
            Stream::Stderr => tracing::info!(target: STDERR_TARGET, "{}", text),
        }
        return;
    }

    // Broken pipes on our own stdout are not the child's problem.
    let _ = match stream {
        Stream::Stdout => write_flush(&mut io::stdout().lock(), text),
        Stream::Stderr => write_flush(&mut io::stderr().lock(), text),
    };
}

fn write_flush(out: &mut impl Write, text: &str) -> io::Result<()> {
    out.write_all(text.as_bytes())?;
    out.flush()
}
