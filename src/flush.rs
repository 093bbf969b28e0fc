//! Flush policies and the background flush worker.

use crate::error::{Error, Result};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Controls when a collection gets written to disk.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushPolicy {
    /// Write after every mutation. Safest, but most I/O.
    Immediate,
    /// Background thread writes on a timer and whenever the data changes.
    Async(Duration),
    /// Only write when `flush()` is called.
    Manual,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        FlushPolicy::Immediate
    }
}

/// Parses `immediate`, `manual` or `async:<millis>`.
impl FromStr for FlushPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" => Ok(FlushPolicy::Immediate),
            "manual" => Ok(FlushPolicy::Manual),
            other => {
                let millis = other
                    .strip_prefix("async:")
                    .and_then(|ms| ms.parse::<u64>().ok())
                    .filter(|ms| *ms > 0)
                    .ok_or_else(|| Error::Config(format!("unknown flush policy: {s}")))?;
                Ok(FlushPolicy::Async(Duration::from_millis(millis)))
            }
        }
    }
}

/// Background thread that calls a flush closure on a timer or when poked.
/// Joins the thread on drop so nothing leaks.
pub struct FlushWorker {
    stop: Arc<AtomicBool>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl FlushWorker {
    /// Spawn a worker listening on `rx`. The caller keeps the sender side;
    /// dropping every sender tells the worker to exit.
    pub fn start<F>(interval: Duration, flush_fn: F, rx: mpsc::Receiver<()>) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let join_handle = thread::spawn(move || loop {
            if stop_flag.load(Ordering::Relaxed) {
                // one last write so nothing queued since the last tick is lost
                flush_fn();
                break;
            }
            match rx.recv_timeout(interval) {
                Ok(()) | Err(mpsc::RecvTimeoutError::Timeout) => flush_fn(),
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    flush_fn();
                    break;
                }
            }
        });

        Self {
            stop,
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(h) = self.join_handle.take() {
            let _ = h.join();
        }
    }
}

impl std::fmt::Debug for FlushWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushWorker")
            .field("running", &self.join_handle.is_some())
            .finish()
    }
}
