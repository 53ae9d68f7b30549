// src/io/acquisition.rs
//
// Acquisition worker: pulls bytes from a ByteChannel on a dedicated thread,
// frames them into lines and appends the lines to the LineStore.
//
// The loop checks the cancel flag before every read. Idle reads (timeouts)
// are not failures; an I/O error ends the worker without retrying.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::framer::{LineEnd, LineFramer};
use super::{now_us, ByteChannel, ReadOutcome};
use crate::line_store::LineStore;

/// Pause after an idle read so a non-blocking source cannot spin the worker
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Channel slot shared between the handle (open/release) and the worker (read)
pub(crate) type SharedChannel = Arc<Mutex<Option<Box<dyn ByteChannel>>>>;

// ============================================================================
// Status Types
// ============================================================================

/// Why a worker exited
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The cancel flag was observed
    Stopped,
    /// End of stream, or the channel was released underneath the worker
    Disconnected,
    /// Read failure; not retried
    Error(String),
}

/// Pollable worker status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    Idle,
    Running,
    Ended(StreamEnd),
}

/// Counters shared by every worker of one reader
#[derive(Debug, Default)]
pub struct AcquisitionStats {
    bytes_read: AtomicU64,
    lines: AtomicU64,
    overflows: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub bytes_read: u64,
    pub lines: u64,
    pub overflows: u64,
}

impl AcquisitionStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            lines: self.lines.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Acquisition
// ============================================================================

/// Everything a worker needs, moved onto its thread
pub(crate) struct WorkerContext {
    pub label: String,
    pub channel: SharedChannel,
    pub framer: LineFramer,
    pub store: Arc<LineStore>,
    pub stats: Arc<AcquisitionStats>,
    pub status: Arc<Mutex<WorkerStatus>>,
}

/// One running (or finished) worker thread
pub(crate) struct Acquisition {
    cancel_flag: Arc<AtomicBool>,
    task_handle: Option<JoinHandle<StreamEnd>>,
}

impl Acquisition {
    pub fn spawn(ctx: WorkerContext) -> std::io::Result<Self> {
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let worker_flag = cancel_flag.clone();
        let status = ctx.status.clone();

        set_status(&status, WorkerStatus::Running);

        let spawned = thread::Builder::new()
            .name(format!("serial-reader-{}", ctx.label))
            .spawn(move || {
                let status = ctx.status.clone();
                let end = run_acquisition_blocking(ctx, worker_flag);
                set_status(&status, WorkerStatus::Ended(end.clone()));
                end
            });

        match spawned {
            Ok(handle) => Ok(Acquisition {
                cancel_flag,
                task_handle: Some(handle),
            }),
            Err(e) => {
                set_status(&status, WorkerStatus::Ended(StreamEnd::Error(e.to_string())));
                Err(e)
            }
        }
    }

    /// Request cancellation. Returns immediately.
    pub fn request_stop(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.task_handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Block until the worker exits
    pub fn join(&mut self) -> StreamEnd {
        match self.task_handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|e| {
                tlog!("[acquisition] Worker panicked: {:?}", e);
                StreamEnd::Error("worker panicked".to_string())
            }),
            None => StreamEnd::Stopped,
        }
    }
}

fn set_status(status: &Mutex<WorkerStatus>, value: WorkerStatus) {
    *status.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

/// Blocking acquisition loop
fn run_acquisition_blocking(ctx: WorkerContext, cancel_flag: Arc<AtomicBool>) -> StreamEnd {
    let WorkerContext {
        label,
        channel,
        mut framer,
        store,
        stats,
        ..
    } = ctx;

    tlog!(
        "[acquisition:{}] Starting (terminator: {:02X?}, capacity: {})",
        label,
        framer.terminator().as_bytes(),
        framer.capacity()
    );

    let stream_end = loop {
        // Check cancellation
        if cancel_flag.load(Ordering::SeqCst) {
            break StreamEnd::Stopped;
        }

        let read_result = match channel.lock() {
            Ok(mut guard) => match guard.as_mut() {
                Some(ch) => ch.read_byte(),
                None => break StreamEnd::Disconnected,
            },
            Err(e) => {
                tlog!("[acquisition:{}] Channel mutex poisoned in read loop: {}", label, e);
                break StreamEnd::Error(format!("Channel mutex poisoned: {}", e));
            }
        };

        match read_result {
            Ok(ReadOutcome::Byte(byte)) => {
                stats.bytes_read.fetch_add(1, Ordering::Relaxed);
                if let Some(line) = framer.feed(byte) {
                    if line.end == LineEnd::Overflow {
                        stats.overflows.fetch_add(1, Ordering::Relaxed);
                        tlog!(
                            "[acquisition:{}] Line exceeded {} bytes, forced flush",
                            label,
                            framer.capacity()
                        );
                    }
                    store.push(line, now_us());
                    stats.lines.fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(ReadOutcome::Idle) => {
                thread::sleep(IDLE_BACKOFF);
            }
            Ok(ReadOutcome::Closed) => {
                for line in framer.flush() {
                    if line.end == LineEnd::Overflow {
                        stats.overflows.fetch_add(1, Ordering::Relaxed);
                    }
                    store.push(line, now_us());
                    stats.lines.fetch_add(1, Ordering::Relaxed);
                }
                break StreamEnd::Disconnected;
            }
            Err(e) => {
                tlog!("[acquisition:{}] Read error: {}", label, e);
                break StreamEnd::Error(format!("Read error: {}", e));
            }
        }
    };

    if framer.pending_len() > 0 {
        tlog!(
            "[acquisition:{}] Discarding {} bytes of unterminated line",
            label,
            framer.pending_len()
        );
    }
    tlog!("[acquisition:{}] Stream ended: {:?}", label, stream_end);

    stream_end
}
