// src/handle.rs
//
// ReaderHandle: owns one channel, one line store and at most one acquisition
// worker, and exposes the reader lifecycle
// (initialize → connect → start → stop → destroy).
//
// All methods take `&self`; lifecycle transitions are serialized by an
// internal mutex so the check-and-start in `start_reading` is atomic even
// when the handle is shared across threads.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::error::{ReaderError, Result};
use crate::io::acquisition::{Acquisition, SharedChannel, WorkerContext};
use crate::io::{AcquisitionStats, ChannelOpener, LineFramer, StatsSnapshot, StreamEnd, Terminator, WorkerStatus};
use crate::line_store::{LineRecord, LineStore};
use crate::settings::ReaderConfig;
use crate::snapshot::{ExportedLines, LineArray, Snapshot};

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Lifecycle state of a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Configured, channel not open
    Initialized,
    /// Channel open, no worker
    Connected,
    /// Worker active
    Reading,
    /// Stop requested or worker ended; channel still open
    Stopped,
    Destroyed,
}

struct HandleInner {
    config: ReaderConfig,
    state: ReaderState,
    worker: Option<Acquisition>,
    exported: Option<ExportedLines>,
    last_error: Option<String>,
}

pub struct ReaderHandle {
    label: String,
    opener: Box<dyn ChannelOpener>,
    inner: Mutex<HandleInner>,
    channel: SharedChannel,
    store: Arc<LineStore>,
    stats: Arc<AcquisitionStats>,
    status: Arc<Mutex<WorkerStatus>>,
}

impl ReaderHandle {
    /// Reader for a real serial port. Configures, does not open.
    #[cfg(not(target_os = "ios"))]
    pub fn new(config: ReaderConfig) -> Result<Self> {
        Self::with_opener(config, crate::io::serial::SerialPortOpener)
    }

    /// `initialize(deviceId, baud, bufferCapacity)`; capacity 0 selects the default
    #[cfg(not(target_os = "ios"))]
    pub fn initialize(port: &str, baud_rate: u32, buffer_capacity: usize) -> Result<Self> {
        Self::new(ReaderConfig::new(port, baud_rate, buffer_capacity))
    }

    pub fn with_opener(config: ReaderConfig, opener: impl ChannelOpener + 'static) -> Result<Self> {
        config.validate()?;
        tlog!("[reader:{}] Initialised {}", config.port, config.describe());
        Ok(ReaderHandle {
            label: config.port.clone(),
            opener: Box::new(opener),
            inner: Mutex::new(HandleInner {
                config,
                state: ReaderState::Initialized,
                worker: None,
                exported: None,
                last_error: None,
            }),
            channel: Arc::new(Mutex::new(None)),
            store: Arc::new(LineStore::new()),
            stats: Arc::new(AcquisitionStats::default()),
            status: Arc::new(Mutex::new(WorkerStatus::Idle)),
        })
    }

    // Lifecycle transitions never leave HandleInner half-updated across a
    // panic point, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock and fail with `Disposed` after destroy. Folds a worker that
    /// ended on its own into the `Stopped` state.
    fn lock_live(&self) -> Result<MutexGuard<'_, HandleInner>> {
        let mut inner = self.lock();
        if inner.state == ReaderState::Destroyed {
            return Err(ReaderError::Disposed);
        }
        if inner.state == ReaderState::Reading
            && inner.worker.as_ref().map_or(true, Acquisition::is_finished)
        {
            inner.state = ReaderState::Stopped;
        }
        Ok(inner)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open and configure the channel. `Ok(false)` when the device could not
    /// be opened; the handle stays usable for another attempt.
    pub fn connect(&self) -> Result<bool> {
        let mut inner = self.lock_live()?;
        if inner.state != ReaderState::Initialized {
            return Ok(true);
        }

        match self.opener.open(&inner.config) {
            Ok(channel) => {
                *self.channel.lock().unwrap_or_else(PoisonError::into_inner) = Some(channel);
                inner.state = ReaderState::Connected;
                inner.last_error = None;
                tlog!("[reader:{}] Connected", self.label);
                Ok(true)
            }
            Err(e) => {
                tlog!("[reader:{}] Connect failed: {}", self.label, e);
                inner.last_error = Some(e.to_string());
                Ok(false)
            }
        }
    }

    /// Start the acquisition worker. Returns whether a worker was started:
    /// `false` when not connected yet or already reading.
    pub fn start_reading(&self) -> Result<bool> {
        let mut inner = self.lock_live()?;
        match inner.state {
            ReaderState::Connected | ReaderState::Stopped => {}
            _ => return Ok(false),
        }

        // A stopped worker may still be draining its last read; it must be
        // gone before a new one writes to the store.
        if let Some(mut previous) = inner.worker.take() {
            previous.request_stop();
            previous.join();
        }

        let framer = LineFramer::new(inner.config.terminator.clone(), inner.config.buffer_capacity)?;
        let worker = Acquisition::spawn(WorkerContext {
            label: self.label.clone(),
            channel: self.channel.clone(),
            framer,
            store: self.store.clone(),
            stats: self.stats.clone(),
            status: self.status.clone(),
        })?;

        inner.worker = Some(worker);
        inner.state = ReaderState::Reading;
        tlog!("[reader:{}] Reading started", self.label);
        Ok(true)
    }

    /// Request cancellation and return immediately. The worker exits after
    /// its current read; use `wait_stopped` or `stop_and_join` to wait.
    pub fn stop_reading(&self) -> Result<()> {
        let mut inner = self.lock_live()?;
        if let Some(worker) = inner.worker.as_ref() {
            worker.request_stop();
        }
        if inner.state == ReaderState::Reading {
            inner.state = ReaderState::Stopped;
            tlog!("[reader:{}] Stop requested", self.label);
        }
        Ok(())
    }

    /// Request cancellation and block until the worker has exited.
    /// Returns how the worker ended, or `None` if there was none.
    pub fn stop_and_join(&self) -> Result<Option<StreamEnd>> {
        let mut inner = self.lock_live()?;
        let end = inner.worker.take().map(|mut worker| {
            worker.request_stop();
            worker.join()
        });
        if inner.state == ReaderState::Reading {
            inner.state = ReaderState::Stopped;
        }
        Ok(end)
    }

    /// Wait up to `timeout` for the worker to exit without stopping it.
    /// `true` once no worker is running.
    pub fn wait_stopped(&self, timeout: Duration) -> Result<bool> {
        // No deadline when the timeout does not fit in an Instant
        let deadline = Instant::now().checked_add(timeout);
        loop {
            {
                let mut inner = self.lock_live()?;
                let finished = inner.worker.as_ref().map_or(true, Acquisition::is_finished);
                if finished {
                    if let Some(mut worker) = inner.worker.take() {
                        worker.join();
                    }
                    return Ok(true);
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(false);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// Stop the worker and release the channel; `connect` may be called again.
    pub fn disconnect(&self) -> Result<()> {
        let mut inner = self.lock_live()?;
        self.shutdown(&mut inner);
        inner.state = ReaderState::Initialized;
        Ok(())
    }

    /// Stop the worker, release the channel and all lines. Idempotent.
    pub fn destroy(&self) {
        let mut inner = self.lock();
        if inner.state == ReaderState::Destroyed {
            return;
        }
        self.shutdown(&mut inner);
        inner.exported = None;
        self.store.clear();
        inner.state = ReaderState::Destroyed;
        tlog!("[reader:{}] Destroyed", self.label);
    }

    fn shutdown(&self, inner: &mut HandleInner) {
        if let Some(mut worker) = inner.worker.take() {
            worker.request_stop();
            worker.join();
        }
        let released = self
            .channel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if released.is_some() {
            tlog!("[reader:{}] Channel released", self.label);
        }
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Replace the line terminator. Takes effect on the next `start_reading`.
    pub fn set_terminator(&self, terminator: Terminator) -> Result<()> {
        let mut inner = self.lock_live()?;
        if inner.state == ReaderState::Reading {
            return Err(ReaderError::Busy("terminator cannot change while reading"));
        }
        let mut config = inner.config.clone();
        config.terminator = terminator;
        config.validate()?;
        inner.config = config;
        Ok(())
    }

    pub fn config(&self) -> Result<ReaderConfig> {
        Ok(self.lock_live()?.config.clone())
    }

    // ========================================================================
    // Lines
    // ========================================================================

    /// Owned point-in-time copy of every line received so far
    pub fn export_snapshot(&self) -> Result<Snapshot> {
        let _inner = self.lock_live()?;
        Ok(self.store.snapshot())
    }

    /// Snapshot for C callers. The returned pointers stay valid until the
    /// next export, `release_snapshot` or `destroy`.
    pub fn export_line_array(&self) -> Result<LineArray> {
        let mut inner = self.lock_live()?;
        let exported = inner.exported.insert(ExportedLines::new(self.store.snapshot()));
        Ok(exported.as_line_array())
    }

    /// Free the memory behind the last `export_line_array`
    pub fn release_snapshot(&self) -> Result<()> {
        self.lock_live()?.exported = None;
        Ok(())
    }

    pub fn last_line(&self) -> Result<LineRecord> {
        let _inner = self.lock_live()?;
        self.store.last_line()
    }

    pub fn line_count(&self) -> Result<usize> {
        let _inner = self.lock_live()?;
        Ok(self.store.len())
    }

    pub fn lines_since(&self, start: usize) -> Result<Vec<LineRecord>> {
        let _inner = self.lock_live()?;
        Ok(self.store.lines_since(start))
    }

    // ========================================================================
    // Status
    // ========================================================================

    pub fn state(&self) -> ReaderState {
        match self.lock_live() {
            Ok(inner) => inner.state,
            Err(_) => ReaderState::Destroyed,
        }
    }

    pub fn status(&self) -> Result<WorkerStatus> {
        let _inner = self.lock_live()?;
        Ok(self
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    pub fn stats(&self) -> Result<StatsSnapshot> {
        let _inner = self.lock_live()?;
        Ok(self.stats.snapshot())
    }

    /// Reason for the last failed `connect`
    pub fn last_error(&self) -> Result<Option<String>> {
        Ok(self.lock_live()?.last_error.clone())
    }

    pub fn port(&self) -> &str {
        &self.label
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Blocking wait on the caller's thread
pub fn delay(seconds: u32) {
    std::thread::sleep(Duration::from_secs(u64::from(seconds)));
}
