// src/io/testing.rs
//
// Scripted channels for tests: deterministic byte delivery with idle gaps,
// slow chunks, failures and end-of-stream.

use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{ByteChannel, ChannelOpener, ReadOutcome};
use crate::error::{ReaderError, Result};
use crate::settings::ReaderConfig;

pub(crate) enum Step {
    /// Deliver these bytes, one per read
    Bytes(Vec<u8>),
    /// One idle read
    Idle,
    /// Sleep, then report idle
    Pause(Duration),
    /// Fail the read with this kind
    Fail(ErrorKind),
    /// End of stream
    Close,
    /// Deliver these bytes forever
    Repeat(Vec<u8>),
}

pub(crate) struct ScriptedChannel {
    steps: VecDeque<Step>,
    pending: VecDeque<u8>,
    reads: Arc<AtomicUsize>,
    released: Arc<AtomicUsize>,
}

impl ScriptedChannel {
    pub fn new(steps: Vec<Step>) -> Self {
        ScriptedChannel {
            steps: steps.into(),
            pending: VecDeque::new(),
            reads: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn read_counter(&self) -> Arc<AtomicUsize> {
        self.reads.clone()
    }

    /// Incremented when the channel is dropped
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        self.released.clone()
    }
}

impl ByteChannel for ScriptedChannel {
    fn read_byte(&mut self) -> io::Result<ReadOutcome> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        loop {
            if let Some(byte) = self.pending.pop_front() {
                return Ok(ReadOutcome::Byte(byte));
            }
            match self.steps.pop_front() {
                Some(Step::Bytes(bytes)) => self.pending.extend(bytes),
                Some(Step::Idle) => return Ok(ReadOutcome::Idle),
                Some(Step::Pause(d)) => {
                    std::thread::sleep(d);
                    return Ok(ReadOutcome::Idle);
                }
                Some(Step::Fail(kind)) => return Err(io::Error::new(kind, "unplugged")),
                Some(Step::Close) => return Ok(ReadOutcome::Closed),
                Some(Step::Repeat(bytes)) => {
                    self.pending.extend(bytes.iter().copied());
                    self.steps.push_front(Step::Repeat(bytes));
                }
                // Quiet line once the script runs out
                None => {
                    std::thread::sleep(Duration::from_millis(1));
                    return Ok(ReadOutcome::Idle);
                }
            }
        }
    }
}

impl Drop for ScriptedChannel {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out prepared channels in order; `Err` entries fail the open
#[derive(Default)]
pub(crate) struct ScriptedOpener {
    channels: Mutex<VecDeque<std::result::Result<ScriptedChannel, String>>>,
    opens: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    pub fn new(channels: Vec<std::result::Result<ScriptedChannel, String>>) -> Self {
        ScriptedOpener {
            channels: Mutex::new(channels.into()),
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_channel(channel: ScriptedChannel) -> Self {
        Self::new(vec![Ok(channel)])
    }

    pub fn open_counter(&self) -> Arc<AtomicUsize> {
        self.opens.clone()
    }
}

impl ChannelOpener for ScriptedOpener {
    fn open(&self, config: &ReaderConfig) -> Result<Box<dyn ByteChannel>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let next = self
            .channels
            .lock()
            .map_err(|e| ReaderError::ChannelOpen(e.to_string()))?
            .pop_front();
        match next {
            Some(Ok(channel)) => Ok(Box::new(channel)),
            Some(Err(reason)) => Err(ReaderError::ChannelOpen(reason)),
            None => Err(ReaderError::ChannelOpen(format!("No such device: {}", config.port))),
        }
    }
}
