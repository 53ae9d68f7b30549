// src/line_store.rs
//
// Ordered, append-only store of completed lines.
// One writer (the acquisition worker), any number of readers. Append and
// every read go through the same RwLock, so a reader never sees a torn Vec.

use std::borrow::Cow;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{ReaderError, Result};
use crate::io::framer::{FramedLine, LineEnd};
use crate::snapshot::Snapshot;

/// A completed line as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub bytes: Vec<u8>,
    pub end: LineEnd,
    /// Host UNIX timestamp in microseconds.
    pub timestamp_us: u64,
}

impl LineRecord {
    /// Line contents as text; invalid UTF-8 is replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

impl AsRef<[u8]> for LineRecord {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Default)]
pub struct LineStore {
    lines: RwLock<Vec<LineRecord>>,
}

impl LineStore {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-pushed record,
    // so poisoned guards are still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Vec<LineRecord>> {
        self.lines.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<LineRecord>> {
        self.lines.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a line. Returns its index.
    pub fn push(&self, line: FramedLine, timestamp_us: u64) -> usize {
        let mut lines = self.write();
        lines.push(LineRecord {
            bytes: line.bytes,
            end: line.end,
            timestamp_us,
        });
        lines.len() - 1
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Most recent line, or `ReaderError::Empty`
    pub fn last_line(&self) -> Result<LineRecord> {
        self.read().last().cloned().ok_or(ReaderError::Empty)
    }

    pub fn get(&self, index: usize) -> Option<LineRecord> {
        self.read().get(index).cloned()
    }

    /// Lines from `start` onwards, for incremental polling
    pub fn lines_since(&self, start: usize) -> Vec<LineRecord> {
        let lines = self.read();
        lines.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<LineRecord> {
        self.read().clone()
    }

    /// Point-in-time flat copy of every stored line
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_lines(self.read().as_slice())
    }

    /// Drop all lines and release their memory
    pub fn clear(&self) {
        let mut lines = self.write();
        lines.clear();
        lines.shrink_to_fit();
    }
}
