// src/snapshot.rs
//
// Flat, immutable copies of the line store.
//
// A `Snapshot` is one contiguous buffer holding every line followed by a NUL
// separator, plus the offset of each line in arrival order. `ExportedLines`
// adds the C pointer table over that buffer; the owner keeps it alive for as
// long as the pointers are handed out.

use std::os::raw::c_char;

/// Point-in-time copy of accumulated lines
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    buffer: Box<[u8]>,
    offsets: Box<[usize]>,
}

impl Snapshot {
    pub fn from_lines<L: AsRef<[u8]>>(lines: &[L]) -> Self {
        let total_len: usize = lines.iter().map(|l| l.as_ref().len() + 1).sum();

        let mut buffer = Vec::with_capacity(total_len);
        let mut offsets = Vec::with_capacity(lines.len());
        for line in lines {
            offsets.push(buffer.len());
            buffer.extend_from_slice(line.as_ref());
            buffer.push(0);
        }

        Snapshot {
            buffer: buffer.into_boxed_slice(),
            offsets: offsets.into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Line `index` without its separator
    pub fn get(&self, index: usize) -> Option<&[u8]> {
        let start = *self.offsets.get(index)?;
        let end = self
            .offsets
            .get(index + 1)
            .copied()
            .unwrap_or(self.buffer.len())
            - 1;
        self.buffer.get(start..end)
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }

    /// The raw NUL-separated buffer
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Lines as text, invalid UTF-8 replaced
    pub fn to_strings(&self) -> Vec<String> {
        self.iter()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .collect()
    }
}

// =============================================================================
// C Export
// =============================================================================

/// Line array handed across the C boundary.
/// Layout matches `struct ResultStruct { unsigned long long size; const char** results; }`.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LineArray {
    pub size: u64,
    pub results: *const *const c_char,
}

impl LineArray {
    pub fn empty() -> Self {
        LineArray {
            size: 0,
            results: std::ptr::null(),
        }
    }
}

/// A snapshot together with the C pointer table into it.
///
/// Pointers stay valid until this value is dropped: the boxed buffer never
/// moves, even when `ExportedLines` itself does.
pub struct ExportedLines {
    snapshot: Snapshot,
    pointers: Box<[*const c_char]>,
}

// SAFETY: the pointers only ever address `snapshot.buffer`, which is owned by
// this value and never mutated after construction.
unsafe impl Send for ExportedLines {}
unsafe impl Sync for ExportedLines {}

impl ExportedLines {
    pub fn new(snapshot: Snapshot) -> Self {
        let base = snapshot.buffer.as_ptr();
        let pointers = snapshot
            .offsets
            .iter()
            .map(|&offset| base.wrapping_add(offset) as *const c_char)
            .collect();
        ExportedLines { snapshot, pointers }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn as_line_array(&self) -> LineArray {
        if self.pointers.is_empty() {
            return LineArray::empty();
        }
        LineArray {
            size: self.pointers.len() as u64,
            results: self.pointers.as_ptr(),
        }
    }
}
