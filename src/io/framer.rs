// src/io/framer.rs
//
// Terminator-based line framing for serial byte streams.
// Bytes are fed one at a time; completed lines are returned as they close.

use serde::Deserialize;

use crate::error::{ReaderError, Result};

/// Default line buffer capacity in bytes
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

// =============================================================================
// Terminator
// =============================================================================

/// The exact byte sequence that closes a line.
///
/// Carries a precomputed fallback table so that an abandoned partial match
/// can resume on the longest terminator prefix that is still in play.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TerminatorRepr")]
pub struct Terminator {
    bytes: Vec<u8>,
    fallback: Vec<usize>,
}

/// Accepted config forms: `"\r\n"` or `{ hex = "0D0A" }`
#[derive(Deserialize)]
#[serde(untagged)]
enum TerminatorRepr {
    Text(String),
    Hex { hex: String },
}

impl TryFrom<TerminatorRepr> for Terminator {
    type Error = ReaderError;

    fn try_from(repr: TerminatorRepr) -> Result<Self> {
        match repr {
            TerminatorRepr::Text(text) => Terminator::new(text.into_bytes()),
            TerminatorRepr::Hex { hex } => Terminator::from_hex(&hex),
        }
    }
}

impl Terminator {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ReaderError::InvalidConfig(
                "Terminator must not be empty".to_string(),
            ));
        }
        let fallback = build_fallback(&bytes);
        Ok(Terminator { bytes, fallback })
    }

    /// Parse hex string to a terminator (e.g., "0D0A" -> CRLF)
    pub fn from_hex(hex: &str) -> Result<Self> {
        let hex = hex.trim();
        if hex.len() % 2 != 0 {
            return Err(ReaderError::InvalidConfig(
                "Hex string must have even length".to_string(),
            ));
        }
        let mut bytes = Vec::with_capacity(hex.len() / 2);
        for i in (0..hex.len()).step_by(2) {
            let byte_str = hex.get(i..i + 2).ok_or_else(|| {
                ReaderError::InvalidConfig(format!("Invalid hex string: {}", hex))
            })?;
            let byte = u8::from_str_radix(byte_str, 16)
                .map_err(|_| ReaderError::InvalidConfig(format!("Invalid hex byte: {}", byte_str)))?;
            bytes.push(byte);
        }
        Terminator::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for Terminator {
    fn default() -> Self {
        Terminator {
            bytes: vec![b'\r', b'\n'],
            fallback: vec![0, 0],
        }
    }
}

/// fallback[i] = length of the longest proper prefix of `pattern[..=i]`
/// that is also a suffix of it.
fn build_fallback(pattern: &[u8]) -> Vec<usize> {
    let mut fallback = vec![0; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[i] != pattern[k] {
            k = fallback[k - 1];
        }
        if pattern[i] == pattern[k] {
            k += 1;
        }
        fallback[i] = k;
    }
    fallback
}

// =============================================================================
// Framed Lines
// =============================================================================

/// How a line was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnd {
    /// The full terminator was observed
    Terminator,
    /// The buffer filled up before a terminator arrived
    Overflow,
    /// The stream ended with a partial line pending
    EndOfStream,
}

/// A line extracted from the byte stream (terminator excluded)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedLine {
    pub bytes: Vec<u8>,
    pub end: LineEnd,
}

// =============================================================================
// LineFramer
// =============================================================================

/// Byte-at-a-time line framer with a bounded line buffer.
///
/// A partial terminator match is held as a count, not in the buffer. When the
/// match is abandoned the matched prefix is payload and is written back before
/// the current byte. A payload byte that would not fit forces the buffer out
/// as an `Overflow` line first, so no byte is ever dropped.
pub struct LineFramer {
    terminator: Terminator,
    buffer: Vec<u8>,
    capacity: usize,
    matched: usize,
}

impl LineFramer {
    /// Capacity must be at least the terminator length so that one fed byte
    /// can close at most one line.
    pub fn new(terminator: Terminator, capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity < terminator.len() {
            return Err(ReaderError::InvalidConfig(format!(
                "Buffer capacity {} is smaller than the {}-byte terminator",
                capacity,
                terminator.len()
            )));
        }
        Ok(LineFramer {
            terminator,
            buffer: Vec::with_capacity(capacity),
            capacity,
            matched: 0,
        })
    }

    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes held back, including a pending partial terminator
    pub fn pending_len(&self) -> usize {
        self.buffer.len() + self.matched
    }

    /// Feed one byte. Returns a line when one closes.
    pub fn feed(&mut self, byte: u8) -> Option<FramedLine> {
        let mut emitted = None;

        // Walk back through the terminator prefixes that can no longer match
        while self.matched > 0 && byte != self.terminator.bytes[self.matched] {
            let keep = self.terminator.fallback[self.matched - 1];
            for i in 0..self.matched - keep {
                let abandoned = self.terminator.bytes[i];
                if let Some(line) = self.push_payload(abandoned) {
                    emitted = Some(line);
                }
            }
            self.matched = keep;
        }

        if byte == self.terminator.bytes[self.matched] {
            self.matched += 1;
            if self.matched == self.terminator.len() {
                self.matched = 0;
                return Some(FramedLine {
                    bytes: std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity)),
                    end: LineEnd::Terminator,
                });
            }
            return emitted;
        }

        if let Some(line) = self.push_payload(byte) {
            emitted = Some(line);
        }
        emitted
    }

    /// Feed a slice of bytes, collecting every line that closes
    pub fn feed_all(&mut self, data: &[u8]) -> Vec<FramedLine> {
        data.iter().filter_map(|&b| self.feed(b)).collect()
    }

    /// Flush any remaining buffered data. Call when the stream ends.
    ///
    /// A pending partial terminator is payload here, so a full buffer may
    /// first go out as an `Overflow` line ahead of the `EndOfStream` one.
    pub fn flush(&mut self) -> Vec<FramedLine> {
        let mut lines = Vec::new();
        let matched = std::mem::take(&mut self.matched);
        for i in 0..matched {
            let byte = self.terminator.bytes[i];
            lines.extend(self.push_payload(byte));
        }
        if !self.buffer.is_empty() {
            lines.push(FramedLine {
                bytes: std::mem::take(&mut self.buffer),
                end: LineEnd::EndOfStream,
            });
        }
        lines
    }

    /// Discard all buffered state
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.matched = 0;
    }

    fn push_payload(&mut self, byte: u8) -> Option<FramedLine> {
        let forced = if self.buffer.len() >= self.capacity {
            Some(FramedLine {
                bytes: std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity)),
                end: LineEnd::Overflow,
            })
        } else {
            None
        };
        self.buffer.push(byte);
        forced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer(term: &[u8], capacity: usize) -> LineFramer {
        LineFramer::new(Terminator::new(term.to_vec()).unwrap(), capacity).unwrap()
    }

    fn texts(lines: &[FramedLine]) -> Vec<&[u8]> {
        lines.iter().map(|l| l.bytes.as_slice()).collect()
    }

    /// Rejoin lines the way they were split off the stream
    fn rejoin(lines: &[FramedLine], term: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        for line in lines {
            out.extend_from_slice(&line.bytes);
            if line.end == LineEnd::Terminator {
                out.extend_from_slice(term);
            }
        }
        out
    }

    #[test]
    fn test_crlf_lines() {
        let mut f = framer(b"\r\n", 256);
        let lines = f.feed_all(b"HELLO\r\nWORLD\r\n");
        assert_eq!(texts(&lines), vec![&b"HELLO"[..], &b"WORLD"[..]]);
        assert!(lines.iter().all(|l| l.end == LineEnd::Terminator));
        assert_eq!(f.pending_len(), 0);
    }

    #[test]
    fn test_abandoned_partial_match_is_payload() {
        let mut f = framer(b"\r\n", 256);
        let lines = f.feed_all(b"A\rB\r\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].bytes, b"A\rB".to_vec());
    }

    #[test]
    fn test_repeated_terminator_start_rematches() {
        let mut f = framer(b"\r\n", 256);
        let lines = f.feed_all(b"A\r\r\n");
        assert_eq!(texts(&lines), vec![&b"A\r"[..]]);
    }

    #[test]
    fn test_self_overlapping_terminator() {
        // The mismatch at the fourth byte resumes on the overlapping "a" prefix
        let mut f = framer(b"abab", 64);
        let lines = f.feed_all(b"abaabab");
        assert_eq!(texts(&lines), vec![&b"aba"[..]]);

        let lines = f.feed_all(b"ab|");
        assert!(lines.is_empty());
        let rest = f.flush();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].bytes, b"ab|".to_vec());
        assert_eq!(rest[0].end, LineEnd::EndOfStream);
    }

    #[test]
    fn test_empty_lines_kept() {
        let mut f = framer(b"\n", 16);
        let lines = f.feed_all(b"\n\nA\n");
        assert_eq!(texts(&lines), vec![&b""[..], &b""[..], &b"A"[..]]);
    }

    #[test]
    fn test_overflow_forces_flush() {
        let mut f = framer(b"\n", 4);
        let lines = f.feed_all(b"ABCDE\n");
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].bytes, b"ABCD".to_vec());
        assert_eq!(lines[0].end, LineEnd::Overflow);
        assert_eq!(lines[1].bytes, b"E".to_vec());
        assert_eq!(lines[1].end, LineEnd::Terminator);
    }

    #[test]
    fn test_full_buffer_then_terminator_is_not_overflow() {
        let mut f = framer(b"\n", 4);
        let lines = f.feed_all(b"ABCD\n");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].end, LineEnd::Terminator);
    }

    #[test]
    fn test_overflow_during_abandoned_match() {
        let mut f = framer(b"\r\n", 3);
        // "ABC" fills the buffer, "\r" is pending, "X" abandons it
        let lines = f.feed_all(b"ABC\rX\r\n");
        assert_eq!(texts(&lines), vec![&b"ABC"[..], &b"\rX"[..]]);
        assert_eq!(lines[0].end, LineEnd::Overflow);
    }

    #[test]
    fn test_round_trip_with_mixed_streams() {
        let streams: [&[u8]; 5] = [
            b"one\r\ntwo\r\n\r\nthree",
            b"\r\r\r\n\n\r\n",
            b"a long line that certainly overflows the buffer\r\nshort\r\n",
            b"\r",
            b"",
        ];
        for capacity in [2usize, 3, 8, 256] {
            for stream in streams {
                let mut f = framer(b"\r\n", capacity);
                let mut lines = f.feed_all(stream);
                lines.extend(f.flush());
                assert_eq!(rejoin(&lines, b"\r\n"), stream.to_vec(), "capacity {}", capacity);
                assert!(lines.iter().all(|l| l.bytes.len() <= capacity));
            }
        }
    }

    #[test]
    fn test_lines_never_exceed_capacity_while_streaming() {
        let mut f = framer(b"\n", 5);
        let lines = f.feed_all(&[b'z'; 23]);
        assert_eq!(lines.len(), 4);
        assert!(lines.iter().all(|l| l.bytes.len() == 5));
        assert_eq!(f.pending_len(), 3);
    }

    #[test]
    fn test_flush_includes_partial_terminator() {
        let mut f = framer(b"\r\n", 16);
        assert!(f.feed_all(b"tail\r").is_empty());
        let lines = f.flush();
        assert_eq!(texts(&lines), vec![&b"tail\r"[..]]);
        assert!(f.flush().is_empty());
    }

    #[test]
    fn test_flush_of_full_buffer_with_partial_terminator() {
        let mut f = framer(b"\r\n", 4);
        assert!(f.feed_all(b"ABCD\r").is_empty());
        let lines = f.flush();
        assert_eq!(texts(&lines), vec![&b"ABCD"[..], &b"\r"[..]]);
        assert_eq!(lines[0].end, LineEnd::Overflow);
        assert_eq!(lines[1].end, LineEnd::EndOfStream);
        assert_eq!(f.pending_len(), 0);
    }

    #[test]
    fn test_reset_discards_state() {
        let mut f = framer(b"\r\n", 16);
        f.feed_all(b"junk\r");
        f.reset();
        let lines = f.feed_all(b"\nok\r\n");
        assert_eq!(texts(&lines), vec![&b"\nok"[..]]);
    }

    #[test]
    fn test_capacity_smaller_than_terminator_rejected() {
        let term = Terminator::new(b"END".to_vec()).unwrap();
        assert!(LineFramer::new(term.clone(), 2).is_err());
        assert!(LineFramer::new(term, 0).is_err());
    }

    #[test]
    fn test_terminator_from_hex() {
        let term = Terminator::from_hex("0D0A").unwrap();
        assert_eq!(term, Terminator::default());
        assert!(Terminator::from_hex("0D0").is_err());
        assert!(Terminator::from_hex("ZZ").is_err());
        assert!(Terminator::from_hex("").is_err());
    }

    #[test]
    fn test_fallback_table() {
        assert_eq!(build_fallback(b"abab"), vec![0, 0, 1, 2]);
        assert_eq!(build_fallback(b"aab"), vec![0, 1, 0]);
        assert_eq!(build_fallback(b"\r\n"), vec![0, 0]);
    }
}
