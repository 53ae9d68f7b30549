// src/io/channel.rs
//
// ByteChannel over any `Read` source. Reads the device in chunks and hands
// the bytes out one at a time.

use std::io::{ErrorKind, Read};

use super::{ByteChannel, ReadOutcome};

const CHUNK_SIZE: usize = 256;

pub struct StreamChannel<R> {
    inner: R,
    buf: [u8; CHUNK_SIZE],
    pos: usize,
    filled: usize,
}

impl<R: Read + Send> StreamChannel<R> {
    pub fn new(inner: R) -> Self {
        StreamChannel {
            inner,
            buf: [0u8; CHUNK_SIZE],
            pos: 0,
            filled: 0,
        }
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }
}

impl<R: Read + Send> ByteChannel for StreamChannel<R> {
    fn read_byte(&mut self) -> std::io::Result<ReadOutcome> {
        if self.pos < self.filled {
            let byte = self.buf[self.pos];
            self.pos += 1;
            return Ok(ReadOutcome::Byte(byte));
        }

        match self.inner.read(&mut self.buf) {
            // EOF - port closed/disconnected
            Ok(0) => Ok(ReadOutcome::Closed),
            Ok(n) => {
                self.filled = n;
                self.pos = 1;
                Ok(ReadOutcome::Byte(self.buf[0]))
            }
            // Timeout is expected for serial reads
            Err(ref e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                Ok(ReadOutcome::Idle)
            }
            Err(e) => Err(e),
        }
    }
}
