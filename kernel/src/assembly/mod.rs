// Record Assembly
//
// Accumulates raw bytes from a front end until a terminator shows up,
// then splits the complete command off as a `Record`.

use crate::log::{LogError, Record, TERMINATOR};

/// Accumulation buffer for one stream of writes.
///
/// Not shared: each owner feeds it from a single source. Callers that
/// share one assembler between writers must serialize access themselves.
#[derive(Debug, Default)]
pub struct RecordAssembler {
    buffer: Vec<u8>,
    carry_over_remainder: bool,
}

impl RecordAssembler {
    /// Create an empty assembler.
    ///
    /// With `carry_over_remainder` set, bytes after a terminator stay
    /// buffered for the next command. Without it, the first terminator in
    /// a chunk ends the command and the rest of that chunk is dropped.
    pub fn new(carry_over_remainder: bool) -> Self {
        Self {
            buffer: Vec::new(),
            carry_over_remainder,
        }
    }

    /// Feed a chunk, returning every command it completed (oldest first).
    ///
    /// A chunk without a terminator completes nothing. On allocation
    /// failure the buffer is left exactly as it was.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Record>, LogError> {
        let scan_from = self.buffer.len();

        if self.carry_over_remainder {
            self.reserve(chunk.len())?;
            self.buffer.extend_from_slice(chunk);
            return Ok(self.split_complete(scan_from));
        }

        match chunk.iter().position(|&b| b == TERMINATOR) {
            Some(end) => {
                self.reserve(end + 1)?;
                self.buffer.extend_from_slice(&chunk[..=end]);
                Ok(vec![Record::from(std::mem::take(&mut self.buffer))])
            }
            None => {
                self.reserve(chunk.len())?;
                self.buffer.extend_from_slice(chunk);
                Ok(Vec::new())
            }
        }
    }

    /// Number of bytes waiting for a terminator.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard any partially assembled command.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    fn reserve(&mut self, additional: usize) -> Result<(), LogError> {
        self.buffer
            .try_reserve(additional)
            .map_err(|_| LogError::ResourceExhausted {
                requested: self.buffer.len().saturating_add(additional),
            })
    }

    /// Split off every command completed by bytes at or after `scan_from`.
    ///
    /// Bytes before `scan_from` never hold a terminator. The leftover tail
    /// is shifted once, however many commands the buffer held.
    fn split_complete(&mut self, scan_from: usize) -> Vec<Record> {
        let mut records = Vec::new();
        let mut start = 0;

        for (i, &b) in self.buffer.iter().enumerate().skip(scan_from) {
            if b == TERMINATOR {
                records.push(Record::from(&self.buffer[start..=i]));
                start = i + 1;
            }
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
        records
    }
}
