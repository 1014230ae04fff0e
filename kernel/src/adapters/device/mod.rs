// Character Device Adapter
//
// File-like front end over the shared command log. Each `open` yields a
// handle with its own cursor; writes go through the log's shared
// accumulation buffer, so partial commands persist across handles.

use std::io;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::access::{Interrupt, SharedLog};
use crate::log::LogError;

/// Reference point for `llseek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Current,
    End,
}

/// Seek request addressed by command rather than byte offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeekTo {
    /// Oldest-first index of the command to seek into.
    pub write_cmd: u32,
    /// Byte offset within that command.
    pub write_cmd_offset: u32,
}

/// The device node: one shared log, any number of open handles.
#[derive(Debug, Clone)]
pub struct CharDevice {
    log: Arc<SharedLog>,
}

impl CharDevice {
    pub fn new(log: Arc<SharedLog>) -> Self {
        Self { log }
    }

    /// Open a handle positioned at the start of the log.
    pub fn open(&self) -> DeviceHandle {
        debug!("open");
        DeviceHandle {
            log: Arc::clone(&self.log),
            cursor: 0,
            interrupt: Interrupt::new(),
        }
    }
}

/// One open file on the device.
#[derive(Debug)]
pub struct DeviceHandle {
    log: Arc<SharedLog>,
    cursor: usize,
    interrupt: Interrupt,
}

impl DeviceHandle {
    /// Current logical offset.
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Handle that aborts this file's waits on the log lock.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    /// Read from the command under the cursor. Never spans two commands;
    /// returns 0 at end of log.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, LogError> {
        debug!(count = buf.len(), offset = self.cursor, "read");

        let chunk = self.log.read_at(self.cursor, buf.len(), &self.interrupt)?;
        buf[..chunk.len()].copy_from_slice(&chunk.bytes);
        self.cursor = chunk.next_offset;

        Ok(chunk.len())
    }

    /// Write raw bytes. A command becomes visible once its terminator arrives.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, LogError> {
        debug!(count = data.len(), offset = self.cursor, "write");

        let outcome = self.log.write_chunk(data, &self.interrupt)?;
        if !outcome.evicted.is_empty() {
            debug!(evicted = outcome.evicted.len(), "dropped oldest commands");
        }

        Ok(outcome.accepted)
    }

    /// Reposition the cursor within `[0, total_size]`.
    pub fn llseek(&mut self, offset: i64, whence: Whence) -> Result<usize, LogError> {
        let size = self.log.total_size(&self.interrupt)?;
        let base = match whence {
            Whence::Set => 0,
            Whence::Current => self.cursor,
            Whence::End => size,
        };

        let target = i64::try_from(base)
            .ok()
            .and_then(|base| base.checked_add(offset))
            .and_then(|pos| usize::try_from(pos).ok())
            .filter(|&pos| pos <= size)
            .ok_or_else(|| {
                LogError::InvalidArgument(format!(
                    "seek to {offset} from {whence:?} leaves the log ({size} bytes)"
                ))
            })?;

        self.cursor = target;
        Ok(target)
    }

    /// Move the cursor to `write_cmd_offset` bytes into command `write_cmd`.
    pub fn seek_to(&mut self, request: SeekTo) -> Result<usize, LogError> {
        debug!(
            command = request.write_cmd,
            offset = request.write_cmd_offset,
            "seek to command"
        );

        let target = self.log.seek_by_command(
            request.write_cmd as usize,
            request.write_cmd_offset as usize,
            &self.interrupt,
        )?;

        self.cursor = target;
        Ok(target)
    }
}

fn to_io_error(err: LogError) -> io::Error {
    let kind = match err {
        LogError::Interrupted => io::ErrorKind::Interrupted,
        LogError::InvalidArgument(_) | LogError::OutOfRange { .. } => io::ErrorKind::InvalidInput,
        LogError::NotFound { .. } => io::ErrorKind::UnexpectedEof,
        LogError::ResourceExhausted { .. } => io::ErrorKind::OutOfMemory,
    };
    io::Error::new(kind, err)
}

impl io::Read for DeviceHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        DeviceHandle::read(self, buf).map_err(to_io_error)
    }
}

impl io::Write for DeviceHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        DeviceHandle::write(self, buf).map_err(to_io_error)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Seek for DeviceHandle {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, whence) = match pos {
            io::SeekFrom::Start(offset) => (
                i64::try_from(offset).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "seek offset too large")
                })?,
                Whence::Set,
            ),
            io::SeekFrom::Current(offset) => (offset, Whence::Current),
            io::SeekFrom::End(offset) => (offset, Whence::End),
        };

        self.llseek(offset, whence)
            .map(|pos| pos as u64)
            .map_err(to_io_error)
    }
}
