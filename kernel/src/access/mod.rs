// Concurrent Access Layer
//
// The only way front ends reach the command log. Every operation runs
// under one exclusive lock, and waiting for that lock can be interrupted.

mod interrupt;

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::assembly::RecordAssembler;
use crate::log::{CircularLog, LogError, Record, RecordStore};
use crate::position::{self, Position, ReadChunk};

pub use interrupt::Interrupt;

/// How long a blocked caller waits before re-checking its interrupt.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Result of feeding raw bytes through the shared accumulation buffer.
#[derive(Debug, Default)]
pub struct WriteOutcome {
    /// Bytes taken from the caller (always the whole chunk on success).
    pub accepted: usize,
    /// Commands completed and appended by this write.
    pub committed: usize,
    /// Commands pushed out of the log, handed back for the caller to drop.
    pub evicted: Vec<Record>,
}

#[derive(Debug)]
struct LogState<S> {
    store: S,
    pending: RecordAssembler,
}

/// Command log shared between threads.
///
/// Also owns the accumulation buffer used by `write_chunk`, under the same
/// lock as the store, so assembling and appending a command is one step.
#[derive(Debug)]
pub struct SharedLog<S = CircularLog> {
    state: Mutex<LogState<S>>,
    capacity: usize,
}

impl SharedLog<CircularLog> {
    /// Shared ring holding at most `capacity` commands.
    pub fn with_capacity(capacity: usize) -> Result<Self, LogError> {
        Ok(Self::new(CircularLog::new(capacity)?))
    }
}

impl<S: RecordStore> SharedLog<S> {
    pub fn new(store: S) -> Self {
        Self::with_assembler(store, RecordAssembler::new(true))
    }

    pub fn with_assembler(store: S, pending: RecordAssembler) -> Self {
        Self {
            capacity: store.capacity(),
            state: Mutex::new(LogState { store, pending }),
        }
    }

    /// Append a complete command, returning the evicted one (if any).
    pub fn append(
        &self,
        record: Record,
        interrupt: &Interrupt,
    ) -> Result<Option<Record>, LogError> {
        let mut state = self.lock(interrupt)?;
        Ok(state.store.append(record))
    }

    /// Feed raw bytes through the shared accumulation buffer, appending
    /// every command they complete.
    pub fn write_chunk(
        &self,
        chunk: &[u8],
        interrupt: &Interrupt,
    ) -> Result<WriteOutcome, LogError> {
        let mut state = self.lock(interrupt)?;
        let completed = state.pending.push(chunk)?;

        let committed = completed.len();
        let evicted = completed
            .into_iter()
            .filter_map(|record| state.store.append(record))
            .collect();

        Ok(WriteOutcome {
            accepted: chunk.len(),
            committed,
            evicted,
        })
    }

    /// Copy of the command containing `logical_offset` and the offset inside it.
    pub fn find(
        &self,
        logical_offset: usize,
        interrupt: &Interrupt,
    ) -> Result<(Record, usize), LogError> {
        let state = self.lock(interrupt)?;
        let (record, intra) = state.store.find(logical_offset)?;
        Ok((record.clone(), intra))
    }

    /// Command-addressed form of `logical_offset`.
    pub fn locate(
        &self,
        logical_offset: usize,
        interrupt: &Interrupt,
    ) -> Result<Position, LogError> {
        let state = self.lock(interrupt)?;
        position::locate(&state.store, logical_offset)
    }

    /// Sequential read of at most `max_len` bytes at `logical_offset`.
    pub fn read_at(
        &self,
        logical_offset: usize,
        max_len: usize,
        interrupt: &Interrupt,
    ) -> Result<ReadChunk, LogError> {
        let state = self.lock(interrupt)?;
        Ok(position::read_from(&state.store, logical_offset, max_len))
    }

    /// Logical offset of `command_offset` bytes into command `command_index`.
    pub fn seek_by_command(
        &self,
        command_index: usize,
        command_offset: usize,
        interrupt: &Interrupt,
    ) -> Result<usize, LogError> {
        let state = self.lock(interrupt)?;
        position::resolve(
            &state.store,
            Position {
                command_index,
                command_offset,
            },
        )
    }

    pub fn nth_record(&self, index: usize, interrupt: &Interrupt) -> Result<Record, LogError> {
        let state = self.lock(interrupt)?;
        state.store.nth_record(index).cloned()
    }

    pub fn total_size(&self, interrupt: &Interrupt) -> Result<usize, LogError> {
        Ok(self.lock(interrupt)?.store.total_size())
    }

    /// Number of live commands.
    pub fn len(&self, interrupt: &Interrupt) -> Result<usize, LogError> {
        Ok(self.lock(interrupt)?.store.len())
    }

    /// Fixed at construction, so readable without the lock.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The whole logical stream, oldest command first.
    pub fn snapshot(&self, interrupt: &Interrupt) -> Result<Vec<u8>, LogError> {
        let state = self.lock(interrupt)?;
        let store = &state.store;

        let mut out = Vec::new();
        out.try_reserve(store.total_size())
            .map_err(|_| LogError::ResourceExhausted {
                requested: store.total_size(),
            })?;

        for index in 0..store.len() {
            out.extend_from_slice(store.nth_record(index)?.as_bytes());
        }
        Ok(out)
    }

    /// Bytes sitting in the shared accumulation buffer.
    pub fn pending_bytes(&self, interrupt: &Interrupt) -> Result<usize, LogError> {
        Ok(self.lock(interrupt)?.pending.pending())
    }

    /// Drop every command and any partially assembled write.
    pub fn clear(&self, interrupt: &Interrupt) -> Result<(), LogError> {
        let mut state = self.lock(interrupt)?;
        state.store.clear();
        state.pending.reset();
        Ok(())
    }

    fn lock(&self, interrupt: &Interrupt) -> Result<MutexGuard<'_, LogState<S>>, LogError> {
        if let Some(guard) = self.state.try_lock() {
            return Ok(guard);
        }

        loop {
            if interrupt.is_fired() {
                return Err(LogError::Interrupted);
            }
            if let Some(guard) = self.state.try_lock_for(LOCK_POLL_INTERVAL) {
                return Ok(guard);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn log(capacity: usize) -> SharedLog {
        SharedLog::with_capacity(capacity).unwrap()
    }

    #[test]
    fn append_reports_eviction() {
        let log = log(2);
        let none = Interrupt::new();

        assert_eq!(log.append(Record::from("a\n"), &none).unwrap(), None);
        assert_eq!(log.append(Record::from("b\n"), &none).unwrap(), None);
        assert_eq!(
            log.append(Record::from("c\n"), &none).unwrap(),
            Some(Record::from("a\n"))
        );
        assert_eq!(log.snapshot(&none).unwrap(), b"b\nc\n");
    }

    #[test]
    fn write_chunk_assembles_under_the_lock() {
        let log = log(3);
        let none = Interrupt::new();

        let outcome = log.write_chunk(b"part", &none).unwrap();
        assert_eq!((outcome.accepted, outcome.committed), (4, 0));
        assert_eq!(log.total_size(&none).unwrap(), 0);
        assert_eq!(log.pending_bytes(&none).unwrap(), 4);

        let outcome = log.write_chunk(b"ial\nx\ny\nz\n", &none).unwrap();
        assert_eq!(outcome.committed, 4);
        assert_eq!(outcome.evicted, vec![Record::from("partial\n")]);
        assert_eq!(log.snapshot(&none).unwrap(), b"x\ny\nz\n");
    }

    #[test]
    fn seek_then_read() {
        let log = log(3);
        let none = Interrupt::new();
        log.write_chunk(b"a\nbb\nccc\ndddd\n", &none).unwrap();

        let offset = log.seek_by_command(1, 2, &none).unwrap();
        assert_eq!(offset, 5);

        let chunk = log.read_at(offset, 10, &none).unwrap();
        assert_eq!(chunk.bytes, b"c\n");
        assert_eq!(chunk.next_offset, 7);

        assert!(matches!(
            log.seek_by_command(3, 0, &none),
            Err(LogError::InvalidArgument(_))
        ));
    }

    #[test]
    fn find_and_locate_agree() {
        let log = log(3);
        let none = Interrupt::new();
        log.write_chunk(b"a\nbb\nccc\ndddd\n", &none).unwrap();

        let (record, intra) = log.find(11, &none).unwrap();
        assert_eq!((record, intra), (Record::from("dddd\n"), 4));
        assert_eq!(
            log.locate(11, &none).unwrap(),
            Position {
                command_index: 2,
                command_offset: 4
            }
        );
        assert_eq!(log.nth_record(0, &none).unwrap(), Record::from("bb\n"));
    }

    #[test]
    fn clear_drops_commands_and_pending_bytes() {
        let log = log(3);
        let none = Interrupt::new();
        log.write_chunk(b"one\ntw", &none).unwrap();

        log.clear(&none).unwrap();
        assert_eq!(log.len(&none).unwrap(), 0);
        assert_eq!(log.pending_bytes(&none).unwrap(), 0);
    }

    #[test]
    fn blocked_caller_can_be_interrupted() {
        let log = Arc::new(log(3));
        let interrupt = Interrupt::new();

        let held = log.state.lock();

        let waiter = {
            let log = Arc::clone(&log);
            let interrupt = interrupt.clone();
            thread::spawn(move || log.append(Record::from("late\n"), &interrupt))
        };

        thread::sleep(Duration::from_millis(30));
        interrupt.fire();

        assert_eq!(waiter.join().unwrap(), Err(LogError::Interrupted));
        drop(held);

        let none = Interrupt::new();
        assert_eq!(log.len(&none).unwrap(), 0);
    }

    #[test]
    fn capacity_does_not_wait_for_the_lock() {
        let log = Arc::new(log(7));
        let held = log.state.lock();

        let reader = {
            let log = Arc::clone(&log);
            thread::spawn(move || log.capacity())
        };

        assert_eq!(reader.join().unwrap(), 7);
        drop(held);
    }

    #[test]
    fn uncontended_lock_ignores_fired_interrupt() {
        let log = log(3);
        let fired = Interrupt::new();
        fired.fire();

        assert!(log.append(Record::from("ok\n"), &fired).is_ok());
    }
}
