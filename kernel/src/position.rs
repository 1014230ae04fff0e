// Position Translation
//
// Maps between the flat logical byte stream and
// (command index, offset within command) pairs.
// Pure functions over a `RecordStore`; callers hold whatever lock applies.

use serde::{Deserialize, Serialize};

use crate::log::{LogError, RecordStore};

/// A location expressed as a command and an offset inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Oldest-first index among live commands.
    pub command_index: usize,
    pub command_offset: usize,
}

/// Bytes returned by a sequential read together with the advanced cursor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReadChunk {
    pub bytes: Vec<u8>,
    pub next_offset: usize,
}

impl ReadChunk {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Translate a logical offset into the command that contains it.
pub fn locate<S: RecordStore + ?Sized>(
    store: &S,
    logical_offset: usize,
) -> Result<Position, LogError> {
    let mut running_total = 0;

    for command_index in 0..store.len() {
        let size = store.nth_record(command_index)?.len();
        if logical_offset < running_total + size {
            return Ok(Position {
                command_index,
                command_offset: logical_offset - running_total,
            });
        }
        running_total += size;
    }

    Err(LogError::NotFound {
        offset: logical_offset,
    })
}

/// Read up to `max_len` bytes from a single command, starting at `logical_offset`.
///
/// Reads never span two commands. Past the end of the stream the chunk is
/// empty and the cursor stays where it was.
pub fn read_from<S: RecordStore + ?Sized>(
    store: &S,
    logical_offset: usize,
    max_len: usize,
) -> ReadChunk {
    match store.find(logical_offset) {
        Ok((record, intra)) => {
            let count = max_len.min(record.len() - intra);
            ReadChunk {
                bytes: record.as_bytes()[intra..intra + count].to_vec(),
                next_offset: logical_offset + count,
            }
        }
        Err(_) => ReadChunk {
            bytes: Vec::new(),
            next_offset: logical_offset,
        },
    }
}

/// Translate a command-addressed position into a logical offset.
///
/// `command_offset` may equal the command's length (the position just past it).
pub fn resolve<S: RecordStore + ?Sized>(store: &S, target: Position) -> Result<usize, LogError> {
    let Position {
        command_index,
        command_offset,
    } = target;

    let record = store.nth_record(command_index).map_err(|_| {
        LogError::InvalidArgument(format!(
            "command {command_index} is not live ({} commands)",
            store.len()
        ))
    })?;

    if command_offset > record.len() {
        return Err(LogError::InvalidArgument(format!(
            "offset {command_offset} is past the end of command {command_index} ({} bytes)",
            record.len()
        )));
    }

    let start = store
        .offset_of(command_index)
        .map_err(|e| LogError::InvalidArgument(e.to_string()))?;

    Ok(start + command_offset)
}
