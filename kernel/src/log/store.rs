// Record Store Abstraction
//
// Defines the contract between the access layer and the ring that
// actually holds commands.
//
// This module defines *interfaces only*.

use super::{LogError, Record};

/// Storage for the most recent commands.
///
/// Properties required from implementations:
/// - Bounded: at most `capacity()` records live at once
/// - Ordered: oldest first, index 0 is the oldest live record
/// - Evicting: appending to a full store drops the oldest record
///
/// Implementations MUST NOT:
/// - Reorder records
/// - Mutate stored records
/// - Free an evicted record on the caller's behalf
pub trait RecordStore: Send {
    /// Insert a record, returning the one evicted to make room (if any).
    fn append(&mut self, record: Record) -> Option<Record>;

    /// Locate the record containing `logical_offset` and the offset inside it.
    fn find(&self, logical_offset: usize) -> Result<(&Record, usize), LogError>;

    /// Oldest-first lookup by command index.
    fn nth_record(&self, index: usize) -> Result<&Record, LogError>;

    /// Sum of the lengths of all live records.
    fn total_size(&self) -> usize;

    /// Number of live records.
    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Drop every live record.
    fn clear(&mut self);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Logical offset at which the record at `index` starts.
    fn offset_of(&self, index: usize) -> Result<usize, LogError> {
        let len = self.len();
        if index >= len {
            return Err(LogError::OutOfRange { index, len });
        }
        let mut offset = 0;
        for i in 0..index {
            offset += self.nth_record(i)?.len();
        }
        Ok(offset)
    }
}
