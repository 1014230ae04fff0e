// Circular Command Log
//
// Fixed-capacity ring of the last N commands. Addressable as one flat
// byte stream (oldest record first) or by command index.

use super::{LogError, Record, RecordStore};

/// Ring of the most recent records.
///
/// Live records run oldest-first from `read_index`, wrapping through
/// `write_index`. `full` is set once the two indexes meet after an append.
#[derive(Debug)]
pub struct CircularLog {
    slots: Box<[Option<Record>]>,
    write_index: usize,
    read_index: usize,
    full: bool,
}

impl CircularLog {
    /// Create an empty ring holding at most `capacity` records.
    pub fn new(capacity: usize) -> Result<Self, LogError> {
        if capacity == 0 {
            return Err(LogError::InvalidArgument(
                "log capacity must be at least 1".into(),
            ));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| LogError::ResourceExhausted {
                requested: capacity,
            })?;
        slots.resize_with(capacity, || None);

        Ok(Self {
            slots: slots.into_boxed_slice(),
            write_index: 0,
            read_index: 0,
            full: false,
        })
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    /// Live records, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Record> + '_ {
        (0..self.live_count()).filter_map(move |i| self.slots[self.slot(i)].as_ref())
    }

    fn slot(&self, index: usize) -> usize {
        (self.read_index + index) % self.slots.len()
    }

    fn live_count(&self) -> usize {
        if self.full {
            self.slots.len()
        } else {
            (self.write_index + self.slots.len() - self.read_index) % self.slots.len()
        }
    }
}

impl RecordStore for CircularLog {
    fn append(&mut self, record: Record) -> Option<Record> {
        let capacity = self.slots.len();

        let evicted = if self.full {
            self.slots[self.read_index].take()
        } else {
            None
        };

        self.slots[self.write_index] = Some(record);
        self.write_index = (self.write_index + 1) % capacity;

        if self.full {
            self.read_index = (self.read_index + 1) % capacity;
        }

        if self.write_index == self.read_index {
            self.full = true;
        }

        evicted
    }

    fn find(&self, logical_offset: usize) -> Result<(&Record, usize), LogError> {
        let mut running_total = 0;

        for record in self.iter() {
            if logical_offset < running_total + record.len() {
                return Ok((record, logical_offset - running_total));
            }
            running_total += record.len();
        }

        Err(LogError::NotFound {
            offset: logical_offset,
        })
    }

    fn nth_record(&self, index: usize) -> Result<&Record, LogError> {
        let len = self.live_count();
        if index >= len {
            return Err(LogError::OutOfRange { index, len });
        }

        self.slots[self.slot(index)]
            .as_ref()
            .ok_or(LogError::OutOfRange { index, len })
    }

    fn total_size(&self) -> usize {
        self.iter().map(Record::len).sum()
    }

    fn len(&self) -> usize {
        self.live_count()
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.write_index = 0;
        self.read_index = 0;
        self.full = false;
    }
}
