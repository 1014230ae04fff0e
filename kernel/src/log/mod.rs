// Command Log
//
// Records and the fixed-capacity ring that holds the most recent ones.
// Nothing in this module synchronizes; see `crate::access` for that.

pub mod ring;
pub mod store;

pub use ring::CircularLog;
pub use store::RecordStore;

/// Byte that terminates a command.
pub const TERMINATOR: u8 = b'\n';

/// Number of commands retained by default.
pub const DEFAULT_CAPACITY: usize = 10;

/// A single complete command.
///
/// Immutable once built. The length is always the length of the owned bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    bytes: Vec<u8>,
}

impl Record {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Whether the record ends with the command terminator.
    pub fn is_terminated(&self) -> bool {
        self.bytes.last() == Some(&TERMINATOR)
    }
}

impl From<Vec<u8>> for Record {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl From<&[u8]> for Record {
    fn from(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }
}

impl From<&str> for Record {
    fn from(text: &str) -> Self {
        Self::from(text.as_bytes())
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LogError {
    #[error("interrupted while waiting for the log lock")]
    Interrupted,

    #[error("offset {offset} is past the end of the log")]
    NotFound { offset: usize },

    #[error("command index {index} out of range ({len} live commands)")]
    OutOfRange { index: usize, len: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unable to allocate {requested} bytes")]
    ResourceExhausted { requested: usize },
}
