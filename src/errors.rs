mod storage_errors;

use std::io;

pub use storage_errors::CorruptRecord;
pub use storage_errors::InvalidSegmentFileName;

use crate::SegmentId;

/// Error returned by the read path: [`Cursor`](crate::Cursor).
///
/// Reading past the live tail of the log is not an error; it is reported as
/// "no data yet" by the cursor.
#[derive(Debug)]
#[derive(thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Collected(#[from] LsnCollected),

    #[error(transparent)]
    Corrupt(#[from] CorruptRecord),
}

impl From<ReadError> for io::Error {
    fn from(value: ReadError) -> Self {
        match value {
            ReadError::Io(e) => e,
            ReadError::Collected(e) => {
                io::Error::new(io::ErrorKind::NotFound, e)
            }
            ReadError::Corrupt(e) => e.into(),
        }
    }
}

/// Error indicating that the requested LSN lives in a segment that has been
/// garbage collected.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("LSN {lsn} is collected: minimal retained LSN is {min:?}")]
pub struct LsnCollected {
    pub lsn: u64,
    /// The minimal retained segment id when the condition was detected.
    pub min: Option<SegmentId>,
}

impl LsnCollected {
    pub fn new(lsn: u64, min: Option<SegmentId>) -> Self {
        Self { lsn, min }
    }
}

/// Error indicating that a slot is added to a log twice.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Slot is already added to the log; watermark: {watermark}")]
pub struct SlotAlreadyAdded {
    pub watermark: u64,
}

impl SlotAlreadyAdded {
    pub fn new(watermark: u64) -> Self {
        Self { watermark }
    }
}

impl From<SlotAlreadyAdded> for io::Error {
    fn from(value: SlotAlreadyAdded) -> Self {
        io::Error::new(io::ErrorKind::InvalidInput, value)
    }
}
