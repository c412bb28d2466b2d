use std::io;

use crate::SegmentId;

#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Invalid WAL segment file name: {bad_file_name}: {reason}")]
pub struct InvalidSegmentFileName {
    pub bad_file_name: String,
    pub reason: String,
}

impl InvalidSegmentFileName {
    pub fn new(bad_file_name: impl ToString, reason: impl ToString) -> Self {
        Self {
            bad_file_name: bad_file_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// A record that is completely present on disk but fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[derive(thiserror::Error)]
#[error("Corrupt record in {segment_id} at offset {offset}: {reason}")]
pub struct CorruptRecord {
    pub segment_id: SegmentId,
    /// Byte offset of the record within the segment file.
    pub offset: u64,
    pub reason: String,
}

impl CorruptRecord {
    pub fn new(
        segment_id: SegmentId,
        offset: u64,
        reason: impl ToString,
    ) -> Self {
        Self {
            segment_id,
            offset,
            reason: reason.to_string(),
        }
    }
}

impl From<CorruptRecord> for io::Error {
    fn from(value: CorruptRecord) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, value)
    }
}
