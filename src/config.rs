use std::format;

use crate::errors::InvalidSegmentFileName;
use crate::SegmentId;

/// When segment data is forced to stable storage with `fdatasync`.
///
/// The log itself never waits for durability unless asked to: callers that
/// need a commit to survive a crash either pick [`SyncPolicy::EveryBatch`] or
/// call [`Wal::sync`](crate::Wal::sync) at their own cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPolicy {
    /// Never sync; rely on the OS page cache and explicit `Wal::sync()`.
    None,

    /// Sync a segment when it is superseded by rotation and on close.
    #[default]
    OnRotation,

    /// Sync the current segment after every appended batch.
    EveryBatch,
}

/// Configuration for a WAL directory.
///
/// Optional parameters are `Option<T>` in this struct, and default values is
/// evaluated when a getter method is called.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Directory that holds the segment files.
    pub dir: String,

    /// Rotate the current segment once it reaches this size in bytes.
    ///
    /// This is the initial value; it can be changed at runtime with
    /// [`Wal::set_segment_max_size`](crate::Wal::set_segment_max_size).
    pub segment_max_size: Option<u64>,

    /// Size of the read buffer used by sequential scans.
    pub read_buffer_size: Option<usize>,

    /// When to `fdatasync` segment files.
    pub sync_policy: Option<SyncPolicy>,

    /// Whether to truncate the last half written record found when opening
    /// the current segment.
    ///
    /// If truncate, the segment is considered successfully opened.
    /// Otherwise, an io::Error will be returned.
    pub truncate_incomplete_record: Option<bool>,
}

impl Config {
    /// Creates a new Config with the specified directory and default values for
    /// other fields
    pub fn new(dir: impl ToString) -> Self {
        Self {
            dir: dir.to_string(),
            ..Default::default()
        }
    }

    /// Returns the rotation threshold in bytes (defaults to 64MB)
    pub fn segment_max_size(&self) -> u64 {
        self.segment_max_size.unwrap_or(64 * 1024 * 1024)
    }

    /// Returns the size of read buffer in bytes (defaults to 64KB)
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size.unwrap_or(64 * 1024)
    }

    /// Returns the sync policy (defaults to [`SyncPolicy::OnRotation`])
    pub fn sync_policy(&self) -> SyncPolicy {
        self.sync_policy.unwrap_or_default()
    }

    /// Returns whether to truncate incomplete records (defaults to true)
    pub fn truncate_incomplete_record(&self) -> bool {
        self.truncate_incomplete_record.unwrap_or(true)
    }

    /// Returns the full path for a given segment ID
    pub fn segment_path(&self, segment_id: SegmentId) -> String {
        format!("{}/{}", self.dir, Self::segment_file_name(segment_id))
    }

    /// The file name of a segment is the decimal LSN of its first record.
    pub(crate) fn segment_file_name(segment_id: SegmentId) -> String {
        format!("{}", *segment_id)
    }

    /// Parses a segment file name and returns the segment ID.
    ///
    /// Only names made of ASCII digits that fit in a u64 are accepted: no
    /// sign, no padding characters, no suffix. Zero is not a segment id.
    pub(crate) fn parse_segment_file_name(
        file_name: &str,
    ) -> Result<SegmentId, InvalidSegmentFileName> {
        if file_name.is_empty() {
            return Err(InvalidSegmentFileName::new(file_name, "is empty"));
        }

        let mut id = 0u64;
        for c in file_name.chars() {
            let Some(digit) = c.to_digit(10) else {
                return Err(InvalidSegmentFileName::new(
                    file_name,
                    format!("contains non-digit {:?}", c),
                ));
            };

            id = id
                .checked_mul(10)
                .and_then(|x| x.checked_add(digit as u64))
                .ok_or_else(|| {
                    InvalidSegmentFileName::new(file_name, "overflows u64")
                })?;
        }

        // LSNs start at 1.
        if id == 0 {
            return Err(InvalidSegmentFileName::new(file_name, "is zero"));
        }

        Ok(SegmentId(id))
    }
}

#[cfg(test)]
mod tests {
    use super::Config;
    use crate::SegmentId;

    #[test]
    fn test_parse_segment_file_name() {
        assert_eq!(Config::parse_segment_file_name("1"), Ok(SegmentId(1)));
        assert_eq!(
            Config::parse_segment_file_name("0001200"),
            Ok(SegmentId(1200))
        );
        assert_eq!(
            Config::parse_segment_file_name("18446744073709551615"),
            Ok(SegmentId(u64::MAX))
        );

        assert!(Config::parse_segment_file_name("").is_err());
        assert!(Config::parse_segment_file_name("0").is_err());
        assert!(Config::parse_segment_file_name("000").is_err());
        assert!(Config::parse_segment_file_name("LOCK").is_err());
        assert!(Config::parse_segment_file_name(".1").is_err());
        assert!(Config::parse_segment_file_name("12.wal").is_err());
        assert!(Config::parse_segment_file_name("-3").is_err());
        assert!(Config::parse_segment_file_name("18446744073709551616").is_err());
    }

    #[test]
    fn test_segment_path() {
        let config = Config::new("/tmp/wal");
        assert_eq!(config.segment_path(SegmentId(42)), "/tmp/wal/42");
        assert_eq!(Config::segment_file_name(SegmentId(7)), "7");
    }
}
