use std::fmt;
use std::fmt::Formatter;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::num::format_pad9_u64;
use crate::SegmentId;

/// Cumulative write counters, updated by every successful append.
#[derive(Debug, Default)]
pub(crate) struct WriteStat {
    pub(crate) writes: AtomicU64,
    pub(crate) writes_bytes: AtomicU64,
    pub(crate) ops: AtomicU64,
}

impl WriteStat {
    pub(crate) fn add(&self, bytes: u64, ops: u64) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.writes_bytes.fetch_add(bytes, Ordering::Relaxed);
        self.ops.fetch_add(ops, Ordering::Relaxed);
    }
}

/// A point-in-time status report of a [`Wal`](crate::Wal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// The last assigned LSN.
    pub lsn: u64,
    /// The minimal retained LSN: the id of the oldest segment.
    pub lsn_min: u64,
    /// Number of retained segments, the current one included.
    pub segments: u64,
    /// Number of added slots.
    pub slots: u64,
    /// The minimal watermark of all added slots.
    pub slots_min: Option<u64>,
    /// Number of appended batches.
    pub writes: u64,
    /// Bytes of appended batches.
    pub writes_bytes: u64,
    /// Number of records carried by appended batches.
    pub ops: u64,
    /// LSN of the last checkpoint reported by the checkpoint coordinator.
    pub checkpoint: u64,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let lb = if f.alternate() { "\n" } else { "" };
        let slots_min = match self.slots_min {
            Some(x) => format_pad9_u64(x),
            None => "-".to_string(),
        };
        write!(
            f,
            "Status{{{lb} lsn: {},{lb} lsn_min: {},{lb} segments: {},{lb} slots: {},{lb} slots_min: {},{lb} \
            writes: {},{lb} writes_bytes: {},{lb} ops: {},{lb} checkpoint: {}{lb}\
            }}",
            format_pad9_u64(self.lsn),
            format_pad9_u64(self.lsn_min),
            self.segments,
            self.slots,
            slots_min,
            format_pad9_u64(self.writes),
            format_pad9_u64(self.writes_bytes),
            format_pad9_u64(self.ops),
            format_pad9_u64(self.checkpoint),
        )
    }
}

/// Outcome of a [`Wal::gc`](crate::Wal::gc) call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcStat {
    /// The effective floor: the requested one lowered to the minimal slot
    /// watermark.
    pub floor: u64,
    /// Removed segments, in ascending order.
    pub removed: Vec<SegmentId>,
    /// Total size of the removed segment files.
    pub bytes: u64,
}

impl fmt::Display for GcStat {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GcStat{{floor: {}, removed: {}, bytes: {}}}",
            format_pad9_u64(self.floor),
            self.removed.len(),
            format_pad9_u64(self.bytes)
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::Status;

    #[test]
    fn test_status_display() {
        let st = Status {
            lsn: 3,
            lsn_min: 1,
            segments: 1,
            slots: 2,
            slots_min: Some(2),
            writes: 3,
            writes_bytes: 102,
            ops: 3,
            checkpoint: 0,
        };

        assert_eq!(
            "Status{ lsn: 000_000_003, lsn_min: 000_000_001, segments: 1, slots: 2, slots_min: 000_000_002, writes: 000_000_003, writes_bytes: 000_000_102, ops: 000_000_003, checkpoint: 000_000_000}",
            format!("{}", st)
        );

        let st = Status {
            slots: 0,
            slots_min: None,
            ..st
        };

        assert_eq!(
            "Status{\n lsn: 000_000_003,\n lsn_min: 000_000_001,\n segments: 1,\n slots: 0,\n slots_min: -,\n writes: 000_000_003,\n writes_bytes: 000_000_102,\n ops: 000_000_003,\n checkpoint: 000_000_000\n}",
            format!("{:#}", st)
        );
    }
}
