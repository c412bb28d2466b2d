use std::io;

use crate::num::format_pad9_u64;
use crate::Record;
use crate::SegmentId;

/// Write one record per line, preceded by the segment id line when the
/// record is the first one of its segment.
pub fn multiline_string<W: io::Write>(
    w: &mut W,
    segment_id: SegmentId,
    record_index: u64,
    res: Result<(u64, Record), io::Error>,
) -> Result<(), io::Error> {
    match res {
        Ok((offset, rec)) => {
            if offset == 0 {
                writeln!(w, "{}", segment_id)?;
            }
            writeln!(
                w,
                "  R-{record_index:05}: [{}, {}) {}: lsn={} count={} meta={} payload={}",
                format_pad9_u64(offset),
                format_pad9_u64(offset + rec.size()),
                rec.size(),
                rec.lsn(),
                rec.count(),
                rec.meta.len(),
                rec.payload.len(),
            )?;
        }
        Err(io_err) => {
            writeln!(w, "Error: {}", io_err)?;
        }
    }
    Ok(())
}
