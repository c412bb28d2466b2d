use std::io;

use codeq::error_context_ext::ErrorContextExt;
use codeq::Decode;

use crate::record::Record;
use crate::SegmentId;

/// Sequentially decode every record of a segment file.
///
/// Yields `(offset, record)`; after the first error it yields nothing.
pub(crate) struct RecordIterator<R> {
    r: R,
    offset: u64,
    total_size: u64,
    segment_id: SegmentId,
    failed: bool,
}

impl<R> RecordIterator<R>
where R: io::Read
{
    pub(crate) fn new(r: R, size: u64, segment_id: SegmentId) -> Self {
        Self {
            r,
            offset: 0,
            total_size: size,
            segment_id,
            failed: false,
        }
    }
}

impl<R> Iterator for RecordIterator<R>
where R: io::Read
{
    type Item = Result<(u64, Record), io::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let start = self.offset;
        if start == self.total_size {
            return None;
        }

        let res = Record::decode(&mut self.r)
            .context(|| format!("decode Record at offset {}", start))
            .context(|| format!("iterate {}", self.segment_id));

        match res {
            Ok(record) => {
                self.offset += record.size();
                Some(Ok((start, record)))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}
