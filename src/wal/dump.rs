use std::fs::File;
use std::io;
use std::io::BufReader;
use std::sync::Arc;

use crate::dump_writer;
use crate::segment::record_iterator::RecordIterator;
use crate::Config;
use crate::Record;
use crate::SegmentId;

/// Print every record of every segment in a WAL directory.
///
/// It reads the files directly and does not acquire the directory lock, so
/// it can inspect a log that is open by another process.
pub struct Dump {
    config: Arc<Config>,
}

impl Dump {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn write_to_string(&self) -> Result<String, io::Error> {
        let mut buf = Vec::new();
        self.write(&mut buf)?;
        String::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    pub fn write<W: io::Write>(&self, mut w: W) -> Result<(), io::Error> {
        writeln!(&mut w, "WAL:")?;
        self.write_with(w, dump_writer::multiline_string)
    }

    /// Write each record with `write_record`.
    ///
    /// A segment is scanned up to its first undecodable record; the error is
    /// passed to `write_record` and the next segment is scanned.
    pub fn write_with<W: io::Write, D>(
        &self,
        mut w: W,
        write_record: D,
    ) -> Result<(), io::Error>
    where
        D: Fn(
            &mut W,
            SegmentId,
            u64,
            Result<(u64, Record), io::Error>,
        ) -> Result<(), io::Error>,
    {
        let config = self.config.as_ref();
        let ids = crate::load_segment_ids(config)?;
        for segment_id in ids {
            let f = File::open(config.segment_path(segment_id))?;
            let size = f.metadata()?.len();
            let br = BufReader::with_capacity(config.read_buffer_size(), f);

            let it = RecordIterator::new(br, size, segment_id);
            for (i, res) in it.enumerate() {
                write_record(&mut w, segment_id, i as u64, res)?;
            }
        }
        Ok(())
    }
}
