//! Segment files: the unit of rotation and garbage collection.
//!
//! A segment is an append-only file named by the LSN of its first record.
//! Exactly one segment, the current one, is written to; once superseded by
//! rotation it never changes again.
//!
//! Writers go through [`Segment`], owned by the log and shared with readers
//! through an `Arc` so that a tailing reader can observe its live size.
//! Readers go through [`SegmentReader`], which owns a private file handle so
//! that its seeks never interfere with other readers or the writer.

pub(crate) mod record_iterator;
pub(crate) mod segment_dir;
pub(crate) mod segment_id;

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::BufReader;
use std::io::IoSlice;
use std::io::Read;
use std::io::Seek;
use std::io::Write;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use codeq::error_context_ext::ErrorContextExt;
use log::error;
use log::info;
use log::warn;

use crate::errors::CorruptRecord;
use crate::errors::ReadError;
use crate::record::RecordHeader;
use crate::segment::record_iterator::RecordIterator;
use crate::segment::segment_id::SegmentId;
use crate::Config;

/// The writable handle of a segment file.
#[derive(Debug)]
pub(crate) struct Segment {
    id: SegmentId,

    /// Opened in append mode: every write lands at the end of the file.
    f: File,

    /// Bytes of complete records in the file.
    ///
    /// Stored after a write completes, so that everything below it can be
    /// read by a concurrent reader.
    size: AtomicU64,
}

impl Segment {
    /// Create a new empty segment file and make its directory entry durable.
    ///
    /// Fails if a file with the same id already exists.
    pub(crate) fn create(
        config: &Config,
        id: SegmentId,
    ) -> Result<Self, io::Error> {
        let path = config.segment_path(id);
        let f = OpenOptions::new()
            .read(true)
            .append(true)
            .create_new(true)
            .open(&path)
            .context(|| format!("create {}", id))?;

        sync_dir(&config.dir).context(|| format!("sync dir after create {}", id))?;

        Ok(Self {
            id,
            f,
            size: AtomicU64::new(0),
        })
    }

    /// Open an existing segment to continue appending to it.
    ///
    /// All records are decoded and verified. A torn trailing record is
    /// truncated if `config.truncate_incomplete_record()`, otherwise an error
    /// is returned.
    ///
    /// Returns the segment and the LSN of its last record, if any.
    pub(crate) fn open(
        config: &Config,
        id: SegmentId,
    ) -> Result<(Self, Option<u64>), io::Error> {
        let path = config.segment_path(id);
        let f = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&path)
            .context(|| format!("open {}", id))?;

        let file_size = f.metadata()?.len();

        let it = RecordIterator::new(
            BufReader::with_capacity(config.read_buffer_size(), &f),
            file_size,
            id,
        );

        let mut end = 0;
        let mut last_lsn = None;
        let mut torn = None;

        for res in it {
            match res {
                Ok((offset, record)) => {
                    let want = last_lsn.map_or(id.first_lsn(), |l| l + 1);
                    if record.lsn() != want {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!(
                                "Non-contiguous LSN in {} at offset {}: expect {}, got {}",
                                id,
                                offset,
                                want,
                                record.lsn()
                            ),
                        ));
                    }
                    end = offset + record.size();
                    last_lsn = Some(record.lsn());
                }
                Err(io_err) => {
                    if io_err.kind() == io::ErrorKind::UnexpectedEof {
                        // Incomplete record: a write interrupted by a crash.
                        torn = Some(io_err);
                        break;
                    }

                    // Maybe damaged or unfinished write with trailing zeros.
                    //
                    // Trailing zeros can happen if EXT4 is mounted with
                    // `data=writeback` mode, with which, data and
                    // metadata(file len) will be written to disk in
                    // arbitrary order.
                    if verify_trailing_zeros(&f, end, id)? {
                        warn!(
                            "Trailing zeros detected at {} in {}; Treat it as unfinished write",
                            end, id
                        );
                        torn = Some(io_err);
                        break;
                    }

                    error!("Found damaged bytes in {}: {}", id, io_err);
                    return Err(io_err);
                }
            }
        }

        if let Some(io_err) = torn {
            if !config.truncate_incomplete_record() {
                return Err(io_err);
            }

            warn!(
                "Truncate incomplete record in {}: file size {} -> {}",
                id, file_size, end
            );
            f.set_len(end)?;
            f.sync_all()?;
        }

        info!("Opened {}: size: {}, last LSN: {:?}", id, end, last_lsn);

        let segment = Self {
            id,
            f,
            size: AtomicU64::new(end),
        };

        Ok((segment, last_lsn))
    }

    /// Read through a sealed segment and return the LSN of its last record.
    ///
    /// The file is not modified: any undecodable byte is an error.
    pub(crate) fn scan_last_lsn(
        config: &Config,
        id: SegmentId,
    ) -> Result<Option<u64>, io::Error> {
        let f = File::open(config.segment_path(id))
            .context(|| format!("open {} to scan", id))?;

        let file_size = f.metadata()?.len();

        let it = RecordIterator::new(
            BufReader::with_capacity(config.read_buffer_size(), &f),
            file_size,
            id,
        );

        let mut last_lsn = None;
        for res in it {
            let (_offset, record) = res?;
            last_lsn = Some(record.lsn());
        }

        Ok(last_lsn)
    }

    pub(crate) fn id(&self) -> SegmentId {
        self.id
    }

    /// Live size: bytes of complete records written so far.
    pub(crate) fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    /// Append all `bufs` with vectored writes.
    ///
    /// Must be called with the log's lock held. On error the file may hold a
    /// partial record beyond [`Self::size`]; the caller truncates it.
    pub(crate) fn write(
        &self,
        mut bufs: &mut [IoSlice<'_>],
    ) -> Result<(), io::Error> {
        let total = bufs.iter().map(|b| b.len() as u64).sum::<u64>();

        let mut w = &self.f;
        while !bufs.is_empty() {
            match w.write_vectored(bufs) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        format!("write zero bytes to {}", self.id),
                    ));
                }
                Ok(n) => IoSlice::advance_slices(&mut bufs, n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        self.size.fetch_add(total, Ordering::Release);
        Ok(())
    }

    /// Drop everything after `len` bytes, e.g., a partially written record.
    pub(crate) fn truncate(&self, len: u64) -> Result<(), io::Error> {
        self.f.set_len(len)?;
        self.size.store(len, Ordering::Release);
        Ok(())
    }

    pub(crate) fn sync(&self) -> Result<(), io::Error> {
        self.f.sync_data().context(|| format!("sync {}", self.id))
    }
}

/// A read-only handle of a segment, owned by one reader.
#[derive(Debug)]
pub(crate) struct SegmentReader {
    id: SegmentId,
    f: File,

    /// Set if the segment was the current one when this reader opened it:
    /// its size is re-read on every read since it may still grow.
    live: Option<Arc<Segment>>,

    /// Size of a segment that was already closed when opened.
    closed_size: u64,
}

impl SegmentReader {
    pub(crate) fn open(
        config: &Config,
        id: SegmentId,
        live: Option<Arc<Segment>>,
    ) -> Result<Self, io::Error> {
        let f = File::open(config.segment_path(id))?;

        let closed_size = if live.is_some() { 0 } else { f.metadata()?.len() };

        Ok(Self {
            id,
            f,
            live,
            closed_size,
        })
    }

    pub(crate) fn id(&self) -> SegmentId {
        self.id
    }

    /// The currently observed length of the segment.
    pub(crate) fn size(&self) -> u64 {
        match &self.live {
            Some(segment) => segment.size(),
            None => self.closed_size,
        }
    }

    /// Read the header of the record at `offset` if the whole record is
    /// present.
    ///
    /// Returns `Ok(None)` if the record is not, or not yet, completely
    /// written.
    pub(crate) fn read_header_at(
        &mut self,
        offset: u64,
    ) -> Result<Option<RecordHeader>, ReadError> {
        let end = self.size();
        if offset + RecordHeader::SIZE as u64 > end {
            return Ok(None);
        }

        let mut b = [0u8; RecordHeader::SIZE];
        self.f.seek(io::SeekFrom::Start(offset))?;
        self.f.read_exact(&mut b)?;

        let header = RecordHeader::from_bytes(&b);
        header
            .validate()
            .map_err(|e| CorruptRecord::new(self.id, offset, e))?;

        if offset + header.size as u64 > end {
            return Ok(None);
        }

        Ok(Some(header))
    }

    /// Read the complete record at `offset` into `buf`, replacing its content,
    /// and verify its checksum.
    ///
    /// Returns `Ok(None)` if the record is not, or not yet, completely
    /// written; `buf` is left empty then.
    pub(crate) fn read_at(
        &mut self,
        offset: u64,
        buf: &mut Vec<u8>,
    ) -> Result<Option<RecordHeader>, ReadError> {
        buf.clear();

        let Some(header) = self.read_header_at(offset)? else {
            return Ok(None);
        };

        buf.resize(header.size as usize, 0);
        buf[..RecordHeader::SIZE].copy_from_slice(&header.to_bytes());
        self.f.read_exact(&mut buf[RecordHeader::SIZE..])?;

        if let Err(e) = header.verify(&buf[RecordHeader::SIZE..]) {
            buf.clear();
            return Err(CorruptRecord::new(self.id, offset, e).into());
        }

        Ok(Some(header))
    }
}

/// Make a newly created or removed directory entry durable.
#[cfg_attr(not(unix), allow(unused_variables))]
fn sync_dir(dir: &str) -> Result<(), io::Error> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;

    Ok(())
}

/// Checks if a file contains only zero bytes from a specified offset to the
/// end.
///
/// Used to tell an interrupted write, whose tail space may have been
/// zero-filled, from damaged data.
fn verify_trailing_zeros(
    mut file: &File,
    mut start_offset: u64,
    segment_id: SegmentId,
) -> Result<bool, io::Error> {
    let file_size = file.metadata()?.len();

    if start_offset > file_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "Start offset {} exceeds file size {}",
                start_offset, file_size
            ),
        ));
    }

    if file_size == start_offset {
        return Ok(true);
    }

    const WARN_THRESHOLD: u64 = 64 * 1024; // 64KB
    if file_size - start_offset > WARN_THRESHOLD {
        warn!(
            "Large maybe damaged section detected: {} bytes to the end; in {}",
            file_size - start_offset,
            segment_id
        );
    }

    file.seek(io::SeekFrom::Start(start_offset))?;

    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut buffer = vec![0; 1024];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }

        if let Some(i) = buffer[..n].iter().position(|b| *b != 0) {
            error!(
                "Non-zero byte detected at offset {} in {}",
                start_offset + i as u64,
                segment_id
            );
            return Ok(false);
        }

        start_offset += n as u64;
    }
    Ok(true)
}
