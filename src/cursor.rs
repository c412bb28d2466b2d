//! Sequential reader over the segments of a [`Wal`].
//!
//! A cursor is owned by a single consumer: recovery replay, a replication
//! session catching up, a backup. It holds its own file handle and reads
//! without taking the log's lock, except for a brief lock to find out whether
//! the segment it moves to is the current one.

use std::io;

use crate::errors::CorruptRecord;
use crate::errors::LsnCollected;
use crate::errors::ReadError;
use crate::record::Record;
use crate::record::RecordRef;
use crate::segment::SegmentReader;
use crate::SegmentId;
use crate::Wal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// Released its segment handle; reads nothing any more.
    Closed,

    /// Positioned at a record, or before the first one after open.
    Positioned,

    /// No more data is available for now.
    Exhausted,
}

#[derive(Debug)]
pub struct Cursor<'a> {
    wal: &'a Wal,

    follow: bool,

    /// Records with a smaller LSN are skipped.
    start_lsn: u64,

    /// The last LSN when opened: a non-follow cursor stops after it.
    end_lsn: u64,

    reader: Option<SegmentReader>,

    /// Offset of the next record in `reader`.
    offset: u64,

    /// LSN of the next record in `reader`.
    expect: u64,

    /// The positioned record, header included.
    buf: Vec<u8>,
    has_record: bool,

    state: CursorState,
}

impl<'a> Cursor<'a> {
    /// Open a cursor positioned before the first record with LSN `>=
    /// start_lsn`.
    ///
    /// If `follow` is false the cursor is exhausted after the last LSN
    /// assigned when it is opened. Otherwise it keeps returning records
    /// appended later; the caller retries [`Self::next`] after it returns
    /// `false`, typically after waiting on its [`Slot`](crate::Slot).
    ///
    /// Returns [`ReadError::Collected`] if `start_lsn` is below the oldest
    /// retained segment.
    pub fn open(
        wal: &'a Wal,
        start_lsn: u64,
        follow: bool,
    ) -> Result<Self, ReadError> {
        let mut c = Self {
            wal,
            follow,
            start_lsn,
            end_lsn: wal.lsn(),
            reader: None,
            offset: 0,
            expect: 0,
            buf: Vec::new(),
            has_record: false,
            state: CursorState::Exhausted,
        };

        let Some(min) = wal.segments().min() else {
            return Ok(c);
        };

        if start_lsn < min.first_lsn() {
            return Err(LsnCollected::new(start_lsn, Some(min)).into());
        }

        let Some(id) = wal.segments().find(start_lsn) else {
            return Err(LsnCollected::new(start_lsn, wal.segments().min()).into());
        };

        c.open_segment(id)?;
        c.skip_to_start()?;
        c.state = CursorState::Positioned;

        Ok(c)
    }

    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Whether the cursor stops at the last LSN assigned when it is opened.
    pub fn is_following(&self) -> bool {
        self.follow
    }

    /// Advance to the next record.
    ///
    /// Returns `false` if no more data is available: not an error, a
    /// following cursor may find more later.
    pub fn next(&mut self) -> Result<bool, ReadError> {
        self.has_record = false;

        if self.state == CursorState::Closed {
            return Ok(false);
        }

        loop {
            if !self.follow && self.expect > self.end_lsn {
                self.state = CursorState::Exhausted;
                return Ok(false);
            }

            let Some(reader) = self.reader.as_mut() else {
                self.state = CursorState::Exhausted;
                return Ok(false);
            };

            if reader.read_header_at(self.offset)?.is_some() {
                self.skip_to_start()?;

                let Some(reader) = self.reader.as_mut() else {
                    continue;
                };

                if let Some(h) = reader.read_at(self.offset, &mut self.buf)? {
                    self.check_lsn(h.lsn)?;
                    self.offset += h.size as u64;
                    self.expect = h.lsn + 1;
                    self.has_record = true;
                    self.state = CursorState::Positioned;
                    return Ok(true);
                }
                continue;
            }

            // No complete record at the offset: move on if the segment is
            // superseded.
            let id = reader.id();
            let Some(next_id) = self.wal.segments().next_after(id) else {
                self.state = CursorState::Exhausted;
                return Ok(false);
            };

            // The size of a superseded segment is final. Records written
            // before the rotation may not have been observed yet.
            if reader.read_header_at(self.offset)?.is_some() {
                continue;
            }

            if next_id.first_lsn() > self.expect {
                return Err(LsnCollected::new(
                    self.expect,
                    self.wal.segments().min(),
                )
                .into());
            }

            if next_id.first_lsn() < self.expect {
                return Err(CorruptRecord::new(
                    next_id,
                    0,
                    format!(
                        "segment starts at LSN {}, previous one ends at {}",
                        next_id.first_lsn(),
                        self.expect - 1
                    ),
                )
                .into());
            }

            self.open_segment(next_id)?;
        }
    }

    /// A view of the record the cursor is positioned at.
    ///
    /// Returns `None` before the first [`Self::next`], or after it returned
    /// `false` or an error.
    pub fn at(&self) -> Option<RecordRef<'_>> {
        if self.has_record {
            Some(RecordRef::parse(&self.buf))
        } else {
            None
        }
    }

    /// Read up to `limit` records and append their raw bytes, headers
    /// included, to `buf`.
    ///
    /// Returns the LSN of the last record read, or `None` if no record is
    /// available.
    pub fn collect(
        &mut self,
        limit: usize,
        buf: &mut Vec<u8>,
    ) -> Result<Option<u64>, ReadError> {
        let mut last = None;

        for _ in 0..limit {
            if !self.next()? {
                break;
            }
            buf.extend_from_slice(&self.buf);
            last = self.at().map(|r| r.lsn());
        }

        Ok(last)
    }

    /// Convert into an iterator of owned records.
    ///
    /// The iterator ends when the cursor is exhausted, or after the first
    /// error. To restart, open a new cursor at the next LSN.
    pub fn records(self) -> Records<'a> {
        Records { cursor: self }
    }

    /// Release the segment handle. Calling it again is a no-op.
    pub fn close(&mut self) {
        self.reader = None;
        self.buf = Vec::new();
        self.has_record = false;
        self.state = CursorState::Closed;
    }

    /// Skip records below `start_lsn` by reading their headers only.
    fn skip_to_start(&mut self) -> Result<(), ReadError> {
        while self.expect < self.start_lsn {
            let Some(reader) = self.reader.as_mut() else {
                return Ok(());
            };

            let Some(h) = reader.read_header_at(self.offset)? else {
                return Ok(());
            };

            self.check_lsn(h.lsn)?;
            self.offset += h.size as u64;
            self.expect = h.lsn + 1;
        }
        Ok(())
    }

    fn check_lsn(&self, lsn: u64) -> Result<(), ReadError> {
        if lsn == self.expect {
            return Ok(());
        }

        let id = self.reader.as_ref().map(|r| r.id()).unwrap_or_default();
        Err(CorruptRecord::new(
            id,
            self.offset,
            format!("expect LSN {}, got {}", self.expect, lsn),
        )
        .into())
    }

    fn open_segment(&mut self, id: SegmentId) -> Result<(), ReadError> {
        let live = self.wal.live_segment(id);

        let reader = match SegmentReader::open(self.wal.config(), id, live) {
            Ok(r) => r,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let lsn = id.first_lsn().max(self.start_lsn);
                return Err(
                    LsnCollected::new(lsn, self.wal.segments().min()).into()
                );
            }
            Err(e) => return Err(e.into()),
        };

        self.reader = Some(reader);
        self.offset = 0;
        self.expect = id.first_lsn();

        Ok(())
    }
}

/// Iterator of owned records, created by [`Cursor::records`].
#[derive(Debug)]
pub struct Records<'a> {
    cursor: Cursor<'a>,
}

impl Iterator for Records<'_> {
    type Item = Result<Record, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.cursor.next() {
            Ok(true) => self.cursor.at().map(|r| Ok(r.to_record())),
            Ok(false) => None,
            Err(e) => {
                self.cursor.close();
                Some(Err(e))
            }
        }
    }
}
