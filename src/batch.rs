use std::io;
use std::io::IoSlice;

use crate::record::RecordHeader;

/// A write batch: one or more payload ranges appended to the log as a single
/// record, under a single LSN.
///
/// The LSN is assigned by [`Wal::append`](crate::Wal::append); until then
/// [`Batch::lsn`] returns 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    lsn: u64,
    count: u32,
    meta: Vec<u8>,
    payloads: Vec<Vec<u8>>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the metadata range, written between the header and the payloads.
    pub fn with_meta(mut self, meta: impl Into<Vec<u8>>) -> Self {
        self.meta = meta.into();
        self
    }

    /// Add a payload range that carries one record.
    pub fn push(&mut self, payload: impl Into<Vec<u8>>) {
        self.payloads.push(payload.into());
        self.count += 1;
    }

    /// Add a payload range that carries `count` records.
    pub fn push_many(&mut self, payload: impl Into<Vec<u8>>, count: u32) {
        self.payloads.push(payload.into());
        self.count += count;
    }

    /// The LSN assigned by the last successful append, or 0.
    pub fn lsn(&self) -> u64 {
        self.lsn
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn meta(&self) -> &[u8] {
        &self.meta
    }

    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.payloads
    }

    pub fn is_empty(&self) -> bool {
        self.meta.is_empty() && self.payloads.is_empty()
    }

    /// Size of the record this batch is written as, header included.
    pub fn size(&self) -> u64 {
        let body = self.meta.len()
            + self.payloads.iter().map(|p| p.len()).sum::<usize>();
        (RecordHeader::SIZE + body) as u64
    }

    /// Build the record header this batch would be written with at `lsn`.
    pub(crate) fn header(&self, lsn: u64) -> Result<RecordHeader, io::Error> {
        let payloads =
            self.payloads.iter().map(|p| p.as_slice()).collect::<Vec<_>>();
        RecordHeader::new(lsn, self.count, &self.meta, &payloads)
    }

    pub(crate) fn set_lsn(&mut self, lsn: u64) {
        self.lsn = lsn;
    }

    /// The ranges to write: header, metadata, then each payload in order.
    pub(crate) fn io_slices<'a>(
        &'a self,
        header: &'a [u8],
    ) -> Vec<IoSlice<'a>> {
        let mut bufs = Vec::with_capacity(self.payloads.len() + 2);
        bufs.push(IoSlice::new(header));
        if !self.meta.is_empty() {
            bufs.push(IoSlice::new(&self.meta));
        }
        for p in self.payloads.iter() {
            bufs.push(IoSlice::new(p));
        }
        bufs
    }
}
