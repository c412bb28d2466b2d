//! On-disk framing of a batch: `[header][metadata][payload]`.
//!
//! The header is fixed size, big-endian:
//!
//! ```text
//! | lsn: u64 | count: u32 | size: u32 | meta_size: u32 | crc: u32 |
//! ```
//!
//! `size` is the total size of the record, header included. `crc` is the
//! CRC32 of the first 20 header bytes followed by the metadata and payload.

use std::io;

use byteorder::BigEndian;
use byteorder::ByteOrder;
use codeq::Decode;
use codeq::Encode;

/// Header of a record as it is stored at the start of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    /// LSN assigned to the batch.
    pub lsn: u64,

    /// Number of rows or operations carried by the batch.
    pub count: u32,

    /// Total size of the record in bytes, including this header.
    pub size: u32,

    /// Size of the metadata range that follows the header.
    pub meta_size: u32,

    pub crc: u32,
}

impl RecordHeader {
    pub const SIZE: usize = 24;

    /// Size of the header fields covered by the checksum.
    const CHECKSUMMED: usize = 20;

    /// Build a header for the given body ranges and fill in its checksum.
    pub(crate) fn new(
        lsn: u64,
        count: u32,
        meta: &[u8],
        payloads: &[&[u8]],
    ) -> Result<Self, io::Error> {
        let body = meta.len() + payloads.iter().map(|p| p.len()).sum::<usize>();
        let size = u32::try_from(Self::SIZE + body).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("batch too large: {} bytes", Self::SIZE + body),
            )
        })?;

        let mut h = Self {
            lsn,
            count,
            size,
            meta_size: meta.len() as u32,
            crc: 0,
        };

        let mut ranges = Vec::with_capacity(payloads.len() + 1);
        ranges.push(meta);
        ranges.extend_from_slice(payloads);
        h.crc = h.checksum(&ranges);

        Ok(h)
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut b = [0u8; Self::SIZE];
        BigEndian::write_u64(&mut b[0..8], self.lsn);
        BigEndian::write_u32(&mut b[8..12], self.count);
        BigEndian::write_u32(&mut b[12..16], self.size);
        BigEndian::write_u32(&mut b[16..20], self.meta_size);
        BigEndian::write_u32(&mut b[20..24], self.crc);
        b
    }

    /// Parse a header from the first [`Self::SIZE`] bytes of `b`.
    pub fn from_bytes(b: &[u8]) -> Self {
        Self {
            lsn: BigEndian::read_u64(&b[0..8]),
            count: BigEndian::read_u32(&b[8..12]),
            size: BigEndian::read_u32(&b[12..16]),
            meta_size: BigEndian::read_u32(&b[16..20]),
            crc: BigEndian::read_u32(&b[20..24]),
        }
    }

    /// Size of metadata and payload.
    pub fn body_size(&self) -> usize {
        (self.size as usize).saturating_sub(Self::SIZE)
    }

    /// Check the declared sizes are self consistent, before trusting them to
    /// read the body.
    pub(crate) fn validate(&self) -> Result<(), String> {
        if (self.size as usize) < Self::SIZE {
            return Err(format!(
                "declared size {} is smaller than header size {}",
                self.size,
                Self::SIZE
            ));
        }

        if self.meta_size as usize > self.body_size() {
            return Err(format!(
                "meta size {} exceeds body size {}",
                self.meta_size,
                self.body_size()
            ));
        }

        Ok(())
    }

    /// Verify the stored checksum against the body that follows the header.
    pub(crate) fn verify(&self, body: &[u8]) -> Result<(), String> {
        let actual = self.checksum(&[body]);
        if actual != self.crc {
            return Err(format!(
                "checksum mismatch: stored {:#010x}, computed {:#010x}",
                self.crc, actual
            ));
        }
        Ok(())
    }

    fn checksum(&self, body: &[&[u8]]) -> u32 {
        let b = self.to_bytes();
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&b[..Self::CHECKSUMMED]);
        for range in body {
            hasher.update(range);
        }
        hasher.finalize()
    }
}

impl Encode for RecordHeader {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        w.write_all(&self.to_bytes())?;
        Ok(Self::SIZE)
    }
}

impl Decode for RecordHeader {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let mut b = [0u8; Self::SIZE];
        r.read_exact(&mut b)?;
        Ok(Self::from_bytes(&b))
    }
}

/// A borrowed view of a complete record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordRef<'a> {
    pub header: RecordHeader,
    pub meta: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> RecordRef<'a> {
    /// Build a view over a buffer that holds exactly one verified record.
    pub(crate) fn parse(buf: &'a [u8]) -> Self {
        let header = RecordHeader::from_bytes(buf);
        let body = &buf[RecordHeader::SIZE..header.size as usize];
        let (meta, payload) = body.split_at(header.meta_size as usize);
        Self {
            header,
            meta,
            payload,
        }
    }

    pub fn lsn(&self) -> u64 {
        self.header.lsn
    }

    pub fn to_record(&self) -> Record {
        Record {
            header: self.header,
            meta: self.meta.to_vec(),
            payload: self.payload.to_vec(),
        }
    }
}

/// An owned record, as decoded from a segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub header: RecordHeader,
    pub meta: Vec<u8>,
    pub payload: Vec<u8>,
}

impl Record {
    pub fn lsn(&self) -> u64 {
        self.header.lsn
    }

    pub fn count(&self) -> u32 {
        self.header.count
    }

    pub fn size(&self) -> u64 {
        self.header.size as u64
    }
}

impl Encode for Record {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = self.header.encode(&mut w)?;
        w.write_all(&self.meta)?;
        w.write_all(&self.payload)?;
        n += self.meta.len() + self.payload.len();
        Ok(n)
    }
}

/// Decode a record and verify its checksum.
///
/// An incomplete record yields `UnexpectedEof`; a damaged one `InvalidData`.
impl Decode for Record {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let header = RecordHeader::decode(&mut r)?;
        header
            .validate()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut body = vec![0u8; header.body_size()];
        r.read_exact(&mut body)?;

        header
            .verify(&body)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let payload = body.split_off(header.meta_size as usize);

        Ok(Self {
            header,
            meta: body,
            payload,
        })
    }
}
