use std::io;

use byteorder::BigEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

/// The list of segment files a new consumer needs to copy, produced by
/// [`Wal::snapshot`](crate::Wal::snapshot).
///
/// Entries are in ascending LSN order. A consumer copies `size` bytes of each
/// file and then streams the rest with a cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path of the segment file relative to the WAL directory.
    pub path: String,

    /// Bytes of complete records in the file when the manifest was built.
    pub size: u64,
}

impl ManifestEntry {
    pub fn new(path: impl ToString, size: u64) -> Self {
        Self {
            path: path.to_string(),
            size,
        }
    }
}

impl Manifest {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }
}

/// Encoded as:
/// - 4 bytes: number of entries
/// - per entry: 4 bytes path length, path bytes, 8 bytes size
impl codeq::Encode for Manifest {
    fn encode<W: io::Write>(&self, mut w: W) -> Result<usize, io::Error> {
        let mut n = 0;

        let count = u32::try_from(self.entries.len())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        w.write_u32::<BigEndian>(count)?;
        n += 4;

        for entry in self.entries.iter() {
            let path = entry.path.as_bytes();
            let len = u32::try_from(path.len())
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

            w.write_u32::<BigEndian>(len)?;
            w.write_all(path)?;
            w.write_u64::<BigEndian>(entry.size)?;
            n += 4 + path.len() + 8;
        }

        Ok(n)
    }
}

impl codeq::Decode for Manifest {
    fn decode<R: io::Read>(mut r: R) -> Result<Self, io::Error> {
        let count = r.read_u32::<BigEndian>()?;

        let mut entries = Vec::with_capacity(count.min(1024) as usize);
        for _ in 0..count {
            let len = r.read_u32::<BigEndian>()?;
            let mut path = vec![0u8; len as usize];
            r.read_exact(&mut path)?;
            let path = String::from_utf8(path)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

            let size = r.read_u64::<BigEndian>()?;
            entries.push(ManifestEntry { path, size });
        }

        Ok(Self { entries })
    }
}
