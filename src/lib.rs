//! Segmented write-ahead log:
//! an append-only, LSN-numbered log split into size-rotated segment files,
//! with consumer slots that hold back garbage collection and cursors that
//! stream the log for recovery and replication.
//!
//! ## Features
//!
//! - Gap-free LSNs assigned under a single lock, one per appended batch
//! - Size-based segment rotation; segment files are named by their first LSN
//! - CRC32 checked records; a torn tail is truncated on open
//! - Slots: consumer watermarks that bound [`Wal::gc`], with a wake channel
//!   for tailing consumers
//! - Cursors that read without blocking the writer and follow the live tail
//! - Snapshot manifests to bootstrap a new consumer
//!
//! ## Example
//!
//! ```rust
//! # use std::sync::Arc;
//! use wal_log::{Batch, Config, Slot, Wal};
//!
//! let temp_dir = tempfile::tempdir().unwrap();
//! let config = Arc::new(Config::new(temp_dir.path().to_str().unwrap()));
//! let wal = Wal::open(config).unwrap();
//!
//! // Append two batches
//! let mut batch = Batch::new();
//! batch.push("first entry");
//! assert_eq!(wal.append(&mut batch).unwrap(), 1);
//!
//! let mut batch = Batch::new().with_meta("txn-2");
//! batch.push("second entry");
//! batch.push("third entry");
//! assert_eq!(wal.append(&mut batch).unwrap(), 2);
//! wal.sync().unwrap();
//!
//! // A consumer holds back gc until it has processed the records
//! let slot = Slot::new();
//! wal.add_slot(&slot).unwrap();
//!
//! let mut cursor = wal.cursor(1, false).unwrap();
//! while cursor.next().unwrap() {
//!     let rec = cursor.at().unwrap();
//!     slot.set(rec.lsn());
//! }
//! assert_eq!(slot.lsn(), 2);
//!
//! wal.gc(slot.lsn()).unwrap();
//! ```

mod config;

pub(crate) mod file_lock;
pub(crate) mod mutex_ext;
pub(crate) mod num;
pub(crate) mod segment;
pub(crate) mod testing;
pub(crate) mod wal;

pub use codeq;

pub mod api;
pub mod batch;
pub mod cursor;
pub mod dump_writer;
pub mod errors;
pub mod record;
pub mod slot;

pub use batch::Batch;
pub use config::Config;
pub use config::SyncPolicy;
pub use cursor::Cursor;
pub use cursor::CursorState;
pub use cursor::Records;
pub use record::Record;
pub use record::RecordHeader;
pub use record::RecordRef;
pub use segment::segment_dir::load_segment_ids;
pub use segment::segment_id::SegmentId;
pub use slot::Slot;

pub use self::wal::dump::Dump;
pub use self::wal::manifest::Manifest;
pub use self::wal::manifest::ManifestEntry;
pub use self::wal::stat::GcStat;
pub use self::wal::stat::Status;
pub use self::wal::wal::Wal;

#[cfg(test)]
mod tests;
