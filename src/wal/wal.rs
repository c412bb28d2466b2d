use std::fs;
use std::io;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;

use codeq::error_context_ext::ErrorContextExt;
use log::error;
use log::info;
use log::warn;

use crate::api::log_writer::LogWriter;
use crate::cursor::Cursor;
use crate::errors::ReadError;
use crate::errors::SlotAlreadyAdded;
use crate::file_lock::FileLock;
use crate::mutex_ext::MutexExt;
use crate::segment::segment_dir::SegmentDir;
use crate::segment::Segment;
use crate::wal::dump::Dump;
use crate::wal::manifest::Manifest;
use crate::wal::manifest::ManifestEntry;
use crate::wal::stat::GcStat;
use crate::wal::stat::Status;
use crate::wal::stat::WriteStat;
use crate::Batch;
use crate::Config;
use crate::SegmentId;
use crate::Slot;
use crate::SyncPolicy;

/// Wal is a segmented write-ahead log of LSN-numbered batches.
///
/// - Appends are serialized by one lock and assigned gap-free LSNs.
/// - The log is split into segment files, rotated by size.
/// - Consumers register [`Slot`]s; [`Wal::gc`] never removes data a slot has
///   not yet processed.
/// - Readers stream the log with a [`Cursor`] without blocking appends.
///
/// A `Wal` is `Sync`: share it with `Arc` between the writer and the
/// consumers.
#[derive(Debug)]
pub struct Wal {
    config: Arc<Config>,

    /// Acquire the dir exclusive lock for the lifetime of the log.
    _dir_lock: FileLock,

    segments: SegmentDir,

    inner: Mutex<WalInner>,

    /// The last assigned LSN, published after the batch is written.
    lsn: AtomicU64,

    /// Rotation threshold in bytes.
    segment_max_size: AtomicU64,

    checkpoint: AtomicU64,

    write_stat: WriteStat,
}

/// State protected by the log's lock.
#[derive(Debug, Default)]
struct WalInner {
    current: Option<Arc<Segment>>,
    slots: Vec<Arc<Slot>>,

    /// Set when a failed write could not be rolled back: the current segment
    /// holds bytes beyond its size. Appends are rejected until reopen.
    failed: Option<io::ErrorKind>,
}

impl WalInner {
    fn has_slot(&self, slot: &Arc<Slot>) -> bool {
        self.slots.iter().any(|s| Arc::ptr_eq(s, slot))
    }
}

impl LogWriter for Wal {
    fn append(&self, batch: &mut Batch) -> Result<u64, io::Error> {
        Wal::append(self, batch)
    }

    fn sync(&self) -> Result<(), io::Error> {
        Wal::sync(self)
    }
}

impl Wal {
    /// Opens a Wal at the directory specified by `config.dir`.
    ///
    /// This operation:
    /// 1. Creates the directory if absent and acquires an exclusive lock on it
    /// 2. Registers every file whose name is a decimal number as a segment
    /// 3. Re-opens the last segment for appending, truncating a torn tail, or
    ///    creates segment `1` in an empty directory
    ///
    /// The last assigned LSN is recovered from the last segment. An empty last
    /// segment whose name does not follow the previous segment's last LSN is
    /// removed.
    pub fn open(config: Arc<Config>) -> Result<Self, io::Error> {
        fs::create_dir_all(&config.dir)
            .context(|| format!("create WAL dir '{}'", config.dir))?;

        let dir_lock = FileLock::new(config.clone())
            .context(|| format!("open Wal in '{}'", config.dir))?;

        let segments = SegmentDir::load(&config)?;

        let mut inner = WalInner::default();
        let mut lsn = 0;

        while let Some(last) = segments.max() {
            let (segment, last_lsn) = Segment::open(&config, last)?;

            if let Some(last_lsn) = last_lsn {
                lsn = last_lsn;
                inner.current = Some(Arc::new(segment));
                break;
            }

            // An empty segment must start right after the previous one.
            let expected = match segments.prev_before(last) {
                None => last.first_lsn(),
                Some(prev) => {
                    let prev_last = Segment::scan_last_lsn(&config, prev)?;
                    prev_last.unwrap_or(prev.first_lsn() - 1) + 1
                }
            };

            if last.first_lsn() == expected {
                lsn = expected - 1;
                inner.current = Some(Arc::new(segment));
                break;
            }

            warn!(
                "Remove stray empty {}: the previous segment ends at LSN {}",
                last,
                expected - 1
            );
            drop(segment);
            fs::remove_file(config.segment_path(last))
                .context(|| format!("remove stray {}", last))?;
            segments.remove(last);
        }

        let segment_max_size = config.segment_max_size();

        let wal = Self {
            config,
            _dir_lock: dir_lock,
            segments,
            inner: Mutex::new(inner),
            lsn: AtomicU64::new(lsn),
            segment_max_size: AtomicU64::new(segment_max_size),
            checkpoint: AtomicU64::new(0),
            write_stat: WriteStat::default(),
        };

        {
            let mut inner = wal.inner.locked();
            if inner.current.is_none() {
                wal.rotate(&mut inner, lsn + 1)?;
            }
        }

        info!(
            "Wal opened in '{}': lsn: {}, segments: {:?}",
            wal.config.dir,
            lsn,
            wal.segments.stats()
        );

        Ok(wal)
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    /// The last assigned LSN.
    pub fn lsn(&self) -> u64 {
        self.lsn.load(Ordering::Acquire)
    }

    pub fn segment_max_size(&self) -> u64 {
        self.segment_max_size.load(Ordering::Relaxed)
    }

    /// Change the rotation threshold; takes effect from the next append.
    pub fn set_segment_max_size(&self, size: u64) {
        self.segment_max_size.store(size, Ordering::Relaxed);
    }

    /// Record the LSN of the last completed checkpoint, reported by
    /// [`Wal::status`].
    pub fn set_checkpoint(&self, lsn: u64) {
        self.checkpoint.store(lsn, Ordering::Relaxed);
    }

    /// Append a batch as one record and return its LSN.
    ///
    /// The LSN is `last + 1`; it is stamped into `batch`. The current segment
    /// is rotated first if it has reached the size threshold.
    ///
    /// Data is written without `fdatasync` unless the sync policy is
    /// [`SyncPolicy::EveryBatch`]; call [`Wal::sync`] to make it durable.
    ///
    /// On error nothing is published: the LSN is not consumed and readers
    /// never see a partial record. If a failed write can not be truncated
    /// away, every following append fails until the log is reopened.
    pub fn append(&self, batch: &mut Batch) -> Result<u64, io::Error> {
        let mut inner = self.inner.locked();

        if let Some(kind) = inner.failed {
            return Err(io::Error::new(
                kind,
                format!(
                    "Wal in '{}' rejects appends after a failed truncate; reopen it",
                    self.config.dir
                ),
            ));
        }

        let next_lsn = self.lsn.load(Ordering::Acquire) + 1;
        let header = batch.header(next_lsn)?;

        if self.should_rotate(&inner) {
            self.rotate(&mut inner, next_lsn)?;
        }

        let current = inner.current.clone().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Other, "Wal has no current segment")
        })?;

        let prev_size = current.size();
        let header_bytes = header.to_bytes();
        let mut bufs = batch.io_slices(&header_bytes);

        let res = current.write(&mut bufs).and_then(|_| {
            if self.config.sync_policy() == SyncPolicy::EveryBatch {
                current.sync()?;
            }
            Ok(())
        });

        if let Err(e) = res {
            error!(
                "Failed to append LSN {} to {}: {}; truncate back to {}",
                next_lsn,
                current.id(),
                e,
                prev_size
            );
            if let Err(te) = current.truncate(prev_size) {
                error!(
                    "Failed to truncate {}: {}; reject appends until reopen",
                    current.id(),
                    te
                );
                inner.failed = Some(te.kind());
            }
            return Err(e).context(|| format!("append LSN {}", next_lsn));
        }

        self.lsn.store(next_lsn, Ordering::Release);
        batch.set_lsn(next_lsn);

        for slot in inner.slots.iter() {
            slot.signal(next_lsn);
        }

        self.write_stat.add(header.size as u64, header.count as u64);

        Ok(next_lsn)
    }

    /// `fdatasync` the current segment.
    pub fn sync(&self) -> Result<(), io::Error> {
        let inner = self.inner.locked();
        match &inner.current {
            Some(current) => current.sync(),
            None => Ok(()),
        }
    }

    /// Add a consumer slot. Until removed, [`Wal::gc`] retains every segment
    /// holding an LSN above the slot's watermark.
    pub fn add_slot(&self, slot: &Arc<Slot>) -> Result<(), SlotAlreadyAdded> {
        let mut inner = self.inner.locked();
        if inner.has_slot(slot) {
            return Err(SlotAlreadyAdded::new(slot.lsn()));
        }
        inner.slots.push(slot.clone());
        slot.set_added(true);
        Ok(())
    }

    /// Remove a consumer slot; no-op if it is not added to this log.
    pub fn remove_slot(&self, slot: &Arc<Slot>) {
        let mut inner = self.inner.locked();
        if !inner.has_slot(slot) {
            return;
        }
        inner.slots.retain(|s| !Arc::ptr_eq(s, slot));
        slot.set_added(false);
    }

    /// Wire the slot's wake channel: every following append signals it.
    pub fn attach(&self, slot: &Slot) {
        let _inner = self.inner.locked();
        slot.attach();
    }

    /// Unwire the slot's wake channel and wake up its waiter.
    pub fn detach(&self, slot: &Slot) {
        let _inner = self.inner.locked();
        slot.detach();
    }

    /// Remove segments that no consumer needs any more.
    ///
    /// The effective floor is `requested_floor` lowered to the minimal
    /// watermark of all added slots. A segment is removed only if every LSN in
    /// it is below the floor. The current segment is never removed.
    pub fn gc(&self, requested_floor: u64) -> Result<GcStat, io::Error> {
        let (floor, ids) = {
            let inner = self.inner.locked();

            let floor = inner
                .slots
                .iter()
                .map(|s| s.lsn())
                .fold(requested_floor, u64::min);

            let current = inner.current.as_ref().map(|c| c.id());
            (floor, self.segments.take_below(floor, current))
        };

        let mut stat = GcStat {
            floor,
            ..Default::default()
        };

        for (i, id) in ids.iter().enumerate() {
            let path = self.config.segment_path(*id);

            let res = fs::metadata(&path).and_then(|meta| {
                fs::remove_file(&path)?;
                Ok(meta.len())
            });

            match res {
                Ok(size) => {
                    stat.removed.push(*id);
                    stat.bytes += size;
                }
                Err(e) => {
                    self.segments.restore(&ids[i..]);
                    self.log_gc(&stat);
                    return Err(e).context(|| format!("gc remove {}", path));
                }
            }
        }

        self.log_gc(&stat);
        Ok(stat)
    }

    fn log_gc(&self, stat: &GcStat) {
        if stat.removed.is_empty() {
            return;
        }
        info!(
            "wal: {} files removed ({:.2} MiB), floor: {}",
            stat.removed.len(),
            stat.bytes as f64 / 1024.0 / 1024.0,
            stat.floor
        );
    }

    /// Whether `lsn` is still retained: it is at or above the first LSN of
    /// the oldest segment.
    pub fn in_range(&self, lsn: u64) -> bool {
        match self.segments.min() {
            Some(min) => lsn >= min.first_lsn(),
            None => false,
        }
    }

    /// Register `slot` at watermark 0 and list every segment with its size.
    ///
    /// Both the log's lock and the segment directory's lock are held while
    /// the listing is built and the slot is registered: no listed segment can
    /// be removed until the slot advances or is removed.
    ///
    /// On error the slot is not registered.
    pub fn snapshot(&self, slot: &Arc<Slot>) -> Result<Manifest, io::Error> {
        let mut inner = self.inner.locked();
        let ids = self.segments.lock();

        if inner.has_slot(slot) {
            return Err(SlotAlreadyAdded::new(slot.lsn()).into());
        }

        let current = inner.current.clone();

        let mut manifest = Manifest::default();
        for id in ids.iter().copied() {
            let size = match &current {
                Some(c) if c.id() == id => c.size(),
                _ => fs::metadata(self.config.segment_path(id))
                    .context(|| format!("snapshot stat {}", id))?
                    .len(),
            };

            manifest
                .entries
                .push(ManifestEntry::new(Config::segment_file_name(id), size));
        }

        slot.pin(0);
        inner.slots.push(slot.clone());
        slot.set_added(true);

        Ok(manifest)
    }

    pub fn status(&self) -> Status {
        let (segments, lsn_min) = self.segments.stats();

        let (slots, slots_min) = {
            let inner = self.inner.locked();
            let min = inner.slots.iter().map(|s| s.lsn()).min();
            (inner.slots.len(), min)
        };

        let ws = &self.write_stat;

        Status {
            lsn: self.lsn(),
            lsn_min: lsn_min.map(|x| x.first_lsn()).unwrap_or_default(),
            segments: segments as u64,
            slots: slots as u64,
            slots_min,
            writes: ws.writes.load(Ordering::Relaxed),
            writes_bytes: ws.writes_bytes.load(Ordering::Relaxed),
            ops: ws.ops.load(Ordering::Relaxed),
            checkpoint: self.checkpoint.load(Ordering::Relaxed),
        }
    }

    /// Open a cursor positioned before the first record with LSN `>=
    /// start_lsn`. See [`Cursor::open`].
    pub fn cursor(
        &self,
        start_lsn: u64,
        follow: bool,
    ) -> Result<Cursor<'_>, ReadError> {
        Cursor::open(self, start_lsn, follow)
    }

    /// Dump the segment files of this log, for debugging purposes.
    pub fn dump(&self) -> Dump {
        Dump::new(self.config.clone())
    }

    pub(crate) fn segments(&self) -> &SegmentDir {
        &self.segments
    }

    /// Put the log in the state left by a failed write that could not be
    /// truncated.
    #[cfg(test)]
    pub(crate) fn set_failed(&self, kind: io::ErrorKind) {
        self.inner.locked().failed = Some(kind);
    }

    /// Returns the current segment if its id is `id`.
    pub(crate) fn live_segment(&self, id: SegmentId) -> Option<Arc<Segment>> {
        let inner = self.inner.locked();
        inner.current.as_ref().filter(|c| c.id() == id).cloned()
    }

    /// A segment is rotated when it reaches the threshold, unless it is empty:
    /// its successor would have the same id.
    fn should_rotate(&self, inner: &WalInner) -> bool {
        match &inner.current {
            None => true,
            Some(c) => {
                let size = c.size();
                size > 0 && size >= self.segment_max_size()
            }
        }
    }

    /// Create segment `next_lsn` and make it current.
    ///
    /// The previous state is untouched if the new segment can not be created
    /// or the previous one can not be synced.
    fn rotate(
        &self,
        inner: &mut WalInner,
        next_lsn: u64,
    ) -> Result<(), io::Error> {
        let id = SegmentId(next_lsn);
        let segment = Segment::create(&self.config, id)?;

        if let Some(prev) = &inner.current {
            if self.config.sync_policy() != SyncPolicy::None {
                if let Err(e) = prev.sync() {
                    drop(segment);
                    if let Err(re) = fs::remove_file(self.config.segment_path(id))
                    {
                        warn!("Failed to remove unused {}: {}", id, re);
                    }
                    return Err(e);
                }
            }

            info!(
                "Rotate segment: {}, size: {}, open new: {}",
                prev.id(),
                prev.size(),
                id
            );
        }

        self.segments.add(id);
        inner.current = Some(Arc::new(segment));

        Ok(())
    }
}

impl Drop for Wal {
    fn drop(&mut self) {
        if self.config.sync_policy() == SyncPolicy::None {
            return;
        }

        let inner = self.inner.locked();
        if let Some(current) = &inner.current {
            if let Err(e) = current.sync() {
                warn!("Failed to sync {} on close: {}", current.id(), e);
            }
        }
    }
}
