use std::collections::BTreeSet;
use std::io;
use std::sync::Mutex;
use std::sync::MutexGuard;

use log::debug;

use crate::file_lock::FileLock;
use crate::mutex_ext::MutexExt;
use crate::Config;
use crate::SegmentId;

/// The ordered set of segment ids known to a log.
///
/// It has its own lock so that readers can resolve positions without taking
/// the log's lock. When both are needed, the log's lock is acquired first.
#[derive(Debug, Default)]
pub(crate) struct SegmentDir {
    ids: Mutex<BTreeSet<SegmentId>>,
}

impl SegmentDir {
    /// Build the set from the segment files found in `config.dir`.
    pub(crate) fn load(config: &Config) -> Result<Self, io::Error> {
        let ids = load_segment_ids(config)?;
        Ok(Self {
            ids: Mutex::new(ids.into_iter().collect()),
        })
    }

    /// Hold the internal lock, e.g., to build a consistent listing.
    pub(crate) fn lock(&self) -> MutexGuard<'_, BTreeSet<SegmentId>> {
        self.ids.locked()
    }

    pub(crate) fn add(&self, id: SegmentId) {
        self.ids.locked().insert(id);
    }

    pub(crate) fn remove(&self, id: SegmentId) -> bool {
        self.ids.locked().remove(&id)
    }

    /// Put back ids that were taken out for removal but could not be removed.
    pub(crate) fn restore(&self, ids: &[SegmentId]) {
        self.ids.locked().extend(ids.iter().copied());
    }

    pub(crate) fn min(&self) -> Option<SegmentId> {
        self.ids.locked().first().copied()
    }

    pub(crate) fn max(&self) -> Option<SegmentId> {
        self.ids.locked().last().copied()
    }

    /// Returns the number of segments and the minimal segment id.
    pub(crate) fn stats(&self) -> (usize, Option<SegmentId>) {
        let ids = self.ids.locked();
        (ids.len(), ids.first().copied())
    }

    /// The segment that contains `lsn`: the greatest id that is `<= lsn`.
    pub(crate) fn find(&self, lsn: u64) -> Option<SegmentId> {
        self.ids.locked().range(..=SegmentId(lsn)).next_back().copied()
    }

    /// The segment following `id`.
    pub(crate) fn next_after(&self, id: SegmentId) -> Option<SegmentId> {
        let ids = self.ids.locked();
        ids.range(SegmentId(id.0.saturating_add(1))..).next().copied()
    }

    /// The segment preceding `id`.
    pub(crate) fn prev_before(&self, id: SegmentId) -> Option<SegmentId> {
        self.ids.locked().range(..id).next_back().copied()
    }

    /// Remove and return the ids of every segment whose records are all below
    /// `floor`, i.e., the segment following it starts at or below `floor`.
    ///
    /// `current` is never returned, whatever the floor is.
    pub(crate) fn take_below(
        &self,
        floor: u64,
        current: Option<SegmentId>,
    ) -> Vec<SegmentId> {
        let mut ids = self.ids.locked();

        let taken = ids
            .iter()
            .zip(ids.iter().skip(1))
            .take_while(|(_id, next)| next.0 <= floor)
            .map(|(id, _next)| *id)
            .filter(|id| Some(*id) != current)
            .collect::<Vec<_>>();

        for id in taken.iter() {
            ids.remove(id);
        }

        taken
    }

    #[cfg(test)]
    pub(crate) fn ids(&self) -> Vec<SegmentId> {
        self.ids.locked().iter().copied().collect()
    }
}

/// List the segment ids in a WAL directory, in ascending order.
///
/// Entries whose name is not a decimal number are ignored.
pub fn load_segment_ids(config: &Config) -> Result<Vec<SegmentId>, io::Error> {
    let entries = std::fs::read_dir(&config.dir)?;
    let mut ids = vec![];
    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();

        let fn_str = file_name.to_string_lossy();
        if fn_str == FileLock::LOCK_FILE_NAME || fn_str.starts_with('.') {
            continue;
        }

        match Config::parse_segment_file_name(&fn_str) {
            Ok(id) => ids.push(id),
            Err(err) => {
                debug!("Ignore non-segment file: '{}': {}", fn_str, err);
            }
        }
    }

    ids.sort();

    Ok(ids)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::load_segment_ids;
    use super::SegmentDir;
    use crate::tests::context::TestContext;
    use crate::SegmentId;

    fn dir_of(ids: &[u64]) -> SegmentDir {
        let d = SegmentDir::default();
        for id in ids {
            d.add(SegmentId(*id));
        }
        d
    }

    #[test]
    fn test_load_skips_non_numeric_names() -> Result<(), io::Error> {
        let ctx = TestContext::new()?;
        let config = ctx.config();

        for name in [
            "10", "2", "LOCK", ".hidden", "3.tmp", "abc", "007", "0", "00",
        ] {
            std::fs::write(format!("{}/{}", config.dir, name), b"")?;
        }

        let ids = load_segment_ids(&config)?;
        assert_eq!(ids, vec![SegmentId(2), SegmentId(7), SegmentId(10)]);

        let d = SegmentDir::load(&config)?;
        assert_eq!(d.stats(), (3, Some(SegmentId(2))));
        assert_eq!(d.max(), Some(SegmentId(10)));

        Ok(())
    }

    #[test]
    fn test_find_and_next() {
        let d = dir_of(&[1, 4, 9]);

        assert_eq!(d.find(0), None);
        assert_eq!(d.find(1), Some(SegmentId(1)));
        assert_eq!(d.find(3), Some(SegmentId(1)));
        assert_eq!(d.find(4), Some(SegmentId(4)));
        assert_eq!(d.find(100), Some(SegmentId(9)));

        assert_eq!(d.next_after(SegmentId(1)), Some(SegmentId(4)));
        assert_eq!(d.next_after(SegmentId(5)), Some(SegmentId(9)));
        assert_eq!(d.next_after(SegmentId(9)), None);

        assert_eq!(d.prev_before(SegmentId(1)), None);
        assert_eq!(d.prev_before(SegmentId(4)), Some(SegmentId(1)));
        assert_eq!(d.prev_before(SegmentId(100)), Some(SegmentId(9)));

        assert!(d.remove(SegmentId(9)));
        assert!(!d.remove(SegmentId(9)));
        assert_eq!(d.max(), Some(SegmentId(4)));
    }

    #[test]
    fn test_take_below() {
        // Segments: [1, 4), [4, 9), [9, ..)
        let d = dir_of(&[1, 4, 9]);

        assert!(d.take_below(3, Some(SegmentId(9))).is_empty());
        assert_eq!(d.ids().len(), 3);

        // 4 is the first LSN of the second segment: the first is all below.
        assert_eq!(d.take_below(4, Some(SegmentId(9))), vec![SegmentId(1)]);
        assert_eq!(d.ids(), vec![SegmentId(4), SegmentId(9)]);

        // The last segment is never taken: nothing follows it.
        assert_eq!(d.take_below(u64::MAX, Some(SegmentId(9))), vec![
            SegmentId(4)
        ]);
        assert_eq!(d.ids(), vec![SegmentId(9)]);

        d.restore(&[SegmentId(1), SegmentId(4)]);
        assert_eq!(d.ids(), vec![SegmentId(1), SegmentId(4), SegmentId(9)]);
    }

    #[test]
    fn test_take_below_never_takes_current() {
        let d = dir_of(&[1, 4, 9]);

        assert_eq!(d.take_below(100, Some(SegmentId(4))), vec![SegmentId(1)]);
        assert_eq!(d.ids(), vec![SegmentId(4), SegmentId(9)]);
    }
}
