//! Define the writing interface of the log.
//!
//! The transaction commit path depends on [`LogWriter`] rather than on
//! [`Wal`](crate::Wal) directly, so that it can be driven by another
//! implementation in tests.

use std::io;

use crate::Batch;

/// Define the writing interface of a write-ahead log.
///
/// Note: [`Self::append`] does not sync unless the log is configured to. Call
/// [`Self::sync`] explicitly to ensure data is durably persisted.
pub trait LogWriter {
    /// Append a batch as one record, stamp the assigned LSN into it and
    /// return it.
    ///
    /// LSNs are assigned in append order, without gaps.
    fn append(&self, batch: &mut Batch) -> Result<u64, io::Error>;

    /// Make every appended batch durable.
    fn sync(&self) -> Result<(), io::Error>;
}

/// Append a batch and make it durable before returning its LSN.
pub fn commit<W>(w: &W, batch: &mut Batch) -> Result<u64, io::Error>
where W: LogWriter + ?Sized {
    let lsn = w.append(batch)?;
    w.sync()?;
    Ok(lsn)
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::commit;
    use crate::testing::batch_of;
    use crate::tests::context::new_testing;

    #[test]
    fn test_commit() -> Result<(), io::Error> {
        let (_ctx, wal) = new_testing()?;

        let mut b = batch_of(&["a"]);
        assert_eq!(commit(&wal, &mut b)?, 1);
        assert_eq!(b.lsn(), 1);

        let mut b = batch_of(&["b", "c"]);
        assert_eq!(commit(&wal, &mut b)?, 2);
        assert_eq!(wal.lsn(), 2);

        Ok(())
    }
}
