use std::io;

use pretty_assertions::assert_eq;

use crate::errors::LsnCollected;
use crate::errors::ReadError;
use crate::testing::payload10;
use crate::tests::context::new_testing;
use crate::tests::context::TestContext;
use crate::tests::sample_data::append_n;
use crate::tests::sample_data::build_five_segments;
use crate::Batch;
use crate::Cursor;
use crate::CursorState;
use crate::SegmentId;

/// Drive a cursor to exhaustion and return the LSNs it yields.
fn read_lsns(c: &mut Cursor<'_>) -> Result<Vec<u64>, ReadError> {
    let mut lsns = vec![];
    while c.next()? {
        let r = c.at().unwrap();
        assert_eq!(r.payload, payload10(r.lsn()).as_bytes());
        lsns.push(r.lsn());
    }
    Ok(lsns)
}

#[test]
fn test_cursor_from_start() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    append_n(&wal, 5)?;

    let mut c = wal.cursor(1, false)?;
    assert_eq!(c.state(), CursorState::Positioned);
    assert!(c.at().is_none());

    assert_eq!(read_lsns(&mut c)?, vec![1, 2, 3, 4, 5]);
    assert_eq!(c.state(), CursorState::Exhausted);
    assert!(c.at().is_none());

    // Still exhausted.
    assert!(!c.next()?);

    Ok(())
}

#[test]
fn test_cursor_meta_and_payload() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;

    let mut b = Batch::new().with_meta("txn");
    b.push("foo");
    b.push_many("barbaz", 2);
    wal.append(&mut b)?;

    let mut c = wal.cursor(1, false)?;
    assert!(c.next()?);

    let r = c.at().unwrap();
    assert_eq!(r.lsn(), 1);
    assert_eq!(r.header.count, 3);
    assert_eq!(r.header.size, 24 + 3 + 9);
    assert_eq!(r.meta, b"txn");
    assert_eq!(r.payload, b"foobarbaz");

    Ok(())
}

#[test]
fn test_cursor_across_segments() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    build_five_segments(&wal)?;

    for start in 1..=10 {
        let mut c = wal.cursor(start, false)?;
        let want = (start..=10).collect::<Vec<_>>();
        assert_eq!(read_lsns(&mut c)?, want, "start at {}", start);

        // Reopen at the same position reproduces the same sequence.
        let mut c = wal.cursor(start, false)?;
        assert_eq!(read_lsns(&mut c)?, want, "reopen at {}", start);
    }

    // Beyond the last LSN: nothing yet.
    let mut c = wal.cursor(11, false)?;
    assert!(!c.next()?);

    Ok(())
}

#[test]
fn test_cursor_empty_log() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;

    // An empty log is not an error.
    let mut c = wal.cursor(1, false)?;
    assert!(!c.next()?);
    assert_eq!(c.state(), CursorState::Exhausted);

    Ok(())
}

#[test]
fn test_cursor_collected() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    build_five_segments(&wal)?;

    wal.gc(5)?;

    let res = wal.cursor(4, false);
    match res {
        Err(ReadError::Collected(e)) => {
            assert_eq!(e, LsnCollected::new(4, Some(SegmentId(5))));
        }
        other => panic!("expect collected, got: {:?}", other.map(|_| ())),
    }

    // Converted to io::Error
    let res = wal.cursor(1, false).map(|_| ()).map_err(io::Error::from);
    assert_eq!(io::ErrorKind::NotFound, res.unwrap_err().kind());

    let mut c = wal.cursor(5, false)?;
    assert_eq!(read_lsns(&mut c)?, vec![5, 6, 7, 8, 9, 10]);

    Ok(())
}

/// The segment a cursor is about to move to is removed while it reads.
#[test]
fn test_cursor_next_segment_collected() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    build_five_segments(&wal)?;

    let mut c = wal.cursor(1, false)?;
    assert!(c.next()?);
    assert_eq!(c.at().map(|r| r.lsn()), Some(1));

    // Removes segment 1 and 3
    assert_eq!(wal.gc(5)?.removed, vec![SegmentId(1), SegmentId(3)]);

    // The open segment is still readable.
    assert!(c.next()?);
    assert_eq!(c.at().map(|r| r.lsn()), Some(2));

    let res = c.next();
    assert!(
        matches!(res, Err(ReadError::Collected(ref e)) if e.lsn == 3),
        "got: {:?}",
        res
    );

    Ok(())
}

/// A non-follow cursor stops at the last LSN assigned when it is opened.
#[test]
fn test_cursor_non_follow_bound() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    append_n(&wal, 3)?;

    let mut c = wal.cursor(2, false)?;
    append_n(&wal, 2)?;

    assert_eq!(read_lsns(&mut c)?, vec![2, 3]);

    Ok(())
}

#[test]
fn test_cursor_follow() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    wal.set_segment_max_size(50);
    append_n(&wal, 3)?;

    let mut c = wal.cursor(1, true)?;
    assert!(c.is_following());
    assert_eq!(read_lsns(&mut c)?, vec![1, 2, 3]);
    assert_eq!(c.state(), CursorState::Exhausted);

    // New records appear, including in newly rotated segments.
    append_n(&wal, 4)?;
    assert_eq!(read_lsns(&mut c)?, vec![4, 5, 6, 7]);

    assert!(!c.next()?);
    append_n(&wal, 1)?;
    assert_eq!(read_lsns(&mut c)?, vec![8]);

    Ok(())
}

/// A follow cursor opened beyond the last LSN waits for it.
#[test]
fn test_cursor_follow_from_future_lsn() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    append_n(&wal, 2)?;

    let mut c = wal.cursor(4, true)?;
    assert!(!c.next()?);

    append_n(&wal, 1)?;
    assert!(!c.next()?);

    append_n(&wal, 2)?;
    assert_eq!(read_lsns(&mut c)?, vec![4, 5]);

    Ok(())
}

#[test]
fn test_cursor_collect() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    build_five_segments(&wal)?;

    let mut c = wal.cursor(2, false)?;
    let mut buf = Vec::new();

    assert_eq!(c.collect(4, &mut buf)?, Some(5));
    assert_eq!(buf.len(), 4 * 34);

    // Raw records, header first: the LSN of the first one.
    assert_eq!(&buf[..8], &2u64.to_be_bytes());

    assert_eq!(c.collect(100, &mut buf)?, Some(10));
    assert_eq!(buf.len(), 9 * 34);

    assert_eq!(c.collect(100, &mut buf)?, None);
    assert_eq!(buf.len(), 9 * 34);

    Ok(())
}

#[test]
fn test_cursor_records() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    build_five_segments(&wal)?;

    let records = wal
        .cursor(3, false)?
        .records()
        .collect::<Result<Vec<_>, _>>()?;

    assert_eq!(
        records.iter().map(|r| r.lsn()).collect::<Vec<_>>(),
        (3..=10).collect::<Vec<_>>()
    );
    assert_eq!(records[0].payload, payload10(3).as_bytes());
    assert_eq!(records[0].size(), 34);

    Ok(())
}

#[test]
fn test_cursor_close() -> Result<(), io::Error> {
    let (_ctx, wal) = new_testing()?;
    append_n(&wal, 3)?;

    let mut c = wal.cursor(1, true)?;
    assert!(c.next()?);

    c.close();
    assert_eq!(c.state(), CursorState::Closed);
    assert!(c.at().is_none());
    assert!(!c.next()?);

    c.close();
    assert_eq!(c.state(), CursorState::Closed);

    Ok(())
}

/// A record that fails its checksum is reported, not skipped.
#[test]
fn test_cursor_corrupt_record() -> Result<(), io::Error> {
    let ctx = TestContext::new()?;

    {
        let wal = ctx.new_wal()?;
        build_five_segments(&wal)?;
    }

    // Damage the payload of LSN 4, in a segment that is not scanned on open.
    let path = ctx.config.segment_path(SegmentId(3));
    let mut data = std::fs::read(&path)?;
    data[34 + 30] ^= 0xff;
    std::fs::write(&path, data)?;

    let wal = ctx.new_wal()?;
    let mut c = wal.cursor(3, false)?;
    assert!(c.next()?);

    let res = c.next();
    match res {
        Err(ReadError::Corrupt(e)) => {
            assert_eq!(e.segment_id, SegmentId(3));
            assert_eq!(e.offset, 34);
        }
        other => panic!("expect corrupt record, got: {:?}", other),
    }

    // Converted to io::Error
    let res = wal.cursor(4, false)?.next().map_err(io::Error::from);
    assert_eq!(io::ErrorKind::InvalidData, res.unwrap_err().kind());

    Ok(())
}
