use std::fs;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use wal_log::Batch;
use wal_log::Config;
use wal_log::Manifest;
use wal_log::Record;
use wal_log::Slot;
use wal_log::Wal;

fn config_in(dir: &TempDir, segment_max_size: u64) -> Arc<Config> {
    Arc::new(Config {
        dir: dir.path().to_str().unwrap().to_string(),
        segment_max_size: Some(segment_max_size),
        ..Default::default()
    })
}

fn append(wal: &Wal, i: u64) -> io::Result<u64> {
    let mut b = Batch::new().with_meta(format!("m{}", i));
    b.push(format!("payload-{}", i));
    wal.append(&mut b)
}

/// Copy the listed prefix of every segment file.
fn copy_snapshot(
    manifest: &Manifest,
    from: &TempDir,
    to: &TempDir,
) -> io::Result<()> {
    for entry in manifest.entries.iter() {
        let data = fs::read(from.path().join(&entry.path))?;
        fs::write(to.path().join(&entry.path), &data[..entry.size as usize])?;
    }
    Ok(())
}

/// Re-append a record replicated from another log.
fn replay(wal: &Wal, rec: &Record) -> io::Result<u64> {
    let mut b = Batch::new().with_meta(rec.meta.clone());
    b.push_many(rec.payload.clone(), rec.header.count);
    wal.append(&mut b)
}

/// A new follower is bootstrapped from a snapshot and then streams the rest
/// of the log while the leader keeps appending and collecting.
#[test]
fn test_bootstrap_follower() -> io::Result<()> {
    let leader_dir = TempDir::new()?;
    let follower_dir = TempDir::new()?;

    let leader = Wal::open(config_in(&leader_dir, 256))?;
    for i in 1..=20 {
        append(&leader, i)?;
    }

    let slot = Slot::new();
    let manifest = leader.snapshot(&slot)?;
    assert!(manifest.len() > 1);
    assert_eq!(slot.lsn(), 0);

    copy_snapshot(&manifest, &leader_dir, &follower_dir)?;

    let follower = Wal::open(config_in(&follower_dir, 256))?;
    assert_eq!(follower.lsn(), 20);

    // The follower has what it copied: the slot can move up to it.
    slot.set(follower.lsn());
    leader.attach(&slot);

    let n = 100;

    thread::scope(|s| -> io::Result<()> {
        let streamer = s.spawn(|| -> io::Result<()> {
            let mut c = leader.cursor(follower.lsn() + 1, true)?;

            while follower.lsn() < n {
                if c.next()? {
                    let rec = c.at().map(|r| r.to_record());
                    if let Some(rec) = rec {
                        let lsn = replay(&follower, &rec)?;
                        assert_eq!(lsn, rec.lsn());
                        slot.set(lsn);
                    }
                    continue;
                }
                slot.wait_timeout(Duration::from_millis(100));
            }

            c.close();
            Ok(())
        });

        for i in 21..=n {
            append(&leader, i)?;
            if i % 10 == 0 {
                leader.gc(u64::MAX)?;
            }
        }

        streamer.join().unwrap()
    })?;

    leader.detach(&slot);
    leader.remove_slot(&slot);

    // Both logs hold the same records from the leader's oldest LSN.
    let first = leader.status().lsn_min;
    let a = leader
        .cursor(first, false)
        .map_err(io::Error::from)?
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(io::Error::from)?;
    let b = follower
        .cursor(first, false)
        .map_err(io::Error::from)?
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(io::Error::from)?;

    assert_eq!(a.len() as u64, n - first + 1);
    assert_eq!(a, b);

    // Nothing holds back gc any more.
    let stat = leader.gc(u64::MAX)?;
    println!("{}", stat);
    assert_eq!(leader.status().segments, 1);

    Ok(())
}
