use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use fs2::FileExt;
use log::info;

use crate::Config;

/// Exclusive advisory lock on a WAL directory, held for the lifetime of a
/// [`Wal`](crate::Wal) so that two processes never append to the same
/// segments.
#[derive(Debug)]
pub(crate) struct FileLock {
    config: Arc<Config>,
    f: File,
}

impl FileLock {
    pub const LOCK_FILE_NAME: &'static str = "LOCK";

    pub(crate) fn new(config: Arc<Config>) -> Result<Self, io::Error> {
        let path = Self::lock_path(config.as_ref());

        let f = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        f.try_lock_exclusive().map_err(|e| {
            io::Error::new(
                io::ErrorKind::WouldBlock,
                format!(
                    "WAL directory '{}' is locked by another process; error:({})",
                    config.dir, e
                ),
            )
        })?;

        info!("WAL directory lock acquired: {}", path);

        Ok(Self { config, f })
    }

    pub(crate) fn lock_path(config: &Config) -> String {
        format!("{}/{}", config.dir, Self::LOCK_FILE_NAME)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.f.unlock();
        info!(
            "WAL directory lock released: {}",
            Self::lock_path(self.config.as_ref())
        );
    }
}
