pub(crate) mod dump;
pub(crate) mod manifest;
pub(crate) mod stat;
#[allow(clippy::module_inception)]
pub(crate) mod wal;
