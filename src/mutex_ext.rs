use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

/// Lock a mutex, ignoring poisoning.
///
/// Every critical section in this crate leaves the guarded state consistent
/// before any call that may panic, so the data behind a poisoned lock is
/// still valid.
pub(crate) trait MutexExt<T> {
    fn locked(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    fn locked(&self) -> MutexGuard<'_, T> {
        self.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
