//! Usage: Lock extension traits that recover from poisoned state instead of panicking.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub(crate) trait MutexExt<T> {
    /// Acquire the lock; a poisoned lock is recovered and logged.
    fn lock_or_recover(&self) -> MutexGuard<'_, T>;
}

impl<T> MutexExt<T> for Mutex<T> {
    #[track_caller]
    fn lock_or_recover(&self) -> MutexGuard<'_, T> {
        match self.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log_poisoned::<T>(std::panic::Location::caller());
                poisoned.into_inner()
            }
        }
    }
}

pub(crate) trait RwLockExt<T> {
    fn read_or_recover(&self) -> RwLockReadGuard<'_, T>;
    fn write_or_recover(&self) -> RwLockWriteGuard<'_, T>;
}

impl<T> RwLockExt<T> for RwLock<T> {
    #[track_caller]
    fn read_or_recover(&self) -> RwLockReadGuard<'_, T> {
        match self.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log_poisoned::<T>(std::panic::Location::caller());
                poisoned.into_inner()
            }
        }
    }

    #[track_caller]
    fn write_or_recover(&self) -> RwLockWriteGuard<'_, T> {
        match self.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log_poisoned::<T>(std::panic::Location::caller());
                poisoned.into_inner()
            }
        }
    }
}

fn log_poisoned<T>(loc: &std::panic::Location<'_>) {
    tracing::error!(
        lock_type = std::any::type_name::<T>(),
        file = loc.file(),
        line = loc.line(),
        column = loc.column(),
        "lock poisoned by a panicking thread; recovered data may be inconsistent"
    );
}
