use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, taking the inner state back if a panicking holder poisoned it.
pub(crate) fn lock_with_recovery<'a, T>(
    mutex: &'a Mutex<T>,
    lock_name: &'static str,
) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            tracing::warn!(lock = lock_name, "mutex poisoned; recovering inner state");
            poisoned.into_inner()
        }
    }
}
