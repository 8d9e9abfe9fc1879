//! Per-key locks for in-process publish serialization.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::cache::key::CacheKey;

/// A table of mutexes, one per cache key.
#[derive(Debug, Default)]
pub(crate) struct KeyLocks {
    table: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
    /// The mutex guarding `key`, created on first use.
    pub fn for_key(&self, key: &CacheKey) -> Arc<Mutex<()>> {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.entry(key.clone()).or_default().clone()
    }
}

/// Lock a key mutex, ignoring poisoning left by a panicked holder.
///
/// Nothing is guarded by the mutex itself; on-disk state is validated on
/// every access.
pub(crate) fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Ecosystem;

    #[test]
    fn test_same_key_same_lock() {
        let locks = KeyLocks::default();
        let a = CacheKey::new(Ecosystem::Pip, "requests", "2.31.0");
        let b = CacheKey::new(Ecosystem::Pip, "Requests", "2.31.0");
        let c = CacheKey::new(Ecosystem::Pip, "requests", "2.30.0");

        assert!(Arc::ptr_eq(&locks.for_key(&a), &locks.for_key(&b)));
        assert!(!Arc::ptr_eq(&locks.for_key(&a), &locks.for_key(&c)));
    }

    #[test]
    fn test_poisoned_lock_still_acquires() {
        let lock = Arc::new(Mutex::new(()));
        let poisoner = Arc::clone(&lock);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(lock.is_poisoned());
        let _guard = acquire(&lock);
    }
}
