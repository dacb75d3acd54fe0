//! Per-test read locks
//!
//! History reads for a single test are serialized; reads for different
//! tests proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Named async mutexes keyed by test name.
#[derive(Debug, Default)]
pub struct TestReadLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl TestReadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `test_name`, waiting for any current holder.
    pub async fn lock(&self, test_name: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // entries only held by the map are idle
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            locks
                .entry(test_name.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Number of names with a live lock.
    pub fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_name_is_exclusive() {
        let locks = Arc::new(TestReadLocks::new());
        let guard = locks.lock("buttons").await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = other.lock("buttons").await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_different_names_do_not_block() {
        let locks = TestReadLocks::new();
        let _a = locks.lock("a").await;
        let _b = locks.lock("b").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_pruned() {
        let locks = TestReadLocks::new();
        drop(locks.lock("a").await);
        let _b = locks.lock("b").await;
        assert_eq!(locks.len(), 1);
    }
}
