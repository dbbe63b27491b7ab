//! Per-key async locks serializing mutations of the same group.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Keyed mutex table. `acquire` serializes tasks that pass the same key
/// and leaves tasks on other keys untouched. Lock entries are retained
/// for the life of the process; the key space (group and account ids) is
/// small enough that they are never reaped.
pub struct GroupLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GroupLocks {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Take the lock for `key`, waiting until any current holder releases it.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };

        lock.lock_owned().await
    }
}

impl Default for GroupLocks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let locks = GroupLocks::new();
        let guard = locks.acquire("grp-1").await;

        let blocked = timeout(Duration::from_millis(50), locks.acquire("grp-1")).await;
        assert!(blocked.is_err());

        drop(guard);

        let reacquired = timeout(Duration::from_millis(50), locks.acquire("grp-1")).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_keys_are_independent() {
        let locks = GroupLocks::new();
        let _guard = locks.acquire("grp-1").await;

        let other = timeout(Duration::from_millis(50), locks.acquire("grp-2")).await;
        assert!(other.is_ok());
    }
}
