use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug, Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held while an entity is being reconverted. Dropping it releases the entity.
#[derive(Debug)]
pub struct EntityLease {
    _guard: OwnedMutexGuard<()>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, entity_id: &str) -> EntityLease {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // drop locks nobody holds or waits on
            locks.retain(|key, lock| key == entity_id || Arc::strong_count(lock) > 1);
            locks
                .entry(entity_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        EntityLease {
            _guard: lock.lock_owned().await,
        }
    }

    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .map(|locks| locks.len())
            .unwrap_or_default()
    }
}
