use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use keyquorum_core::tokio;

type LockMap = HashMap<String, Arc<AsyncMutex<()>>>;

/// Single writer per `client_id`. Tasks with different ids never contend.
#[derive(Clone, Default)]
pub struct TaskLocks {
    inner: Arc<Mutex<LockMap>>,
}

pub struct TaskGuard {
    locks: TaskLocks,
    client_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, client_id: &str) -> TaskGuard {
        let mutex = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(client_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = mutex.lock_owned().await;
        TaskGuard {
            locks: self.clone(),
            client_id: client_id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        let idle = map
            .get(&self.client_id)
            .map(|m| Arc::strong_count(m) == 1)
            .unwrap_or(false);
        if idle {
            map.remove(&self.client_id);
        }
    }
}
