//! Per-client write locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

/// One async mutex per client id, present only while someone holds or
/// waits for it.
///
/// Holding a client's guard makes the caller the only writer for that
/// client; writers for different clients proceed independently.
#[derive(Default)]
pub struct ClientLocks {
    locks: Slots,
}

impl ClientLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive write access to `client_id`.
    pub async fn acquire(&self, client_id: &str) -> ClientGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().expect("lock poisoned");
            locks
                .entry(client_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        // Dropped mid-wait, the slot is pruned the same way.
        let mut guard = ClientGuard {
            locks: &self.locks,
            client_id: client_id.to_string(),
            held: None,
            waiting: Some(Arc::clone(&lock)),
        };
        guard.held = Some(lock.lock_owned().await);
        guard.waiting = None;
        guard
    }

    /// Number of clients with a live slot.
    pub fn len(&self) -> usize {
        self.locks.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn is_held(&self, client_id: &str) -> bool {
        let locks = self.locks.lock().expect("lock poisoned");
        locks
            .get(client_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }
}

impl std::fmt::Debug for ClientLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientLocks")
            .field("clients", &self.len())
            .finish()
    }
}

/// Exclusive write access to one client. Removes the client's slot on drop
/// when nobody else holds or awaits it.
pub struct ClientGuard<'a> {
    locks: &'a Slots,
    client_id: String,
    held: Option<OwnedMutexGuard<()>>,
    waiting: Option<Arc<AsyncMutex<()>>>,
}

impl Drop for ClientGuard<'_> {
    fn drop(&mut self) {
        self.held.take();
        self.waiting.take();
        let mut locks = self.locks.lock().expect("lock poisoned");
        if locks
            .get(&self.client_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.client_id);
        }
    }
}
