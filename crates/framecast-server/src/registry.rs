use std::{
    collections::HashMap,
    fmt,
    sync::{Mutex, MutexGuard},
    time::{Duration, Instant},
};

use crate::queue::SendQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle. Only `Open` connections receive broadcast frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectionState {
    Connecting,
    Open,
    Closing,
}

struct Entry {
    queue: SendQueue,
    state: ConnectionState,
    last_activity: Instant,
}

/// The one structure mutated by multiple actors (accept path, fan-out loop,
/// per-session close paths). All access goes through these methods; the lock
/// is never held across an await point.
pub(crate) struct Registry {
    connections: Mutex<HashMap<ConnectionId, Entry>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        match self.connections.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn register(&self, id: ConnectionId, queue: SendQueue) {
        let prior = self.lock().insert(
            id,
            Entry {
                queue,
                state: ConnectionState::Connecting,
                last_activity: Instant::now(),
            },
        );
        // Identifiers are allocated from a counter and never reused.
        debug_assert!(prior.is_none(), "duplicate connection id {id}");
    }

    /// Returns false if the connection is no longer registered.
    pub(crate) fn set_state(&self, id: ConnectionId, state: ConnectionState) -> bool {
        match self.lock().get_mut(&id) {
            Some(entry) => {
                entry.state = state;
                true
            }
            None => false,
        }
    }

    /// Record client activity (any inbound message) for the connection.
    pub(crate) fn touch(&self, id: ConnectionId) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.last_activity = Instant::now();
        }
    }

    /// Time since the last inbound message from this client.
    pub(crate) fn idle_for(&self, id: ConnectionId) -> Option<Duration> {
        self.lock()
            .get(&id)
            .map(|entry| entry.last_activity.elapsed())
    }

    /// Remove a connection and release its send queue (clearing anything still
    /// queued). Idempotent: deregistering an absent id is a no-op.
    pub(crate) fn deregister(&self, id: ConnectionId) -> bool {
        match self.lock().remove(&id) {
            Some(entry) => {
                entry.queue.close();
                true
            }
            None => false,
        }
    }

    /// Visit the send queue of every currently-Open connection.
    ///
    /// Iterates a snapshot so callers tolerate concurrent registration and
    /// removal, and so no queue operation runs under the registry lock.
    pub(crate) fn for_each_open(&self, mut f: impl FnMut(ConnectionId, &SendQueue)) {
        let snapshot: Vec<(ConnectionId, SendQueue)> = self
            .lock()
            .iter()
            .filter(|(_, entry)| entry.state == ConnectionState::Open)
            .map(|(id, entry)| (*id, entry.queue.clone()))
            .collect();
        for (id, queue) in &snapshot {
            f(*id, queue);
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.lock().len()
    }
}
