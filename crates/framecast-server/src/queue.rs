use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
};

use bytes::Bytes;
use tokio::sync::Notify;

/// Outcome of a non-blocking enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Enqueued,
    /// The queue was full; the least-recently-queued frame was discarded to
    /// make room. Staleness is worse than loss for a live stream.
    DroppedOldest,
    /// The connection is closing; the frame was discarded.
    Closed,
}

/// Bounded per-connection outbound frame queue with drop-oldest semantics.
///
/// Producers (the fan-out loop) call `push` and never block. A single
/// consumer (the connection's writer task) awaits `pop`. `close` clears any
/// queued frames so nothing is retained for a dead socket.
#[derive(Clone)]
pub(crate) struct SendQueue {
    inner: Arc<Inner>,
}

struct Inner {
    capacity: usize,
    state: Mutex<State>,
    notify: Notify,
}

struct State {
    frames: VecDeque<Bytes>,
    closed: bool,
}

impl SendQueue {
    /// `capacity` must be at least 1 (enforced by config validation).
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                capacity,
                state: Mutex::new(State {
                    frames: VecDeque::with_capacity(capacity),
                    closed: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.inner.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn push(&self, frame: Bytes) -> PushOutcome {
        let outcome = {
            let mut state = self.lock();
            if state.closed {
                return PushOutcome::Closed;
            }
            let outcome = if state.frames.len() >= self.inner.capacity {
                state.frames.pop_front();
                PushOutcome::DroppedOldest
            } else {
                PushOutcome::Enqueued
            };
            state.frames.push_back(frame);
            outcome
        };
        self.inner.notify.notify_one();
        outcome
    }

    /// Await the next frame. Returns `None` once the queue is closed and no
    /// further frames will ever be delivered.
    pub(crate) async fn pop(&self) -> Option<Bytes> {
        loop {
            // Register interest before checking state so a push between the
            // check and the await is not lost.
            let notified = self.inner.notify.notified();
            {
                let mut state = self.lock();
                if let Some(frame) = state.frames.pop_front() {
                    return Some(frame);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Close the queue and discard anything still queued. Idempotent.
    pub(crate) fn close(&self) {
        {
            let mut state = self.lock();
            state.closed = true;
            state.frames.clear();
        }
        self.inner.notify.notify_one();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: u8) -> Bytes {
        Bytes::from(vec![tag; 8])
    }

    #[test]
    fn full_queue_drops_oldest_first() {
        let queue = SendQueue::new(3);
        assert_eq!(queue.push(frame(0)), PushOutcome::Enqueued);
        assert_eq!(queue.push(frame(1)), PushOutcome::Enqueued);
        assert_eq!(queue.push(frame(2)), PushOutcome::Enqueued);
        assert_eq!(queue.push(frame(3)), PushOutcome::DroppedOldest);
        assert_eq!(queue.len(), 3);

        // The three most recent frames survive, in order.
        let mut state = queue.lock();
        let tags: Vec<u8> = state.frames.drain(..).map(|f| f[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn pop_returns_frames_in_order() {
        let queue = SendQueue::new(4);
        queue.push(frame(1));
        queue.push(frame(2));
        assert_eq!(queue.pop().await.unwrap()[0], 1);
        assert_eq!(queue.pop().await.unwrap()[0], 2);
    }

    #[tokio::test]
    async fn pop_wakes_on_push() {
        let queue = SendQueue::new(4);
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push(frame(9));
        let got = consumer.await.unwrap().unwrap();
        assert_eq!(got[0], 9);
    }

    #[tokio::test]
    async fn close_discards_queued_frames_and_ends_pop() {
        let queue = SendQueue::new(4);
        queue.push(frame(1));
        queue.push(frame(2));
        queue.close();
        assert_eq!(queue.pop().await, None);
        assert_eq!(queue.push(frame(3)), PushOutcome::Closed);
        // Second close is a no-op.
        queue.close();
    }
}
