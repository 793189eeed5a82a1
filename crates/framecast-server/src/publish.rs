use std::sync::Arc;

use bytes::Bytes;
use framecast_protocol::{encode_frame, Dimensions, MalformedFrame};

use crate::{metrics::Metrics, queue::PushOutcome, registry::Registry};

/// Result of one fan-out pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastReport {
    /// Connections the frame was enqueued for.
    pub receivers: usize,
    /// Stale frames discarded to make room on full queues.
    pub dropped: usize,
}

/// Handle for pushing frames into the stream. Cloneable; a frame source keeps
/// one and calls [`publish`](Self::publish) at its own cadence.
#[derive(Clone)]
pub struct FramePublisher {
    dims: Dimensions,
    registry: Arc<Registry>,
    metrics: Metrics,
}

impl FramePublisher {
    pub(crate) fn new(dims: Dimensions, registry: Arc<Registry>, metrics: Metrics) -> Self {
        Self {
            dims,
            registry,
            metrics,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dims
    }

    /// Validate `payload` against the configured dimensions and enqueue it on
    /// every currently-Open connection.
    ///
    /// Never blocks: a full queue drops its oldest frame instead, and actual
    /// transmission is left to each connection's writer. The same `Bytes` are
    /// shared by every queue; nothing is copied per connection.
    pub fn publish(&self, payload: Bytes) -> Result<BroadcastReport, MalformedFrame> {
        let payload = encode_frame(self.dims, payload).inspect_err(|_| {
            self.metrics.frame_rejected();
        })?;
        self.metrics.frame_published();

        let mut report = BroadcastReport::default();
        self.registry.for_each_open(|id, queue| {
            match queue.push(payload.clone()) {
                PushOutcome::Enqueued => report.receivers += 1,
                PushOutcome::DroppedOldest => {
                    report.receivers += 1;
                    report.dropped += 1;
                    self.metrics.frame_dropped();
                    tracing::trace!(connection = %id, "queue full, dropped oldest frame");
                }
                // Lost the race with a close; the registry entry is on its
                // way out.
                PushOutcome::Closed => {}
            }
        });
        Ok(report)
    }
}
