//! Frame production glue.
//!
//! Real deployments feed the publisher from whatever produces pixels (an
//! emulator, a capture pipeline). The built-in [`TestPattern`] keeps the
//! binary usable on its own and doubles as a smoke-test source.

use std::time::Duration;

use bytes::Bytes;
use framecast_protocol::Dimensions;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::FramePublisher;

/// Something that yields one full RGBA frame per call.
pub trait FrameSource {
    fn dimensions(&self) -> Dimensions;
    fn next_frame(&mut self) -> Bytes;
}

/// Animated gradient: x drives red, y drives green, time drives blue.
pub struct TestPattern {
    dims: Dimensions,
    tick: u64,
}

impl TestPattern {
    pub fn new(dims: Dimensions) -> Self {
        Self { dims, tick: 0 }
    }
}

impl FrameSource for TestPattern {
    fn dimensions(&self) -> Dimensions {
        self.dims
    }

    fn next_frame(&mut self) -> Bytes {
        let mut buf = Vec::with_capacity(self.dims.byte_len());
        let phase = self.tick as u8;
        for y in 0..self.dims.height() {
            for x in 0..self.dims.width() {
                buf.push(x as u8);
                buf.push(y as u8);
                buf.push(phase.wrapping_add((x ^ y) as u8));
                buf.push(0xff);
            }
        }
        self.tick = self.tick.wrapping_add(1);
        Bytes::from(buf)
    }
}

/// Publish frames from `source` at `fps` until `shutdown` flips.
///
/// `publish` never blocks on consumers, and missed ticks are skipped rather
/// than bursted, so a slow wall-clock (or a paused debugger) cannot flood the
/// queues with stale frames.
pub async fn pump<S: FrameSource>(
    mut source: S,
    publisher: FramePublisher,
    fps: u32,
    mut shutdown: watch::Receiver<bool>,
) {
    let period = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match publisher.publish(source.next_frame()) {
                    Ok(report) => {
                        tracing::trace!(
                            receivers = report.receivers,
                            dropped = report.dropped,
                            "published frame"
                        );
                    }
                    // A source producing wrong-size buffers is a bug, but it
                    // must not take the server down.
                    Err(err) => tracing::warn!("dropping frame: {err}"),
                }
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_frames_are_exactly_one_frame_long() {
        let dims = Dimensions::new(33, 7).unwrap();
        let mut source = TestPattern::new(dims);
        for _ in 0..3 {
            assert_eq!(source.next_frame().len(), dims.byte_len());
        }
    }

    #[test]
    fn test_pattern_animates() {
        let dims = Dimensions::new(8, 8).unwrap();
        let mut source = TestPattern::new(dims);
        let first = source.next_frame();
        let second = source.next_frame();
        assert_ne!(first, second);
    }
}
