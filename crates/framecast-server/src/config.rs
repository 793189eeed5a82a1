use std::{env, net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use framecast_protocol::Dimensions;

/// Server configuration.
///
/// Width and height must match what every client is built against: the wire
/// carries raw pixels with no dimension header, so a mismatch renders as
/// garbage on the client canvas rather than as an error anywhere.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub bind_addr: SocketAddr,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Max frames queued per connection before drop-oldest engages.
    pub queue_capacity: usize,
    /// Server-initiated WebSocket pings; `None` disables them.
    pub ping_interval: Option<Duration>,
    /// Per-write deadline; a consumer stalled past the queue's tolerance and
    /// this long on one socket write is treated as dead. `None` disables it.
    pub write_timeout: Option<Duration>,
    /// Cadence of the built-in test pattern source (binary only).
    pub source_fps: u32,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 2794)),
            width: 640,
            height: 480,
            queue_capacity: 4,
            ping_interval: Some(Duration::from_secs(30)),
            write_timeout: Some(Duration::from_secs(10)),
            source_fps: 30,
        }
    }
}

impl StreamConfig {
    /// Build a configuration from `FRAMECAST_*` environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let bind_addr = match env::var("FRAMECAST_LISTEN_ADDR") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("FRAMECAST_LISTEN_ADDR: invalid socket address {raw:?}"))?,
            Err(_) => defaults.bind_addr,
        };

        let width = parse_env_u32("FRAMECAST_WIDTH")?.unwrap_or(defaults.width);
        let height = parse_env_u32("FRAMECAST_HEIGHT")?.unwrap_or(defaults.height);

        let queue_capacity = match parse_env_u32("FRAMECAST_QUEUE_CAPACITY")? {
            Some(cap) => cap as usize,
            None => defaults.queue_capacity,
        };

        let ping_interval = match parse_env_u32("FRAMECAST_PING_INTERVAL_MS")? {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms as u64)),
            None => defaults.ping_interval,
        };

        let write_timeout = match parse_env_u32("FRAMECAST_WRITE_TIMEOUT_MS")? {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms as u64)),
            None => defaults.write_timeout,
        };

        let source_fps = parse_env_u32("FRAMECAST_SOURCE_FPS")?.unwrap_or(defaults.source_fps);

        let cfg = Self {
            bind_addr,
            width,
            height,
            queue_capacity,
            ping_interval,
            write_timeout,
            source_fps,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        self.dimensions()?;
        if self.queue_capacity == 0 {
            bail!("queue_capacity must be at least 1");
        }
        if self.source_fps == 0 {
            bail!("source_fps must be at least 1");
        }
        Ok(())
    }

    pub fn dimensions(&self) -> anyhow::Result<Dimensions> {
        Dimensions::new(self.width, self.height)
            .with_context(|| format!("invalid frame dimensions {}x{}", self.width, self.height))
    }
}

fn parse_env_u32(var: &str) -> anyhow::Result<Option<u32>> {
    match env::var(var) {
        Ok(raw) => {
            let value = raw
                .trim()
                .parse()
                .with_context(|| format!("{var}: expected an unsigned integer, got {raw:?}"))?;
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = StreamConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.bind_addr.port(), 2794);
    }

    #[test]
    fn zero_queue_capacity_is_rejected() {
        let cfg = StreamConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_dimensions_are_rejected() {
        let cfg = StreamConfig {
            width: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
