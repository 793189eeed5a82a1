use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

#[derive(Clone)]
pub(crate) struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    next_connection_id: AtomicU64,

    // Clients
    clients_active: AtomicU64,
    clients_total: AtomicU64,
    handshakes_rejected_total: AtomicU64,

    // Frames/bytes
    frames_published_total: AtomicU64,
    frames_rejected_total: AtomicU64,
    frames_tx_total: AtomicU64,
    bytes_tx_total: AtomicU64,
    frames_dropped_total: AtomicU64,
}

impl Metrics {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(MetricsInner {
                next_connection_id: AtomicU64::new(1),
                clients_active: AtomicU64::new(0),
                clients_total: AtomicU64::new(0),
                handshakes_rejected_total: AtomicU64::new(0),
                frames_published_total: AtomicU64::new(0),
                frames_rejected_total: AtomicU64::new(0),
                frames_tx_total: AtomicU64::new(0),
                bytes_tx_total: AtomicU64::new(0),
                frames_dropped_total: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn next_connection_id(&self) -> u64 {
        self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn client_connected(&self) {
        self.inner.clients_total.fetch_add(1, Ordering::Relaxed);
        self.inner.clients_active.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn client_disconnected(&self) {
        self.inner.clients_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn handshake_rejected(&self) {
        self.inner
            .handshakes_rejected_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_published(&self) {
        self.inner
            .frames_published_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_rejected(&self) {
        self.inner
            .frames_rejected_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn frame_tx(&self, bytes: usize) {
        self.inner.frames_tx_total.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_tx_total
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn frame_dropped(&self) {
        self.inner
            .frames_dropped_total
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn render_prometheus(&self) -> String {
        let clients_active = self.inner.clients_active.load(Ordering::Relaxed);
        let clients_total = self.inner.clients_total.load(Ordering::Relaxed);
        let handshakes_rejected_total = self
            .inner
            .handshakes_rejected_total
            .load(Ordering::Relaxed);
        let frames_published_total = self.inner.frames_published_total.load(Ordering::Relaxed);
        let frames_rejected_total = self.inner.frames_rejected_total.load(Ordering::Relaxed);
        let frames_tx_total = self.inner.frames_tx_total.load(Ordering::Relaxed);
        let bytes_tx_total = self.inner.bytes_tx_total.load(Ordering::Relaxed);
        let frames_dropped_total = self.inner.frames_dropped_total.load(Ordering::Relaxed);

        let mut out = String::new();

        push_gauge(&mut out, "framecast_clients_active", clients_active);
        push_counter(&mut out, "framecast_clients_total", clients_total);
        push_counter(
            &mut out,
            "framecast_handshakes_rejected_total",
            handshakes_rejected_total,
        );

        push_counter(
            &mut out,
            "framecast_frames_published_total",
            frames_published_total,
        );
        push_counter(
            &mut out,
            "framecast_frames_rejected_total",
            frames_rejected_total,
        );
        push_counter(&mut out, "framecast_frames_tx_total", frames_tx_total);
        push_counter(&mut out, "framecast_bytes_tx_total", bytes_tx_total);
        push_counter(
            &mut out,
            "framecast_frames_dropped_total",
            frames_dropped_total,
        );

        out
    }
}

fn push_gauge(out: &mut String, name: &str, val: u64) {
    out.push_str("# TYPE ");
    out.push_str(name);
    out.push_str(" gauge\n");
    out.push_str(name);
    out.push(' ');
    out.push_str(&val.to_string());
    out.push('\n');
}

fn push_counter(out: &mut String, name: &str, val: u64) {
    out.push_str("# TYPE ");
    out.push_str(name);
    out.push_str(" counter\n");
    out.push_str(name);
    out.push(' ');
    out.push_str(&val.to_string());
    out.push('\n');
}
