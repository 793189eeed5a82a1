use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;
use framecast_server::{start_server, StreamConfig, STREAM_SUBPROTOCOL};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::{client::IntoClientRequest, http::HeaderValue, Message};

fn test_config() -> StreamConfig {
    StreamConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        // 128x128 RGBA = 64 KiB per frame, enough to fill loopback socket
        // buffers quickly once a consumer stops reading.
        width: 128,
        height: 128,
        queue_capacity: 2,
        ping_interval: None,
        write_timeout: None,
        source_fps: 30,
    }
}

fn ws_request(addr: SocketAddr) -> tokio_tungstenite::tungstenite::http::Request<()> {
    let ws_url = format!("ws://{addr}/stream");
    let mut req = ws_url.into_client_request().unwrap();
    req.headers_mut().insert(
        "sec-websocket-protocol",
        HeaderValue::from_static(STREAM_SUBPROTOCOL),
    );
    req
}

fn parse_metric(body: &str, name: &str) -> Option<u64> {
    for line in body.lines() {
        let line = line.trim();
        if line.starts_with('#') || line.is_empty() {
            continue;
        }
        let (k, v) = line.split_once(' ')?;
        if k == name {
            return v.parse().ok();
        }
    }
    None
}

async fn fetch_metric(addr: SocketAddr, name: &str) -> u64 {
    let body = reqwest::get(format!("http://{addr}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    parse_metric(&body, name).unwrap_or_else(|| panic!("metric {name} missing"))
}

fn sequenced_frame(seq: u64, len: usize) -> Bytes {
    let mut payload = vec![0x55u8; len];
    payload[..8].copy_from_slice(&seq.to_be_bytes());
    Bytes::from(payload)
}

fn frame_seq(frame: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&frame[..8]);
    u64::from_be_bytes(bytes)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_viewer_drops_oldest_while_healthy_viewer_streams_on() {
    let cfg = test_config();
    let frame_len = (cfg.width * cfg.height * 4) as usize;
    let handle = start_server(cfg).await.unwrap();
    let addr = handle.local_addr();
    let publisher = handle.publisher();

    // Healthy viewer: reads continuously and records frame sequence numbers.
    let (healthy_ws, _) = tokio_tungstenite::connect_async(ws_request(addr))
        .await
        .unwrap();
    let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    let reader = {
        let seen = Arc::clone(&seen);
        tokio::spawn(async move {
            let mut ws = healthy_ws;
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Binary(frame) = msg {
                    seen.lock().unwrap().push(frame_seq(&frame));
                }
            }
        })
    };

    // Stalled viewer: connects and then never reads.
    let (stalled_ws, _) = tokio_tungstenite::connect_async(ws_request(addr))
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let active = fetch_metric(addr, "framecast_clients_active").await;
        if active == 2 {
            break;
        }
        assert!(Instant::now() < deadline, "viewers never became active");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Publish until the stalled viewer's queue starts shedding frames.
    let mut seq = 0u64;
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        publisher.publish(sequenced_frame(seq, frame_len)).unwrap();
        seq += 1;
        if seq % 25 == 0 {
            if fetch_metric(addr, "framecast_frames_dropped_total").await > 0 {
                break;
            }
            assert!(
                Instant::now() < deadline,
                "queue never overflowed after {seq} frames"
            );
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    // The healthy viewer must still be live: keep publishing until it
    // observes a frame published after the overflow.
    let overflow_seq = seq;
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        publisher.publish(sequenced_frame(seq, frame_len)).unwrap();
        seq += 1;
        let caught_up = seen
            .lock()
            .unwrap()
            .last()
            .is_some_and(|&last| last >= overflow_seq);
        if caught_up {
            break;
        }
        assert!(
            Instant::now() < deadline,
            "healthy viewer stopped receiving after the stalled viewer overflowed"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Per-connection ordering: drop-oldest may skip frames but never reorders.
    {
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(
            seen.windows(2).all(|w| w[0] < w[1]),
            "healthy viewer saw frames out of order"
        );
    }

    // The server survived the stalled consumer with both connections alive.
    assert_eq!(fetch_metric(addr, "framecast_clients_active").await, 2);

    // Tear the stalled socket down first: with no write timeout configured its
    // writer may be parked inside a blocked send, which only a transport error
    // can interrupt.
    drop(stalled_ws);
    handle.shutdown().await;
    let _ = reader.await;
}
