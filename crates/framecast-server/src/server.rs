use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::{
    sync::{oneshot, watch},
    task::JoinHandle,
};

use crate::{
    metrics::Metrics,
    publish::FramePublisher,
    registry::{ConnectionId, Registry},
    session, StreamConfig, STREAM_SUBPROTOCOL,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) cfg: Arc<StreamConfig>,
    pub(crate) registry: Arc<Registry>,
    pub(crate) metrics: Metrics,
    pub(crate) shutting_down: watch::Receiver<bool>,
}

pub struct ServerHandle {
    addr: SocketAddr,
    publisher: FramePublisher,
    shutting_down_tx: watch::Sender<bool>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle for feeding frames into the fan-out.
    pub fn publisher(&self) -> FramePublisher {
        self.publisher.clone()
    }

    /// Receiver that flips to `true` once shutdown begins; frame sources use
    /// it to stop producing.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutting_down_tx.subscribe()
    }

    /// Start draining: `/readyz` turns 503 and every open connection is sent
    /// a going-away close.
    pub fn mark_shutting_down(&self) {
        let _ = self.shutting_down_tx.send(true);
    }

    pub async fn shutdown(mut self) {
        self.mark_shutting_down();
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.shutting_down_tx.send(true);
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Bind the listener and start serving. A bind failure here is the only
/// process-fatal error; everything after this point is per-connection.
pub async fn start_server(cfg: StreamConfig) -> anyhow::Result<ServerHandle> {
    cfg.validate()?;
    let dims = cfg.dimensions()?;

    let listener = tokio::net::TcpListener::bind(cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    let addr = listener.local_addr().context("listener local_addr")?;

    let registry = Arc::new(Registry::new());
    let metrics = Metrics::new();
    let (shutting_down_tx, shutting_down_rx) = watch::channel(false);

    let publisher = FramePublisher::new(dims, Arc::clone(&registry), metrics.clone());

    let state = AppState {
        cfg: Arc::new(cfg),
        registry,
        metrics,
        shutting_down: shutting_down_rx,
    };
    let app = build_app(state);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await;
    });

    Ok(ServerHandle {
        addr,
        publisher,
        shutting_down_tx,
        stop_tx: Some(stop_tx),
        task: Some(task),
    })
}

fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/stream", get(stream_ws_handler))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    if *state.shutting_down.borrow() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.render_prometheus();
    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4",
        )],
        body,
    )
}

async fn stream_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    if !has_subprotocol(&headers, STREAM_SUBPROTOCOL) {
        state.metrics.handshake_rejected();
        return (
            StatusCode::BAD_REQUEST,
            format!("missing required websocket subprotocol {STREAM_SUBPROTOCOL:?}"),
        )
            .into_response();
    }

    ws.protocols([STREAM_SUBPROTOCOL])
        .on_upgrade(move |socket| handle_stream_ws(socket, state))
}

async fn handle_stream_ws(socket: WebSocket, state: AppState) {
    let id = ConnectionId(state.metrics.next_connection_id());
    if let Err(err) = session::run_session(socket, state, id).await {
        tracing::debug!(connection = %id, "stream session ended: {err:#}");
    }
}

fn has_subprotocol(headers: &HeaderMap, required: &str) -> bool {
    let Some(value) = headers
        .get(axum::http::header::SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };

    value
        .split(',')
        .map(str::trim)
        .any(|proto| proto == required)
}
