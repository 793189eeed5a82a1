use std::borrow::Cow;

use anyhow::{anyhow, Context};
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};

use crate::{
    queue::SendQueue,
    registry::{ConnectionId, ConnectionState},
    server::AppState,
    timeouts::timeout_opt,
};

/// Serve one accepted viewer until it disconnects, its transport fails, or
/// the server shuts down. Registration is scoped: the connection is removed
/// from the registry on every exit path.
pub(crate) async fn run_session(
    socket: WebSocket,
    state: AppState,
    id: ConnectionId,
) -> anyhow::Result<()> {
    let queue = SendQueue::new(state.cfg.queue_capacity);
    state.registry.register(id, queue.clone());
    tracing::info!(connection = %id, "viewer connected");

    let result = drive(socket, &state, id, &queue).await;

    let idle = state.registry.idle_for(id);
    state.registry.deregister(id);
    queue.close();
    state.metrics.client_disconnected();
    tracing::info!(connection = %id, idle = ?idle, "viewer disconnected");
    result
}

async fn drive(
    socket: WebSocket,
    state: &AppState,
    id: ConnectionId,
    queue: &SendQueue,
) -> anyhow::Result<()> {
    let (ws_tx, ws_rx) = socket.split();

    // The subprotocol handshake has already succeeded by the time axum hands
    // over the socket; this makes the connection visible to the fan-out. The
    // active-clients gauge moves only after that, so an observed increment
    // means broadcasts reach this connection.
    state.registry.set_state(id, ConnectionState::Open);
    state.metrics.client_connected();

    let mut writer = tokio::spawn(write_loop(ws_tx, queue.clone(), state.clone(), id));

    tokio::select! {
        res = &mut writer => {
            // Fatal write error or shutdown close; the transport is done.
            res.context("writer task")?
        }
        _ = read_loop(ws_rx, state, id) => {
            // Remote close or read failure: stop feeding the writer and let
            // it finish the frame it may currently be sending.
            state.registry.set_state(id, ConnectionState::Closing);
            queue.close();
            let _ = writer.await;
            Ok(())
        }
    }
}

/// Drains the connection's queue onto the socket. Transport backpressure
/// suspends only this task; the fan-out keeps enqueueing (and dropping
/// oldest) independently.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    queue: SendQueue,
    state: AppState,
    id: ConnectionId,
) -> anyhow::Result<()> {
    let mut shutting_down = state.shutting_down.clone();
    let mut ping = state.cfg.ping_interval.map(|dur| {
        let mut interval = tokio::time::interval(dur);
        // interval's first tick completes immediately; skip it so the first
        // ping goes out one full period after the handshake.
        interval.reset();
        interval
    });

    loop {
        tokio::select! {
            frame = queue.pop() => {
                let Some(frame) = frame else { return Ok(()) };
                let len = frame.len();
                timeout_opt(state.cfg.write_timeout, ws_tx.send(Message::Binary(frame.to_vec())))
                    .await
                    .map_err(|_| anyhow!("frame write timed out"))?
                    .context("send frame")?;
                state.metrics.frame_tx(len);
            }
            _ = tick(&mut ping) => {
                timeout_opt(state.cfg.write_timeout, ws_tx.send(Message::Ping(Vec::new())))
                    .await
                    .map_err(|_| anyhow!("ping write timed out"))?
                    .context("send ping")?;
            }
            res = shutting_down.changed() => {
                if res.is_err() || *shutting_down.borrow() {
                    tracing::debug!(connection = %id, "closing viewer for shutdown");
                    let _ = ws_tx
                        .send(Message::Close(Some(CloseFrame {
                            code: close_code::AWAY,
                            reason: Cow::from("shutting down"),
                        })))
                        .await;
                    return Ok(());
                }
            }
        }
    }
}

async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn read_loop(mut ws_rx: SplitStream<WebSocket>, state: &AppState, id: ConnectionId) {
    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                tracing::debug!(connection = %id, "read error: {err}");
                return;
            }
        };
        state.registry.touch(id);
        match msg {
            // The reference browser client sends a greeting after connecting;
            // client text is logged, never interpreted.
            Message::Text(text) => {
                tracing::debug!(connection = %id, "client text: {text}");
            }
            // Client data frames are not meaningful input on a one-way stream.
            Message::Binary(payload) => {
                tracing::debug!(
                    connection = %id,
                    len = payload.len(),
                    "ignoring client binary message"
                );
            }
            // Pings are answered by the protocol layer during the read.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return,
        }
    }
}
