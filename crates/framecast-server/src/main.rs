#![forbid(unsafe_code)]

use framecast_server::{source, start_server, StreamConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = match StreamConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("invalid config: {err:#}");
            return Err(err);
        }
    };
    let source_fps = config.source_fps;

    let handle = start_server(config).await?;
    tracing::info!(
        "framecast-server listening on http://{} ({} @ {source_fps}fps)",
        handle.local_addr(),
        handle.publisher().dimensions(),
    );

    let pattern = source::TestPattern::new(handle.publisher().dimensions());
    let pump = tokio::spawn(source::pump(
        pattern,
        handle.publisher(),
        source_fps,
        handle.shutdown_signal(),
    ));

    // Best-effort graceful shutdown on Ctrl+C / SIGTERM.
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::warn!("failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = sigterm => {},
    }

    tracing::info!("shutdown signal received");
    handle.mark_shutting_down();
    let _ = pump.await;
    handle.shutdown().await;
    Ok(())
}
