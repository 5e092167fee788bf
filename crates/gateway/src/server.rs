use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Router,
        routing::{get, post},
    },
    lobby_config::LobbyConfig,
    lobby_registry::spawn_reaper,
    tokio::sync::mpsc,
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::info,
};

use crate::{api, state::GatewayState};

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/hosts/register", post(api::register))
        .route("/hosts/heartbeat", post(api::heartbeat))
        .route("/hosts/release", post(api::release))
        .route("/hosts/unregister", post(api::unregister))
        .route("/claim", post(api::claim))
        .route("/leave", post(api::leave))
        .route("/health", get(api::health))
        .route("/ice", get(api::ice))
        .route("/ws/{room}", get(api::relay_upgrade));

    #[cfg(feature = "prometheus")]
    let router = router.route("/metrics", get(api::metrics));

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Serve `app` on `listener` until `shutdown` fires. The reaper runs for as
/// long as the server does, and the relay room of every host it evicts is
/// closed.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (evicted_tx, mut evicted_rx) = mpsc::unbounded_channel::<String>();
    let reaper = spawn_reaper(
        Arc::clone(&state.registry),
        shutdown.child_token(),
        Some(evicted_tx),
    );
    let closer = tokio::spawn({
        let state = Arc::clone(&state);
        async move {
            while let Some(room) = evicted_rx.recv().await {
                state.relay.close_room(&room).await;
            }
        }
    });
    let app = build_gateway_app(state);

    let signal = shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { signal.cancelled().await })
    .await?;

    shutdown.cancel();
    reaper.await?;
    // The reaper owned the only sender, so this drains and ends.
    closer.await?;
    Ok(())
}

/// Start the gateway HTTP + WebSocket server and run it until Ctrl-C.
pub async fn start_gateway(config: LobbyConfig) -> anyhow::Result<()> {
    config.validate()?;

    let addr = (config.server.bind.clone(), config.server.port);
    let state = GatewayState::new(config);

    #[cfg(feature = "prometheus")]
    {
        match lobby_metrics::install_prometheus() {
            Ok(handle) => state.set_prometheus(handle),
            Err(e) => tracing::warn!(error = %e, "prometheus metrics disabled"),
        }
    }

    let listener = tokio::net::TcpListener::bind((addr.0.as_str(), addr.1)).await?;
    let local = listener.local_addr()?;

    // Startup banner.
    let registry = &state.config.registry;
    let lines = [
        format!("lobby gateway v{} on {}", state.version, state.hostname),
        format!(
            "protocol v{}, listening on {}",
            lobby_protocol::PROTOCOL_VERSION,
            local
        ),
        format!(
            "heartbeat {}ms, evict after {}ms, sweep every {}ms",
            registry.heartbeat_interval_ms,
            registry.eviction_threshold_ms(),
            registry.sweep_interval_ms
        ),
        format!(
            "ice: {}",
            state.ice.as_ref().map_or("disabled", |p| p.id())
        ),
    ];
    let width = lines.iter().map(|l| l.len()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    let shutdown = CancellationToken::new();
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        on_signal.cancel();
    });

    serve(listener, state, shutdown).await?;
    info!("gateway stopped");
    Ok(())
}
