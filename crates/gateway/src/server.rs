use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    axum::{
        Router,
        extract::{ConnectInfo, State, WebSocketUpgrade},
        response::{IntoResponse, Json},
        routing::get,
    },
    tokio_util::sync::CancellationToken,
    tower_http::{cors::CorsLayer, trace::TraceLayer},
    tracing::info,
};

use crate::{methods::MethodRegistry, state::GatewayState, ws};

/// How often the idle reaper sweeps for timed-out sessions.
const REAPER_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
struct AppState {
    gateway: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy", "service": "chat-server" }))
}

async fn ws_handler(
    State(app): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    upgrade: WebSocketUpgrade,
) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| {
        ws::handle_connection(socket, app.gateway, app.methods, remote_addr)
    })
}

/// Build the HTTP router: one health probe, one WebSocket upgrade.
///
/// CORS is permissive because the real gate is the JWT handshake on every
/// connection, not origin checking.
pub fn router(gateway: Arc<GatewayState>, methods: Arc<MethodRegistry>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { gateway, methods })
}

/// Serve until the shutdown token fires. Also runs the idle-session reaper.
pub async fn serve(
    gateway: Arc<GatewayState>,
    methods: Arc<MethodRegistry>,
    bind_addr: &str,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let reaper_state = Arc::clone(&gateway);
    let reaper_shutdown = shutdown.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = reaper_shutdown.cancelled() => return,
                _ = tokio::time::sleep(REAPER_INTERVAL) => {}
            }
            for session in reaper_state.room_manager.timed_out_sessions() {
                info!(sid = %session.sid, user_id = %session.user_id, "reaping idle session");
                reaper_state.close_client(&session.sid).await;
            }
        }
    });

    let app = router(gateway, methods);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(bind_addr, "chat server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn health_reports_service_name() {
        let Json(body) = health_handler().await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], "chat-server");
    }
}
