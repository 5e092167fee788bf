//! JSON handlers for the host, user, health and ICE routes.
//!
//! Registry work happens under the registry lock and never awaits anything
//! else; the ICE issuer is called with the lock released.
//!
//! Whenever a session ends or a room code is retired, the relay room of that
//! code is closed after the lock is dropped, so the next pair starts from an
//! empty room.

use std::{net::SocketAddr, sync::Arc};

use {
    axum::{
        Json,
        body::Bytes,
        extract::{ConnectInfo, Path, State, WebSocketUpgrade},
        response::{IntoResponse, Response},
    },
    lobby_ice::IceError,
    lobby_protocol::{
        ClaimResponse, HealthResponse, HostRequest, IceServersResponse, LeaveRequest,
        OkResponse, RegisterRequest, RegisterResponse,
    },
    serde::de::DeserializeOwned,
};

use crate::{
    error::{ApiError, ApiResult},
    state::GatewayState,
    ws::handle_connection,
};

/// Parse an optional JSON body. An empty body is the type's default.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::InvalidRequest(format!("invalid JSON body: {e}")))
}

fn required_host_id(body: &Bytes) -> ApiResult<String> {
    let req: HostRequest = parse_body(body)?;
    req.host_id
        .filter(|id| !id.is_empty())
        .ok_or_else(ApiError::missing_host_id)
}

// ── Host side ────────────────────────────────────────────────────────────────

pub async fn register(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> ApiResult<Json<RegisterResponse>> {
    let req: RegisterRequest = parse_body(&body)?;
    let (registration, retired) = {
        let mut reg = state.registry.lock().await;
        let previous = req
            .host_id
            .as_deref()
            .and_then(|key| reg.get(key))
            .map(|h| h.room.clone());
        (reg.register(req.host_id.as_deref()), previous)
    };
    if let Some(room) = retired {
        state.relay.close_room(&room).await;
    }
    Ok(Json(RegisterResponse {
        host_id: registration.host_key,
        room: registration.room,
    }))
}

pub async fn heartbeat(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> ApiResult<Json<OkResponse>> {
    let host_id = required_host_id(&body)?;
    state.registry.lock().await.heartbeat(&host_id)?;
    Ok(Json(OkResponse::OK))
}

pub async fn release(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> ApiResult<Json<OkResponse>> {
    let host_id = required_host_id(&body)?;
    let room = {
        let mut reg = state.registry.lock().await;
        reg.release(&host_id)?;
        reg.get(&host_id).map(|h| h.room.clone())
    };
    if let Some(room) = room {
        state.relay.close_room(&room).await;
    }
    Ok(Json(OkResponse::OK))
}

pub async fn unregister(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> ApiResult<Json<OkResponse>> {
    let host_id = required_host_id(&body)?;
    let room = {
        let mut reg = state.registry.lock().await;
        let room = reg.get(&host_id).map(|h| h.room.clone());
        reg.unregister(&host_id);
        room
    };
    if let Some(room) = room {
        state.relay.close_room(&room).await;
    }
    Ok(Json(OkResponse::OK))
}

// ── User side ────────────────────────────────────────────────────────────────

pub async fn claim(State(state): State<Arc<GatewayState>>) -> ApiResult<Json<ClaimResponse>> {
    let claim = state.registry.lock().await.claim()?;
    Ok(Json(ClaimResponse {
        room: claim.room,
        host_id: claim.host_key,
    }))
}

pub async fn leave(
    State(state): State<Arc<GatewayState>>,
    body: Bytes,
) -> ApiResult<Json<OkResponse>> {
    let req: LeaveRequest = parse_body(&body)?;
    let room = req.room.as_deref().filter(|r| !r.is_empty());
    let host_id = req.host_id.as_deref().filter(|k| !k.is_empty());
    let closed = {
        let mut reg = state.registry.lock().await;
        let freed = reg.leave(room, host_id)?;
        reg.get(&freed).map(|h| h.room.clone())
    };
    if let Some(room) = closed {
        state.relay.close_room(&room).await;
    }
    Ok(Json(OkResponse::OK))
}

// ── Health & ICE ─────────────────────────────────────────────────────────────

pub async fn health(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let hosts = state.registry.lock().await.health();
    Json(HealthResponse { ok: true, hosts })
}

pub async fn ice(State(state): State<Arc<GatewayState>>) -> ApiResult<Json<IceServersResponse>> {
    let provider = state.ice.as_ref().ok_or(IceError::NotConfigured)?;
    let issued = provider.fetch(state.config.ice.ttl_secs).await?;
    Ok(Json(IceServersResponse {
        ice_servers: issued.servers,
        ttl: issued.ttl_secs,
    }))
}

#[cfg(feature = "prometheus")]
pub async fn metrics(State(state): State<Arc<GatewayState>>) -> Response {
    use axum::http::{StatusCode, header};

    match state.prometheus.get() {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

// ── Relay ────────────────────────────────────────────────────────────────────

pub async fn relay_upgrade(
    ws: WebSocketUpgrade,
    Path(room): Path<String>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<GatewayState>>,
) -> Result<Response, ApiError> {
    if !state.registry.lock().await.room_is_live(&room) {
        return Err(ApiError::NotFound(format!("unknown room: {room}")));
    }
    Ok(ws
        .on_upgrade(move |socket| handle_connection(socket, state, room, addr))
        .into_response())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        lobby_config::LobbyConfig,
        lobby_registry::Registry,
        std::{
            io,
            sync::{Mutex, PoisonError},
        },
    };

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn count(&self, message: &str) -> usize {
            let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).matches(message).count()
        }
    }

    #[tokio::test]
    async fn session_events_are_logged_once() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let config = LobbyConfig::default();
        let registry = Registry::new(config.registry.clone()).into_shared();
        let state = GatewayState::with_parts(config, registry, None);

        let Json(reg) = register(State(Arc::clone(&state)), Bytes::new())
            .await
            .unwrap();
        let host = Bytes::from(format!(r#"{{"hostId":"{}"}}"#, reg.host_id));
        claim(State(Arc::clone(&state))).await.unwrap();
        release(State(Arc::clone(&state)), host.clone()).await.unwrap();
        claim(State(Arc::clone(&state))).await.unwrap();
        leave(State(Arc::clone(&state)), host).await.unwrap();

        assert_eq!(captured.count("host claimed"), 2);
        assert_eq!(captured.count("host released"), 1);
        assert_eq!(captured.count("user left"), 1);
    }

    #[test]
    fn empty_body_is_default() {
        let req: LeaveRequest = parse_body(&Bytes::new()).unwrap();
        assert!(req.room.is_none() && req.host_id.is_none());
        let req: RegisterRequest = parse_body(&Bytes::from_static(b"  \n")).unwrap();
        assert!(req.host_id.is_none());
    }

    #[test]
    fn malformed_body_is_invalid_request() {
        let err = parse_body::<HostRequest>(&Bytes::from_static(b"{nope")).unwrap_err();
        assert_eq!(err.code(), "invalid_request");
    }

    #[test]
    fn host_id_required() {
        assert!(required_host_id(&Bytes::from_static(b"{}")).is_err());
        assert!(required_host_id(&Bytes::from_static(br#"{"hostId":""}"#)).is_err());
        assert_eq!(
            required_host_id(&Bytes::from_static(br#"{"hostId":"hk_1"}"#)).unwrap(),
            "hk_1"
        );
    }
}
