use std::{net::SocketAddr, sync::Arc};

use {
    axum::extract::ws::{Message, WebSocket},
    futures::{SinkExt, StreamExt},
    tracing::{debug, info, warn},
};

use crate::state::GatewayState;

/// Drive one relay peer until either side closes.
///
/// A write task drains the peer's channel into the socket; the read loop
/// forwards text frames to the rest of the room. When the hub drops the
/// peer's channel (the room was closed) the socket gets a Close frame and
/// the read loop stops.
pub async fn handle_connection(
    socket: WebSocket,
    state: Arc<GatewayState>,
    room: String,
    remote_addr: SocketAddr,
) {
    let peer_id = uuid::Uuid::new_v4().to_string();
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut outbound = match state.relay.join(&room, &peer_id).await {
        Ok(rx) => rx,
        Err(e) => {
            warn!(room = %room, remote = %remote_addr, error = %e, "relay join refused");
            let _ = ws_tx.send(Message::Close(None)).await;
            return;
        },
    };
    info!(room = %room, peer = %peer_id, remote = %remote_addr, "relay connected");

    let mut write_handle = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if ws_tx.send(Message::Text(frame.into())).await.is_err() {
                return;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    state.relay.forward(&room, &peer_id, text.as_str()).await;
                },
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {},
                Some(Err(e)) => {
                    debug!(peer = %peer_id, error = %e, "relay read error");
                    break;
                },
            },
            _ = &mut write_handle => {
                debug!(peer = %peer_id, "relay room closed under peer");
                break;
            },
        }
    }

    state.relay.leave(&room, &peer_id).await;
    write_handle.abort();
    info!(room = %room, peer = %peer_id, "relay disconnected");
}
