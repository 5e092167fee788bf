//! Signaling relay: per-room fan-out of opaque text frames between the peers
//! a claim has paired.

use std::collections::HashMap;

use {
    lobby_protocol::RelayControl,
    thiserror::Error,
    tokio::sync::{RwLock, mpsc},
    tracing::debug,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("room {room} is full ({max} peers)")]
    RoomFull { room: String, max: usize },
}

/// A peer's write side; the socket task drains the receiver.
#[derive(Debug)]
struct Peer {
    sender: mpsc::UnboundedSender<String>,
}

impl Peer {
    fn send(&self, frame: &str) -> bool {
        self.sender.send(frame.to_string()).is_ok()
    }
}

/// Rooms keyed by room code, each holding its connected peers.
#[derive(Debug)]
pub struct RelayHub {
    max_peers: usize,
    rooms: RwLock<HashMap<String, HashMap<String, Peer>>>,
}

impl RelayHub {
    pub fn new(max_peers: usize) -> Self {
        Self {
            max_peers,
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Add `peer_id` to `room` and announce it to the peers already there.
    /// Returns the receiver the peer's write loop drains.
    pub async fn join(
        &self,
        room: &str,
        peer_id: &str,
    ) -> Result<mpsc::UnboundedReceiver<String>, RelayError> {
        let mut rooms = self.rooms.write().await;
        let peers = rooms.entry(room.to_string()).or_default();
        if peers.len() >= self.max_peers {
            return Err(RelayError::RoomFull {
                room: room.to_string(),
                max: self.max_peers,
            });
        }

        let frame = RelayControl::joined().to_frame();
        for peer in peers.values() {
            peer.send(&frame);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        peers.insert(peer_id.to_string(), Peer { sender });
        debug!(room, peer = peer_id, peers = peers.len(), "relay peer joined");
        Ok(receiver)
    }

    /// Forward `frame` verbatim to every other peer in `room`. Returns how
    /// many peers it reached.
    pub async fn forward(&self, room: &str, from: &str, frame: &str) -> usize {
        let rooms = self.rooms.read().await;
        let Some(peers) = rooms.get(room) else {
            return 0;
        };
        peers
            .iter()
            .filter(|(id, _)| id.as_str() != from)
            .filter(|(_, peer)| peer.send(frame))
            .count()
    }

    /// Remove `peer_id`, tell the remaining peers, and drop the room once
    /// empty.
    pub async fn leave(&self, room: &str, peer_id: &str) {
        let mut rooms = self.rooms.write().await;
        let Some(peers) = rooms.get_mut(room) else {
            return;
        };
        if peers.remove(peer_id).is_none() {
            return;
        }
        if peers.is_empty() {
            rooms.remove(room);
            debug!(room, "relay room closed");
            return;
        }
        let frame = RelayControl::left().to_frame();
        for peer in peers.values() {
            peer.send(&frame);
        }
        debug!(room, peer = peer_id, peers = peers.len(), "relay peer left");
    }

    /// Drop `room` with every peer in it. Each peer's channel ends, which
    /// closes its socket. Returns how many peers were connected.
    pub async fn close_room(&self, room: &str) -> usize {
        let Some(peers) = self.rooms.write().await.remove(room) else {
            return 0;
        };
        debug!(room, peers = peers.len(), "relay room torn down");
        peers.len()
    }

    pub async fn peer_count(&self, room: &str) -> usize {
        self.rooms.read().await.get(room).map_or(0, HashMap::len)
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}
