//! Wire types shared by the lobby gateway and its clients.
//!
//! Every request and response body is JSON with camelCase keys. Failures
//! always carry `{"ok": false, "error": <code>, "message": ...}` so clients
//! can branch on the stable code and show the message.

use serde::{Deserialize, Serialize};

/// Version of the HTTP contract below. Bumped on breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Control frame types emitted by the signaling relay.
pub const RELAY_PEER_JOINED: &str = "peer-joined";
pub const RELAY_PEER_LEFT: &str = "peer-left";

pub mod error_codes {
    pub const HOST_NOT_FOUND: &str = "host_not_found";
    pub const NO_HOSTS: &str = "no_hosts";
    pub const ICE_UNAVAILABLE: &str = "ice_unavailable";
    pub const INVALID_REQUEST: &str = "invalid_request";
    pub const INTERNAL: &str = "internal";
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Error body returned by every failing operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ErrorShape {
    pub ok: bool,
    #[serde(rename = "error")]
    pub code: String,
    pub message: String,
}

impl ErrorShape {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            code: code.into(),
            message: message.into(),
        }
    }
}

// ── Host side ────────────────────────────────────────────────────────────────

/// Body of `POST /hosts/register`. A host that persists its key across
/// restarts sends it back here so the registry replaces the old entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub host_id: String,
    pub room: String,
}

/// Body of heartbeat, release and unregister.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostRequest {
    #[serde(default)]
    pub host_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub const OK: Self = Self { ok: true };
}

// ── User side ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResponse {
    pub room: String,
    pub host_id: String,
}

/// Body of `POST /leave`. Either field may be given; `hostId` wins when both
/// resolve.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_id: Option<String>,
}

// ── Health ───────────────────────────────────────────────────────────────────

/// Snapshot of the host pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostCounts {
    pub total: usize,
    pub busy: usize,
    pub avail: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub hosts: HostCounts,
}

// ── ICE ──────────────────────────────────────────────────────────────────────

/// One STUN/TURN entry in the shape browsers expect for `RTCIceServer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServersResponse {
    pub ice_servers: Vec<IceServer>,
    /// Seconds until the credentials stop working.
    pub ttl: u64,
}

/// Control frame sent by the relay (never produced by peers).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayControl {
    #[serde(rename = "type")]
    pub kind: String,
}

impl RelayControl {
    pub fn joined() -> Self {
        Self {
            kind: RELAY_PEER_JOINED.into(),
        }
    }

    pub fn left() -> Self {
        Self {
            kind: RELAY_PEER_LEFT.into(),
        }
    }

    pub fn to_frame(&self) -> String {
        serde_json::json!({ "type": self.kind }).to_string()
    }
}
