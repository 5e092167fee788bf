//! Registry error types.

use {lobby_protocol::error_codes, thiserror::Error};

/// Failures a registry operation reports to its caller. None of them leave
/// the registry in a different state than before the call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The host key is not live (never registered, unregistered, or evicted).
    /// The host should register again.
    #[error("host not found: {host_key}")]
    HostNotFound { host_key: String },

    /// `leave` could resolve neither the host key nor the room.
    #[error("no live host for room {room}")]
    RoomNotFound { room: String },

    /// `leave` was called without any identifier.
    #[error("leave requires a room or a host id")]
    NoLeaveTarget,

    /// Every live host is busy. Callers retry with their own backoff.
    #[error("no hosts available")]
    NoHosts,
}

impl RegistryError {
    pub fn host_not_found(host_key: impl Into<String>) -> Self {
        Self::HostNotFound {
            host_key: host_key.into(),
        }
    }

    /// Stable wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::HostNotFound { .. } | Self::RoomNotFound { .. } | Self::NoLeaveTarget => {
                error_codes::HOST_NOT_FOUND
            },
            Self::NoHosts => error_codes::NO_HOSTS,
        }
    }

    /// Whether retrying the same call later can succeed without the caller
    /// doing anything else first.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NoHosts)
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
