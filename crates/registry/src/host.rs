//! Host records and their assignment state.

/// Whether a host is free or serving a user.
///
/// The room a host is serving lives in the state itself, so "busy" can never
/// be set without saying which session it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostState {
    Available,
    Assigned { room: String, since_ms: u64 },
}

/// One registered host.
#[derive(Debug, Clone)]
pub struct Host {
    pub key: String,
    /// Session code, re-issued on every (re-)registration.
    pub room: String,
    pub state: HostState,
    /// First registration under this key; survives re-registration.
    pub registered_at_ms: u64,
    /// Last register, heartbeat, claim or release.
    pub last_seen_ms: u64,
    /// Last time a claim picked this host.
    pub last_assigned_ms: Option<u64>,
    /// Registration order, used as the stable tie-breaker for matching.
    pub(crate) order: u64,
}

impl Host {
    pub fn is_busy(&self) -> bool {
        matches!(self.state, HostState::Assigned { .. })
    }

    /// Room of the session this host is serving, if any.
    pub fn assigned_room(&self) -> Option<&str> {
        match &self.state {
            HostState::Assigned { room, .. } => Some(room),
            HostState::Available => None,
        }
    }

    pub(crate) fn touch(&mut self, now_ms: u64) {
        self.last_seen_ms = now_ms;
    }

    pub(crate) fn silent_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_seen_ms)
    }
}
