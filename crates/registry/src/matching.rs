//! Pairing a user with an available host.

use {
    lobby_config::ClaimPolicy,
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use lobby_metrics::{counter, names};

use crate::{
    error::{RegistryError, RegistryResult},
    host::HostState,
    registry::Registry,
};

/// Outcome of a successful `claim`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claim {
    pub room: String,
    pub host_key: String,
}

impl Registry {
    /// Assign an available host to the caller.
    ///
    /// Reconciliation runs first so a host stuck busy by a lost session is
    /// back in the pool. On success the host is busy, its liveness is
    /// refreshed and a session `room → host` exists until release, leave,
    /// unregister or eviction. Never waits: an empty pool is `NoHosts`.
    pub fn claim(&mut self) -> RegistryResult<Claim> {
        self.reconcile();
        let now = self.now_ms();

        let Some(key) = self.select_available() else {
            #[cfg(feature = "metrics")]
            {
                counter!(names::CLAIMS_TOTAL, "outcome" => "no_hosts").increment(1);
            }
            debug!(total = self.hosts.len(), "claim found no available host");
            return Err(RegistryError::NoHosts);
        };
        let Some(host) = self.hosts.get_mut(&key) else {
            return Err(RegistryError::NoHosts);
        };

        let room = host.room.clone();
        host.state = HostState::Assigned {
            room: room.clone(),
            since_ms: now,
        };
        host.last_assigned_ms = Some(now);
        host.touch(now);
        self.sessions.insert(room.clone(), key.clone());

        #[cfg(feature = "metrics")]
        {
            counter!(names::CLAIMS_TOTAL, "outcome" => "matched").increment(1);
        }
        let counts = self.observe_availability();
        info!(host = %key, room = %room, avail = counts.avail, "host claimed");

        Ok(Claim {
            room,
            host_key: key,
        })
    }

    /// Key of the host the configured policy picks, if any is free.
    fn select_available(&self) -> Option<String> {
        let available = self.hosts.values().filter(|h| !h.is_busy());
        let chosen = match self.config.claim_policy {
            ClaimPolicy::First => available.min_by_key(|h| h.order),
            // `None` orders before `Some`, so never-assigned hosts go first.
            ClaimPolicy::LeastRecentlyUsed => {
                available.min_by_key(|h| (h.last_assigned_ms, h.order))
            },
        };
        chosen.map(|h| h.key.clone())
    }
}
