//! The host/session store and its membership operations.
//!
//! `Registry` owns both the host table and the session index. It has no
//! interior locking: share it as a [`SharedRegistry`] and hold the lock for
//! the whole call, which is what makes register/claim/release atomic with
//! respect to each other and to the reaper.

use std::{collections::HashMap, sync::Arc};

use {
    lobby_config::RegistryConfig,
    lobby_protocol::HostCounts,
    tokio::sync::Mutex,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use lobby_metrics::{gauge, names};

use crate::{
    clock::{Clock, SystemClock},
    error::{RegistryError, RegistryResult},
    host::{Host, HostState},
    ids::{IdSource, RandomIds},
};

/// Draws from the id source before falling back to suffixed ids.
const MAX_ID_ATTEMPTS: usize = 32;

/// A registry behind the single lock every caller (and the reaper) uses.
pub type SharedRegistry = Arc<Mutex<Registry>>;

/// Outcome of `register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub host_key: String,
    pub room: String,
    pub registered_at_ms: u64,
    /// True when an existing live entry under the same key was replaced.
    pub replaced: bool,
}

pub struct Registry {
    /// host key → host
    pub(crate) hosts: HashMap<String, Host>,
    /// room → host key, one entry per active session
    pub(crate) sessions: HashMap<String, String>,
    pub(crate) config: RegistryConfig,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdSource>,
    next_order: u64,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("hosts", &self.hosts.len())
            .field("sessions", &self.sessions.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Registry {
    /// Registry on the system clock with random ids.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_sources(config, Arc::new(SystemClock), Arc::new(RandomIds))
    }

    pub fn with_sources(
        config: RegistryConfig,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
    ) -> Self {
        Self {
            hosts: HashMap::new(),
            sessions: HashMap::new(),
            config,
            clock,
            ids,
            next_order: 0,
        }
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // ── Registration & identity ─────────────────────────────────────────

    /// Add a host, or replace the live entry for `supplied_key`.
    ///
    /// Replacing keeps `registered_at_ms`, drops any session still pointing
    /// at the key, frees the host, and issues a room different from the old
    /// one. An unknown supplied key is adopted as-is; without one a fresh
    /// key is minted.
    pub fn register(&mut self, supplied_key: Option<&str>) -> Registration {
        let now = self.now_ms();
        let supplied_key = supplied_key.filter(|k| !k.is_empty());

        let registration = match supplied_key.filter(|k| self.hosts.contains_key(*k)) {
            Some(key) => self.reregister(key, now),
            None => {
                let key = match supplied_key {
                    Some(k) => k.to_string(),
                    None => self.fresh_host_key(),
                };
                let room = self.fresh_room(None);
                let order = self.next_order;
                self.next_order += 1;
                self.hosts.insert(key.clone(), Host {
                    key: key.clone(),
                    room: room.clone(),
                    state: HostState::Available,
                    registered_at_ms: now,
                    last_seen_ms: now,
                    last_assigned_ms: None,
                    order,
                });
                Registration {
                    host_key: key,
                    room,
                    registered_at_ms: now,
                    replaced: false,
                }
            },
        };

        let counts = self.observe_availability();
        info!(
            host = %registration.host_key,
            room = %registration.room,
            replaced = registration.replaced,
            total = counts.total,
            avail = counts.avail,
            "host registered"
        );
        registration
    }

    fn reregister(&mut self, key: &str, now: u64) -> Registration {
        let dropped = self.drop_sessions_for(key);
        let old_room = self.hosts.get(key).map(|h| h.room.clone());
        let room = self.fresh_room(old_room.as_deref());

        let registered_at_ms = match self.hosts.get_mut(key) {
            Some(host) => {
                host.room = room.clone();
                host.state = HostState::Available;
                host.touch(now);
                host.registered_at_ms
            },
            None => now,
        };

        if dropped > 0 {
            debug!(host = %key, dropped, "dropped stale sessions on re-registration");
        }
        Registration {
            host_key: key.to_string(),
            room,
            registered_at_ms,
            replaced: true,
        }
    }

    /// Refresh a host's liveness. Nothing else changes, busy state included.
    pub fn heartbeat(&mut self, host_key: &str) -> RegistryResult<()> {
        let now = self.now_ms();
        let host = self
            .hosts
            .get_mut(host_key)
            .ok_or_else(|| RegistryError::host_not_found(host_key))?;
        host.touch(now);
        Ok(())
    }

    /// Remove a host and its session. Unknown keys are fine; returns whether
    /// anything was removed.
    pub fn unregister(&mut self, host_key: &str) -> bool {
        let removed = self.hosts.remove(host_key).is_some();
        let dropped = self.drop_sessions_for(host_key);
        if removed {
            let counts = self.observe_availability();
            info!(host = %host_key, dropped, total = counts.total, "host unregistered");
        } else {
            debug!(host = %host_key, "unregister for unknown host");
        }
        removed
    }

    // ── Release ─────────────────────────────────────────────────────────

    /// Host-side: the current user is done. Frees the host and ends its
    /// session. The room is kept.
    pub fn release(&mut self, host_key: &str) -> RegistryResult<()> {
        let now = self.now_ms();
        let host = self
            .hosts
            .get_mut(host_key)
            .ok_or_else(|| RegistryError::host_not_found(host_key))?;
        host.state = HostState::Available;
        host.touch(now);
        self.drop_sessions_for(host_key);
        self.observe_availability();
        info!(host = %host_key, "host released");
        Ok(())
    }

    /// User-side: free a host without waiting for its own release.
    ///
    /// A known `host_key` wins; otherwise `room` is resolved through the
    /// session index. Returns the key of the host that was freed. Does not
    /// count as a liveness signal from the host.
    pub fn leave(&mut self, room: Option<&str>, host_key: Option<&str>) -> RegistryResult<String> {
        let key = match (host_key, room) {
            (Some(k), _) if self.hosts.contains_key(k) => k.to_string(),
            (_, Some(r)) => match self.sessions.get(r) {
                Some(k) if self.hosts.contains_key(k) => k.clone(),
                _ => {
                    return Err(match host_key {
                        Some(k) => RegistryError::host_not_found(k),
                        None => RegistryError::RoomNotFound { room: r.to_string() },
                    });
                },
            },
            (Some(k), None) => return Err(RegistryError::host_not_found(k)),
            (None, None) => return Err(RegistryError::NoLeaveTarget),
        };

        if let Some(r) = room
            && self.sessions.get(r) == Some(&key)
        {
            self.sessions.remove(r);
        }
        self.drop_sessions_for(&key);
        if let Some(host) = self.hosts.get_mut(&key) {
            host.state = HostState::Available;
        }
        self.observe_availability();
        info!(host = %key, room = ?room, "user left");
        Ok(key)
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn health(&self) -> HostCounts {
        let total = self.hosts.len();
        let busy = self.hosts.values().filter(|h| h.is_busy()).count();
        HostCounts {
            total,
            busy,
            avail: total - busy,
        }
    }

    pub fn get(&self, host_key: &str) -> Option<&Host> {
        self.hosts.get(host_key)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    /// Host currently serving `room`, if a session exists for it.
    pub fn session_host(&self, room: &str) -> Option<&str> {
        self.sessions.get(room).map(String::as_str)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `room` belongs to a live host right now.
    pub fn room_is_live(&self, room: &str) -> bool {
        self.hosts.values().any(|h| h.room == room)
    }

    /// Describe every broken invariant. Empty on a healthy registry.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut out = Vec::new();

        let mut rooms: HashMap<&str, &str> = HashMap::new();
        for host in self.hosts.values() {
            if let Some(other) = rooms.insert(&host.room, &host.key) {
                out.push(format!(
                    "room {} shared by {} and {}",
                    host.room, other, host.key
                ));
            }
        }

        for (room, key) in &self.sessions {
            match self.hosts.get(key) {
                None => out.push(format!("session {room} references dead host {key}")),
                Some(host) if host.assigned_room() != Some(room.as_str()) => {
                    out.push(format!("session {room} references unassigned host {key}"));
                },
                Some(_) => {},
            }
        }

        for host in self.hosts.values() {
            if let Some(room) = host.assigned_room()
                && (room != host.room || self.sessions.get(room) != Some(&host.key))
            {
                out.push(format!("host {} busy without session {room}", host.key));
            }
        }

        out
    }

    // ── Internals ───────────────────────────────────────────────────────

    /// Remove every session entry pointing at `host_key`.
    pub(crate) fn drop_sessions_for(&mut self, host_key: &str) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, k| k != host_key);
        before - self.sessions.len()
    }

    /// Update availability gauges and return the counts.
    pub(crate) fn observe_availability(&self) -> HostCounts {
        let counts = self.health();
        #[cfg(feature = "metrics")]
        {
            gauge!(names::HOSTS_TOTAL).set(counts.total as f64);
            gauge!(names::HOSTS_AVAILABLE).set(counts.avail as f64);
        }
        counts
    }

    fn room_taken(&self, code: &str) -> bool {
        self.sessions.contains_key(code) || self.hosts.values().any(|h| h.room == code)
    }

    /// A room code no live host or session uses, and not `previous`.
    pub(crate) fn fresh_room(&self, previous: Option<&str>) -> String {
        let taken = |c: &str| previous == Some(c) || self.room_taken(c);
        fresh_id(|| self.ids.room_code(), taken, self.next_order)
    }

    fn fresh_host_key(&self) -> String {
        fresh_id(
            || self.ids.host_key(),
            |k| self.hosts.contains_key(k),
            self.next_order,
        )
    }
}

/// Draw ids until one is free; after `MAX_ID_ATTEMPTS` collisions, suffix
/// draws with a counter, which terminates because the taken set is finite.
fn fresh_id(
    mut draw: impl FnMut() -> String,
    taken: impl Fn(&str) -> bool,
    seed: u64,
) -> String {
    for _ in 0..MAX_ID_ATTEMPTS {
        let id = draw();
        if !taken(&id) {
            return id;
        }
    }
    warn!(attempts = MAX_ID_ATTEMPTS, "id source keeps colliding, suffixing ids");
    let mut n = seed;
    loop {
        let id = format!("{}-{n}", draw());
        if !taken(&id) {
            return id;
        }
        n += 1;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::{clock::ManualClock, ids::SequentialIds},
        std::collections::HashSet,
    };

    pub(crate) fn test_registry() -> (Registry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let registry = Registry::with_sources(
            RegistryConfig {
                heartbeat_interval_ms: 1_000,
                ttl_multiple: 3,
                sweep_interval_ms: 1_000,
                ..Default::default()
            },
            clock.clone(),
            Arc::new(SequentialIds::new()),
        );
        (registry, clock)
    }

    /// Id source that always proposes the same values.
    #[derive(Debug)]
    struct StuckIds;

    impl IdSource for StuckIds {
        fn host_key(&self) -> String {
            "hk_same".into()
        }

        fn room_code(&self) -> String {
            "ROOM".into()
        }
    }

    #[test]
    fn register_mints_key_and_room() {
        let (mut reg, _) = test_registry();
        let r = reg.register(None);
        assert_eq!(r.host_key, "hk_1");
        assert_eq!(r.room, "r_1");
        assert!(!r.replaced);

        let host = reg.get("hk_1").unwrap();
        assert_eq!(host.registered_at_ms, 1_000_000);
        assert_eq!(host.last_seen_ms, 1_000_000);
        assert!(!host.is_busy());
    }

    #[test]
    fn register_adopts_unknown_supplied_key() {
        let (mut reg, _) = test_registry();
        let r = reg.register(Some("K"));
        assert_eq!(r.host_key, "K");
        assert!(!r.replaced);
        assert!(reg.get("K").is_some());
    }

    #[test]
    fn empty_supplied_key_is_treated_as_absent() {
        let (mut reg, _) = test_registry();
        let r = reg.register(Some(""));
        assert_eq!(r.host_key, "hk_1");
    }

    #[test]
    fn reregistration_preserves_age_not_room() {
        let (mut reg, clock) = test_registry();
        let first = reg.register(Some("K"));
        clock.advance(5_000);
        let second = reg.register(Some("K"));

        assert!(second.replaced);
        assert_eq!(second.host_key, "K");
        assert_eq!(second.registered_at_ms, first.registered_at_ms);
        assert_ne!(second.room, first.room);
        assert_eq!(reg.health().total, 1);

        let host = reg.get("K").unwrap();
        assert_eq!(host.last_seen_ms, 1_005_000);
        assert!(!host.is_busy());
    }

    #[test]
    fn reregistration_drops_session_and_frees_host() {
        let (mut reg, _) = test_registry();
        let first = reg.register(Some("K"));
        let claim = reg.claim().unwrap();
        assert_eq!(claim.room, first.room);
        assert_eq!(reg.session_host(&first.room), Some("K"));

        reg.register(Some("K"));
        assert_eq!(reg.session_host(&first.room), None);
        assert!(!reg.get("K").unwrap().is_busy());
        assert!(reg.invariant_violations().is_empty());
    }

    #[test]
    fn rooms_unique_even_with_colliding_source() {
        let clock = Arc::new(ManualClock::new(0));
        let mut reg =
            Registry::with_sources(RegistryConfig::default(), clock, Arc::new(StuckIds));

        let keys: Vec<_> = (0..5).map(|_| reg.register(None)).collect();
        let hosts: HashSet<_> = keys.iter().map(|r| r.host_key.clone()).collect();
        let rooms: HashSet<_> = keys.iter().map(|r| r.room.clone()).collect();
        assert_eq!(hosts.len(), 5);
        assert_eq!(rooms.len(), 5);

        // Re-registration must move off the old room even when the source
        // keeps proposing it.
        let again = reg.register(Some(&keys[0].host_key));
        assert_ne!(again.room, keys[0].room);
        assert!(reg.invariant_violations().is_empty());
    }

    #[test]
    fn heartbeat_refreshes_only_last_seen() {
        let (mut reg, clock) = test_registry();
        reg.register(Some("K"));
        reg.claim().unwrap();
        clock.advance(700);

        reg.heartbeat("K").unwrap();
        let host = reg.get("K").unwrap();
        assert_eq!(host.last_seen_ms, 1_000_700);
        assert!(host.is_busy());
    }

    #[test]
    fn heartbeat_unknown_host() {
        let (mut reg, _) = test_registry();
        assert_eq!(
            reg.heartbeat("nope"),
            Err(RegistryError::host_not_found("nope"))
        );
    }

    #[test]
    fn unregister_is_idempotent() {
        let (mut reg, _) = test_registry();
        let r = reg.register(None);
        reg.claim().unwrap();

        assert!(reg.unregister(&r.host_key));
        assert_eq!(reg.health().total, 0);
        assert_eq!(reg.session_count(), 0);

        assert!(!reg.unregister(&r.host_key));
        assert_eq!(reg.health().total, 0);
        assert!(!reg.unregister("never-seen"));
    }

    #[test]
    fn release_frees_host_and_keeps_room() {
        let (mut reg, clock) = test_registry();
        let r = reg.register(None);
        reg.claim().unwrap();
        clock.advance(10);

        reg.release(&r.host_key).unwrap();
        let host = reg.get(&r.host_key).unwrap();
        assert!(!host.is_busy());
        assert_eq!(host.room, r.room);
        assert_eq!(host.last_seen_ms, 1_000_010);
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn release_unknown_host() {
        let (mut reg, _) = test_registry();
        assert!(matches!(
            reg.release("gone"),
            Err(RegistryError::HostNotFound { .. })
        ));
    }

    #[test]
    fn leave_by_room() {
        let (mut reg, clock) = test_registry();
        let r = reg.register(None);
        let claim = reg.claim().unwrap();
        clock.advance(50);

        let freed = reg.leave(Some(&claim.room), None).unwrap();
        assert_eq!(freed, r.host_key);
        let host = reg.get(&r.host_key).unwrap();
        assert!(!host.is_busy());
        // Leave is not a liveness signal from the host.
        assert_eq!(host.last_seen_ms, 1_000_000);
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn leave_by_host_id_wins() {
        let (mut reg, _) = test_registry();
        let a = reg.register(None);
        let b = reg.register(None);
        reg.claim().unwrap();
        reg.claim().unwrap();

        // Host id resolves, so the unrelated room is ignored.
        let freed = reg.leave(Some(&a.room), Some(&b.host_key)).unwrap();
        assert_eq!(freed, b.host_key);
        assert!(reg.get(&a.host_key).unwrap().is_busy());
        assert!(!reg.get(&b.host_key).unwrap().is_busy());
        assert!(reg.invariant_violations().is_empty());
    }

    #[test]
    fn leave_falls_back_to_room_for_unknown_host_id() {
        let (mut reg, _) = test_registry();
        let r = reg.register(None);
        let claim = reg.claim().unwrap();
        let freed = reg.leave(Some(&claim.room), Some("stale")).unwrap();
        assert_eq!(freed, r.host_key);
    }

    #[test]
    fn leave_not_found() {
        let (mut reg, _) = test_registry();
        reg.register(None);
        assert_eq!(reg.leave(None, None), Err(RegistryError::NoLeaveTarget));
        assert!(matches!(
            reg.leave(Some("r_404"), None),
            Err(RegistryError::RoomNotFound { .. })
        ));
        assert!(matches!(
            reg.leave(None, Some("hk_404")),
            Err(RegistryError::HostNotFound { .. })
        ));
        // A room that exists but has no session does not resolve.
        assert!(reg.leave(Some("r_1"), None).is_err());
    }

    #[test]
    fn leave_on_available_host_is_ok() {
        let (mut reg, _) = test_registry();
        let r = reg.register(None);
        assert_eq!(reg.leave(None, Some(&r.host_key)).unwrap(), r.host_key);
    }

    #[test]
    fn health_counts() {
        let (mut reg, _) = test_registry();
        for _ in 0..3 {
            reg.register(None);
        }
        reg.claim().unwrap();
        assert_eq!(reg.health(), HostCounts {
            total: 3,
            busy: 1,
            avail: 2,
        });
    }

    #[test]
    fn room_is_live_tracks_current_rooms() {
        let (mut reg, _) = test_registry();
        let first = reg.register(Some("K"));
        assert!(reg.room_is_live(&first.room));
        let second = reg.register(Some("K"));
        assert!(!reg.room_is_live(&first.room));
        assert!(reg.room_is_live(&second.room));
    }
}
