//! Repair of session/host drift.
//!
//! Three shapes are fixed here:
//! - hosts sharing a room code: one keeps it, the rest get fresh codes and
//!   go back to available;
//! - a session whose host is gone, or whose host is not assigned to that
//!   room, is dropped;
//! - a host assigned to a room with no matching `room → host` session (or a
//!   room that is no longer its own) goes back to available.
//!
//! Public operations never produce either shape, so every repair is logged
//! as an error. The pass is idempotent.

use std::collections::HashMap;

use tracing::error;

#[cfg(feature = "metrics")]
use lobby_metrics::{counter, names};

use crate::{host::HostState, registry::Registry};

/// What a reconciliation pass changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileReport {
    pub duplicate_rooms: usize,
    pub dangling_sessions: usize,
    pub orphaned_busy: usize,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_rooms == 0 && self.dangling_sessions == 0 && self.orphaned_busy == 0
    }
}

impl Registry {
    pub fn reconcile(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport {
            duplicate_rooms: self.split_shared_rooms(),
            ..Default::default()
        };

        let hosts = &self.hosts;
        self.sessions.retain(|room, key| {
            let valid = hosts
                .get(key.as_str())
                .is_some_and(|h| h.assigned_room() == Some(room.as_str()));
            if !valid {
                error!(room = %room, host = %key, live = hosts.contains_key(key.as_str()), "dropping dangling session");
                report.dangling_sessions += 1;
            }
            valid
        });

        let orphaned: Vec<String> = self
            .hosts
            .values()
            .filter(|h| {
                h.assigned_room().is_some_and(|room| {
                    room != h.room || self.sessions.get(room) != Some(&h.key)
                })
            })
            .map(|h| h.key.clone())
            .collect();

        for key in &orphaned {
            if let Some(host) = self.hosts.get_mut(key) {
                error!(host = %key, room = ?host.assigned_room(), "clearing busy flag without session");
                host.state = HostState::Available;
            }
            self.drop_sessions_for(key);
        }
        report.orphaned_busy = orphaned.len();

        if !report.is_clean() {
            #[cfg(feature = "metrics")]
            {
                counter!(names::RECONCILE_REPAIRS_TOTAL, "kind" => "duplicate_room")
                    .increment(report.duplicate_rooms as u64);
                counter!(names::RECONCILE_REPAIRS_TOTAL, "kind" => "dangling_session")
                    .increment(report.dangling_sessions as u64);
                counter!(names::RECONCILE_REPAIRS_TOTAL, "kind" => "orphaned_busy")
                    .increment(report.orphaned_busy as u64);
            }
            self.observe_availability();
        }
        report
    }

    /// Give every host but one in a shared room a fresh code. The host whose
    /// session owns the room keeps it, otherwise the earliest registered.
    fn split_shared_rooms(&mut self) -> usize {
        let mut by_room: HashMap<&str, Vec<(&str, u64)>> = HashMap::new();
        for host in self.hosts.values() {
            by_room
                .entry(host.room.as_str())
                .or_default()
                .push((host.key.as_str(), host.order));
        }

        let mut displaced = Vec::new();
        for (room, mut holders) in by_room {
            if holders.len() < 2 {
                continue;
            }
            let owner = self.sessions.get(room).map(String::as_str);
            holders.sort_by_key(|&(key, order)| (Some(key) != owner, order));
            displaced.extend(holders[1..].iter().map(|&(key, _)| key.to_string()));
        }

        for key in &displaced {
            let room = self.fresh_room(None);
            if let Some(host) = self.hosts.get_mut(key) {
                error!(host = %key, old = %host.room, new = %room, "re-issuing shared room");
                host.room = room;
                host.state = HostState::Available;
            }
        }
        displaced.len()
    }
}
