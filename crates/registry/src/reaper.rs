//! TTL sweep and the background task that runs it.

use std::time::Duration;

use {
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinHandle,
        time::{MissedTickBehavior, interval},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use lobby_metrics::{counter, names};

use crate::{
    reconcile::ReconcileReport,
    registry::{Registry, SharedRegistry},
};

/// What a TTL sweep removed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub sessions_dropped: usize,
    /// Rooms of the evicted hosts, for closing their relay rooms.
    pub evicted_rooms: Vec<String>,
}

/// Outcome of one reaper pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    pub sweep: SweepReport,
    pub repairs: ReconcileReport,
    /// Invariant violations still present after the pass.
    pub violations: Vec<String>,
}

impl Registry {
    /// Evict every host silent for longer than the configured threshold,
    /// together with any session pointing at it.
    pub fn sweep(&mut self) -> SweepReport {
        let now = self.now_ms();
        let threshold = self.config.eviction_threshold_ms();

        let expired: Vec<String> = self
            .hosts
            .values()
            .filter(|h| h.silent_for(now) > threshold)
            .map(|h| h.key.clone())
            .collect();

        let mut report = SweepReport::default();
        for key in &expired {
            if let Some(host) = self.hosts.remove(key) {
                report.evicted += 1;
                report.evicted_rooms.push(host.room);
            }
            report.sessions_dropped += self.drop_sessions_for(key);
        }

        if report.evicted > 0 {
            #[cfg(feature = "metrics")]
            {
                counter!(names::HOSTS_EVICTED_TOTAL).increment(report.evicted as u64);
            }
            self.observe_availability();
        }
        report
    }
}

/// One reaper pass under the registry lock. Logs a single aggregated line
/// when anything was evicted or repaired, and every invariant violation the
/// pass leaves behind at `error`.
pub async fn reap_once(registry: &Mutex<Registry>) -> ReapReport {
    let mut reg = registry.lock().await;
    let sweep = reg.sweep();
    let repairs = if reg.config().reconcile_on_sweep {
        reg.reconcile()
    } else {
        ReconcileReport::default()
    };
    let violations = reg.invariant_violations();
    let counts = reg.health();
    drop(reg);

    if sweep.evicted > 0 {
        info!(
            evicted = sweep.evicted,
            sessions_dropped = sweep.sessions_dropped,
            remaining = counts.total,
            avail = counts.avail,
            "reaper evicted stale hosts"
        );
    }
    if !repairs.is_clean() {
        warn!(
            dangling_sessions = repairs.dangling_sessions,
            orphaned_busy = repairs.orphaned_busy,
            duplicate_rooms = repairs.duplicate_rooms,
            "reaper repaired registry drift"
        );
    }
    for violation in &violations {
        error!(violation = %violation, "registry invariant violated");
    }
    ReapReport {
        sweep,
        repairs,
        violations,
    }
}

/// Run [`reap_once`] every `sweep_interval_ms` until `cancel` fires.
///
/// With `evicted_rooms`, the room of every evicted host is sent there so
/// transport state tied to it can be torn down. A closed receiver is ignored.
pub fn spawn_reaper(
    registry: SharedRegistry,
    cancel: CancellationToken,
    evicted_rooms: Option<mpsc::UnboundedSender<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let (period, threshold) = {
            let reg = registry.lock().await;
            (
                reg.config().sweep_interval(),
                reg.config().eviction_threshold_ms(),
            )
        };
        let period = period.max(Duration::from_millis(1));
        info!(
            period_ms = period.as_millis() as u64,
            threshold_ms = threshold,
            "reaper started"
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can be stale yet.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = reap_once(&registry).await;
                    if let Some(tx) = &evicted_rooms {
                        for room in report.sweep.evicted_rooms {
                            let _ = tx.send(room);
                        }
                    }
                },
            }
        }
        debug!("reaper stopped");
    })
}
