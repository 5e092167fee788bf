//! Host/session registry: which hosts are alive, which are serving a user,
//! and which room each session lives in.
//!
//! Layers, leaves first:
//! 1. [`clock`] and [`ids`]: time and identifier sources
//! 2. [`registry`]: the store plus register/heartbeat/release/leave/unregister
//! 3. [`matching`]: `claim`
//! 4. [`reconcile`]: repair of session/host drift, run before every claim
//! 5. [`reaper`]: TTL sweep and the background task driving it
//!
//! All state sits behind one lock ([`SharedRegistry`]); the reaper takes the
//! same lock as request handlers.

pub mod clock;
pub mod error;
pub mod host;
pub mod ids;
pub mod matching;
pub mod reaper;
pub mod reconcile;
pub mod registry;

pub use {
    clock::{Clock, ManualClock, SystemClock},
    error::{RegistryError, RegistryResult},
    host::{Host, HostState},
    ids::{IdSource, RandomIds, SequentialIds},
    matching::Claim,
    reaper::{ReapReport, SweepReport, reap_once, spawn_reaper},
    reconcile::ReconcileReport,
    registry::{Registration, Registry, SharedRegistry},
};
