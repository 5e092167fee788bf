//! Metrics for the lobby server.
//!
//! Crates record through the re-exported `metrics` macros; nothing is kept
//! until a recorder is installed. With the `prometheus` feature the binary
//! installs a Prometheus recorder and the gateway renders it at `/metrics`.

pub use metrics::{counter, gauge, histogram};

/// Metric names. Kept in one place so dashboards and code agree.
pub mod names {
    /// Live hosts, busy or not.
    pub const HOSTS_TOTAL: &str = "lobby_hosts_total";
    /// Live hosts that can be claimed right now.
    pub const HOSTS_AVAILABLE: &str = "lobby_hosts_available";
    /// Claims, labelled `outcome` = `matched` | `no_hosts`.
    pub const CLAIMS_TOTAL: &str = "lobby_claims_total";
    /// Hosts removed by the TTL sweep.
    pub const HOSTS_EVICTED_TOTAL: &str = "lobby_hosts_evicted_total";
    /// Reconciliation repairs, labelled `kind` = `duplicate_room` | `dangling_session` | `orphaned_busy`.
    pub const RECONCILE_REPAIRS_TOTAL: &str = "lobby_reconcile_repairs_total";
    /// Credential issuer fetch latency in seconds.
    pub const ICE_FETCH_SECONDS: &str = "lobby_ice_fetch_seconds";
}

#[cfg(feature = "prometheus")]
pub use metrics_exporter_prometheus::PrometheusHandle;

/// Install the global Prometheus recorder. Call once, before any metric is
/// recorded that should be exported.
#[cfg(feature = "prometheus")]
pub fn install_prometheus() -> anyhow::Result<PrometheusHandle> {
    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install prometheus recorder: {e}"))?;
    tracing::debug!("prometheus recorder installed");
    Ok(handle)
}
