#[cfg(feature = "prometheus")]
use std::sync::OnceLock;
use std::sync::Arc;

use {
    lobby_config::LobbyConfig,
    lobby_ice::IceProvider,
    lobby_registry::{Registry, SharedRegistry},
};

use crate::relay::RelayHub;

// ── Gateway state ────────────────────────────────────────────────────────────

/// Shared gateway runtime state, wrapped in Arc for use across async tasks.
pub struct GatewayState {
    /// Host/session registry. Handlers hold the lock only for map work.
    pub registry: SharedRegistry,
    /// Credential issuer; `None` when ICE is disabled.
    pub ice: Option<Arc<dyn IceProvider>>,
    /// Signaling relay rooms.
    pub relay: RelayHub,
    /// Effective configuration.
    pub config: LobbyConfig,
    /// Server version string.
    pub version: String,
    /// Hostname for the startup banner and `/health` debugging.
    pub hostname: String,
    /// Recorder rendered at `/metrics`, set once by the binary.
    #[cfg(feature = "prometheus")]
    pub prometheus: OnceLock<lobby_metrics::PrometheusHandle>,
}

impl GatewayState {
    /// Fresh registry and the ICE provider named in `config`.
    pub fn new(config: LobbyConfig) -> Arc<Self> {
        let registry = Registry::new(config.registry.clone()).into_shared();
        let ice = lobby_ice::from_config(&config.ice);
        Self::with_parts(config, registry, ice)
    }

    /// Assemble state from prebuilt parts (tests inject clocks and providers).
    pub fn with_parts(
        config: LobbyConfig,
        registry: SharedRegistry,
        ice: Option<Arc<dyn IceProvider>>,
    ) -> Arc<Self> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".into());

        Arc::new(Self {
            relay: RelayHub::new(config.relay.max_peers_per_room),
            registry,
            ice,
            config,
            version: env!("CARGO_PKG_VERSION").to_string(),
            hostname,
            #[cfg(feature = "prometheus")]
            prometheus: OnceLock::new(),
        })
    }

    /// Expose an installed Prometheus recorder. Later calls are ignored.
    #[cfg(feature = "prometheus")]
    pub fn set_prometheus(&self, handle: lobby_metrics::PrometheusHandle) {
        let _ = self.prometheus.set(handle);
    }
}
