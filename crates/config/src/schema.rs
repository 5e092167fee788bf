//! Config schema types (server, registry timing, ICE issuer, relay).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    pub server: ServerConfig,
    pub registry: RegistryConfig,
    pub ice: IceConfig,
    pub relay: RelayConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

/// How `claim` picks among available hosts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClaimPolicy {
    /// Oldest registration wins.
    #[default]
    First,
    /// Host whose last assignment is oldest wins; never-assigned hosts first.
    LeastRecentlyUsed,
}

/// Liveness and matching knobs for the host registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Interval at which hosts are expected to heartbeat.
    pub heartbeat_interval_ms: u64,

    /// A host is evicted once it has been silent for this many heartbeat
    /// intervals. Must be at least 1.
    pub ttl_multiple: u32,

    /// Period of the background sweep. May be coarser than the heartbeat.
    pub sweep_interval_ms: u64,

    pub claim_policy: ClaimPolicy,

    /// Also run orphan reconciliation on every sweep, not only before claims.
    pub reconcile_on_sweep: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            ttl_multiple: 3,
            sweep_interval_ms: 5_000,
            claim_policy: ClaimPolicy::First,
            reconcile_on_sweep: true,
        }
    }
}

impl RegistryConfig {
    /// Silence after which a host is considered dead.
    pub fn eviction_threshold_ms(&self) -> u64 {
        self.heartbeat_interval_ms
            .saturating_mul(u64::from(self.ttl_multiple))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Which credential issuer backs `GET /ice`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceProviderKind {
    #[default]
    None,
    /// Fixed STUN/TURN urls from this file.
    Static,
    /// Remote issuer that mints short-lived TURN credentials.
    Http,
}

/// Network-traversal credential issuer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub provider: IceProviderKind,

    /// STUN/TURN urls for the static provider.
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,

    /// Issuer endpoint for the http provider.
    pub endpoint: Option<String>,

    /// Bearer token for the issuer (`${ENV_VAR}` substitution recommended).
    pub api_token: Option<String>,

    /// Requested credential lifetime.
    pub ttl_secs: u64,

    /// Refetch this long before cached credentials expire.
    pub refresh_margin_secs: u64,

    /// Upper bound on one issuer request, connect included.
    pub timeout_secs: u64,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            provider: IceProviderKind::None,
            urls: Vec::new(),
            username: None,
            credential: None,
            endpoint: None,
            api_token: None,
            ttl_secs: 86_400,
            refresh_margin_secs: 300,
            timeout_secs: 10,
        }
    }
}

/// Signaling relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub max_peers_per_room: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_peers_per_room: 2,
        }
    }
}

impl LobbyConfig {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let reg = &self.registry;
        if reg.heartbeat_interval_ms == 0 {
            anyhow::bail!("registry.heartbeat_interval_ms must be greater than 0");
        }
        if reg.ttl_multiple == 0 {
            anyhow::bail!("registry.ttl_multiple must be at least 1");
        }
        if reg.sweep_interval_ms == 0 {
            anyhow::bail!("registry.sweep_interval_ms must be greater than 0");
        }

        match self.ice.provider {
            IceProviderKind::None => {},
            IceProviderKind::Static => {
                if self.ice.urls.is_empty() {
                    anyhow::bail!("ice.provider = \"static\" requires ice.urls");
                }
            },
            IceProviderKind::Http => {
                if self.ice.endpoint.as_deref().is_none_or(str::is_empty) {
                    anyhow::bail!("ice.provider = \"http\" requires ice.endpoint");
                }
            },
        }

        if self.ice.timeout_secs == 0 {
            anyhow::bail!("ice.timeout_secs must be greater than 0");
        }

        if self.relay.max_peers_per_room < 2 {
            anyhow::bail!("relay.max_peers_per_room must be at least 2");
        }
        Ok(())
    }

    /// Copy with secrets blanked, for printing.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.ice.api_token.is_some() {
            copy.ice.api_token = Some("[REDACTED]".into());
        }
        if copy.ice.credential.is_some() {
            copy.ice.credential = Some("[REDACTED]".into());
        }
        copy
    }
}
