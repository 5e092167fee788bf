//! STUN/TURN server lists for `GET /ice`.
//!
//! A provider is either a fixed list from config or a remote issuer minting
//! short-lived TURN credentials; both are wrapped in a cache so repeated
//! calls don't hit the issuer.

pub mod cache;
pub mod error;
pub mod http;
pub mod provider;

use std::{sync::Arc, time::Duration};

use {
    lobby_config::{IceConfig, IceProviderKind},
    secrecy::Secret,
    tracing::{info, warn},
};

pub use {
    cache::CachedIceProvider,
    error::{IceError, IceResult},
    http::HttpIceProvider,
    provider::{IceProvider, IceServers, StaticIceProvider},
};

/// Build the configured provider, or `None` when ICE is disabled.
pub fn from_config(config: &IceConfig) -> Option<Arc<dyn IceProvider>> {
    let inner: Arc<dyn IceProvider> = match config.provider {
        IceProviderKind::None => return None,
        IceProviderKind::Static => Arc::new(StaticIceProvider::new(
            config.urls.clone(),
            config.username.clone(),
            config.credential.clone(),
        )),
        IceProviderKind::Http => {
            let Some(endpoint) = config.endpoint.clone().filter(|e| !e.is_empty()) else {
                warn!("ice.provider is http but no endpoint is set; ICE disabled");
                return None;
            };
            let token = config.api_token.clone().map(Secret::new);
            let timeout = Duration::from_secs(config.timeout_secs);
            match HttpIceProvider::new(endpoint, token, timeout) {
                Ok(provider) => Arc::new(provider),
                Err(e) => {
                    warn!(error = %e, "ICE issuer client unavailable; ICE disabled");
                    return None;
                },
            }
        },
    };
    info!(provider = inner.id(), ttl_secs = config.ttl_secs, "ICE provider enabled");
    Some(Arc::new(CachedIceProvider::new(
        inner,
        Duration::from_secs(config.refresh_margin_secs),
    )))
}
