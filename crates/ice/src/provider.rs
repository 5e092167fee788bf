use std::fmt::Debug;

use {async_trait::async_trait, lobby_protocol::IceServer};

use crate::error::IceResult;

/// A time-limited set of STUN/TURN servers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServers {
    pub servers: Vec<IceServer>,
    /// Seconds the credentials stay valid from the moment they were issued.
    pub ttl_secs: u64,
}

/// Source of ICE server lists. Implementations must not touch registry
/// state; the gateway calls them outside the registry lock.
#[async_trait]
pub trait IceProvider: Send + Sync + Debug {
    fn id(&self) -> &'static str;

    /// Obtain servers valid for (at most) `ttl_secs`.
    async fn fetch(&self, ttl_secs: u64) -> IceResult<IceServers>;
}

/// Fixed servers from config. Static credentials never expire, so the
/// requested TTL is echoed back.
#[derive(Debug, Clone)]
pub struct StaticIceProvider {
    server: IceServer,
}

impl StaticIceProvider {
    pub fn new(urls: Vec<String>, username: Option<String>, credential: Option<String>) -> Self {
        Self {
            server: IceServer {
                urls,
                username,
                credential,
            },
        }
    }
}

#[async_trait]
impl IceProvider for StaticIceProvider {
    fn id(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self, ttl_secs: u64) -> IceResult<IceServers> {
        Ok(IceServers {
            servers: vec![self.server.clone()],
            ttl_secs,
        })
    }
}
