use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use {async_trait::async_trait, tokio::sync::Mutex, tracing::debug};

#[cfg(feature = "metrics")]
use lobby_metrics::{histogram, names};

use crate::{
    error::IceResult,
    provider::{IceProvider, IceServers},
};

#[derive(Debug)]
struct Entry {
    servers: IceServers,
    expires_at: Instant,
}

/// Reuses issued credentials until `refresh_margin` before they expire.
///
/// Failures are never cached; the next call goes back to the issuer. The
/// TTL reported to callers is what remains of the cached credentials.
#[derive(Debug)]
pub struct CachedIceProvider {
    inner: Arc<dyn IceProvider>,
    refresh_margin: Duration,
    entry: Mutex<Option<Entry>>,
}

impl CachedIceProvider {
    pub fn new(inner: Arc<dyn IceProvider>, refresh_margin: Duration) -> Self {
        Self {
            inner,
            refresh_margin,
            entry: Mutex::new(None),
        }
    }
}

#[async_trait]
impl IceProvider for CachedIceProvider {
    fn id(&self) -> &'static str {
        self.inner.id()
    }

    async fn fetch(&self, ttl_secs: u64) -> IceResult<IceServers> {
        // Held across the fetch so concurrent misses issue one request.
        let mut entry = self.entry.lock().await;
        let now = Instant::now();

        if let Some(cached) = entry.as_ref()
            && cached.expires_at > now
        {
            let remaining = cached.expires_at.duration_since(now) + self.refresh_margin;
            return Ok(IceServers {
                servers: cached.servers.servers.clone(),
                ttl_secs: remaining.as_secs(),
            });
        }

        let started = Instant::now();
        let result = self.inner.fetch(ttl_secs).await;
        #[cfg(feature = "metrics")]
        {
            let outcome = if result.is_ok() { "ok" } else { "error" };
            histogram!(names::ICE_FETCH_SECONDS, "provider" => self.inner.id(), "outcome" => outcome)
                .record(started.elapsed().as_secs_f64());
        }
        let fresh = result?;

        let lifetime = Duration::from_secs(fresh.ttl_secs);
        if lifetime > self.refresh_margin {
            *entry = Some(Entry {
                servers: fresh.clone(),
                expires_at: started + (lifetime - self.refresh_margin),
            });
        } else {
            *entry = None;
        }
        debug!(
            provider = self.inner.id(),
            ttl_secs = fresh.ttl_secs,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refreshed ICE credentials"
        );
        Ok(fresh)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{error::IceError, http::HttpIceProvider},
        lobby_protocol::IceServer,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    #[derive(Debug, Default)]
    struct Counting {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl IceProvider for Counting {
        fn id(&self) -> &'static str {
            "counting"
        }

        async fn fetch(&self, ttl_secs: u64) -> IceResult<IceServers> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IceError::Transport("down".into()));
            }
            Ok(IceServers {
                servers: vec![IceServer {
                    urls: vec![format!("turn:t{n}.example.org")],
                    username: Some(format!("user{n}")),
                    credential: Some("pw".into()),
                }],
                ttl_secs,
            })
        }
    }

    #[tokio::test]
    async fn serves_from_cache_until_margin() {
        let inner = Arc::new(Counting::default());
        let cache = CachedIceProvider::new(inner.clone(), Duration::from_secs(300));

        let first = cache.fetch(3_600).await.unwrap();
        let second = cache.fetch(3_600).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.servers, second.servers);
        assert!(second.ttl_secs <= 3_600);
        assert!(second.ttl_secs >= 3_590);
    }

    #[tokio::test]
    async fn short_lived_credentials_are_not_cached() {
        let inner = Arc::new(Counting::default());
        let cache = CachedIceProvider::new(inner.clone(), Duration::from_secs(300));

        cache.fetch(60).await.unwrap();
        let again = cache.fetch(60).await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(again.servers[0].username.as_deref(), Some("user1"));
    }

    #[tokio::test]
    async fn hung_issuer_does_not_wedge_later_callers() {
        let endpoint = crate::http::tests::silent_issuer().await;
        let inner = HttpIceProvider::new(endpoint, None, Duration::from_millis(200)).unwrap();
        let cache = Arc::new(CachedIceProvider::new(Arc::new(inner), Duration::ZERO));

        let first = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move { cache.fetch(60).await }
        });
        let second = tokio::time::timeout(Duration::from_secs(5), cache.fetch(60))
            .await
            .expect("second fetch stuck behind the first");
        assert!(matches!(second, Err(IceError::Transport(_))));
        assert!(first.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let inner = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let cache = CachedIceProvider::new(inner.clone(), Duration::ZERO);

        assert!(cache.fetch(60).await.is_err());
        assert!(cache.fetch(60).await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.id(), "counting");
    }
}
