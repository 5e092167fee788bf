//! Remote credential issuer speaking the common "TURN REST" shape: POST
//! `{"ttl": <secs>}` with a bearer token, receive `{"iceServers": ...}`.

use std::time::Duration;

use {
    async_trait::async_trait,
    lobby_protocol::IceServer,
    reqwest::Client,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

use crate::{
    error::{IceError, IceResult},
    provider::{IceProvider, IceServers},
};

/// Issuer error bodies are truncated to this many bytes in error messages.
const MAX_ERROR_BODY: usize = 512;

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
struct IssuedServer {
    urls: OneOrMany<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    credential: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssuerResponse {
    ice_servers: OneOrMany<IssuedServer>,
    #[serde(default)]
    ttl: Option<u64>,
}

/// Fetches short-lived TURN credentials from an HTTP issuer.
///
/// Every request is bounded by `timeout`; an issuer that accepts the
/// connection and never answers surfaces as [`IceError::Transport`].
#[derive(Clone)]
pub struct HttpIceProvider {
    client: Client,
    endpoint: String,
    api_token: Option<Secret<String>>,
    timeout: Duration,
}

impl std::fmt::Debug for HttpIceProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpIceProvider")
            .field("endpoint", &self.endpoint)
            .field("api_token", &"[REDACTED]")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl HttpIceProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_token: Option<Secret<String>>,
        timeout: Duration,
    ) -> IceResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IceError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_token,
            timeout,
        })
    }

    fn transport_error(&self, e: &reqwest::Error) -> IceError {
        if e.is_timeout() {
            IceError::Transport(format!("timed out after {:?}", self.timeout))
        } else {
            IceError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl IceProvider for HttpIceProvider {
    fn id(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, ttl_secs: u64) -> IceResult<IceServers> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "ttl": ttl_secs }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            return Err(IceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: IssuerResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(&e)
            } else {
                IceError::InvalidResponse(e.to_string())
            }
        })?;

        let servers: Vec<IceServer> = parsed
            .ice_servers
            .into_vec()
            .into_iter()
            .map(|s| IceServer {
                urls: s.urls.into_vec(),
                username: s.username,
                credential: s.credential,
            })
            .filter(|s| !s.urls.is_empty())
            .collect();
        if servers.is_empty() {
            return Err(IceError::InvalidResponse("no ICE servers in response".into()));
        }

        let ttl_secs = parsed.ttl.map_or(ttl_secs, |t| t.min(ttl_secs));
        debug!(count = servers.len(), ttl_secs, "fetched ICE servers");
        Ok(IceServers { servers, ttl_secs })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {super::*, mockito::Matcher, serde_json::json, tokio::net::TcpListener};

    fn issuer_client(endpoint: impl Into<String>, token: Option<&str>) -> HttpIceProvider {
        HttpIceProvider::new(
            endpoint,
            token.map(|t| Secret::new(t.to_string())),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    /// Accepts connections and never writes a byte back.
    pub(crate) async fn silent_issuer() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn posts_ttl_with_bearer_and_parses_object() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/credentials")
            .match_header("authorization", "Bearer tok")
            .match_body(Matcher::Json(json!({ "ttl": 600 })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "iceServers": {
                        "urls": ["stun:turn.example.org:3478", "turn:turn.example.org:3478?transport=udp"],
                        "username": "u",
                        "credential": "c"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let provider = issuer_client(format!("{}/credentials", server.url()), Some("tok"));
        let got = provider.fetch(600).await.unwrap();
        mock.assert_async().await;

        assert_eq!(got.ttl_secs, 600);
        assert_eq!(got.servers.len(), 1);
        assert_eq!(got.servers[0].urls.len(), 2);
        assert_eq!(got.servers[0].username.as_deref(), Some("u"));
    }

    #[tokio::test]
    async fn accepts_array_and_single_url_and_shorter_ttl() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "iceServers": [
                        { "urls": "stun:a.example.org" },
                        { "urls": ["turn:b.example.org"], "username": "x", "credential": "y" }
                    ],
                    "ttl": 120
                })
                .to_string(),
            )
            .create_async()
            .await;

        let provider = issuer_client(server.url(), None);
        let got = provider.fetch(600).await.unwrap();
        assert_eq!(got.servers.len(), 2);
        assert_eq!(got.servers[0].urls, ["stun:a.example.org"]);
        assert_eq!(got.ttl_secs, 120);
    }

    #[tokio::test]
    async fn surfaces_issuer_errors_verbatim() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(401)
            .with_body("bad token")
            .create_async()
            .await;

        let provider = issuer_client(server.url(), None);
        let err = provider.fetch(60).await.unwrap_err();
        assert_eq!(err, IceError::Http {
            status: 401,
            body: "bad token".into(),
        });
        assert_eq!(err.to_string(), "ICE issuer returned 401: bad token");
    }

    #[tokio::test]
    async fn rejects_empty_server_list() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/")
            .with_status(200)
            .with_body(r#"{"iceServers":[]}"#)
            .create_async()
            .await;

        let provider = issuer_client(server.url(), None);
        assert!(matches!(
            provider.fetch(60).await,
            Err(IceError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_issuer_is_transport_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let provider = issuer_client("http://127.0.0.1:9/", None);
        assert!(matches!(
            provider.fetch(60).await,
            Err(IceError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn silent_issuer_times_out() {
        let endpoint = silent_issuer().await;
        let provider =
            HttpIceProvider::new(endpoint, None, Duration::from_millis(200)).unwrap();

        let err = tokio::time::timeout(Duration::from_secs(5), provider.fetch(60))
            .await
            .expect("issuer request was not bounded")
            .unwrap_err();
        assert!(
            matches!(&err, IceError::Transport(msg) if msg.contains("timed out")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn debug_redacts_token() {
        let provider = issuer_client("http://x", Some("sekrit"));
        let shown = format!("{provider:?}");
        assert!(!shown.contains("sekrit"));
    }
}
