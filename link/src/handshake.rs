//! Handshake coordinator.
//!
//! Trades short-lived authorization for a connect URL and protocol
//! headers. The whole exchange, plus opening the socket with its result,
//! must fit in the handshake window (15 s by default); the returned
//! [`HandshakeInfo::valid_until`] carries that deadline to the connector.
//! The coordinator never retries.

use crate::auth::{AuthProvider, ResolvedAuth};
use crate::error::{LinkError, Result};
use crate::models::{EndpointConfig, HandshakeInfo, HandshakeResponse};
use crate::timeouts::LinkTimeouts;
use futures_util::{stream, Stream};
use reqwest::Url;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Performs the auxiliary handshake request.
#[async_trait::async_trait]
pub trait HandshakeFetcher: Send + Sync + 'static {
    async fn fetch(&self, endpoint: &EndpointConfig, auth: &AuthProvider) -> Result<HandshakeResponse>;
}

/// Handshake over HTTP: `POST {}` to the endpoint, expecting `{url, header}`.
#[derive(Debug, Clone, Default)]
pub struct HttpHandshakeFetcher {
    client: reqwest::Client,
}

impl HttpHandshakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl HandshakeFetcher for HttpHandshakeFetcher {
    async fn fetch(&self, endpoint: &EndpointConfig, auth: &AuthProvider) -> Result<HandshakeResponse> {
        let mut request = self.client.post(endpoint.url().clone()).json(&serde_json::json!({}));
        for (name, value) in endpoint.headers() {
            request = request.header(name.as_str(), value.as_str());
        }
        let request = auth.apply_to_request(request)?;

        log::debug!("[realtime-link] Handshake request to {}", endpoint.url());
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LinkError::HandshakeFailed(format!("HTTP {}: {}", status, body)));
        }
        response
            .json::<HandshakeResponse>()
            .await
            .map_err(|e| LinkError::HandshakeFailed(format!("invalid handshake response: {}", e)))
    }
}

/// Fetcher that always returns the same connect info.
///
/// Used with [`MemoryConnector`](crate::MemoryConnector) or when the
/// connect URL is known ahead of time.
#[derive(Debug, Clone)]
pub struct StaticHandshakeFetcher {
    response: HandshakeResponse,
    calls: Arc<AtomicUsize>,
}

impl StaticHandshakeFetcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            response: HandshakeResponse {
                url: url.into(),
                header: Default::default(),
            },
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.response.header.insert(name.into(), value.into());
        self
    }

    /// Number of handshakes performed so far.
    pub fn fetch_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HandshakeFetcher for StaticHandshakeFetcher {
    async fn fetch(&self, _endpoint: &EndpointConfig, _auth: &AuthProvider) -> Result<HandshakeResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// Produces one [`HandshakeInfo`] per socket open attempt.
#[derive(Clone)]
pub struct HandshakeCoordinator {
    endpoint: EndpointConfig,
    auth: ResolvedAuth,
    fetcher: Arc<dyn HandshakeFetcher>,
    window: Duration,
}

impl std::fmt::Debug for HandshakeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeCoordinator")
            .field("endpoint", &self.endpoint.url().as_str())
            .field("auth", &self.auth)
            .field("window", &self.window)
            .finish()
    }
}

impl HandshakeCoordinator {
    pub fn new(
        endpoint: EndpointConfig,
        auth: ResolvedAuth,
        fetcher: Arc<dyn HandshakeFetcher>,
        window: Duration,
    ) -> Self {
        Self {
            endpoint,
            auth,
            fetcher,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Run one handshake.
    ///
    /// Resolves credentials, performs the request, and validates the
    /// returned connect URL. Protocol headers are the credential headers
    /// overlaid with whatever the server returned.
    pub async fn handshake(&self) -> Result<HandshakeInfo> {
        let valid_until = if LinkTimeouts::is_no_timeout(self.window) {
            Instant::now() + Duration::from_secs(86400 * 365)
        } else {
            Instant::now() + self.window
        };

        let exchange = async {
            let auth = self.auth.resolve().await?;
            let response = self.fetcher.fetch(&self.endpoint, &auth).await?;
            Ok::<_, LinkError>((auth, response))
        };
        let (auth, response) = tokio::time::timeout_at(valid_until, exchange)
            .await
            .map_err(|_| LinkError::HandshakeTimeout(self.window))??;

        let url = Url::parse(&response.url).map_err(|e| {
            LinkError::HandshakeFailed(format!("invalid connect URL '{}': {}", response.url, e))
        })?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(LinkError::HandshakeFailed(format!(
                "connect URL must use ws or wss, got '{}'",
                url.scheme()
            )));
        }

        let mut protocol_headers = auth.headers();
        protocol_headers.extend(response.header);
        log::debug!("[realtime-link] Handshake complete, connect URL {}", response.url);

        Ok(HandshakeInfo {
            connect_url: response.url,
            protocol_headers,
            valid_until,
        })
    }

    /// The handshake as a single-value pipeline stage.
    pub fn stage(&self) -> impl Stream<Item = Result<HandshakeInfo>> + Send + '_ {
        stream::once(self.handshake())
    }
}
