//! Realtime client with builder pattern.
//!
//! Wires the reachability monitor, connection status monitor, handshake
//! coordinator, socket lifecycle manager and subscription multiplexer
//! together behind one handle.

use crate::{
    auth::{ArcDynAuthProvider, AuthProvider, ResolvedAuth},
    connection::{Connector, LifecycleHandle, LinkCmd, LinkConfig, WebSocketConnector},
    connection_status::{ConnectionStatusMonitor, ConnectionStatusStream},
    context::{
        control_messages_stage, run_non_terminating, ControlledRequest, OperationContext,
        CONTROL_MESSAGES_KEY,
    },
    error::{LinkError, Result},
    event_handlers::EventHandlers,
    handshake::{HandshakeCoordinator, HandshakeFetcher, HttpHandshakeFetcher},
    models::{
        ConnectionOptions, ConnectionState, EndpointConfig, SocketState, SubscriptionInfo,
        SubscriptionRequest,
    },
    reachability::{detect_adapter, ReachabilityAdapter, ReachabilityMonitor},
    subscription::Subscription,
    timeouts::LinkTimeouts,
};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, oneshot};

/// Realtime subscription client.
///
/// Many subscriptions share one socket, opened on the first subscribe and
/// closed when the last one goes away. Cloning the client is cheap and all
/// clones share that socket.
///
/// # Examples
///
/// ```rust,no_run
/// use realtime_link::{AuthProvider, RealtimeLinkClient};
///
/// # async fn example() -> realtime_link::Result<()> {
/// let client = RealtimeLinkClient::builder()
///     .endpoint("https://api.example.com/graphql")
///     .auth(AuthProvider::api_key("da2-abcdef"))
///     .build()?;
///
/// let mut sub = client
///     .subscribe("subscription { onMessage { id body } }", None)
///     .await?;
/// while let Some(event) = sub.next().await {
///     println!("{:?}", event?);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RealtimeLinkClient {
    lifecycle: Arc<LifecycleHandle>,
    status: ConnectionStatusMonitor,
    reachability: ReachabilityMonitor,
    next_key: Arc<AtomicU64>,
}

impl std::fmt::Debug for RealtimeLinkClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeLinkClient")
            .field("status", &self.status.current())
            .finish()
    }
}

impl RealtimeLinkClient {
    /// Create a new builder for configuring the client
    pub fn builder() -> RealtimeLinkClientBuilder {
        RealtimeLinkClientBuilder::new()
    }

    /// Subscribe to a push sequence.
    ///
    /// Returns immediately; the socket is opened (or reused) in the
    /// background. Put `"@@controlEvents": true` into `variables` to also
    /// receive [`ControlMessage::Connected`](crate::ControlMessage) each
    /// time the server acknowledges the subscription.
    pub async fn subscribe(
        &self,
        query: &str,
        variables: Option<serde_json::Value>,
    ) -> Result<Subscription> {
        let request = SubscriptionRequest::new(query, variables.unwrap_or(serde_json::Value::Null));

        let mut ctx = OperationContext::new();
        run_non_terminating(&mut ctx, CONTROL_MESSAGES_KEY, control_messages_stage(request)).await?;
        let controlled = ctx
            .take::<ControlledRequest>(CONTROL_MESSAGES_KEY)
            .ok_or_else(|| LinkError::ProtocolError("controlMessages stage left no request".into()))?;

        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let query = controlled.request.query.clone();
        let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
        self.lifecycle.send(LinkCmd::Subscribe {
            key,
            request: controlled.request,
            delivery_tx,
        })?;

        Ok(Subscription::new(
            key,
            query,
            controlled.control_events,
            delivery_rx,
            self.lifecycle.sender(),
        ))
    }

    /// Observe connection state changes, starting with the current snapshot.
    pub fn connection_status(&self) -> ConnectionStatusStream {
        self.status.subscribe()
    }

    /// Current connection state.
    pub fn current_status(&self) -> ConnectionState {
        self.status.current()
    }

    /// Snapshot of every live subscription on the shared socket.
    pub async fn list_subscriptions(&self) -> Result<Vec<SubscriptionInfo>> {
        let (result_tx, result_rx) = oneshot::channel();
        self.lifecycle.send(LinkCmd::ListSubscriptions { result_tx })?;
        result_rx
            .await
            .map_err(|_| LinkError::Closed("Lifecycle task stopped".to_string()))
    }

    /// Snapshot of the shared socket.
    pub async fn socket_state(&self) -> Result<SocketState> {
        let (result_tx, result_rx) = oneshot::channel();
        self.lifecycle.send(LinkCmd::SocketState { result_tx })?;
        result_rx
            .await
            .map_err(|_| LinkError::Closed("Lifecycle task stopped".to_string()))
    }

    /// Reachability monitor feeding this client.
    pub fn reachability(&self) -> &ReachabilityMonitor {
        &self.reachability
    }

    /// Stop every subscription and close the socket.
    ///
    /// Idempotent. Open subscriptions complete; later `subscribe` calls fail
    /// with [`LinkError::Closed`].
    pub async fn disconnect(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self.lifecycle.send(LinkCmd::Disconnect { done_tx }).is_err() {
            log::debug!("[realtime-link] disconnect() on a stopped client");
            return Ok(());
        }
        let _ = done_rx.await;
        self.status.unsubscribe();
        Ok(())
    }
}

/// Builder for configuring [`RealtimeLinkClient`] instances.
pub struct RealtimeLinkClientBuilder {
    endpoint: Option<String>,
    headers: Vec<(String, String)>,
    auth: ResolvedAuth,
    timeouts: LinkTimeouts,
    connection_options: ConnectionOptions,
    event_handlers: EventHandlers,
    reachability: Option<Arc<dyn ReachabilityAdapter>>,
    connector: Option<Arc<dyn Connector>>,
    handshake_fetcher: Option<Arc<dyn HandshakeFetcher>>,
}

impl RealtimeLinkClientBuilder {
    fn new() -> Self {
        Self {
            endpoint: None,
            headers: Vec::new(),
            auth: ResolvedAuth::default(),
            timeouts: LinkTimeouts::default(),
            connection_options: ConnectionOptions::default(),
            event_handlers: EventHandlers::default(),
            reachability: None,
            connector: None,
            handshake_fetcher: None,
        }
    }

    /// Set the handshake endpoint (http or https).
    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Add a static header to every handshake request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set static credentials.
    pub fn auth(mut self, auth: AuthProvider) -> Self {
        self.auth = ResolvedAuth::Static(auth);
        self
    }

    /// Resolve credentials on every handshake.
    pub fn auth_provider(mut self, provider: ArcDynAuthProvider) -> Self {
        self.auth = ResolvedAuth::Dynamic(provider);
        self
    }

    /// Set the timeout configuration.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use realtime_link::{LinkTimeouts, RealtimeLinkClient};
    ///
    /// # async fn example() -> realtime_link::Result<()> {
    /// let client = RealtimeLinkClient::builder()
    ///     .endpoint("http://localhost:20002/graphql")
    ///     .timeouts(LinkTimeouts::fast())
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn timeouts(mut self, timeouts: LinkTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Set reconnect behavior.
    pub fn connection_options(mut self, options: ConnectionOptions) -> Self {
        self.connection_options = options;
        self
    }

    /// Register lifecycle callbacks.
    pub fn event_handlers(mut self, handlers: EventHandlers) -> Self {
        self.event_handlers = handlers;
        self
    }

    /// Use this network-info source instead of detecting one.
    pub fn reachability(mut self, adapter: Arc<dyn ReachabilityAdapter>) -> Self {
        self.reachability = Some(adapter);
        self
    }

    /// Replace the WebSocket connector (e.g. with a [`MemoryConnector`](crate::MemoryConnector)).
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Replace the HTTP handshake request.
    pub fn handshake_fetcher(mut self, fetcher: Arc<dyn HandshakeFetcher>) -> Self {
        self.handshake_fetcher = Some(fetcher);
        self
    }

    /// Build the client and start its lifecycle task.
    ///
    /// Must be called inside a tokio runtime.
    pub fn build(self) -> Result<RealtimeLinkClient> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            LinkError::ConfigurationError("RealtimeLinkClient must be built inside a tokio runtime".into())
        })?;

        let url = self
            .endpoint
            .ok_or_else(|| LinkError::ConfigurationError("endpoint is required".into()))?;
        let mut endpoint = EndpointConfig::new(url)?;
        for (name, value) in self.headers {
            endpoint = endpoint.with_header(name, value);
        }

        let adapter = match self.reachability {
            Some(adapter) => adapter,
            None => detect_adapter(endpoint.probe_target().as_deref())?,
        };
        let reachability = ReachabilityMonitor::new(Some(adapter))?;
        let status = ConnectionStatusMonitor::new(&reachability);

        let fetcher = self
            .handshake_fetcher
            .unwrap_or_else(|| Arc::new(HttpHandshakeFetcher::new()));
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(WebSocketConnector::new()));

        log::debug!("[realtime-link] Building client for {}", endpoint.url());
        let coordinator = HandshakeCoordinator::new(
            endpoint,
            self.auth,
            fetcher,
            self.timeouts.handshake_timeout,
        );

        let lifecycle = LifecycleHandle::spawn(
            LinkConfig {
                coordinator,
                connector,
                status: status.clone(),
                handlers: self.event_handlers,
                timeouts: self.timeouts,
                options: self.connection_options,
            },
            &reachability,
            &runtime,
        );

        Ok(RealtimeLinkClient {
            lifecycle: Arc::new(lifecycle),
            status,
            reachability,
            next_key: Arc::new(AtomicU64::new(1)),
        })
    }
}
