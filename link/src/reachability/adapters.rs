//! Bundled reachability adapters.
//!
//! - [`ManualReachability`]: the host application pushes network changes
//!   (for example from an OS network-info callback).
//! - [`ProbeReachability`]: periodically opens a TCP connection to a known
//!   host and reports whether it succeeded.
//!
//! [`detect_adapter`] picks one for the current environment at startup.

use super::{ListenerGuard, ReachabilityAdapter, ReachabilityListener};
use crate::error::{LinkError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;

/// Default spacing between TCP probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(5);

/// Default bound on a single TCP probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Default)]
struct ManualState {
    next_id: u64,
    listeners: HashMap<u64, ReachabilityListener>,
    current: Option<bool>,
}

/// Externally driven network-info source.
///
/// Clones share state, so one clone can be handed to the client while
/// another is kept by the code that observes the platform.
///
/// ```rust
/// use realtime_link::ManualReachability;
///
/// let network = ManualReachability::new();
/// network.set_online(false);
/// assert_eq!(network.current(), Some(false));
/// ```
#[derive(Clone, Default)]
pub struct ManualReachability {
    state: Arc<Mutex<ManualState>>,
}

impl ManualReachability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a known value, replayed to every listener on attach.
    pub fn with_initial(online: bool) -> Self {
        let adapter = Self::new();
        adapter.state.lock().unwrap_or_else(|e| e.into_inner()).current = Some(online);
        adapter
    }

    pub fn set_online(&self, online: bool) {
        self.report(Some(online));
    }

    /// Forward a raw platform value. `None` is passed through so the
    /// monitor can ignore it.
    pub fn report(&self, value: Option<bool>) {
        let listeners: Vec<ReachabilityListener> = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if value.is_some() {
                state.current = value;
            }
            state.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(value);
        }
    }

    pub fn current(&self) -> Option<bool> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).current
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).listeners.len()
    }
}

impl ReachabilityAdapter for ManualReachability {
    fn attach(&self, listener: ReachabilityListener) -> ListenerGuard {
        let (id, current) = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let id = state.next_id;
            state.next_id += 1;
            state.listeners.insert(id, listener.clone());
            (id, state.current)
        };
        if current.is_some() {
            listener(current);
        }
        let state = self.state.clone();
        ListenerGuard::new(move || {
            state.lock().unwrap_or_else(|e| e.into_inner()).listeners.remove(&id);
        })
    }
}

/// Native adapter that infers reachability from TCP connects.
///
/// Reports only transitions; the first probe always reports.
#[derive(Debug, Clone)]
pub struct ProbeReachability {
    target: String,
    interval: Duration,
    connect_timeout: Duration,
}

impl ProbeReachability {
    /// Probe `target` (`host:port`).
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            interval: DEFAULT_PROBE_INTERVAL,
            connect_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl ReachabilityAdapter for ProbeReachability {
    fn attach(&self, listener: ReachabilityListener) -> ListenerGuard {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                log::warn!("[realtime-link] Probe reachability attached outside a tokio runtime");
                return ListenerGuard::noop();
            },
        };
        let probe = self.clone();
        let task = handle.spawn(async move {
            let mut last: Option<bool> = None;
            loop {
                let online = matches!(
                    tokio::time::timeout(probe.connect_timeout, TcpStream::connect(&probe.target))
                        .await,
                    Ok(Ok(_))
                );
                if last != Some(online) {
                    log::debug!("[realtime-link] Probe {} reachable={}", probe.target, online);
                    last = Some(online);
                    listener(Some(online));
                }
                tokio::time::sleep(probe.interval).await;
            }
        });
        ListenerGuard::new(move || task.abort())
    }
}

/// Pick a reachability adapter for the current environment.
///
/// A TCP probe is used when running inside a tokio runtime and a probe
/// target is known. Anything else is a configuration error: pass a
/// [`ManualReachability`] explicitly in that case.
pub fn detect_adapter(probe_target: Option<&str>) -> Result<Arc<dyn ReachabilityAdapter>> {
    if tokio::runtime::Handle::try_current().is_err() {
        return Err(LinkError::ConfigurationError(
            "reachability detection requires a tokio runtime".into(),
        ));
    }
    match probe_target {
        Some(target) if !target.trim().is_empty() => {
            log::debug!("[realtime-link] Using TCP probe reachability against {}", target);
            Ok(Arc::new(ProbeReachability::new(target)))
        },
        _ => Err(LinkError::ConfigurationError(
            "no reachability source: configure an adapter or an endpoint to probe".into(),
        )),
    }
}
