//! Canonical online/offline signal.
//!
//! [`ReachabilityMonitor`] fans one platform network listener out to any
//! number of subscribers. The listener is attached when the first
//! subscriber arrives and detached when the last one leaves. The platform
//! signal itself sits behind the [`ReachabilityAdapter`] capability trait;
//! see [`adapters`] for the bundled implementations.
//!
//! Unknown platform states (`None`) are ignored: subscribers only ever see
//! a definite `online` value.

pub mod adapters;

pub use adapters::{detect_adapter, ManualReachability, ProbeReachability};

use crate::error::{LinkError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

/// Listener handed to an adapter. `None` means the platform does not
/// know whether the network is reachable.
pub type ReachabilityListener = Arc<dyn Fn(Option<bool>) + Send + Sync>;

/// Subscriber callback registered on a [`ReachabilityMonitor`].
pub type ReachabilityCallback = Arc<dyn Fn(NetworkStatus) + Send + Sync>;

/// A definite reachability value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatus {
    pub online: bool,
}

/// Platform network-change source.
pub trait ReachabilityAdapter: Send + Sync + 'static {
    /// Start delivering network changes to `listener` until the returned
    /// guard is dropped.
    fn attach(&self, listener: ReachabilityListener) -> ListenerGuard;
}

/// Detaches an adapter listener when dropped.
pub struct ListenerGuard {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl ListenerGuard {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A guard with nothing to detach.
    pub fn noop() -> Self {
        Self { detach: None }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for ListenerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerGuard").field("attached", &self.detach.is_some()).finish()
    }
}

struct MonitorState {
    next_id: u64,
    subscribers: BTreeMap<u64, ReachabilityCallback>,
    guard: Option<ListenerGuard>,
    attaching: bool,
    last: Option<bool>,
}

struct MonitorInner {
    adapter: Arc<dyn ReachabilityAdapter>,
    state: Mutex<MonitorState>,
}

/// Ref-counted multiplexer over a single [`ReachabilityAdapter`] listener.
#[derive(Clone)]
pub struct ReachabilityMonitor {
    inner: Arc<MonitorInner>,
}

impl fmt::Debug for ReachabilityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachabilityMonitor")
            .field("subscribers", &self.subscriber_count())
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl ReachabilityMonitor {
    /// Wrap a platform adapter. Fails fast when none is available.
    pub fn new(adapter: Option<Arc<dyn ReachabilityAdapter>>) -> Result<Self> {
        let adapter = adapter.ok_or_else(|| {
            LinkError::ConfigurationError(
                "no reachability adapter is available for this environment".into(),
            )
        })?;
        Ok(Self {
            inner: Arc::new(MonitorInner {
                adapter,
                state: Mutex::new(MonitorState {
                    next_id: 0,
                    subscribers: BTreeMap::new(),
                    guard: None,
                    attaching: false,
                    last: None,
                }),
            }),
        })
    }

    /// Register a callback. It immediately receives the last known value,
    /// if any, then every subsequent change.
    pub fn subscribe(
        &self,
        callback: impl Fn(NetworkStatus) + Send + Sync + 'static,
    ) -> ReachabilitySubscription {
        let callback: ReachabilityCallback = Arc::new(callback);
        let (id, needs_attach, last) = {
            let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
            let id = state.next_id;
            state.next_id += 1;
            state.subscribers.insert(id, callback.clone());
            let needs_attach = state.guard.is_none() && !state.attaching;
            if needs_attach {
                state.attaching = true;
            }
            (id, needs_attach, state.last)
        };

        if let Some(online) = last {
            callback(NetworkStatus { online });
        }

        if needs_attach {
            log::debug!("[realtime-link] Attaching reachability listener");
            let weak = Arc::downgrade(&self.inner);
            let listener: ReachabilityListener = Arc::new(move |value| {
                if let Some(inner) = weak.upgrade() {
                    MonitorInner::dispatch(&inner, value);
                }
            });
            // Adapters may report synchronously from attach, so no lock is held here.
            let guard = self.inner.adapter.attach(listener);
            let orphaned = {
                let mut state = self.inner.state.lock().unwrap_or_else(|e| e.into_inner());
                state.attaching = false;
                if state.subscribers.is_empty() {
                    Some(guard)
                } else {
                    state.guard = Some(guard);
                    None
                }
            };
            drop(orphaned);
        }

        ReachabilitySubscription {
            monitor: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).subscribers.len()
    }

    /// Whether the platform listener is currently attached.
    pub fn is_attached(&self) -> bool {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner()).guard.is_some()
    }

    /// Last definite value reported by the platform.
    pub fn last_known(&self) -> Option<NetworkStatus> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last
            .map(|online| NetworkStatus { online })
    }
}

impl MonitorInner {
    fn dispatch(inner: &Arc<Self>, value: Option<bool>) {
        let Some(online) = value else {
            log::debug!("[realtime-link] Ignoring unknown reachability state");
            return;
        };
        let callbacks: Vec<ReachabilityCallback> = {
            let mut state = inner.state.lock().unwrap_or_else(|e| e.into_inner());
            state.last = Some(online);
            state.subscribers.values().cloned().collect()
        };
        log::debug!(
            "[realtime-link] Reachability changed: online={} ({} subscribers)",
            online,
            callbacks.len()
        );
        for cb in callbacks {
            cb(NetworkStatus { online });
        }
    }

    fn remove(&self, id: u64) {
        let guard = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.subscribers.remove(&id);
            if state.subscribers.is_empty() {
                state.guard.take()
            } else {
                None
            }
        };
        if guard.is_some() {
            log::debug!("[realtime-link] Detaching reachability listener");
        }
        drop(guard);
    }
}

/// Handle returned by [`ReachabilityMonitor::subscribe`].
///
/// Unsubscribes on drop; [`unsubscribe`](Self::unsubscribe) is idempotent.
pub struct ReachabilitySubscription {
    monitor: Weak<MonitorInner>,
    id: Option<u64>,
}

impl ReachabilitySubscription {
    pub fn unsubscribe(&mut self) {
        if let Some(id) = self.id.take() {
            if let Some(inner) = self.monitor.upgrade() {
                inner.remove(id);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.id.is_some()
    }
}

impl Drop for ReachabilitySubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for ReachabilitySubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReachabilitySubscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAdapter {
        attached: Arc<AtomicUsize>,
        detached: Arc<AtomicUsize>,
        listener: Arc<Mutex<Option<ReachabilityListener>>>,
    }

    impl ReachabilityAdapter for CountingAdapter {
        fn attach(&self, listener: ReachabilityListener) -> ListenerGuard {
            self.attached.fetch_add(1, Ordering::SeqCst);
            *self.listener.lock().unwrap() = Some(listener);
            let detached = self.detached.clone();
            let slot = self.listener.clone();
            ListenerGuard::new(move || {
                detached.fetch_add(1, Ordering::SeqCst);
                *slot.lock().unwrap() = None;
            })
        }
    }

    fn counting() -> (Arc<CountingAdapter>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let attached = Arc::new(AtomicUsize::new(0));
        let detached = Arc::new(AtomicUsize::new(0));
        let adapter = Arc::new(CountingAdapter {
            attached: attached.clone(),
            detached: detached.clone(),
            listener: Arc::new(Mutex::new(None)),
        });
        (adapter, attached, detached)
    }

    fn emit(adapter: &CountingAdapter, value: Option<bool>) {
        let listener = adapter.listener.lock().unwrap().clone();
        if let Some(l) = listener {
            l(value);
        }
    }

    fn monitor_for(adapter: &Arc<CountingAdapter>) -> ReachabilityMonitor {
        let adapter: Arc<dyn ReachabilityAdapter> = adapter.clone();
        ReachabilityMonitor::new(Some(adapter)).unwrap()
    }

    #[test]
    fn test_missing_adapter_fails_fast() {
        let err = ReachabilityMonitor::new(None).unwrap_err();
        assert!(matches!(err, LinkError::ConfigurationError(_)));
    }

    #[test]
    fn test_single_listener_for_many_subscribers() {
        let (adapter, attached, detached) = counting();
        let monitor = monitor_for(&adapter);

        let mut a = monitor.subscribe(|_| {});
        let b = monitor.subscribe(|_| {});
        let c = monitor.subscribe(|_| {});
        assert_eq!(attached.load(Ordering::SeqCst), 1, "one platform listener");
        assert_eq!(monitor.subscriber_count(), 3);

        a.unsubscribe();
        a.unsubscribe();
        drop(b);
        assert_eq!(detached.load(Ordering::SeqCst), 0, "still one subscriber left");
        drop(c);
        assert_eq!(detached.load(Ordering::SeqCst), 1, "detached with the last subscriber");
        assert!(!monitor.is_attached());

        let _d = monitor.subscribe(|_| {});
        assert_eq!(attached.load(Ordering::SeqCst), 2, "re-attached on demand");
    }

    #[test]
    fn test_unknown_states_are_ignored() {
        let (adapter, _, _) = counting();
        let monitor = monitor_for(&adapter);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _sub = monitor.subscribe(move |status| s.lock().unwrap().push(status.online));

        emit(&adapter, None);
        emit(&adapter, Some(false));
        emit(&adapter, None);
        emit(&adapter, Some(true));

        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
        assert_eq!(monitor.last_known(), Some(NetworkStatus { online: true }));
    }

    #[test]
    fn test_late_subscriber_receives_last_known_value() {
        let (adapter, _, _) = counting();
        let monitor = monitor_for(&adapter);
        let _first = monitor.subscribe(|_| {});
        emit(&adapter, Some(false));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let _late = monitor.subscribe(move |status| s.lock().unwrap().push(status.online));
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }
}
