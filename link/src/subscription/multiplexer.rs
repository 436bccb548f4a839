//! Subscription table for the shared socket.
//!
//! Every logical subscription has a local key that never changes and a
//! wire id (`"{incarnation}-{seq}"`) that is assigned when its `start` is
//! sent on the current socket. A reconnect clears all wire ids, so frames
//! still addressed to the previous socket find no entry and are dropped.
//!
//! Only the lifecycle task owns a multiplexer; nothing here is shared.

use crate::connection::now_ms;
use crate::error::LinkError;
use crate::models::{
    ClientMessage, ServerMessage, StartPayload, SubscriptionEvent, SubscriptionInfo,
    SubscriptionPhase, SubscriptionRequest,
};
use crate::timeouts::LinkTimeouts;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// What the lifecycle task pushes to a subscription handle.
#[derive(Debug)]
pub(crate) enum Delivery {
    Event(SubscriptionEvent),
    /// The server acknowledged the current `start`.
    Acked,
    /// The socket was lost; the `start` will be re-issued.
    Reissuing,
    /// Terminal failure; the entry is already gone.
    Failed(LinkError),
}

struct SubEntry {
    request: SubscriptionRequest,
    delivery_tx: mpsc::UnboundedSender<Delivery>,
    wire_id: Option<String>,
    phase: SubscriptionPhase,
    ack_deadline: Option<Instant>,
    created_at_ms: u64,
    last_event_time_ms: Option<u64>,
}

/// Result of routing one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Routed {
    Delivered,
    /// The message ended its subscription.
    Removed,
    /// No live subscription matched.
    Dropped,
}

pub(crate) struct SubscriptionMultiplexer {
    subs: BTreeMap<u64, SubEntry>,
    by_wire_id: HashMap<String, u64>,
    incarnation: u64,
    next_seq: u64,
    subscribe_timeout: Duration,
}

impl SubscriptionMultiplexer {
    pub fn new(subscribe_timeout: Duration) -> Self {
        Self {
            subs: BTreeMap::new(),
            by_wire_id: HashMap::new(),
            incarnation: 0,
            next_seq: 1,
            subscribe_timeout,
        }
    }

    pub fn insert(
        &mut self,
        key: u64,
        request: SubscriptionRequest,
        delivery_tx: mpsc::UnboundedSender<Delivery>,
    ) {
        self.subs.insert(
            key,
            SubEntry {
                request,
                delivery_tx,
                wire_id: None,
                phase: SubscriptionPhase::Pending,
                ack_deadline: None,
                created_at_ms: now_ms(),
                last_event_time_ms: None,
            },
        );
    }

    /// Drop a subscription's bookkeeping.
    ///
    /// Returns `None` for an unknown key, otherwise the wire id to stop
    /// (if a `start` went out on the current socket).
    pub fn remove(&mut self, key: u64) -> Option<Option<String>> {
        let entry = self.subs.remove(&key)?;
        if let Some(id) = &entry.wire_id {
            self.by_wire_id.remove(id);
        }
        Some(entry.wire_id)
    }

    pub fn is_empty(&self) -> bool {
        self.subs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.subs.len()
    }

    /// Scope subsequent wire ids to a new socket.
    pub fn set_incarnation(&mut self, incarnation: u64) {
        self.incarnation = incarnation;
        self.next_seq = 1;
    }

    /// Forget every wire id after the socket was lost. All subscriptions
    /// go back to `Pending` and will be re-issued on the next socket.
    pub fn reset_wire_ids(&mut self) {
        self.by_wire_id.clear();
        for entry in self.subs.values_mut() {
            if entry.phase == SubscriptionPhase::Active {
                let _ = entry.delivery_tx.send(Delivery::Reissuing);
            }
            entry.wire_id = None;
            entry.phase = SubscriptionPhase::Pending;
            entry.ack_deadline = None;
        }
    }

    /// Assign wire ids to every subscription not yet started on this
    /// socket and build their `start` messages, in key order.
    pub fn prepare_starts(
        &mut self,
        now: Instant,
        authorization: &BTreeMap<String, String>,
    ) -> Vec<ClientMessage> {
        let ack_deadline = if LinkTimeouts::is_no_timeout(self.subscribe_timeout) {
            None
        } else {
            Some(now + self.subscribe_timeout)
        };

        let mut messages = Vec::new();
        for (key, entry) in self.subs.iter_mut() {
            if entry.wire_id.is_some() {
                continue;
            }
            let id = format!("{}-{}", self.incarnation, self.next_seq);
            self.next_seq += 1;
            self.by_wire_id.insert(id.clone(), *key);
            entry.wire_id = Some(id.clone());
            entry.ack_deadline = ack_deadline;
            let payload = StartPayload::new(&entry.request, authorization.clone());
            messages.push(ClientMessage::Start { id, payload });
        }
        messages
    }

    /// Route a subscription-scoped message to its observer.
    pub fn route(&mut self, message: ServerMessage) -> Routed {
        let Some(key) = message.id().and_then(|id| self.by_wire_id.get(id)).copied() else {
            log::debug!("[realtime-link] Dropping message for unknown id: {:?}", message.id());
            return Routed::Dropped;
        };

        match message {
            ServerMessage::StartAck { id } => {
                if let Some(entry) = self.subs.get_mut(&key) {
                    log::debug!("[realtime-link] Subscription {} active as {}", key, id);
                    entry.phase = SubscriptionPhase::Active;
                    entry.ack_deadline = None;
                    let _ = entry.delivery_tx.send(Delivery::Acked);
                }
                Routed::Delivered
            },
            ServerMessage::Data { payload, .. } => {
                if let Some(entry) = self.subs.get_mut(&key) {
                    entry.last_event_time_ms = Some(now_ms());
                    let _ = entry.delivery_tx.send(Delivery::Event(SubscriptionEvent::Data(payload)));
                }
                Routed::Delivered
            },
            ServerMessage::Error { id, payload } => {
                let id = id.unwrap_or_default();
                log::warn!("[realtime-link] Subscription {} failed: {}", id, payload);
                if let Some(entry) = self.take(key) {
                    let _ = entry
                        .delivery_tx
                        .send(Delivery::Failed(LinkError::SubscriptionError { id, payload }));
                }
                Routed::Removed
            },
            ServerMessage::Complete { id } => {
                log::debug!("[realtime-link] Subscription {} completed by server", id);
                // Dropping the sender ends the observer's stream.
                self.take(key);
                Routed::Removed
            },
            other => {
                log::debug!("[realtime-link] Not a subscription message: {:?}", other);
                Routed::Dropped
            },
        }
    }

    /// Fail every subscription whose `start_ack` is overdue and return the
    /// wire ids to stop.
    pub fn expire_acks(&mut self, now: Instant) -> Vec<String> {
        let overdue: Vec<u64> = self
            .subs
            .iter()
            .filter(|(_, e)| e.ack_deadline.map_or(false, |d| d <= now))
            .map(|(k, _)| *k)
            .collect();

        let mut stops = Vec::new();
        for key in overdue {
            if let Some(entry) = self.take(key) {
                log::warn!(
                    "[realtime-link] No start_ack for {:?} within {:?}",
                    entry.wire_id,
                    self.subscribe_timeout
                );
                let _ = entry
                    .delivery_tx
                    .send(Delivery::Failed(LinkError::SubscribeTimeout(self.subscribe_timeout)));
                stops.extend(entry.wire_id);
            }
        }
        stops
    }

    pub fn next_ack_deadline(&self) -> Option<Instant> {
        self.subs.values().filter_map(|e| e.ack_deadline).min()
    }

    /// Terminate every subscription with a copy of `err`.
    pub fn fail_all(&mut self, err: &LinkError) {
        self.by_wire_id.clear();
        for (_, entry) in std::mem::take(&mut self.subs) {
            let _ = entry.delivery_tx.send(Delivery::Failed(err.duplicate()));
        }
    }

    /// Complete every subscription and return the wire ids to stop.
    pub fn close_all(&mut self) -> Vec<String> {
        self.by_wire_id.clear();
        std::mem::take(&mut self.subs)
            .into_values()
            .filter_map(|entry| entry.wire_id)
            .collect()
    }

    pub fn snapshot(&self) -> Vec<SubscriptionInfo> {
        self.subs
            .iter()
            .map(|(key, entry)| SubscriptionInfo {
                key: *key,
                id: entry.wire_id.clone(),
                query: entry.request.query.clone(),
                phase: entry.phase,
                created_at_ms: entry.created_at_ms,
                last_event_time_ms: entry.last_event_time_ms,
            })
            .collect()
    }

    fn take(&mut self, key: u64) -> Option<SubEntry> {
        let entry = self.subs.remove(&key)?;
        if let Some(id) = &entry.wire_id {
            self.by_wire_id.remove(id);
        }
        Some(entry)
    }
}
