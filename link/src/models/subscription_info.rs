//! Subscription metadata exposed to callers.

use serde::{Deserialize, Serialize};

/// Phase of one logical subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionPhase {
    /// Waiting for an open socket or for `start_ack`.
    Pending,
    /// Acknowledged; data flows.
    Active,
    Completed,
    Errored,
}

impl SubscriptionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Errored)
    }
}

/// Read-only snapshot of a live subscription's bookkeeping.
///
/// Returned by [`RealtimeLinkClient::list_subscriptions`](crate::RealtimeLinkClient::list_subscriptions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionInfo {
    /// Local key; stable across reconnects.
    pub key: u64,
    /// Wire id on the current socket, or `None` if no `start` has been
    /// sent on it yet.
    pub id: Option<String>,
    pub query: String,
    pub phase: SubscriptionPhase,
    /// Millis since Unix epoch.
    pub created_at_ms: u64,
    /// Millis since Unix epoch of the last delivered `data`, if any.
    pub last_event_time_ms: Option<u64>,
}
