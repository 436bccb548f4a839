use serde::{Deserialize, Serialize};

/// Out-of-band notice delivered to subscriptions that requested
/// control events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlMessage {
    /// The server acknowledged the subscription on the current socket.
    Connected,
}

/// Item yielded by [`Subscription::next`](crate::Subscription::next).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SubscriptionEvent {
    /// A `data` payload, in the order the server sent it.
    Data(serde_json::Value),
    Control(ControlMessage),
}

impl SubscriptionEvent {
    /// The data payload, or `None` for control events.
    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Control(_) => None,
        }
    }

    pub fn into_data(self) -> Option<serde_json::Value> {
        match self {
            Self::Data(v) => Some(v),
            Self::Control(_) => None,
        }
    }
}
