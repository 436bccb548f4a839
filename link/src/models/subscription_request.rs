use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{LinkError, Result};

/// A subscription query and its variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// GraphQL subscription document, passed through untouched.
    pub query: String,
    /// Variables for the document.
    #[serde(default)]
    pub variables: serde_json::Value,
}

impl SubscriptionRequest {
    pub fn new(query: impl Into<String>, variables: serde_json::Value) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }
}

/// Payload of a `start` message.
///
/// `data` holds the request serialized as a JSON string, which is what
/// the server expects; `extensions.authorization` repeats the handshake
/// headers so the server can authorize each subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartPayload {
    pub data: String,
    #[serde(default)]
    pub extensions: StartExtensions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartExtensions {
    #[serde(default)]
    pub authorization: BTreeMap<String, String>,
}

impl StartPayload {
    /// Encode a request together with its authorization headers.
    pub fn new(request: &SubscriptionRequest, authorization: BTreeMap<String, String>) -> Self {
        let data = serde_json::json!({
            "query": request.query,
            "variables": request.variables,
        });
        Self {
            data: data.to_string(),
            extensions: StartExtensions { authorization },
        }
    }

    /// Decode the request carried in `data`.
    pub fn request(&self) -> Result<SubscriptionRequest> {
        serde_json::from_str(&self.data).map_err(|e| {
            LinkError::SerializationError(format!("invalid start payload data: {}", e))
        })
    }
}
