//! Side-channel context for multi-stage operations.
//!
//! A stage is a stream that must emit exactly one value and then complete.
//! [`run_non_terminating`] drives such a stage and folds its value into an
//! [`OperationContext`] under a name, so the surrounding operation keeps
//! going with the enriched context instead of being resolved by the stage.
//!
//! The client runs two stages per subscription: `controlMessages`, which
//! strips the control-events flag out of the variables, and `handshake`,
//! which carries [`HandshakeInfo`](crate::models::HandshakeInfo) from the
//! handshake coordinator to the socket that consumes it.

use crate::error::{LinkError, Result};
use crate::models::SubscriptionRequest;
use futures_util::{pin_mut, stream, Stream, StreamExt};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;

/// Context key for the handshake stage.
pub const HANDSHAKE_KEY: &str = "handshake";

/// Context key for the control-messages stage.
pub const CONTROL_MESSAGES_KEY: &str = "controlMessages";

/// Variables key that opts a subscription into control events.
pub const CONTROL_EVENTS_KEY: &str = "@@controlEvents";

/// Named, type-erased values shared between the stages of one operation.
#[derive(Default)]
pub struct OperationContext {
    values: HashMap<String, Box<dyn Any + Send>>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value, replacing any previous value under `key`.
    pub fn insert<T: Any + Send>(&mut self, key: impl Into<String>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Remove and return a value. A value of another type stays in place.
    pub fn take<T: Any>(&mut self, key: &str) -> Option<T> {
        let boxed = self.values.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.values.insert(key.to_string(), other);
                None
            },
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        f.debug_struct("OperationContext").field("keys", &keys).finish()
    }
}

/// Drive `stage` to completion and merge its single value into `ctx`.
///
/// Fails with `ProtocolError` if the stage completes empty or emits more
/// than once; a stage error is returned as is and leaves `ctx` untouched.
pub async fn run_non_terminating<T, S>(ctx: &mut OperationContext, key: &str, stage: S) -> Result<()>
where
    T: Any + Send,
    S: Stream<Item = Result<T>>,
{
    pin_mut!(stage);
    let value = match stage.next().await {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(e),
        None => {
            return Err(LinkError::ProtocolError(format!(
                "stage '{}' completed without a value",
                key
            )))
        },
    };
    if stage.next().await.is_some() {
        return Err(LinkError::ProtocolError(format!(
            "stage '{}' emitted more than one value",
            key
        )));
    }
    ctx.insert(key, value);
    Ok(())
}

/// Request after the control-messages stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlledRequest {
    /// The request with the control flag removed from its variables.
    pub request: SubscriptionRequest,
    /// Whether the caller asked for control events.
    pub control_events: bool,
}

/// Stage that strips [`CONTROL_EVENTS_KEY`] from the variables.
pub fn control_messages_stage(
    mut request: SubscriptionRequest,
) -> impl Stream<Item = Result<ControlledRequest>> {
    let control_events = match request.variables.as_object_mut() {
        Some(vars) => vars
            .remove(CONTROL_EVENTS_KEY)
            .map(|v| v.as_bool().unwrap_or(false))
            .unwrap_or(false),
        None => false,
    };
    stream::once(async move {
        Ok(ControlledRequest {
            request,
            control_events,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_typed_access() {
        let mut ctx = OperationContext::new();
        ctx.insert("n", 5u32);
        assert_eq!(ctx.get::<u32>("n"), Some(&5));
        assert_eq!(ctx.get::<String>("n"), None);
        assert_eq!(ctx.take::<String>("n"), None);
        assert!(ctx.contains("n"), "mismatched take leaves the value");
        assert_eq!(ctx.take::<u32>("n"), Some(5));
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_single_value_is_merged() {
        let mut ctx = OperationContext::new();
        run_non_terminating(&mut ctx, "k", stream::iter(vec![Ok("v".to_string())]))
            .await
            .unwrap();
        assert_eq!(ctx.get::<String>("k").map(String::as_str), Some("v"));
    }

    #[tokio::test]
    async fn test_empty_or_repeated_stage_is_rejected() {
        let mut ctx = OperationContext::new();
        let empty = stream::iter(Vec::<Result<u8>>::new());
        assert!(matches!(
            run_non_terminating(&mut ctx, "k", empty).await,
            Err(LinkError::ProtocolError(_))
        ));

        let twice = stream::iter(vec![Ok(1u8), Ok(2u8)]);
        assert!(matches!(
            run_non_terminating(&mut ctx, "k", twice).await,
            Err(LinkError::ProtocolError(_))
        ));
        assert!(ctx.is_empty(), "nothing merged on failure");
    }

    #[tokio::test]
    async fn test_stage_error_passes_through() {
        let mut ctx = OperationContext::new();
        let failing = stream::iter(vec![Err::<u8, _>(LinkError::HandshakeFailed("403".into()))]);
        let err = run_non_terminating(&mut ctx, "k", failing).await.unwrap_err();
        assert!(matches!(err, LinkError::HandshakeFailed(_)));
    }

    #[tokio::test]
    async fn test_control_messages_stage_strips_flag() {
        let request = SubscriptionRequest::new(
            "subscription { s }",
            json!({"room": "a", "@@controlEvents": true}),
        );
        let mut ctx = OperationContext::new();
        run_non_terminating(&mut ctx, CONTROL_MESSAGES_KEY, control_messages_stage(request))
            .await
            .unwrap();

        let controlled = ctx.take::<ControlledRequest>(CONTROL_MESSAGES_KEY).unwrap();
        assert!(controlled.control_events);
        assert_eq!(controlled.request.variables, json!({"room": "a"}));

        let plain = SubscriptionRequest::new("subscription { s }", serde_json::Value::Null);
        run_non_terminating(&mut ctx, CONTROL_MESSAGES_KEY, control_messages_stage(plain))
            .await
            .unwrap();
        assert!(!ctx.take::<ControlledRequest>(CONTROL_MESSAGES_KEY).unwrap().control_events);
    }
}
