//! Caller-facing subscription handle.
//!
//! A [`Subscription`] is a cancellable push sequence: [`next`](Subscription::next)
//! yields data (and, when requested, control events) in the order the
//! server sent them, then `Some(Err(_))` once on a terminal error, or
//! `None` when the subscription completes. After
//! [`close`](Subscription::close) nothing more is yielded.

pub(crate) mod multiplexer;

use crate::connection::LinkCmd;
use crate::error::Result;
use crate::models::{ControlMessage, SubscriptionEvent, SubscriptionPhase};
use futures_util::Stream;
use multiplexer::Delivery;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// One logical subscription on the shared socket.
///
/// Dropping the handle unsubscribes (a `stop` is sent best-effort).
pub struct Subscription {
    key: u64,
    query: String,
    control_events: bool,
    delivery_rx: mpsc::UnboundedReceiver<Delivery>,
    cmd_tx: Option<mpsc::UnboundedSender<LinkCmd>>,
    phase: SubscriptionPhase,
    closed: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("query", &self.query)
            .field("phase", &self.phase)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Subscription {
    pub(crate) fn new(
        key: u64,
        query: String,
        control_events: bool,
        delivery_rx: mpsc::UnboundedReceiver<Delivery>,
        cmd_tx: mpsc::UnboundedSender<LinkCmd>,
    ) -> Self {
        Self {
            key,
            query,
            control_events,
            delivery_rx,
            cmd_tx: Some(cmd_tx),
            phase: SubscriptionPhase::Pending,
            closed: false,
        }
    }

    /// Receive the next event.
    ///
    /// Returns `None` when the subscription completed or was closed.
    pub async fn next(&mut self) -> Option<Result<SubscriptionEvent>> {
        std::future::poll_fn(|cx| self.poll_event(cx)).await
    }

    fn poll_event(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<SubscriptionEvent>>> {
        loop {
            if self.closed {
                return Poll::Ready(None);
            }
            match self.delivery_rx.poll_recv(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Delivery::Acked)) => {
                    self.phase = SubscriptionPhase::Active;
                    if self.control_events {
                        return Poll::Ready(Some(Ok(SubscriptionEvent::Control(
                            ControlMessage::Connected,
                        ))));
                    }
                },
                Poll::Ready(Some(Delivery::Reissuing)) => self.phase = SubscriptionPhase::Pending,
                Poll::Ready(Some(Delivery::Event(event))) => return Poll::Ready(Some(Ok(event))),
                Poll::Ready(Some(Delivery::Failed(err))) => {
                    self.phase = SubscriptionPhase::Errored;
                    self.finish();
                    return Poll::Ready(Some(Err(err)));
                },
                Poll::Ready(None) => {
                    self.phase = SubscriptionPhase::Completed;
                    self.finish();
                    return Poll::Ready(None);
                },
            }
        }
    }

    /// The lifecycle task already dropped this entry; no stop needed.
    fn finish(&mut self) {
        self.closed = true;
        self.cmd_tx = None;
    }

    /// Local key, stable across reconnects.
    pub fn key(&self) -> u64 {
        self.key
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Phase as observed by this handle. Goes back to `Pending` while the
    /// subscription is re-issued after a reconnect.
    pub fn phase(&self) -> SubscriptionPhase {
        self.phase
    }

    /// Unsubscribe. Calling it again is a no-op.
    ///
    /// Local bookkeeping is removed at once and a `stop` is sent without
    /// waiting for any acknowledgment.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(LinkCmd::Unsubscribe { key: self.key });
        }
        self.delivery_rx.close();
        if self.phase == SubscriptionPhase::Pending || self.phase == SubscriptionPhase::Active {
            self.phase = SubscriptionPhase::Completed;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Stream for Subscription {
    type Item = Result<SubscriptionEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.poll_event(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(LinkCmd::Unsubscribe { key: self.key });
        }
    }
}
