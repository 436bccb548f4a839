//! Timeout configuration for the subscription transport.
//!
//! Every protocol wait is bounded. The defaults are explicit and documented
//! here rather than inferred from any server:
//!
//! | Timeout                  | Default | Bounds                                         |
//! |--------------------------|---------|------------------------------------------------|
//! | `handshake_timeout`      | 15 s    | handshake request + opening the transport      |
//! | `connection_ack_timeout` | 10 s    | `connection_init` → `connection_ack`           |
//! | `subscribe_timeout`      | 10 s    | `start` → `start_ack` (per subscription)       |
//! | `keepalive_fallback`     | 300 s   | liveness window when the ack advertises none   |
//! | `offline_grace_period`   | 120 s   | offline with subscriptions awaiting reconnect  |

use std::time::Duration;

/// Timeout configuration for realtime-link.
///
/// # Examples
///
/// ```rust
/// use realtime_link::LinkTimeouts;
/// use std::time::Duration;
///
/// // Use defaults (recommended for most cases)
/// let timeouts = LinkTimeouts::default();
///
/// // Custom timeouts for high-latency environments
/// let timeouts = LinkTimeouts::builder()
///     .handshake_timeout(Duration::from_secs(30))
///     .subscribe_timeout(Duration::from_secs(20))
///     .build();
///
/// // Aggressive timeouts for local development
/// let timeouts = LinkTimeouts::fast();
/// ```
#[derive(Debug, Clone)]
pub struct LinkTimeouts {
    /// Window for obtaining handshake info and opening the socket with it.
    /// The authorization is only valid for this long.
    /// Default: 15 seconds
    pub handshake_timeout: Duration,

    /// Maximum wait for `connection_ack` after sending `connection_init`.
    /// Default: 10 seconds
    pub connection_ack_timeout: Duration,

    /// Maximum wait for `start_ack` after a `start` message was sent.
    /// Default: 10 seconds
    pub subscribe_timeout: Duration,

    /// Liveness window used when `connection_ack` carries no
    /// `connectionTimeoutMs`.
    /// Default: 300 seconds
    pub keepalive_fallback: Duration,

    /// How long subscriptions may wait for the network to come back while a
    /// reconnect is suspended. Set to 0 to wait indefinitely.
    /// Default: 120 seconds
    pub offline_grace_period: Duration,
}

impl Default for LinkTimeouts {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            connection_ack_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(10),
            keepalive_fallback: Duration::from_secs(300),
            offline_grace_period: Duration::from_secs(120),
        }
    }
}

impl LinkTimeouts {
    /// Create a new builder for custom timeout configuration.
    pub fn builder() -> LinkTimeoutsBuilder {
        LinkTimeoutsBuilder::new()
    }

    /// Short timeouts for local development against a nearby server.
    pub fn fast() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(5),
            connection_ack_timeout: Duration::from_secs(3),
            subscribe_timeout: Duration::from_secs(3),
            keepalive_fallback: Duration::from_secs(60),
            offline_grace_period: Duration::from_secs(30),
        }
    }

    /// Long timeouts for high-latency or unreliable networks.
    pub fn relaxed() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            connection_ack_timeout: Duration::from_secs(30),
            subscribe_timeout: Duration::from_secs(30),
            keepalive_fallback: Duration::from_secs(600),
            offline_grace_period: Duration::from_secs(600),
        }
    }

    /// Check if a duration represents "no timeout" (zero or very large).
    pub fn is_no_timeout(duration: Duration) -> bool {
        duration.is_zero() || duration > Duration::from_secs(86400 * 365) // > 1 year
    }
}

/// Builder for creating custom [`LinkTimeouts`] configurations.
#[derive(Debug, Clone)]
pub struct LinkTimeoutsBuilder {
    timeouts: LinkTimeouts,
}

impl LinkTimeoutsBuilder {
    fn new() -> Self {
        Self {
            timeouts: LinkTimeouts::default(),
        }
    }

    /// Set the handshake window.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.handshake_timeout = timeout;
        self
    }

    /// Set the handshake window in seconds.
    pub fn handshake_timeout_secs(self, secs: u64) -> Self {
        self.handshake_timeout(Duration::from_secs(secs))
    }

    /// Set the `connection_ack` wait.
    pub fn connection_ack_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.connection_ack_timeout = timeout;
        self
    }

    /// Set the `connection_ack` wait in seconds.
    pub fn connection_ack_timeout_secs(self, secs: u64) -> Self {
        self.connection_ack_timeout(Duration::from_secs(secs))
    }

    /// Set the `start_ack` wait.
    pub fn subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.timeouts.subscribe_timeout = timeout;
        self
    }

    /// Set the `start_ack` wait in seconds.
    pub fn subscribe_timeout_secs(self, secs: u64) -> Self {
        self.subscribe_timeout(Duration::from_secs(secs))
    }

    /// Set the fallback liveness window.
    pub fn keepalive_fallback(mut self, interval: Duration) -> Self {
        self.timeouts.keepalive_fallback = interval;
        self
    }

    /// Set the offline grace period. Set to 0 to wait indefinitely.
    pub fn offline_grace_period(mut self, period: Duration) -> Self {
        self.timeouts.offline_grace_period = period;
        self
    }

    /// Build the timeout configuration.
    pub fn build(self) -> LinkTimeouts {
        self.timeouts
    }
}
