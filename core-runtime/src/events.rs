//! # Event Bus
//!
//! Broadcasts what the session core did (sign-ins, account changes, token
//! grants, API calls) to anyone interested: diagnostics, telemetry hooks or
//! host UI that wants more than the controller pushes.
//!
//! ```text
//! IdentityClient ──┐
//!                  ├── emit ──> EventBus (tokio broadcast) ──> subscribers
//! GraphClient ─────┘
//! ```
//!
//! Publishing never fails: with nobody subscribed the event is dropped.
//! Subscribers that fall more than the buffer size behind receive
//! `RecvError::Lagged` and continue from the oldest retained event.
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
//!
//! let bus = EventBus::new(16);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Auth(AuthEvent::SignInCancelled));
//! assert_eq!(rx.try_recv().unwrap(), CoreEvent::Auth(AuthEvent::SignInCancelled));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;
use tracing::trace;

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Events buffered per subscriber before it starts lagging.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Auth(AuthEvent),
    Api(ApiEvent),
}

impl CoreEvent {
    /// One-line human summary.
    pub fn summary(&self) -> &'static str {
        match self {
            CoreEvent::Auth(AuthEvent::SignedIn { .. }) => "Account signed in",
            CoreEvent::Auth(AuthEvent::SignedOut { .. }) => "Account signed out",
            CoreEvent::Auth(AuthEvent::AccountChanged { .. }) => "Current account changed",
            CoreEvent::Auth(AuthEvent::SignInCancelled) => "Sign-in cancelled by user",
            CoreEvent::Auth(AuthEvent::TokenAcquired { .. }) => "Access token acquired",
            CoreEvent::Auth(AuthEvent::AuthError { .. }) => "Authentication failed",
            CoreEvent::Api(ApiEvent::RequestCompleted { .. }) => "API request completed",
            CoreEvent::Api(ApiEvent::RequestFailed { .. }) => "API request failed",
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Auth(AuthEvent::AuthError { .. })
            | CoreEvent::Api(ApiEvent::RequestFailed { .. }) => EventSeverity::Error,
            CoreEvent::Auth(AuthEvent::AccountChanged { .. }) => EventSeverity::Warning,
            CoreEvent::Auth(AuthEvent::SignedIn { .. })
            | CoreEvent::Auth(AuthEvent::SignedOut { .. }) => EventSeverity::Info,
            CoreEvent::Auth(AuthEvent::SignInCancelled)
            | CoreEvent::Auth(AuthEvent::TokenAcquired { .. })
            | CoreEvent::Api(ApiEvent::RequestCompleted { .. }) => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Account and token lifecycle.
///
/// Accounts are identified by provider account id only; usernames appear
/// solely on `SignedIn`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    SignedIn {
        account_id: String,
        username: String,
    },
    SignedOut {
        /// The account that was held, if any.
        account_id: Option<String>,
    },
    /// The provider reported a different account than the one held; the
    /// prior one has been invalidated.
    AccountChanged {
        prior: Option<String>,
        current: Option<String>,
    },
    SignInCancelled,
    TokenAcquired {
        account_id: String,
        /// Whether the user was prompted.
        interactive: bool,
        /// Unix epoch seconds.
        expires_at: i64,
    },
    AuthError {
        message: String,
        /// Whether an interactive attempt could resolve it.
        ui_required: bool,
    },
}

/// Downstream API calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ApiEvent {
    RequestCompleted {
        /// Path relative to the API base URL.
        endpoint: String,
        status: u16,
    },
    RequestFailed {
        endpoint: String,
        /// `None` when no response arrived.
        status: Option<u16>,
        message: String,
    },
}

/// Cloneable handle to a broadcast channel of [`CoreEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` is the number of events retained for a slow subscriber.
    ///
    /// # Panics
    ///
    /// If `capacity` is zero. `AppConfig` validation rejects that value.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `event`. Returns how many subscribers it reached.
    pub fn emit(&self, event: CoreEvent) -> usize {
        trace!(
            summary = event.summary(),
            severity = ?event.severity(),
            "Publishing event"
        );
        self.sender.send(event).unwrap_or(0)
    }

    /// A receiver for every event published from now on.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed_in() -> CoreEvent {
        CoreEvent::Auth(AuthEvent::SignedIn {
            account_id: "oid-1".to_string(),
            username: "ada@contoso.com".to_string(),
        })
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        assert_eq!(bus.emit(signed_in()), 0);
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_event() {
        let bus = EventBus::new(4);
        let mut first = bus.subscribe();
        let mut second = bus.clone().subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        assert_eq!(bus.emit(signed_in()), 2);
        assert_eq!(first.recv().await.unwrap(), signed_in());
        assert_eq!(second.recv().await.unwrap(), signed_in());
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();

        for expires_at in 0..5 {
            bus.emit(CoreEvent::Auth(AuthEvent::TokenAcquired {
                account_id: "oid-1".to_string(),
                interactive: false,
                expires_at,
            }));
        }

        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
    }

    #[test]
    fn test_severity_and_summary() {
        let failed = CoreEvent::Api(ApiEvent::RequestFailed {
            endpoint: "me?$expand=drive".to_string(),
            status: None,
            message: "timed out".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.summary(), "API request failed");

        let changed = CoreEvent::Auth(AuthEvent::AccountChanged {
            prior: Some("a".to_string()),
            current: None,
        });
        assert_eq!(changed.severity(), EventSeverity::Warning);
        assert!(changed.severity() > signed_in().severity());
        assert_eq!(
            CoreEvent::Auth(AuthEvent::SignInCancelled).severity(),
            EventSeverity::Debug
        );
    }

    #[test]
    fn test_serialized_shape() {
        let event = CoreEvent::Auth(AuthEvent::AccountChanged {
            prior: Some("oid-1".to_string()),
            current: None,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Auth");
        assert_eq!(json["payload"]["event"], "AccountChanged");
        assert_eq!(json["payload"]["prior"], "oid-1");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
