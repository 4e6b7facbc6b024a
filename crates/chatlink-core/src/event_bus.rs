//! Broadcast channel for session notifications.
//!
//! The session controller publishes linking codes and state changes here so
//! that presentation layers (terminal printer, future UIs) can follow the
//! session without touching its state.
//!
//! # Example
//!
//! ```rust
//! use chatlink_core::event_bus::{EventBus, SessionNotice};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(SessionNotice::LinkingCode { code: "2@abc".into() });
//!
//! // In async context:
//! // let notice = rx.recv().await.unwrap();
//! ```

use serde::Serialize;
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
/// Slow subscribers beyond this many notices start lagging.
const DEFAULT_CAPACITY: usize = 64;

pub const LINKING_CODE_EVENT: &str = "session:linking_code";
pub const STATE_EVENT: &str = "session:state";

/// A notification about the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionNotice {
    /// A fresh linking code should be shown to the operator.
    LinkingCode { code: String },
    /// The session moved between states.
    StateChanged {
        from: String,
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl SessionNotice {
    /// Event type identifier for this notice.
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionNotice::LinkingCode { .. } => LINKING_CODE_EVENT,
            SessionNotice::StateChanged { .. } => STATE_EVENT,
        }
    }
}

/// Publish/subscribe hub for [`SessionNotice`]s.
///
/// Backed by a tokio broadcast channel; every subscriber sees every notice
/// published after it subscribed.
pub struct EventBus {
    sender: broadcast::Sender<SessionNotice>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notice to all current subscribers.
    ///
    /// Returns the number of subscribers reached; 0 when nobody listens.
    pub fn publish(&self, notice: SessionNotice) -> usize {
        log::debug!("Publishing {}", notice.event_type());
        self.sender.send(notice).unwrap_or(0)
    }

    /// Subscribe to notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotice> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================
