//! Session lifecycle state.

use crate::client::LifecycleEvent;

/// Lifecycle state of the single messaging session.
///
/// The linking code lives inside `AwaitingScan`, so it cannot outlive that
/// state: every transition out of it drops the code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Before the first initialization.
    #[default]
    Uninitialized,
    /// A linking code was issued and is waiting to be scanned.
    AwaitingScan { code: String },
    /// Credentials were exchanged but the session is not usable yet.
    Authenticated,
    /// Usable for reads and sends.
    Ready,
    /// The session dropped.
    Disconnected { reason: String },
}

impl SessionState {
    /// State that results from applying `event`.
    ///
    /// Every event is accepted from every state.
    pub fn after(event: &LifecycleEvent) -> Self {
        match event {
            LifecycleEvent::LinkingCode(code) => SessionState::AwaitingScan { code: code.clone() },
            LifecycleEvent::Authenticated => SessionState::Authenticated,
            LifecycleEvent::Ready => SessionState::Ready,
            LifecycleEvent::Disconnected(reason) => SessionState::Disconnected {
                reason: reason.clone(),
            },
        }
    }

    pub fn disconnected(reason: impl Into<String>) -> Self {
        SessionState::Disconnected {
            reason: reason.into(),
        }
    }

    /// The current linking code, only while awaiting a scan.
    pub fn linking_code(&self) -> Option<&str> {
        match self {
            SessionState::AwaitingScan { code } => Some(code),
            _ => None,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, SessionState::Ready)
    }

    /// Short name used in logs and notifications.
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::AwaitingScan { .. } => "awaiting_scan",
            SessionState::Authenticated => "authenticated",
            SessionState::Ready => "ready",
            SessionState::Disconnected { .. } => "disconnected",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected { reason } => write!(f, "disconnected ({reason})"),
            other => f.write_str(other.label()),
        }
    }
}
