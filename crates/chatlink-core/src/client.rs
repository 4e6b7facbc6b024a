//! Capability interface for the external messaging-session client.
//!
//! The client is a black box that can initialize a session, log out, tear
//! itself down, send messages and enumerate conversations. Lifecycle
//! notifications flow the other way: the client pushes them into a
//! [`LifecycleSink`] handed to it by the session controller, and the
//! controller consumes them one at a time.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::media::MediaPayload;

/// Failure reported by a session client operation.
///
/// Carries the collaborator's diagnostic text unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ClientError(pub String);

impl ClientError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Lifecycle notification emitted by a session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// A new linking code is available for scanning.
    LinkingCode(String),
    /// Credentials were exchanged; traffic is not yet allowed.
    Authenticated,
    /// The session is usable for reads and sends.
    Ready,
    /// The session dropped. Carries the client's diagnostic reason.
    Disconnected(String),
}

/// Sending half of the lifecycle event queue.
///
/// Cheap to clone. Emitting after the controller is gone is a no-op.
#[derive(Debug, Clone)]
pub struct LifecycleSink {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl LifecycleSink {
    /// Create a sink and the receiver the controller drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Push an event. Returns false if nobody is listening anymore.
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn on_linking_code(&self, code: impl Into<String>) -> bool {
        self.emit(LifecycleEvent::LinkingCode(code.into()))
    }

    pub fn on_authenticated(&self) -> bool {
        self.emit(LifecycleEvent::Authenticated)
    }

    pub fn on_ready(&self) -> bool {
        self.emit(LifecycleEvent::Ready)
    }

    pub fn on_disconnected(&self, reason: impl Into<String>) -> bool {
        self.emit(LifecycleEvent::Disconnected(reason.into()))
    }
}

/// A conversation as reported by the client. Never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub name: String,
    /// Fully qualified chat address (e.g. `123@c.us`, `456@g.us`).
    pub id: String,
    pub is_group: bool,
}

/// Operations offered by the external messaging-session client.
///
/// Any implementation (the sidecar bridge, a test double) can be swapped in
/// without changing controller logic.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Register the sink that receives lifecycle events.
    ///
    /// Called once by the session controller before `initialize`.
    fn subscribe(&self, sink: LifecycleSink);

    /// Start (or restart) the session. Completion does not imply readiness;
    /// progress is reported through lifecycle events.
    async fn initialize(&self) -> Result<(), ClientError>;

    /// Unlink the device. A successful logout is followed by a
    /// `Disconnected` event.
    async fn logout(&self) -> Result<(), ClientError>;

    /// Tear down the session so it can be initialized again.
    async fn destroy(&self) -> Result<(), ClientError>;

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<(), ClientError>;

    async fn send_media(
        &self,
        chat_id: &str,
        media: MediaPayload,
        caption: &str,
    ) -> Result<(), ClientError>;

    async fn list_conversations(&self) -> Result<Vec<ChatSummary>, ClientError>;
}
