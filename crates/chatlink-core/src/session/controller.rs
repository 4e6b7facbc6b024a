//! SessionController - owner of the session lifecycle.
//!
//! # Ownership model
//!
//! The state lives in a `tokio::sync::watch` channel. The controller holds
//! the only sender, so it is the single writer; every transition replaces
//! the whole value at once and readers always see a complete snapshot.
//! Reads share the lock and never block each other.
//!
//! Lifecycle events arrive on an mpsc queue fed by the client and are
//! applied one at a time by [`SessionController::start`]'s event loop.
//! Client calls are never made while the state lock is held.
//!
//! # Rebuilds
//!
//! A disconnect (or a failed logout) schedules destroy-then-initialize on
//! the client as a background task. Only one rebuild runs at a time; a
//! trigger that arrives while one is in flight is dropped. A failed rebuild
//! is logged and not retried: until an explicit `initialize` or a new
//! linking code / ready event, further disconnects only update the state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::state::SessionState;
use crate::client::{ChatSummary, ClientError, LifecycleEvent, LifecycleSink, SessionClient};
use crate::event_bus::{EventBus, SessionNotice};

/// Disconnect reason recorded when a logout attempt fails.
pub const LOGOUT_FAILED_REASON: &str = "logout-failed";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is not ready")]
    NotReady,

    #[error("Failed to initialize session: {0}")]
    Initialize(ClientError),

    #[error("Failed to log out: {0}")]
    Logout(ClientError),

    #[error("Failed to reinitialize session: {0}")]
    Reinitialize(ClientError),

    #[error("Failed to list conversations: {0}")]
    ListConversations(ClientError),
}

impl SessionError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NotReady => "not_ready",
            SessionError::Initialize(_) => "initialize_error",
            SessionError::Logout(_) => "logout_error",
            SessionError::Reinitialize(_) => "reinitialize_error",
            SessionError::ListConversations(_) => "list_error",
        }
    }

    /// Underlying collaborator diagnostic, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            SessionError::NotReady => None,
            SessionError::Initialize(e)
            | SessionError::Logout(e)
            | SessionError::Reinitialize(e)
            | SessionError::ListConversations(e) => Some(&e.0),
        }
    }
}

/// Owns the session state and drives the client through its lifecycle.
pub struct SessionController {
    state: watch::Sender<SessionState>,
    client: Arc<dyn SessionClient>,
    event_bus: Arc<EventBus>,
    rebuild_in_flight: AtomicBool,
    /// Set when a rebuild's reinitialize failed; suppresses automatic rebuilds.
    rebuild_failed: AtomicBool,
}

impl SessionController {
    /// Create a controller in the `Uninitialized` state.
    ///
    /// Does not subscribe to the client; use [`SessionController::start`]
    /// for a fully wired controller.
    pub fn new(client: Arc<dyn SessionClient>, event_bus: Arc<EventBus>) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            state,
            client,
            event_bus,
            rebuild_in_flight: AtomicBool::new(false),
            rebuild_failed: AtomicBool::new(false),
        }
    }

    /// Create a controller, subscribe it to the client and spawn the event
    /// loop. Must be called from within a tokio runtime.
    ///
    /// The loop ends when every [`LifecycleSink`] clone has been dropped.
    pub fn start(
        client: Arc<dyn SessionClient>,
        event_bus: Arc<EventBus>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let controller = Arc::new(Self::new(Arc::clone(&client), event_bus));
        let (sink, events) = LifecycleSink::channel();
        client.subscribe(sink);

        let task = tokio::spawn(Arc::clone(&controller).run(events));
        (controller, task)
    }

    async fn run(self: Arc<Self>, mut events: mpsc::UnboundedReceiver<LifecycleEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        log::info!("Session event stream closed");
    }

    /// Apply one lifecycle event.
    fn handle_event(self: &Arc<Self>, event: LifecycleEvent) {
        self.transition(SessionState::after(&event));

        match event {
            LifecycleEvent::LinkingCode(code) => {
                self.rebuild_failed.store(false, Ordering::Release);
                log::info!("Linking code received; scan it to link this device");
                self.event_bus.publish(SessionNotice::LinkingCode { code });
            }
            LifecycleEvent::Disconnected(reason) => {
                log::warn!("Session disconnected: {}", reason);
                if self.has_failed_rebuild() {
                    log::warn!("Previous rebuild failed; not rebuilding again");
                } else {
                    self.schedule_rebuild("disconnect");
                }
            }
            LifecycleEvent::Ready => {
                self.rebuild_failed.store(false, Ordering::Release);
            }
            LifecycleEvent::Authenticated => {}
        }
    }

    /// Replace the state in one step and announce the change.
    fn transition(&self, next: SessionState) {
        let reason = match &next {
            SessionState::Disconnected { reason } => Some(reason.clone()),
            _ => None,
        };
        let to = next.label();
        let previous = self.state.send_replace(next);

        log::info!("Session state: {} -> {}", previous.label(), to);
        self.event_bus.publish(SessionNotice::StateChanged {
            from: previous.label().to_string(),
            to: to.to_string(),
            reason,
        });
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// Snapshot of the current state.
    pub fn current_state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// The linking code, present only while awaiting a scan.
    pub fn current_linking_code(&self) -> Option<String> {
        self.state.borrow().linking_code().map(str::to_string)
    }

    pub fn is_ready_for_traffic(&self) -> bool {
        self.state.borrow().is_ready()
    }

    /// Whether a destroy+initialize sequence is currently running.
    pub fn is_rebuilding(&self) -> bool {
        self.rebuild_in_flight.load(Ordering::Acquire)
    }

    /// Whether the last rebuild failed to reinitialize the client.
    pub fn has_failed_rebuild(&self) -> bool {
        self.rebuild_failed.load(Ordering::Acquire)
    }

    /// Watch state changes.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    // ------------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------------

    /// Ask the client to start a session. The state does not change until
    /// the client reports progress through events.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        log::info!("Initializing session client");
        self.rebuild_failed.store(false, Ordering::Release);
        self.client.initialize().await.map_err(|e| {
            log::error!("Session initialization failed: {}", e);
            SessionError::Initialize(e)
        })
    }

    /// Log the linked device out.
    ///
    /// On success the state is left alone; the client's `Disconnected` event
    /// drives the transition. On failure the state is forced to
    /// `Disconnected("logout-failed")`, a rebuild is scheduled in the
    /// background, and the logout error is returned.
    pub async fn logout(self: &Arc<Self>) -> Result<(), SessionError> {
        log::info!("Logging out session");
        match self.client.logout().await {
            Ok(()) => {
                log::info!("Logout accepted; waiting for disconnect");
                Ok(())
            }
            Err(e) => {
                log::error!("Logout failed, forcing session reset: {}", e);
                self.transition(SessionState::disconnected(LOGOUT_FAILED_REASON));
                self.schedule_rebuild("logout failure");
                Err(SessionError::Logout(e))
            }
        }
    }

    /// Fetch the conversation list from the client. Requires `Ready`.
    pub async fn list_conversations(&self) -> Result<Vec<ChatSummary>, SessionError> {
        if !self.is_ready_for_traffic() {
            return Err(SessionError::NotReady);
        }
        self.client
            .list_conversations()
            .await
            .map_err(SessionError::ListConversations)
    }

    /// Group conversations only. Requires `Ready`.
    pub async fn list_groups(&self) -> Result<Vec<ChatSummary>, SessionError> {
        let chats = self.list_conversations().await?;
        Ok(chats.into_iter().filter(|chat| chat.is_group).collect())
    }

    /// Start a background destroy+initialize unless one is already running.
    ///
    /// Returns whether a new rebuild was started.
    fn schedule_rebuild(self: &Arc<Self>, trigger: &str) -> bool {
        if self
            .rebuild_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::info!("Session rebuild already running; ignoring {}", trigger);
            return false;
        }

        log::info!("Rebuilding session after {}", trigger);
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = controller.rebuild().await {
                // Must be set before the in-flight flag clears.
                controller.rebuild_failed.store(true, Ordering::Release);
                log::error!(
                    "{}; session stays {} until restarted",
                    e,
                    controller.current_state()
                );
            }
            controller.rebuild_in_flight.store(false, Ordering::Release);
        });
        true
    }

    async fn rebuild(&self) -> Result<(), SessionError> {
        if let Err(e) = self.client.destroy().await {
            log::warn!("Session teardown failed, reinitializing anyway: {}", e);
        }
        self.client
            .initialize()
            .await
            .map_err(SessionError::Reinitialize)?;
        log::info!("Session reinitialized; waiting for a new linking code");
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
