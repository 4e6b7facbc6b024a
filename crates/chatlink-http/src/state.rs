//! Shared state for the HTTP handlers.

use std::sync::Arc;

use chatlink_core::{DispatchController, SessionClient, SessionController};

/// State available to all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle owner; read for readiness, linking codes and listings.
    pub session: Arc<SessionController>,
    /// Send path.
    pub dispatch: DispatchController,
}

impl AppState {
    pub fn new(session: Arc<SessionController>, client: Arc<dyn SessionClient>) -> Self {
        let dispatch = DispatchController::new(Arc::clone(&session), client);
        Self { session, dispatch }
    }
}
