//! In-memory [`SessionClient`] that records every call.
//!
//! Available to this crate's tests and, with the `test-support` feature, to
//! downstream crates.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::client::{ChatSummary, ClientError, LifecycleEvent, LifecycleSink, SessionClient};
use crate::media::MediaPayload;

/// Client operations, used to count calls and inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Initialize,
    Logout,
    Destroy,
    SendText,
    SendMedia,
    ListConversations,
}

/// A recorded client call with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Initialize,
    Logout,
    Destroy,
    SendText { chat_id: String, body: String },
    SendMedia { chat_id: String, caption: String, media: MediaPayload },
    ListConversations,
}

impl Call {
    pub fn operation(&self) -> Operation {
        match self {
            Call::Initialize => Operation::Initialize,
            Call::Logout => Operation::Logout,
            Call::Destroy => Operation::Destroy,
            Call::SendText { .. } => Operation::SendText,
            Call::SendMedia { .. } => Operation::SendMedia,
            Call::ListConversations => Operation::ListConversations,
        }
    }
}

#[derive(Default)]
pub struct RecordingClient {
    sink: Mutex<Option<LifecycleSink>>,
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<Operation, String>>,
    conversations: Mutex<Vec<ChatSummary>>,
    destroy_gate: Mutex<Option<Arc<Notify>>>,
    reactions: Mutex<HashMap<Operation, LifecycleEvent>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a lifecycle event to the subscribed controller.
    pub fn emit(&self, event: LifecycleEvent) -> bool {
        match self.sink.lock().unwrap().as_ref() {
            Some(sink) => sink.emit(event),
            None => false,
        }
    }

    /// Make every future call to `operation` fail with `message`.
    pub fn fail(&self, operation: Operation, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(operation, message.to_string());
    }

    /// Emit `event` every time `operation` is called, before it returns.
    pub fn emit_on(&self, operation: Operation, event: LifecycleEvent) {
        self.reactions.lock().unwrap().insert(operation, event);
    }

    pub fn set_conversations(&self, chats: Vec<ChatSummary>) {
        *self.conversations.lock().unwrap() = chats;
    }

    /// Block `destroy` until the returned handle is notified.
    pub fn hold_destroy(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.destroy_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.calls().iter().map(Call::operation).collect()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    /// Number of text and media sends.
    pub fn send_count(&self) -> usize {
        self.count(Operation::SendText) + self.count(Operation::SendMedia)
    }

    fn record(&self, call: Call) -> Result<(), ClientError> {
        let operation = call.operation();
        self.calls.lock().unwrap().push(call);
        let reaction = self.reactions.lock().unwrap().get(&operation).cloned();
        if let Some(event) = reaction {
            self.emit(event);
        }
        match self.failures.lock().unwrap().get(&operation) {
            Some(message) => Err(ClientError::new(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SessionClient for RecordingClient {
    fn subscribe(&self, sink: LifecycleSink) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    async fn initialize(&self) -> Result<(), ClientError> {
        self.record(Call::Initialize)
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.record(Call::Logout)
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        let result = self.record(Call::Destroy);
        let gate = self.destroy_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        result
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<(), ClientError> {
        self.record(Call::SendText {
            chat_id: chat_id.to_string(),
            body: body.to_string(),
        })
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media: MediaPayload,
        caption: &str,
    ) -> Result<(), ClientError> {
        self.record(Call::SendMedia {
            chat_id: chat_id.to_string(),
            caption: caption.to_string(),
            media,
        })
    }

    async fn list_conversations(&self) -> Result<Vec<ChatSummary>, ClientError> {
        self.record(Call::ListConversations)?;
        Ok(self.conversations.lock().unwrap().clone())
    }
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
