//! `SessionClient` implementation over the bridge process.
//!
//! Each spawned process gets its own table of pending replies, so a late
//! exit of a torn-down process never fails requests sent to its
//! replacement.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::process::{BridgeProcess, ProcessEvent};
use super::protocol::{encode_request, parse_line, BridgeChat, BridgeMessage, BridgeOp, BridgeReply};
use super::{BridgeConfig, BridgeError};
use crate::client::{ChatSummary, ClientError, LifecycleEvent, LifecycleSink, SessionClient};
use crate::logging::{log_line, open_log_file, LogHandle};
use crate::media::MediaPayload;

/// Upper bound on waiting for the bridge to acknowledge `destroy`.
const DESTROY_TIMEOUT: Duration = Duration::from_secs(10);

type ReplySender = oneshot::Sender<Result<Value, String>>;

/// Requests waiting for a reply from one process.
#[derive(Default)]
struct PendingReplies {
    waiting: Mutex<HashMap<u64, ReplySender>>,
}

impl PendingReplies {
    fn register(&self, id: u64) -> oneshot::Receiver<Result<Value, String>> {
        let (tx, rx) = oneshot::channel();
        self.waiting.lock().unwrap().insert(id, tx);
        rx
    }

    fn cancel(&self, id: u64) {
        self.waiting.lock().unwrap().remove(&id);
    }

    fn resolve(&self, reply: BridgeReply) {
        let id = reply.id;
        let waiter = self.waiting.lock().unwrap().remove(&id);
        match waiter {
            Some(tx) => {
                let _ = tx.send(reply.into_result());
            }
            None => log::warn!("Bridge replied to unknown request {}", id),
        }
    }

    /// Drop every waiter; their receivers observe the bridge as gone.
    fn fail_all(&self) {
        let dropped = self.waiting.lock().unwrap().drain().count();
        if dropped > 0 {
            log::warn!("Bridge exited with {} request(s) outstanding", dropped);
        }
    }
}

/// A live process plus its reply table.
struct Link {
    process: BridgeProcess,
    pending: Arc<PendingReplies>,
}

/// State shared with the output pump.
struct Relay {
    sink: Mutex<Option<LifecycleSink>>,
    traffic: LogHandle,
}

impl Relay {
    fn deliver(&self, event: LifecycleEvent) {
        let sink = self.sink.lock().unwrap().clone();
        match sink {
            Some(sink) => {
                if !sink.emit(event) {
                    log::debug!("Session controller gone; dropping bridge event");
                }
            }
            None => log::warn!("No subscriber for bridge event {:?}", event),
        }
    }
}

/// Session client backed by a sidecar bridge process.
///
/// The process is spawned lazily by `initialize` and stopped by `destroy`.
pub struct BridgeClient {
    config: BridgeConfig,
    relay: Arc<Relay>,
    link: Mutex<Option<Arc<Link>>>,
    next_id: AtomicU64,
}

impl BridgeClient {
    pub fn new(config: BridgeConfig) -> Self {
        let traffic = open_log_file(config.log_dir.as_deref(), "bridge");
        Self {
            config,
            relay: Arc::new(Relay {
                sink: Mutex::new(None),
                traffic,
            }),
            link: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Whether a bridge process is currently alive.
    pub fn is_running(&self) -> bool {
        self.link
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|link| link.process.is_running())
    }

    /// Return the live link, spawning a new process if needed.
    fn ensure_running(&self) -> Result<Arc<Link>, BridgeError> {
        let mut slot = self.link.lock().unwrap();
        if let Some(link) = slot.as_ref().filter(|link| link.process.is_running()) {
            return Ok(Arc::clone(link));
        }

        let (process, events) = BridgeProcess::spawn(&self.config)?;
        let link = Arc::new(Link {
            pending: Arc::new(PendingReplies::default()),
            process,
        });
        tokio::spawn(pump(
            events,
            Arc::clone(&link.pending),
            link.process.stopping_flag(),
            Arc::clone(&self.relay),
        ));
        *slot = Some(Arc::clone(&link));
        Ok(link)
    }

    fn current_link(&self) -> Result<Arc<Link>, BridgeError> {
        self.link
            .lock()
            .unwrap()
            .clone()
            .ok_or(BridgeError::NotRunning)
    }

    async fn request(&self, op: BridgeOp) -> Result<Value, BridgeError> {
        let link = self.current_link()?;
        self.request_on(&link, op).await
    }

    async fn request_on(&self, link: &Link, op: BridgeOp) -> Result<Value, BridgeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = op.name();
        let line = encode_request(id, op)?;

        let reply = link.pending.register(id);
        if let Err(e) = link.process.write_line(&line).await {
            link.pending.cancel(id);
            return Err(e);
        }
        log_line(&self.relay.traffic, "STDIN", &line);
        log::debug!("Bridge request {} ({}) sent", id, name);

        match reply.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(BridgeError::Remote(message)),
            Err(_) => Err(BridgeError::Exited),
        }
    }
}

/// Route process output: replies to waiters, events to the controller.
async fn pump(
    mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    pending: Arc<PendingReplies>,
    stopping: Arc<AtomicBool>,
    relay: Arc<Relay>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProcessEvent::Stdout(line) => {
                log_line(&relay.traffic, "STDOUT", &line);
                match parse_line(&line) {
                    Some(BridgeMessage::Reply(reply)) => pending.resolve(reply),
                    Some(BridgeMessage::Event(event)) => relay.deliver(event.into()),
                    None => {}
                }
            }
            ProcessEvent::Stderr(line) => {
                log_line(&relay.traffic, "STDERR", &line);
                log::warn!("bridge: {}", line);
            }
            ProcessEvent::Exit(exit) => {
                pending.fail_all();
                if stopping.load(Ordering::Acquire) {
                    log::info!("Bridge stopped ({})", exit);
                } else {
                    log::error!("Bridge exited unexpectedly ({})", exit);
                    relay.deliver(LifecycleEvent::Disconnected(format!("bridge exited ({exit})")));
                }
            }
        }
    }
}

#[async_trait]
impl SessionClient for BridgeClient {
    fn subscribe(&self, sink: LifecycleSink) {
        *self.relay.sink.lock().unwrap() = Some(sink);
    }

    async fn initialize(&self) -> Result<(), ClientError> {
        let link = self.ensure_running()?;
        self.request_on(&link, BridgeOp::Initialize).await?;
        Ok(())
    }

    async fn logout(&self) -> Result<(), ClientError> {
        self.request(BridgeOp::Logout).await?;
        Ok(())
    }

    async fn destroy(&self) -> Result<(), ClientError> {
        let link = self.link.lock().unwrap().take();
        let Some(link) = link else {
            return Ok(());
        };
        if !link.process.is_running() {
            return Ok(());
        }

        link.process.mark_stopping();
        let acknowledged =
            tokio::time::timeout(DESTROY_TIMEOUT, self.request_on(&link, BridgeOp::Destroy)).await;
        link.process.stop();

        match acknowledged {
            Ok(Ok(_)) | Ok(Err(BridgeError::Exited)) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ClientError::new("bridge did not acknowledge destroy")),
        }
    }

    async fn send_text(&self, chat_id: &str, body: &str) -> Result<(), ClientError> {
        self.request(BridgeOp::SendText {
            chat_id: chat_id.to_string(),
            body: body.to_string(),
        })
        .await?;
        Ok(())
    }

    async fn send_media(
        &self,
        chat_id: &str,
        media: MediaPayload,
        caption: &str,
    ) -> Result<(), ClientError> {
        self.request(BridgeOp::SendMedia {
            chat_id: chat_id.to_string(),
            caption: caption.to_string(),
            media,
        })
        .await?;
        Ok(())
    }

    async fn list_conversations(&self) -> Result<Vec<ChatSummary>, ClientError> {
        let value = self.request(BridgeOp::ListChats).await?;
        let chats: Vec<BridgeChat> =
            serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string()))?;
        Ok(chats.into_iter().map(ChatSummary::from).collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================
