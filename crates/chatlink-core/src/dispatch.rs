//! Outbound message dispatch.
//!
//! A send request is checked in a fixed order and stops at the first
//! failure, before anything reaches the client:
//!
//! 1. the session must be `Ready`
//! 2. destination and body must be present and non-empty
//! 3. the media file, if any, must load
//!
//! Only then is exactly one send issued. There is no retry.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::client::{ClientError, SessionClient};
use crate::media::{load_media, MediaError};
use crate::session::SessionController;

/// Suffix appended to bare numbers to address a private chat.
pub const PRIVATE_CHAT_SUFFIX: &str = "@c.us";

/// Marker that identifies an already-qualified chat address.
const ADDRESS_QUALIFIER: char = '@';

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Session is not ready")]
    NotReady,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to load media: {0}")]
    MediaLoad(#[from] MediaError),

    #[error("Failed to send message: {0}")]
    Dispatch(ClientError),
}

impl DispatchError {
    /// Stable machine-readable kind.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NotReady => "not_ready",
            DispatchError::InvalidRequest(_) => "invalid_request",
            DispatchError::MediaLoad(_) => "media_load_error",
            DispatchError::Dispatch(_) => "dispatch_error",
        }
    }
}

/// Resolve a raw destination to a chat address.
///
/// Qualified addresses (containing `@`, e.g. `123@g.us`) pass through
/// unchanged; anything else is treated as a phone number for a private chat.
pub fn resolve_chat_address(destination: &str) -> String {
    if destination.contains(ADDRESS_QUALIFIER) {
        destination.to_string()
    } else {
        format!("{destination}{PRIVATE_CHAT_SUFFIX}")
    }
}

/// A validated send request. Lives for a single dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub destination: String,
    pub chat_id: String,
    pub body: String,
    pub media_path: Option<PathBuf>,
}

impl OutboundMessage {
    /// Validate raw request fields.
    ///
    /// An empty media path counts as no media.
    pub fn new(
        destination: Option<&str>,
        body: Option<&str>,
        media_path: Option<&Path>,
    ) -> Result<Self, DispatchError> {
        let destination = non_empty(destination);
        let body = non_empty(body);
        let (Some(destination), Some(body)) = (destination, body) else {
            return Err(DispatchError::InvalidRequest(
                "Missing number or message".to_string(),
            ));
        };

        Ok(Self {
            destination: destination.to_string(),
            chat_id: resolve_chat_address(destination),
            body: body.to_string(),
            media_path: media_path
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Acknowledgment of a delivered send. The client returns no message id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendAck {
    pub chat_id: String,
    pub with_media: bool,
}

/// Executes send requests against the client once the session is ready.
#[derive(Clone)]
pub struct DispatchController {
    session: Arc<SessionController>,
    client: Arc<dyn SessionClient>,
}

impl DispatchController {
    pub fn new(session: Arc<SessionController>, client: Arc<dyn SessionClient>) -> Self {
        Self { session, client }
    }

    /// Validate and send one message.
    pub async fn send(
        &self,
        destination: Option<&str>,
        body: Option<&str>,
        media_path: Option<&Path>,
    ) -> Result<SendAck, DispatchError> {
        if !self.session.is_ready_for_traffic() {
            return Err(DispatchError::NotReady);
        }
        let message = OutboundMessage::new(destination, body, media_path)?;
        self.dispatch(message).await
    }

    async fn dispatch(&self, message: OutboundMessage) -> Result<SendAck, DispatchError> {
        let OutboundMessage {
            chat_id,
            body,
            media_path,
            ..
        } = message;

        match media_path {
            Some(path) => {
                let media = load_media(&path).await.map_err(|e| {
                    log::error!("Error loading media for {}: {}", chat_id, e);
                    DispatchError::MediaLoad(e)
                })?;
                self.client
                    .send_media(&chat_id, media, &body)
                    .await
                    .map_err(|e| send_failed(&chat_id, e))?;
                log::info!("Media sent to {}", chat_id);
                Ok(SendAck {
                    chat_id,
                    with_media: true,
                })
            }
            None => {
                self.client
                    .send_text(&chat_id, &body)
                    .await
                    .map_err(|e| send_failed(&chat_id, e))?;
                log::info!("Message sent to {}", chat_id);
                Ok(SendAck {
                    chat_id,
                    with_media: false,
                })
            }
        }
    }
}

fn send_failed(chat_id: &str, error: ClientError) -> DispatchError {
    log::error!("Error sending message to {}: {}", chat_id, error);
    DispatchError::Dispatch(error)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::LifecycleEvent;
    use crate::event_bus::EventBus;
    use crate::testing::{Call, Operation, RecordingClient};
    use std::fs;
    use tempfile::tempdir;

    async fn controller(ready: bool) -> (Arc<RecordingClient>, DispatchController) {
        let client = Arc::new(RecordingClient::new());
        let (session, _task) =
            SessionController::start(client.clone(), Arc::new(EventBus::new()));
        if ready {
            client.emit(LifecycleEvent::Ready);
            let mut rx = session.watch();
            rx.wait_for(|state| state.is_ready()).await.unwrap();
        }
        (client.clone(), DispatchController::new(session, client))
    }

    mod address {
        use super::*;

        #[test]
        fn bare_number_gets_private_suffix() {
            assert_eq!(resolve_chat_address("1234567890"), "1234567890@c.us");
        }

        #[test]
        fn group_address_is_untouched() {
            assert_eq!(resolve_chat_address("group@g.us"), "group@g.us");
        }

        #[test]
        fn qualified_private_address_is_untouched() {
            assert_eq!(resolve_chat_address("555@c.us"), "555@c.us");
        }
    }

    mod validation {
        use super::*;

        #[test]
        fn missing_destination_is_invalid() {
            let err = OutboundMessage::new(None, Some("hi"), None).unwrap_err();
            assert!(matches!(err, DispatchError::InvalidRequest(_)));
        }

        #[test]
        fn empty_body_is_invalid() {
            let err = OutboundMessage::new(Some("123"), Some(""), None).unwrap_err();
            assert_eq!(err.kind(), "invalid_request");
        }

        #[test]
        fn empty_media_path_means_text() {
            let msg = OutboundMessage::new(Some("123"), Some("hi"), Some(Path::new(""))).unwrap();
            assert!(msg.media_path.is_none());
            assert_eq!(msg.chat_id, "123@c.us");
        }
    }

    mod send {
        use super::*;

        #[tokio::test]
        async fn not_ready_never_reaches_client() {
            let (client, dispatch) = controller(false).await;

            let err = dispatch.send(Some("123"), Some("hi"), None).await.unwrap_err();

            assert!(matches!(err, DispatchError::NotReady));
            assert_eq!(client.send_count(), 0);
        }

        #[tokio::test]
        async fn not_ready_wins_over_invalid_request() {
            let (_client, dispatch) = controller(false).await;
            let err = dispatch.send(None, None, None).await.unwrap_err();
            assert_eq!(err.kind(), "not_ready");
        }

        #[tokio::test]
        async fn text_goes_to_private_chat_once() {
            let (client, dispatch) = controller(true).await;

            let ack = dispatch.send(Some("1234567890"), Some("hi"), None).await.unwrap();

            assert_eq!(
                ack,
                SendAck {
                    chat_id: "1234567890@c.us".into(),
                    with_media: false
                }
            );
            assert_eq!(
                client.calls(),
                vec![Call::SendText {
                    chat_id: "1234567890@c.us".into(),
                    body: "hi".into()
                }]
            );
        }

        #[tokio::test]
        async fn group_address_is_sent_verbatim() {
            let (client, dispatch) = controller(true).await;

            dispatch.send(Some("group@g.us"), Some("hi"), None).await.unwrap();

            assert_eq!(
                client.calls(),
                vec![Call::SendText {
                    chat_id: "group@g.us".into(),
                    body: "hi".into()
                }]
            );
        }

        #[tokio::test]
        async fn missing_fields_are_rejected_before_sending() {
            let (client, dispatch) = controller(true).await;

            let err = dispatch.send(Some("123"), None, None).await.unwrap_err();

            assert!(matches!(err, DispatchError::InvalidRequest(_)));
            assert_eq!(client.send_count(), 0);
        }

        #[tokio::test]
        async fn missing_media_file_sends_nothing() {
            let (client, dispatch) = controller(true).await;
            let dir = tempdir().unwrap();
            let path = dir.path().join("missing.png");

            let err = dispatch
                .send(Some("123"), Some("caption"), Some(&path))
                .await
                .unwrap_err();

            assert_eq!(err.kind(), "media_load_error");
            assert_eq!(client.send_count(), 0);
        }

        #[tokio::test]
        async fn media_is_sent_with_caption() {
            let (client, dispatch) = controller(true).await;
            let dir = tempdir().unwrap();
            let path = dir.path().join("photo.jpg");
            fs::write(&path, b"jpeg").unwrap();

            let ack = dispatch
                .send(Some("123"), Some("look"), Some(&path))
                .await
                .unwrap();

            assert!(ack.with_media);
            match client.calls().as_slice() {
                [Call::SendMedia {
                    chat_id,
                    caption,
                    media,
                }] => {
                    assert_eq!(chat_id, "123@c.us");
                    assert_eq!(caption, "look");
                    assert_eq!(media.mimetype, "image/jpeg");
                    assert_eq!(media.filename.as_deref(), Some("photo.jpg"));
                }
                other => panic!("unexpected calls: {other:?}"),
            }
        }

        #[tokio::test]
        async fn client_failure_is_dispatch_error() {
            let (client, dispatch) = controller(true).await;
            client.fail(Operation::SendText, "evaluation failed");

            let err = dispatch.send(Some("123"), Some("hi"), None).await.unwrap_err();

            match err {
                DispatchError::Dispatch(e) => assert_eq!(e.0, "evaluation failed"),
                other => panic!("expected Dispatch, got {other:?}"),
            }
            assert_eq!(client.count(Operation::SendText), 1);
        }
    }
}
