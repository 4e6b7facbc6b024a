//! Bridge wire format.
//!
//! One JSON object per line in each direction. Outgoing:
//!
//! ```text
//! {"id":3,"op":"sendText","chatId":"123@c.us","body":"hi"}
//! ```
//!
//! Incoming replies and events:
//!
//! ```text
//! {"id":3,"ok":true,"result":null}
//! {"id":4,"ok":false,"error":"chat not found"}
//! {"event":"qr","code":"2@AbC..."}
//! {"event":"disconnected","reason":"NAVIGATION"}
//! ```

use serde::{Deserialize, Serialize};

use crate::client::{ChatSummary, LifecycleEvent};
use crate::media::MediaPayload;

/// An operation requested from the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum BridgeOp {
    Initialize,
    Logout,
    Destroy,
    SendText {
        #[serde(rename = "chatId")]
        chat_id: String,
        body: String,
    },
    SendMedia {
        #[serde(rename = "chatId")]
        chat_id: String,
        caption: String,
        media: MediaPayload,
    },
    ListChats,
}

impl BridgeOp {
    pub fn name(&self) -> &'static str {
        match self {
            BridgeOp::Initialize => "initialize",
            BridgeOp::Logout => "logout",
            BridgeOp::Destroy => "destroy",
            BridgeOp::SendText { .. } => "sendText",
            BridgeOp::SendMedia { .. } => "sendMedia",
            BridgeOp::ListChats => "listChats",
        }
    }
}

/// A request line: correlation id plus the flattened operation.
#[derive(Debug, Clone, Serialize)]
pub struct BridgeRequest {
    pub id: u64,
    #[serde(flatten)]
    pub op: BridgeOp,
}

/// Reply to a request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BridgeReply {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl BridgeReply {
    /// Collapse into the result value or the bridge's error text.
    pub fn into_result(self) -> Result<serde_json::Value, String> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(self
                .error
                .unwrap_or_else(|| "bridge reported failure without details".to_string()))
        }
    }
}

/// Lifecycle event pushed by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum BridgeEvent {
    Qr { code: String },
    Authenticated,
    Ready,
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

impl From<BridgeEvent> for LifecycleEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Qr { code } => LifecycleEvent::LinkingCode(code),
            BridgeEvent::Authenticated => LifecycleEvent::Authenticated,
            BridgeEvent::Ready => LifecycleEvent::Ready,
            BridgeEvent::Disconnected { reason } => LifecycleEvent::Disconnected(reason),
        }
    }
}

/// Any line the bridge may print on stdout.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BridgeMessage {
    Reply(BridgeReply),
    Event(BridgeEvent),
}

/// Conversation entry in a `listChats` result.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeChat {
    #[serde(default)]
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub is_group: bool,
}

impl From<BridgeChat> for ChatSummary {
    fn from(chat: BridgeChat) -> Self {
        ChatSummary {
            name: chat.name,
            id: chat.id,
            is_group: chat.is_group,
        }
    }
}

/// Encode a request as a single line (without the trailing newline).
pub fn encode_request(id: u64, op: BridgeOp) -> Result<String, serde_json::Error> {
    serde_json::to_string(&BridgeRequest { id, op })
}

/// Parse one stdout line. Blank and non-protocol lines yield `None`.
pub fn parse_line(line: &str) -> Option<BridgeMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(message) => Some(message),
        Err(_) => {
            log::debug!("Ignoring non-protocol bridge output: {}", trimmed);
            None
        }
    }
}
