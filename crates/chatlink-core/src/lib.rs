//! # chatlink-core
//!
//! Core logic for chatlink, a small service that brokers access to a single
//! device-linked messaging session.
//!
//! This crate is framework-agnostic and is used by:
//! - the HTTP surface (`chatlink-http`)
//! - the daemon binary (`chatlink-daemon`)
//!
//! ## Key Concepts
//!
//! - **SessionClient**: capability interface for the external messaging client
//! - **SessionController**: owns the session lifecycle state machine
//! - **DispatchController**: validates and executes outbound messages
//! - **BridgeClient**: production `SessionClient` backed by a sidecar process

pub mod bridge;
pub mod client;
pub mod dispatch;
pub mod event_bus;
pub mod logging;
pub mod media;
pub mod session;
pub mod shell;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export commonly used types
pub use bridge::{BridgeClient, BridgeConfig};
pub use client::{ChatSummary, ClientError, LifecycleEvent, LifecycleSink, SessionClient};
pub use dispatch::{DispatchController, DispatchError, OutboundMessage, SendAck};
pub use event_bus::{EventBus, SessionNotice};
pub use session::{SessionController, SessionError, SessionState};
