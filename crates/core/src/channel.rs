//! Channel types: the messaging-platform side of the bridge.
//!
//! An [`InboundEvent`] is one text message that deserves an answer. A
//! [`ReplyChannel`] delivers the answer back through the event's reply handle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ChannelError;

/// A text message received from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEvent {
    /// Platform user identifier; keys the conversation history
    pub user_id: String,

    /// The text the user sent
    pub text: String,

    /// Opaque handle used to answer this event (LINE reply token)
    pub reply_handle: String,
}

/// Sends reply text back to the platform.
#[async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Human-readable channel name (e.g., "line").
    fn name(&self) -> &str;

    /// Answer the event identified by `reply_handle` with `text`.
    async fn reply(&self, reply_handle: &str, text: &str) -> std::result::Result<(), ChannelError>;
}
