//! Core channel types — messages in, responses out.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;

/// Stream of inbound messages from a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A photo attached to an inbound message, referenced by the transport's
/// own file id so it can be re-sent without re-uploading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_id: String,
}

/// An inbound message from any channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel name the message arrived on.
    pub channel: String,
    /// Stable user id within that channel.
    pub user_id: String,
    /// Account handle (e.g. Telegram username), empty when the user has none.
    pub handle: String,
    /// Display name for greetings.
    pub user_name: String,
    /// Message text (caption text for attachment messages).
    pub content: String,
    /// Attached photo, if any.
    pub attachment: Option<Attachment>,
    /// Channel-specific routing data (e.g. chat_id for Telegram).
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            handle: String::new(),
            user_name: String::new(),
            content: content.to_string(),
            attachment: None,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_handle(mut self, handle: &str) -> Self {
        self.handle = handle.to_string();
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = name.to_string();
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Reply keyboard instruction accompanying an outgoing response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Keyboard {
    /// Show a reply keyboard with the given button rows.
    Buttons { rows: Vec<Vec<String>>, one_time: bool },
    /// Remove any active reply keyboard.
    Remove,
}

/// An outbound response to a user.
#[derive(Debug, Clone)]
pub struct OutgoingResponse {
    pub content: String,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, rows: Vec<Vec<String>>) -> Self {
        self.keyboard = Some(Keyboard::Buttons {
            rows,
            one_time: false,
        });
        self
    }

    pub fn with_one_time_keyboard(mut self, rows: Vec<Vec<String>>) -> Self {
        self.keyboard = Some(Keyboard::Buttons {
            rows,
            one_time: true,
        });
        self
    }

    pub fn remove_keyboard(mut self) -> Self {
        self.keyboard = Some(Keyboard::Remove);
        self
    }
}

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name, matched against `IncomingMessage::channel` for routing.
    fn name(&self) -> &str;

    /// Start listening and return the inbound message stream.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a response back to the user a message came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    /// Verify the channel can reach its backend before serving.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Graceful shutdown.
    async fn shutdown(&self) -> Result<(), ChannelError>;
}
