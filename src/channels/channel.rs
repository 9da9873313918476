//! Channel trait and the message types that cross it.

use std::pin::Pin;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use regex::Regex;
use uuid::Uuid;

use crate::dispatcher::{Event, OutgoingContent};
use crate::error::ChannelError;
use crate::session::UserId;

/// What the user sent: typed text or a button press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    /// Callback data of a pressed button.
    Action(String),
}

/// A message received from a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    pub channel: String,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub input: Input,
    /// Channel-specific routing data (e.g. the Telegram chat id).
    pub metadata: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: impl Into<UserId>, content: &str) -> Self {
        Self::from_input(channel, user_id, Input::Text(content.to_string()))
    }

    pub fn action(channel: &str, user_id: impl Into<UserId>, data: &str) -> Self {
        Self::from_input(channel, user_id, Input::Action(data.to_string()))
    }

    pub fn from_input(channel: &str, user_id: impl Into<UserId>, input: Input) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.into(),
            user_name: None,
            input,
            metadata: serde_json::Value::Null,
            received_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    /// Dispatcher event for this message. Unknown button data yields `None`.
    pub fn to_event(&self) -> Option<Event> {
        match &self.input {
            Input::Text(text) => Some(Event::from_text(text)),
            Input::Action(data) => Event::from_action(data),
        }
    }
}

/// Progress signals sent ahead of the final response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    Typing,
    /// Interim message, replaced by the final response where the channel can.
    Notice(OutgoingContent),
}

pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A transport the bot talks through.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start receiving. Messages arrive on the returned stream until the
    /// channel stops.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingContent,
    ) -> Result<(), ChannelError>;

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &serde_json::Value,
    ) -> Result<(), ChannelError>;

    /// Withdraw the notice sent for a request that ended without a reply.
    async fn discard_notice(&self, _metadata: &serde_json::Value) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError>;
}

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));

/// Render HTML-formatted text for transports without markup.
pub fn plain_text(html: &str) -> String {
    TAG_RE
        .replace_all(html, "")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::Command;
    use crate::session::Tier;

    #[test]
    fn text_maps_to_event() {
        let msg = IncomingMessage::new("cli", "local", "/scan");
        assert_eq!(msg.to_event(), Some(Event::Command(Command::Scan(None))));
    }

    #[test]
    fn action_maps_to_event() {
        let msg = IncomingMessage::action("telegram", 5i64, "scan_tier:mvp");
        assert_eq!(msg.to_event(), Some(Event::TierSelected(Tier::Mvp)));
        assert_eq!(msg.user_id, UserId::from(5i64));
        assert_eq!(IncomingMessage::action("telegram", 5i64, "bogus").to_event(), None);
    }

    #[test]
    fn plain_text_strips_markup() {
        assert_eq!(
            plain_text("<b>Usage</b>: <code>/verify_payment &lt;tx&gt;</code> &amp; go"),
            "Usage: /verify_payment <tx> & go"
        );
    }
}
