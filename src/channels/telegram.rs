//! Telegram channel — long-polls the Bot API for messages and button presses.
//!
//! Replies are sent with HTML parse mode and fall back to plain text when
//! Telegram rejects the markup. A processing notice sent through
//! `send_status` is edited in place by the final reply to the same update,
//! or marked cancelled when the request ends without one.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::channels::{Channel, IncomingMessage, Input, MessageStream, StatusUpdate, plain_text};
use crate::dispatcher::{Action, OutgoingContent};
use crate::error::ChannelError;
use crate::prompts;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

const BUTTONS_PER_ROW: usize = 2;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel — connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    api_base: String,
    client: reqwest::Client,
    /// Notice message ids awaiting replacement, keyed by update id.
    notices: Mutex<HashMap<i64, NoticeRef>>,
}

#[derive(Debug, Clone, Copy)]
struct NoticeRef {
    chat_id: i64,
    message_id: i64,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>) -> Self {
        Self {
            bot_token,
            allowed_users,
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
            notices: Mutex::new(HashMap::new()),
        }
    }

    /// Point the channel at another Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn api_url(&self, method: &str) -> String {
        api_url(&self.api_base, &self.bot_token, method)
    }

    /// Check if a username is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    /// Call a Bot API method and return its `result`.
    async fn call(&self, method: &str, body: &Value) -> Result<Value, ChannelError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(body)
            .send()
            .await
            .map_err(|e| send_failed(format!("{method}: {e}")))?;

        let status = resp.status();
        let data: Value = resp.json().await.unwrap_or(Value::Null);
        if status.is_success() && data.get("ok").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(data.get("result").cloned().unwrap_or(Value::Null));
        }
        let description = data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("no description");
        Err(send_failed(format!("{method} returned {status}: {description}")))
    }

    /// Call a text-carrying method with HTML first, then without markup.
    async fn call_with_fallback(&self, method: &str, body: Value) -> Result<Value, ChannelError> {
        let text = body.get("text").and_then(Value::as_str).unwrap_or_default();
        let mut html = body.clone();
        html["parse_mode"] = json!("HTML");

        match self.call(method, &html).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::warn!(error = %e, "Telegram {method} with HTML failed; retrying as plain text");
                let mut plain = body.clone();
                plain["text"] = json!(plain_text(text));
                self.call(method, &plain).await
            }
        }
    }

    /// Send `content`, split to fit the length limit. The keyboard goes on
    /// the last chunk. Returns the id of the last message sent.
    async fn send_message(
        &self,
        chat_id: i64,
        content: &OutgoingContent,
    ) -> Result<Option<i64>, ChannelError> {
        let chunks = split_message(&content.text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);
        let mut message_id = None;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = json!({ "chat_id": chat_id, "text": chunk });
            if i == last && !content.actions.is_empty() {
                body["reply_markup"] = inline_keyboard(&content.actions);
            }
            let sent = self.call_with_fallback("sendMessage", body).await?;
            message_id = sent.get("message_id").and_then(Value::as_i64);
        }
        Ok(message_id)
    }

    /// Replace the text of an earlier message.
    async fn edit_message(
        &self,
        notice: NoticeRef,
        content: &OutgoingContent,
    ) -> Result<(), ChannelError> {
        let mut body = json!({
            "chat_id": notice.chat_id,
            "message_id": notice.message_id,
            "text": content.text,
        });
        if !content.actions.is_empty() {
            body["reply_markup"] = inline_keyboard(&content.actions);
        }
        self.call_with_fallback("editMessageText", body).await.map(|_| ())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let updates_url = self.api_url("getUpdates");
        let answer_url = self.api_url("answerCallbackQuery");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = json!({
                    "offset": offset,
                    "timeout": 30,
                    "allowed_updates": ["message", "callback_query"]
                });

                let resp = match client.post(&updates_url).json(&body).send().await {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let data: Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!("Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let Some(results) = data.get("result").and_then(Value::as_array) else {
                    tracing::warn!(response = %data, "Telegram getUpdates returned no result");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                    continue;
                };
                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(Value::as_i64) {
                        offset = uid + 1;
                    }

                    // Stop the client-side spinner on the pressed button.
                    if let Some(id) = update.pointer("/callback_query/id").and_then(Value::as_str)
                    {
                        let _ = client
                            .post(&answer_url)
                            .json(&json!({ "callback_query_id": id }))
                            .send()
                            .await;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };
                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingContent,
    ) -> Result<(), ChannelError> {
        let chat_id = chat_id(&msg.metadata)?;

        let notice = match update_id(&msg.metadata) {
            Some(update) => self.notices.lock().await.remove(&update),
            None => None,
        };
        if let Some(notice) = notice
            && response.text.len() <= TELEGRAM_MAX_MESSAGE_LENGTH
        {
            match self.edit_message(notice, &response).await {
                Ok(()) => return Ok(()),
                Err(e) => tracing::warn!(error = %e, "Could not replace notice; sending anew"),
            }
        }

        self.send_message(chat_id, &response).await.map(|_| ())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        metadata: &Value,
    ) -> Result<(), ChannelError> {
        let chat_id = chat_id(metadata)?;
        match status {
            StatusUpdate::Typing => {
                let _ = self
                    .call(
                        "sendChatAction",
                        &json!({ "chat_id": chat_id, "action": "typing" }),
                    )
                    .await;
            }
            StatusUpdate::Notice(content) => {
                let message_id = self.send_message(chat_id, &content).await?;
                if let (Some(update), Some(message_id)) = (update_id(metadata), message_id) {
                    self.notices
                        .lock()
                        .await
                        .insert(update, NoticeRef { chat_id, message_id });
                }
            }
        }
        Ok(())
    }

    async fn discard_notice(&self, metadata: &Value) -> Result<(), ChannelError> {
        let Some(update) = update_id(metadata) else {
            return Ok(());
        };
        let Some(notice) = self.notices.lock().await.remove(&update) else {
            return Ok(());
        };
        self.edit_message(notice, &prompts::request_withdrawn()).await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        self.notices.lock().await.clear();
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn api_url(api_base: &str, token: &SecretString, method: &str) -> String {
    format!("{api_base}/bot{}/{method}", token.expose_secret())
}

fn send_failed(reason: String) -> ChannelError {
    ChannelError::SendFailed {
        name: "telegram".into(),
        reason,
    }
}

fn chat_id(metadata: &Value) -> Result<i64, ChannelError> {
    metadata
        .get("chat_id")
        .and_then(Value::as_i64)
        .ok_or_else(|| send_failed("No chat_id in message metadata".into()))
}

fn update_id(metadata: &Value) -> Option<i64> {
    metadata.get("update_id").and_then(Value::as_i64)
}

/// Turn one `getUpdates` entry into an incoming message.
///
/// Text messages and callback queries are accepted; anything else, and
/// senders outside the allowlist, yield `None`.
fn parse_update(update: &Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let update_id = update.get("update_id").and_then(Value::as_i64);

    let (from, chat, input) = if let Some(message) = update.get("message") {
        let text = message.get("text").and_then(Value::as_str)?;
        (
            message.get("from")?,
            message.get("chat")?,
            Input::Text(text.to_string()),
        )
    } else if let Some(callback) = update.get("callback_query") {
        let data = callback.get("data").and_then(Value::as_str)?;
        (
            callback.get("from")?,
            callback.pointer("/message/chat")?,
            Input::Action(data.to_string()),
        )
    } else {
        return None;
    };

    let username = from
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown");
    let user_id = from.get("id").and_then(Value::as_i64)?.to_string();

    // Check allowlist against both username and numeric ID
    if !check_user_allowed(allowed_users, [username, user_id.as_str()]) {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: \
             username={username}, user_id={user_id}"
        );
        return None;
    }

    let chat_id = chat.get("id").and_then(Value::as_i64)?;
    let incoming = IncomingMessage::from_input("telegram", user_id, input).with_metadata(json!({
        "chat_id": chat_id,
        "update_id": update_id,
        "username": username,
    }));

    let first_name = from.get("first_name").and_then(Value::as_str);
    Some(incoming.with_user_name(first_name.unwrap_or(username)))
}

/// Inline keyboard markup, two buttons per row.
fn inline_keyboard(actions: &[Action]) -> Value {
    let rows: Vec<Vec<Value>> = actions
        .chunks(BUTTONS_PER_ROW)
        .map(|row| {
            row.iter()
                .map(|a| json!({ "text": a.label, "callback_data": a.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's length limit.
/// Tries to split on newlines, then spaces, then hard-cuts on a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.len() > max_len {
        let mut end = max_len;
        while !remaining.is_char_boundary(end) {
            end -= 1;
        }
        let window = &remaining[..end];
        let split_at = match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(0) | None => end,
            Some(at) => at,
        };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }
    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

// ── Tests ───────────────────────────────────────────────────────────
