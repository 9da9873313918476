//! CLI channel — stdin/stdout REPL for local testing.
//!
//! Lines starting with `tier:` or `action:` stand in for button presses,
//! e.g. `tier:premium` or `action:dashboard`.

use async_trait::async_trait;
use futures::stream;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::channels::{Channel, IncomingMessage, MessageStream, StatusUpdate, plain_text};
use crate::dispatcher::OutgoingContent;
use crate::error::ChannelError;

const LOCAL_USER: &str = "local-user";

/// A simple CLI channel that reads from stdin and writes to stdout.
#[derive(Default)]
pub struct CliChannel;

impl CliChannel {
    pub fn new() -> Self {
        Self
    }
}

/// Map a typed line onto an incoming message. Text lines are passed on as
/// typed.
fn parse_line(line: &str) -> Option<IncomingMessage> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(if trimmed.starts_with("tier:") {
        IncomingMessage::action("cli", LOCAL_USER, trimmed)
    } else if let Some(data) = trimmed.strip_prefix("action:") {
        IncomingMessage::action("cli", LOCAL_USER, data.trim())
    } else {
        IncomingMessage::new("cli", LOCAL_USER, line)
    })
}

/// Plain-text rendering with the available buttons listed underneath.
fn render(content: &OutgoingContent) -> String {
    let mut out = plain_text(&content.text);
    if !content.actions.is_empty() {
        let buttons: Vec<String> = content
            .actions
            .iter()
            .map(|a| format!("[{}] {}", a.data, a.label))
            .collect();
        out.push_str("\n\n");
        out.push_str(&buttons.join("  "));
    }
    out
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let stdin = tokio::io::stdin();
            let reader = BufReader::new(stdin);
            let mut lines = reader.lines();

            eprint!("> ");

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Some(msg) = parse_line(&line) else {
                            eprint!("> ");
                            continue;
                        };
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break, // EOF
                    Err(e) => {
                        tracing::error!("Error reading stdin: {}", e);
                        break;
                    }
                }
            }
        });

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        _msg: &IncomingMessage,
        response: OutgoingContent,
    ) -> Result<(), ChannelError> {
        println!("\n{}\n", render(&response));
        eprint!("> ");
        Ok(())
    }

    async fn send_status(
        &self,
        status: StatusUpdate,
        _metadata: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Typing => {}
            StatusUpdate::Notice(content) => eprintln!("{}", plain_text(&content.text)),
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
