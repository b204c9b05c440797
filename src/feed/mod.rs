use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;
use tracing::warn;

/// Raw message text plus the chat it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(chat: &str, text: &str) -> Self {
        Self {
            chat: chat.to_string(),
            text: text.to_string(),
        }
    }
}

/// Upstream collaborator delivering signal messages. `None` means the
/// source is exhausted.
#[async_trait]
pub trait MessageSource: Send {
    async fn next_message(&mut self) -> Option<InboundMessage>;
}

/// Reads messages from a line stream; a blank line ends a message.
pub struct LineSource<R> {
    chat: String,
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(chat: &str, reader: R) -> Self {
        Self {
            chat: chat.to_string(),
            lines: reader.lines(),
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageSource for LineSource<R> {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        let mut buf: Vec<String> = Vec::new();
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {
                    if !buf.is_empty() {
                        break;
                    }
                }
                Ok(Some(line)) => buf.push(line),
                Ok(None) => break,
                Err(e) => {
                    warn!("Message source {} read error: {}", self.chat, e);
                    break;
                }
            }
        }

        if buf.is_empty() {
            return None;
        }
        Some(InboundMessage {
            chat: self.chat.clone(),
            text: buf.join("\n"),
        })
    }
}

/// Source fed by another task through an mpsc channel.
pub struct ChannelSource {
    rx: mpsc::Receiver<InboundMessage>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<InboundMessage>) -> Self {
        Self { rx }
    }

    pub fn channel(capacity: usize) -> (mpsc::Sender<InboundMessage>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }
}
