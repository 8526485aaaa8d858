use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

/// Display form of a message after marker extraction. Derived on render;
/// the source message is never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub display_text: String,
    pub tool_id: Option<String>,
    pub response_style: Option<String>,
}

fn tool_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[tool:([A-Za-z0-9_.\-]+)\]").unwrap())
}

fn style_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[style:([A-Za-z0-9_\-]+)\]").unwrap())
}

/// Extract the optional `[tool:ID]` and `[style:NAME]` markers from raw
/// message text. Idempotent, and never fails: malformed markers are left
/// in place and the full text passes through.
pub fn parse_message(text: &str) -> ParsedMessage {
    let tool_id = tool_marker()
        .captures(text)
        .map(|caps| caps[1].to_string());
    let response_style = style_marker()
        .captures(text)
        .map(|caps| caps[1].to_string());

    let mut display_text = text.to_string();
    if tool_id.is_some() || response_style.is_some() {
        // Stripping can expose a marker that was split by a nested one, so
        // repeat until a pass removes nothing. Each pass shrinks the text,
        // so this terminates.
        loop {
            let stripped = tool_marker().replace_all(&display_text, "").into_owned();
            let stripped = style_marker().replace_all(&stripped, "").into_owned();
            if stripped == display_text {
                break;
            }
            display_text = stripped;
        }
        display_text = display_text.trim().to_string();
    }

    ParsedMessage {
        display_text,
        tool_id,
        response_style,
    }
}

/// One streamed chunk or the end of the stream.
#[derive(Debug)]
pub enum StreamEvent {
    Delta(String),
    Done(Result<()>),
}

/// Wire seam for streaming replies. The real transport speaks NDJSON over
/// HTTP; tests feed events straight into the channel.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn stream_reply(
        &self,
        endpoint: &str,
        prompt: &str,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<()>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
}

/// POSTs to the agent's generate endpoint and forwards each NDJSON line's
/// `response` field as a delta.
pub struct HttpChatTransport {
    client: Client,
}

impl HttpChatTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn stream_reply(
        &self,
        endpoint: &str,
        prompt: &str,
        tx: mpsc::UnboundedSender<StreamEvent>,
    ) -> Result<()> {
        let request = GenerateRequest {
            prompt,
            stream: true,
        };
        let response = self.client.post(endpoint).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "Chat request failed with status: {}. Is the agent running?",
                response.status()
            ));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(pos) = buffer.find('\n') {
                let line: String = buffer.drain(..=pos).collect();
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let parsed: GenerateChunk = serde_json::from_str(line)?;
                if !parsed.response.is_empty() {
                    let _ = tx.send(StreamEvent::Delta(parsed.response));
                }
                if parsed.done {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Chat session: append-only message list plus at most one live streaming
/// entry. Chunks arrive on a channel and are drained on the UI tick, so a
/// finalized message and a residual buffer never coexist across a render.
pub struct ChatSession {
    pub messages: Vec<ChatMessage>,
    pub streaming: Option<String>,
    pub is_loading: bool,
    stream_rx: Option<mpsc::UnboundedReceiver<StreamEvent>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            streaming: None,
            is_loading: false,
            stream_rx: None,
            task: None,
        }
    }

    pub fn busy(&self) -> bool {
        self.is_loading || self.streaming.is_some()
    }

    /// Thinking indicator shows only before the first streamed chunk, so
    /// the user never sees "Thinking" under live text.
    pub fn show_thinking(&self) -> bool {
        self.is_loading && self.streaming.is_none()
    }

    /// Append the user message and spawn the streaming request.
    pub fn send(&mut self, text: String, transport: Arc<dyn ChatTransport>, endpoint: String) {
        if self.busy() {
            return;
        }
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            text,
        });
        self.is_loading = true;

        let prompt = build_chat_prompt(&self.messages);
        let (tx, rx) = mpsc::unbounded_channel();
        self.stream_rx = Some(rx);
        self.task = Some(tokio::spawn(async move {
            let result = transport.stream_reply(&endpoint, &prompt, tx.clone()).await;
            let _ = tx.send(StreamEvent::Done(result));
        }));
    }

    /// Drain pending stream events. Returns true when the stream finalized
    /// during this call (message appended, buffer cleared atomically with
    /// respect to the render cycle).
    pub fn drain_stream(&mut self) -> bool {
        let Some(rx) = self.stream_rx.as_mut() else {
            return false;
        };

        let mut finalized = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                StreamEvent::Delta(text) => {
                    self.streaming.get_or_insert_with(String::new).push_str(&text);
                }
                StreamEvent::Done(result) => {
                    match result {
                        Ok(()) => {
                            if let Some(text) = self.streaming.take() {
                                self.messages.push(ChatMessage {
                                    role: ChatRole::Assistant,
                                    text,
                                });
                            }
                        }
                        Err(err) => {
                            // Partial text is kept; the error lands as its
                            // own assistant entry with the cause when known.
                            if let Some(text) = self.streaming.take() {
                                self.messages.push(ChatMessage {
                                    role: ChatRole::Assistant,
                                    text,
                                });
                            }
                            self.messages.push(ChatMessage {
                                role: ChatRole::Assistant,
                                text: format!("Error: {err}"),
                            });
                        }
                    }
                    self.is_loading = false;
                    self.stream_rx = None;
                    self.task = None;
                    finalized = true;
                    break;
                }
            }
        }
        finalized
    }

    /// Session switch clears everything, including a live stream.
    pub fn clear(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.messages.clear();
        self.streaming = None;
        self.is_loading = false;
        self.stream_rx = None;
    }
}

fn build_chat_prompt(messages: &[ChatMessage]) -> String {
    let mut prompt = String::new();

    if messages.len() > 1 {
        prompt.push_str("Conversation so far:\n");
        for msg in messages.iter().take(messages.len().saturating_sub(1)) {
            match msg.role {
                ChatRole::User => prompt.push_str(&format!("User: {}\n", msg.text)),
                ChatRole::Assistant => prompt.push_str(&format!("Assistant: {}\n", msg.text)),
            }
        }
        prompt.push('\n');
    }

    if let Some(last) = messages.last() {
        prompt.push_str(&last.text);
    }

    prompt
}
