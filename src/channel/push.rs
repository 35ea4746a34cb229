//! Push channel — Telegram-style: sends a message with inline "Approve" /
//! "Deny" buttons, long-polls for the matching callback, and edits the
//! message in place once a verdict is known.
//!
//! The pending-request correlation (`oneshot` per request id, resolved by a
//! background poller) is grounded on the `ChannelApprovalGate` pattern found
//! in the example pack (`wqswing-MutilAgent-AI`): a
//! `HashMap<String, oneshot::Sender<_>>` keyed by request id, with
//! `tokio::time::timeout` enforcing the deadline.
//!
//! **Serialization invariant.** At most one prompt is outstanding at a time;
//! concurrent `ask` calls queue on `serialize` and run in arrival order —
//! `tokio::sync::Mutex` is a fair (FIFO) semaphore internally, which gives
//! us that ordering for free.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex as AsyncMutex};

use crate::channel::format::format_action;
use crate::channel::{AskResponse, Channel};
use crate::policy::types::Action;

const MAX_SEND_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(300);
const LONG_POLL_SECONDS: i64 = 25;

struct Inner {
    client: reqwest::Client,
    bot_token: String,
    chat_id: String,
    pending: StdMutex<HashMap<String, (oneshot::Sender<AskResponse>, i64)>>,
    offset: StdMutex<i64>,
    serialize: AsyncMutex<()>,
}

/// Telegram-backed push channel. Cloning shares the same background poller
/// and pending-request map.
#[derive(Clone)]
pub struct PushChannel {
    inner: Arc<Inner>,
}

impl PushChannel {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        let inner = Arc::new(Inner {
            client: reqwest::Client::builder()
                .user_agent("acp-gate/0.1.0")
                .build()
                .unwrap_or_default(),
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            pending: StdMutex::new(HashMap::new()),
            offset: StdMutex::new(0),
            serialize: AsyncMutex::new(()),
        });

        tokio::spawn(poll_loop(inner.clone()));

        Self { inner }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.inner.bot_token, method)
    }
}

#[async_trait]
impl Channel for PushChannel {
    async fn ask(&self, action: &Action, timeout: Duration) -> AskResponse {
        let _serialize_guard = self.inner.serialize.lock().await;

        let request_id = generate_request_id();
        let message_id = match self.send_prompt(action, &request_id).await {
            Ok(id) => id,
            Err(err) => return AskResponse::denied(format!("denied — {}", err)),
        };

        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .unwrap()
            .insert(request_id.clone(), (tx, message_id));

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.inner.pending.lock().unwrap().remove(&request_id);
                AskResponse::denied("Channel unreachable")
            }
            Err(_) => {
                self.inner.pending.lock().unwrap().remove(&request_id);
                self.edit_message(message_id, "⏱ Timed out — denied").await;
                AskResponse::denied("denied — timed out (Timed out)")
            }
        }
    }
}

impl PushChannel {
    async fn send_prompt(&self, action: &Action, request_id: &str) -> Result<i64, String> {
        let display = format_action(action);
        let markdown_text = format!(
            "*Approval requested*\n`{}`\n{}",
            escape_markdown(&display.title),
            escape_markdown(&display.detail)
        );
        let plain_text = format!("Approval requested\n{}\n{}", display.title, display.detail);

        let keyboard = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![
                InlineKeyboardButton {
                    text: "✅ Approve".to_string(),
                    callback_data: format!("approve:{}", request_id),
                },
                InlineKeyboardButton {
                    text: "❌ Deny".to_string(),
                    callback_data: format!("deny:{}", request_id),
                },
            ]],
        };

        let mut use_markdown = true;
        let mut last_err = String::new();

        for attempt in 0..MAX_SEND_ATTEMPTS {
            let text = if use_markdown { &markdown_text } else { &plain_text };
            let body = SendMessageBody {
                chat_id: &self.inner.chat_id,
                text,
                parse_mode: use_markdown.then_some("MarkdownV2"),
                reply_markup: &keyboard,
            };

            match self
                .inner
                .client
                .post(self.api_url("sendMessage"))
                .json(&body)
                .send()
                .await
            {
                Ok(resp) => match resp.json::<TelegramResponse<SentMessage>>().await {
                    Ok(parsed) if parsed.ok => {
                        if let Some(result) = parsed.result {
                            return Ok(result.message_id);
                        }
                    }
                    Ok(parsed) => {
                        let description = parsed.description.unwrap_or_default();
                        if use_markdown && description.contains("can't parse entities") {
                            // Markdown-render failure — retry once with markdown stripped.
                            use_markdown = false;
                            continue;
                        }
                        last_err = description;
                    }
                    Err(err) => last_err = err.to_string(),
                },
                Err(err) => last_err = err.to_string(),
            }

            if attempt + 1 < MAX_SEND_ATTEMPTS {
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
        }

        Err(last_err)
    }

    async fn edit_message(&self, message_id: i64, text: &str) {
        let body = EditMessageBody {
            chat_id: &self.inner.chat_id,
            message_id,
            text,
        };
        let _ = self
            .inner
            .client
            .post(self.api_url("editMessageText"))
            .json(&body)
            .send()
            .await;
    }
}

async fn poll_loop(inner: Arc<Inner>) {
    let client = inner.client.clone();
    loop {
        let offset = *inner.offset.lock().unwrap();
        let url = format!("https://api.telegram.org/bot{}/getUpdates", inner.bot_token);
        let result = client
            .get(&url)
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", LONG_POLL_SECONDS.to_string()),
                ("allowed_updates", "[\"callback_query\"]".to_string()),
            ])
            .send()
            .await;

        let updates = match result {
            Ok(resp) => match resp.json::<TelegramResponse<Vec<Update>>>().await {
                Ok(parsed) if parsed.ok => parsed.result.unwrap_or_default(),
                _ => {
                    tokio::time::sleep(RETRY_BACKOFF).await;
                    continue;
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "push channel poll failed, retrying");
                tokio::time::sleep(RETRY_BACKOFF).await;
                continue;
            }
        };

        for update in updates {
            *inner.offset.lock().unwrap() = update.update_id + 1;
            if let Some(callback) = update.callback_query {
                handle_callback(&inner, &client, callback).await;
            }
        }
    }
}

async fn handle_callback(inner: &Arc<Inner>, client: &reqwest::Client, callback: CallbackQuery) {
    let Some(data) = callback.data else { return };
    let Some((verb, request_id)) = data.split_once(':') else {
        return;
    };

    let entry = inner.pending.lock().unwrap().remove(request_id);
    let Some((tx, message_id)) = entry else {
        return;
    };

    let (response, label) = match verb {
        "approve" => (AskResponse::approved(), "✅ Approved"),
        _ => (AskResponse::denied("Denied by operator"), "❌ Denied"),
    };

    let _ = tx.send(response);

    let edit_url = format!("https://api.telegram.org/bot{}/editMessageText", inner.bot_token);
    let _ = client
        .post(&edit_url)
        .json(&EditMessageBody {
            chat_id: &inner.chat_id,
            message_id,
            text: label,
        })
        .send()
        .await;

    let ack_url = format!(
        "https://api.telegram.org/bot{}/answerCallbackQuery",
        inner.bot_token
    );
    let _ = client
        .post(&ack_url)
        .json(&serde_json::json!({ "callback_query_id": callback.id }))
        .send()
        .await;
}

fn generate_request_id() -> String {
    const HEX: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..8)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect();
    format!("req_{}", suffix)
}

fn escape_markdown(s: &str) -> String {
    const SPECIAL: &[char] = &[
        '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
    ];
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if SPECIAL.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Serialize)]
struct SendMessageBody<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    reply_markup: &'a InlineKeyboardMarkup,
}

#[derive(Serialize)]
struct EditMessageBody<'a> {
    chat_id: &'a str,
    message_id: i64,
    text: &'a str,
}

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize, Default)]
struct SentMessage {
    message_id: i64,
}

#[derive(Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    callback_query: Option<CallbackQuery>,
}

#[derive(Deserialize)]
struct CallbackQuery {
    id: String,
    #[serde(default)]
    data: Option<String>,
}
