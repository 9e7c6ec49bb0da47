//! Telegram Bot API transport.
//!
//! Long-polls `getUpdates`, feeds each text message to [`Bot::handle`], and
//! sends the replies back. Errors talking to Telegram are logged and the loop
//! keeps going; nothing here can change navigation state.
//!
//! # Why Long Polling
//!
//! The bot runs as a plain process with no public endpoint, so it pulls
//! updates instead of receiving webhooks. The agent's global timeout sits a
//! few seconds above the poll window so an idle poll is never cut short.
//!
//! # Errors and Secrets
//!
//! Every request URL embeds the bot token. Errors are built from the method
//! name and Telegram's `description` only; the URL never reaches a log line
//! or an error chain. HTTP status codes are not treated as transport errors
//! because the API reports failures in the JSON body.
//!
//! # Auto-Delete
//!
//! With `auto_delete_secs` set, the messages of each shown record are handed
//! to the [`DeletionScheduler`]. Showing the next record to the same chat
//! makes the previous record's deletion due immediately.
use crate::bot::{Bot, Reply};
use crate::cleanup::{DeletionScheduler, MessageDeleter, TaskId};
use crate::config::TransportSettings;
use crate::identity::Identity;
use crate::render;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::thread;
use std::time::{Duration, Instant};
use ureq::Agent;

/// Pause after a failed poll before trying again.
const POLL_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Clone)]
pub struct TelegramClient {
    agent: Agent,
    base: String,
}

impl TelegramClient {
    /// `poll_timeout` is the long-poll window; requests get a margin above it.
    pub fn new(settings: &TransportSettings, poll_timeout: Duration) -> Self {
        let config = Agent::config_builder()
            .timeout_global(Some(poll_timeout + Duration::from_secs(10)))
            .http_status_as_error(false)
            .build();
        TelegramClient {
            agent: Agent::new_with_config(config),
            base: format!("{}/bot{}", settings.api_url, settings.token),
        }
    }

    fn call<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<T> {
        let url = format!("{}/{method}", self.base);
        let start = Instant::now();
        // The URL carries the token, so it never goes into error context.
        let mut response = self
            .agent
            .post(url.as_str())
            .send_json(body)
            .with_context(|| format!("telegram {method} request"))?;
        let parsed: ApiResponse<T> = response
            .body_mut()
            .read_json()
            .with_context(|| format!("decode telegram {method} response"))?;
        tracing::debug!(
            method,
            elapsed_ms = start.elapsed().as_millis(),
            ok = parsed.ok,
            "telegram call complete"
        );
        if !parsed.ok {
            return Err(anyhow!(
                "telegram {method} failed: {}",
                parsed.description.unwrap_or_else(|| "no description".to_string())
            ));
        }
        parsed
            .result
            .ok_or_else(|| anyhow!("telegram {method} returned no result"))
    }

    pub fn get_me(&self) -> Result<BotUser> {
        self.call("getMe", &json!({}))
    }

    pub fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>> {
        self.call(
            "getUpdates",
            &json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message"],
            }),
        )
    }

    /// Returns the id of the sent message.
    pub fn send_message(&self, chat: &Identity, text: &str) -> Result<i64> {
        let message: Message = self.call(
            "sendMessage",
            &json!({
                "chat_id": chat.as_str(),
                "text": text,
            }),
        )?;
        Ok(message.message_id)
    }

    pub fn delete_message(&self, chat: &Identity, message_id: i64) -> Result<()> {
        let deleted: bool = self.call(
            "deleteMessage",
            &json!({
                "chat_id": chat.as_str(),
                "message_id": message_id,
            }),
        )?;
        if !deleted {
            return Err(anyhow!("telegram refused to delete message {message_id}"));
        }
        Ok(())
    }
}

impl MessageDeleter for TelegramClient {
    fn delete(&self, chat: &Identity, message_id: i64) -> Result<()> {
        self.delete_message(chat, message_id)
    }
}

pub struct PollOptions {
    pub timeout_secs: u64,
    pub contact_phone: String,
    pub auto_delete_after: Option<Duration>,
}

/// Poll forever, answering each message in arrival order.
pub fn run(
    bot: &Bot,
    client: &TelegramClient,
    options: &PollOptions,
    cleanup: Option<&DeletionScheduler>,
) -> Result<()> {
    let mut offset = 0_i64;
    let mut shown: HashMap<Identity, TaskId> = HashMap::new();
    tracing::info!(timeout_secs = options.timeout_secs, "polling for updates");
    loop {
        let updates = match client.get_updates(offset, options.timeout_secs) {
            Ok(updates) => updates,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "getUpdates failed");
                thread::sleep(POLL_BACKOFF);
                continue;
            }
        };
        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text.as_deref() else {
                continue;
            };
            let chat = Identity::from_chat_id(message.chat.id);
            let Some(reply) = bot.handle(&chat, text) else {
                continue;
            };
            deliver(client, &chat, reply, options, cleanup, &mut shown);
        }
    }
}

fn deliver(
    client: &TelegramClient,
    chat: &Identity,
    reply: Reply,
    options: &PollOptions,
    cleanup: Option<&DeletionScheduler>,
    shown: &mut HashMap<Identity, TaskId>,
) {
    match reply {
        Reply::Text(text) => {
            if let Err(err) = client.send_message(chat, &text) {
                tracing::warn!(error = %format!("{err:#}"), "sendMessage failed");
            }
        }
        Reply::Record(view) => {
            let mut sent = Vec::new();
            for text in render::record_messages(&view, &options.contact_phone) {
                match client.send_message(chat, &text) {
                    Ok(message_id) => sent.push(message_id),
                    Err(err) => {
                        tracing::warn!(error = %format!("{err:#}"), "sendMessage failed");
                        break;
                    }
                }
            }
            let (Some(scheduler), Some(delay)) = (cleanup, options.auto_delete_after) else {
                return;
            };
            // The record this chat was looking at goes away as soon as the next one lands.
            if let Some(previous) = shown.remove(chat) {
                scheduler.expedite(previous);
            }
            if !sent.is_empty() {
                shown.insert(chat.clone(), scheduler.schedule(chat, sent, delay));
            }
            tracing::debug!(pending = scheduler.pending(), "deletions scheduled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    /// Serve one canned JSON response and hand back the request body.
    fn one_shot_server(response_body: &'static str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind test server");
        let addr = listener.local_addr().expect("local addr");
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
            let mut content_length = 0usize;
            let mut chunked = false;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).expect("read header");
                let line = line.trim_end();
                if line.is_empty() {
                    break;
                }
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().expect("content length");
                    } else if name.eq_ignore_ascii_case("transfer-encoding") {
                        chunked = value.trim().eq_ignore_ascii_case("chunked");
                    }
                }
            }
            let mut body = Vec::new();
            if chunked {
                loop {
                    let mut size_line = String::new();
                    reader.read_line(&mut size_line).expect("read chunk size");
                    let size = usize::from_str_radix(size_line.trim(), 16).expect("chunk size");
                    let mut chunk = vec![0u8; size + 2];
                    reader.read_exact(&mut chunk).expect("read chunk");
                    if size == 0 {
                        break;
                    }
                    body.extend_from_slice(&chunk[..size]);
                }
            } else {
                body.resize(content_length, 0);
                reader.read_exact(&mut body).expect("read body");
            }
            tx.send(String::from_utf8_lossy(&body).to_string())
                .expect("send body");
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                response_body.len(),
                response_body
            )
            .expect("write response");
        });
        (format!("http://{addr}"), rx)
    }

    fn client(api_url: String) -> TelegramClient {
        TelegramClient::new(
            &TransportSettings {
                token: "123:test".to_string(),
                api_url,
            },
            Duration::from_secs(1),
        )
    }

    #[test]
    fn send_message_returns_message_id() {
        let (url, requests) = one_shot_server(
            r#"{"ok":true,"result":{"message_id":77,"chat":{"id":5},"text":"hi"}}"#,
        );
        let id = client(url)
            .send_message(&Identity::new("5"), "hi")
            .expect("send message");
        assert_eq!(id, 77);
        let body: Value =
            serde_json::from_str(&requests.recv().expect("request body")).expect("json body");
        assert_eq!(body["chat_id"], "5");
        assert_eq!(body["text"], "hi");
    }

    #[test]
    fn api_errors_carry_description() {
        let (url, _requests) =
            one_shot_server(r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked"}"#);
        let err = client(url)
            .send_message(&Identity::new("5"), "hi")
            .expect_err("api error");
        let text = format!("{err:#}");
        assert!(text.contains("bot was blocked"));
        assert!(!text.contains("123:test"));
    }

    #[test]
    fn updates_without_text_decode() {
        let raw = r#"{"ok":true,"result":[
            {"update_id":10,"message":{"message_id":1,"chat":{"id":-100},"text":"/next"}},
            {"update_id":11,"message":{"message_id":2,"chat":{"id":7},"photo":[]}},
            {"update_id":12,"edited_message":{"message_id":3,"chat":{"id":7}}}
        ]}"#;
        let parsed: ApiResponse<Vec<Update>> = serde_json::from_str(raw).expect("decode updates");
        let updates = parsed.result.expect("result");
        assert_eq!(updates.len(), 3);
        assert_eq!(
            updates[0].message.as_ref().and_then(|m| m.text.as_deref()),
            Some("/next")
        );
        assert!(updates[1].message.as_ref().is_some_and(|m| m.text.is_none()));
        assert!(updates[2].message.is_none());
    }
}
