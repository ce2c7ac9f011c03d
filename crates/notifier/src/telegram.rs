//! Telegram Bot API transport.
//!
//! One JSON POST per call against `{api_url}/bot{token}/{method}`. Resolved
//! content maps onto `sendMessage` or the media method of its kind; the
//! returned `message_id` is the message reference used for retraction.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use pushcast_common::config::AppConfig;
use pushcast_common::content::{ButtonAction, ContentPayload, InlineKeyboard, MediaKind, ResolvedContent};
use pushcast_common::error::AppError;
use pushcast_common::transport::{Transport, TransportError, TransportErrorKind};
use pushcast_common::types::MessageRef;

/// Bot API error descriptions that mean the chat can't be reached at all.
const UNREACHABLE_CHAT_MARKERS: &[&str] = &[
    "chat not found",
    "user not found",
    "peer_id_invalid",
    "bot was blocked",
    "user is deactivated",
];

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<u16>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
}

pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let token = config
            .telegram_bot_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Config("TELEGRAM_BOT_TOKEN is required".to_string()))?;

        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.transport_timeout_secs))
            .user_agent("pushcast/0.1");

        if let Some(proxy_url) = &config.https_proxy {
            let proxy = reqwest::Proxy::https(proxy_url)
                .map_err(|e| AppError::Config(format!("Invalid HTTPS_PROXY: {}", e)))?;
            builder = builder.proxy(proxy);
            tracing::info!(proxy = %proxy_url, "Telegram transport using HTTPS proxy");
        }

        let client = builder
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.telegram_api_url.trim_end_matches('/'), token),
        })
    }

    async fn call<T>(&self, method: &str, body: &Value) -> Result<T, TransportError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base_url, method);

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::network(format!("{} request failed: {}", method, e.without_url())))?;

        let status = response.status().as_u16();
        let parsed: ApiResponse<T> = response.json().await.map_err(|e| {
            if status >= 400 {
                TransportError::new(classify(status, ""), format!("{} returned HTTP {}", method, status))
            } else {
                TransportError::network(format!("{} returned an unreadable body: {}", method, e.without_url()))
            }
        })?;

        if parsed.ok {
            return parsed
                .result
                .ok_or_else(|| TransportError::network(format!("{} returned ok without a result", method)));
        }

        let code = parsed.error_code.unwrap_or(status);
        let description = parsed.description.unwrap_or_default();
        let mut detail = format!("{} failed ({}): {}", method, code, description);
        if let Some(retry_after) = parsed.parameters.and_then(|p| p.retry_after) {
            detail.push_str(&format!(", retry after {}s", retry_after));
        }

        Err(TransportError::new(classify(code, &description), detail))
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn deliver(
        &self,
        address: &str,
        content: &ResolvedContent,
    ) -> Result<MessageRef, TransportError> {
        let (method, body) = build_send_request(address, content);
        let sent: SentMessage = self.call(method, &body).await?;

        tracing::debug!(chat_id = address, method, message_id = sent.message_id, "Telegram message sent");
        Ok(MessageRef(sent.message_id))
    }

    async fn retract(&self, address: &str, message_ref: MessageRef) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": chat_id_value(address),
            "message_id": message_ref.0,
        });

        let deleted: bool = self.call("deleteMessage", &body).await?;
        if !deleted {
            return Err(TransportError::rejected("deleteMessage returned false"));
        }

        tracing::debug!(chat_id = address, message_id = message_ref.0, "Telegram message deleted");
        Ok(())
    }
}

/// Map an HTTP/Bot API error code and description to a transport error kind.
pub fn classify(code: u16, description: &str) -> TransportErrorKind {
    let description = description.to_ascii_lowercase();
    match code {
        429 => TransportErrorKind::RateLimited,
        403 => TransportErrorKind::InvalidRecipient,
        400 if UNREACHABLE_CHAT_MARKERS
            .iter()
            .any(|marker| description.contains(marker)) =>
        {
            TransportErrorKind::InvalidRecipient
        }
        400..=499 => TransportErrorKind::Rejected,
        _ => TransportErrorKind::NetworkError,
    }
}

fn chat_id_value(address: &str) -> Value {
    address
        .parse::<i64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(address.to_string()))
}

fn media_method(kind: MediaKind) -> (&'static str, &'static str) {
    match kind {
        MediaKind::Photo => ("sendPhoto", "photo"),
        MediaKind::Video => ("sendVideo", "video"),
        MediaKind::Document => ("sendDocument", "document"),
        MediaKind::Audio => ("sendAudio", "audio"),
    }
}

fn reply_markup(keyboard: &InlineKeyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| match &button.action {
                    ButtonAction::Url(url) => json!({ "text": button.label, "url": url }),
                    ButtonAction::Callback(data) => {
                        json!({ "text": button.label, "callback_data": data })
                    }
                })
                .collect()
        })
        .collect();

    json!({ "inline_keyboard": rows })
}

/// Bot API method and JSON body for delivering `content` to `address`.
pub fn build_send_request(address: &str, content: &ResolvedContent) -> (&'static str, Value) {
    let (method, mut body) = match &content.payload {
        ContentPayload::Text { text } => (
            "sendMessage",
            json!({ "chat_id": chat_id_value(address), "text": text }),
        ),
        ContentPayload::Media {
            kind,
            media_ref,
            caption,
        } => {
            let (method, field) = media_method(*kind);
            let mut body = json!({ "chat_id": chat_id_value(address), field: media_ref });
            if !caption.is_empty() {
                body["caption"] = json!(caption);
            }
            (method, body)
        }
    };

    if let Some(mode) = content.parse_mode {
        body["parse_mode"] = json!(mode.as_str());
    }
    if let Some(keyboard) = &content.keyboard {
        body["reply_markup"] = reply_markup(keyboard);
    }

    (method, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushcast_common::content::{InlineButton, ParseMode};

    fn config(token: Option<&str>, proxy: Option<&str>) -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/pushcast".to_string()),
            "JWT_SECRET" => Some("secret".to_string()),
            "TELEGRAM_BOT_TOKEN" => token.map(str::to_string),
            "HTTPS_PROXY" => proxy.map(str::to_string),
            "TELEGRAM_API_URL" => Some("http://localhost:8081/".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(429, "Too Many Requests: retry after 5"), TransportErrorKind::RateLimited);
        assert_eq!(
            classify(403, "Forbidden: bot was blocked by the user"),
            TransportErrorKind::InvalidRecipient
        );
        assert_eq!(classify(400, "Bad Request: chat not found"), TransportErrorKind::InvalidRecipient);
        assert_eq!(
            classify(400, "Bad Request: can't parse entities"),
            TransportErrorKind::Rejected
        );
        assert_eq!(
            classify(400, "Bad Request: wrong file identifier/HTTP URL specified"),
            TransportErrorKind::Rejected
        );
        assert_eq!(classify(502, "Bad Gateway"), TransportErrorKind::NetworkError);
    }

    #[test]
    fn test_text_request() {
        let content = ResolvedContent {
            payload: ContentPayload::Text {
                text: "hello".to_string(),
            },
            parse_mode: None,
            keyboard: None,
        };

        let (method, body) = build_send_request("123456", &content);
        assert_eq!(method, "sendMessage");
        assert_eq!(body, json!({ "chat_id": 123456, "text": "hello" }));
    }

    #[test]
    fn test_media_request_with_markup_and_keyboard() {
        let content = ResolvedContent {
            payload: ContentPayload::Media {
                kind: MediaKind::Photo,
                media_ref: "AgACAgI".to_string(),
                caption: "New \\*deal\\*".to_string(),
            },
            parse_mode: Some(ParseMode::MarkdownV2),
            keyboard: Some(InlineKeyboard {
                rows: vec![vec![
                    InlineButton {
                        label: "Open".to_string(),
                        action: ButtonAction::Url("https://example.com".to_string()),
                    },
                    InlineButton {
                        label: "Later".to_string(),
                        action: ButtonAction::Callback("snooze".to_string()),
                    },
                ]],
            }),
        };

        let (method, body) = build_send_request("77", &content);
        assert_eq!(method, "sendPhoto");
        assert_eq!(body["photo"], "AgACAgI");
        assert_eq!(body["caption"], "New \\*deal\\*");
        assert_eq!(body["parse_mode"], "MarkdownV2");
        assert_eq!(
            body["reply_markup"],
            json!({ "inline_keyboard": [[
                { "text": "Open", "url": "https://example.com" },
                { "text": "Later", "callback_data": "snooze" }
            ]] })
        );
    }

    #[test]
    fn test_media_methods() {
        assert_eq!(media_method(MediaKind::Video), ("sendVideo", "video"));
        assert_eq!(media_method(MediaKind::Document), ("sendDocument", "document"));
        assert_eq!(media_method(MediaKind::Audio), ("sendAudio", "audio"));
    }

    #[test]
    fn test_non_numeric_chat_id_kept_as_string() {
        assert_eq!(chat_id_value("@channel"), json!("@channel"));
        assert_eq!(chat_id_value("-100123"), json!(-100123));
    }

    #[test]
    fn test_requires_token() {
        assert!(matches!(
            TelegramTransport::new(&config(None, None)),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn test_base_url_trims_trailing_slash() {
        let transport = TelegramTransport::new(&config(Some("123:abc"), None)).unwrap();
        assert_eq!(transport.base_url, "http://localhost:8081/bot123:abc");
    }

    #[test]
    fn test_invalid_proxy_rejected() {
        let result = TelegramTransport::new(&config(Some("123:abc"), Some("not a url")));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
