//! Transport-ready message content.
//!
//! Produced by the engine's content resolver and consumed by `Transport`
//! implementations. Nothing in here is escaped or validated again
//! downstream: a `ResolvedContent` is sent as-is.

use serde::{Deserialize, Serialize};

/// Markup dialect applied to free-form text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParseMode {
    MarkdownV2,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::MarkdownV2 => "MarkdownV2",
        }
    }
}

/// Kind of media attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
    Document,
    Audio,
}

impl MediaKind {
    /// Placeholder prefix used when a media message is degraded to text.
    pub fn placeholder(&self) -> &'static str {
        match self {
            MediaKind::Photo => "[Photo]",
            MediaKind::Video => "[Video]",
            MediaKind::Document => "[Document]",
            MediaKind::Audio => "[Audio]",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Photo => write!(f, "photo"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Document => write!(f, "document"),
            MediaKind::Audio => write!(f, "audio"),
        }
    }
}

/// Message body: plain text, or a media reference with a caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentPayload {
    Text {
        text: String,
    },
    Media {
        kind: MediaKind,
        media_ref: String,
        caption: String,
    },
}

/// What pressing an inline button does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

/// Inline keyboard attached under a message. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

/// Fully resolved content of a push, ready for `Transport::deliver`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedContent {
    pub payload: ContentPayload,
    pub parse_mode: Option<ParseMode>,
    pub keyboard: Option<InlineKeyboard>,
}

impl ResolvedContent {
    pub fn is_media(&self) -> bool {
        matches!(self.payload, ContentPayload::Media { .. })
    }
}
