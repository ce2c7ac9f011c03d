//! Content resolver: turns a stored push into transport-ready content.
//!
//! 1. Parses the stored content kind and checks media presence
//! 2. Escapes operator free text when MarkdownV2 is enabled
//! 3. Expands the stored button layout into an inline keyboard, dropping
//!    invalid buttons instead of failing the push
//!
//! Pure transform, no I/O.

use thiserror::Error;

use pushcast_common::content::{
    ButtonAction, ContentPayload, InlineButton, InlineKeyboard, ParseMode, ResolvedContent,
};
use pushcast_common::types::{ButtonSpec, ContentType, Push, StoredButton};

/// Characters reserved by Telegram MarkdownV2 outside code entities.
const MARKDOWN_V2_RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("unsupported content type '{0}'")]
    UnsupportedType(String),

    #[error("content type '{0}' requires a media reference")]
    MissingMedia(ContentType),
}

/// Stateless resolver for push content.
pub struct ContentResolver;

impl ContentResolver {
    /// Resolve a push into content that can be handed to a transport.
    pub fn resolve(push: &Push) -> Result<ResolvedContent, ContentError> {
        let content_type: ContentType = push
            .content_type
            .parse()
            .map_err(ContentError::UnsupportedType)?;

        let parse_mode = push.use_markdown.then_some(ParseMode::MarkdownV2);
        let text = Self::markup(&push.content, parse_mode);

        let payload = match content_type.media_kind() {
            None => ContentPayload::Text { text },
            Some(kind) => {
                let media_ref = push
                    .media_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .ok_or(ContentError::MissingMedia(content_type))?;

                ContentPayload::Media {
                    kind,
                    media_ref: media_ref.to_string(),
                    caption: text,
                }
            }
        };

        let keyboard = push
            .buttons
            .as_ref()
            .and_then(|spec| Self::build_keyboard(push.push_id, spec));

        Ok(ResolvedContent {
            payload,
            parse_mode,
            keyboard,
        })
    }

    /// Text-only stand-in for a media message, used when the media send fails.
    ///
    /// Carries a placeholder for the media kind, the original caption and the
    /// media reference as plain text, with the same markup and keyboard.
    /// Returns `None` for content that is already text.
    pub fn text_fallback(content: &ResolvedContent) -> Option<ResolvedContent> {
        let ContentPayload::Media {
            kind,
            media_ref,
            caption,
        } = &content.payload
        else {
            return None;
        };

        // The caption was escaped during resolution; placeholder and
        // reference are new free text at this point.
        let text = format!(
            "{} {}\n{}",
            Self::markup(kind.placeholder(), content.parse_mode),
            caption,
            Self::markup(media_ref, content.parse_mode)
        );

        Some(ResolvedContent {
            payload: ContentPayload::Text { text },
            parse_mode: content.parse_mode,
            keyboard: content.keyboard.clone(),
        })
    }

    fn markup(text: &str, parse_mode: Option<ParseMode>) -> String {
        match parse_mode {
            Some(ParseMode::MarkdownV2) => escape_markdown_v2(text),
            None => text.to_string(),
        }
    }

    /// Build the inline keyboard, skipping invalid buttons and empty rows.
    fn build_keyboard(push_id: i64, spec: &ButtonSpec) -> Option<InlineKeyboard> {
        let rows: Vec<Vec<InlineButton>> = spec
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter_map(|button| {
                        let resolved = Self::resolve_button(button);
                        if resolved.is_none() {
                            tracing::warn!(
                                push_id,
                                button = ?button,
                                "Dropping invalid button (needs a label and exactly one of url/callback_data)"
                            );
                        }
                        resolved
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();

        if rows.is_empty() {
            if !spec.is_empty() {
                tracing::warn!(push_id, "No valid buttons left, sending without keyboard");
            }
            return None;
        }

        Some(InlineKeyboard { rows })
    }

    fn resolve_button(button: &StoredButton) -> Option<InlineButton> {
        let label = button.text.as_deref().map(str::trim).filter(|l| !l.is_empty())?;
        let url = button.url.as_deref().filter(|u| !u.is_empty());
        let callback = button.callback_data.as_deref().filter(|c| !c.is_empty());

        let action = match (url, callback) {
            (Some(url), None) => ButtonAction::Url(url.to_string()),
            (None, Some(data)) => ButtonAction::Callback(data.to_string()),
            _ => return None,
        };

        Some(InlineButton {
            label: label.to_string(),
            action,
        })
    }
}

/// Escape every MarkdownV2 reserved character with a backslash.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() * 2);
    for ch in text.chars() {
        if MARKDOWN_V2_RESERVED.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}
