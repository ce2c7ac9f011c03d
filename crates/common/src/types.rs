use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::MediaKind;

/// Primary key of a push.
pub type PushId = i64;

/// Primary key of a recipient.
pub type RecipientId = i64;

/// Lifecycle status of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PushStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Cancelled,
}

impl PushStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PushStatus::Draft => "draft",
            PushStatus::Scheduled => "scheduled",
            PushStatus::Sending => "sending",
            PushStatus::Completed => "completed",
            PushStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PushStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PushStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(PushStatus::Draft),
            "scheduled" => Ok(PushStatus::Scheduled),
            "sending" => Ok(PushStatus::Sending),
            "completed" => Ok(PushStatus::Completed),
            "cancelled" => Ok(PushStatus::Cancelled),
            other => Err(format!("unknown push status '{}'", other)),
        }
    }
}

/// Kind of content a push carries.
///
/// Stored as free text on the push row; parsing happens in the content
/// resolver so that an unknown stored kind surfaces as a dispatch error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Photo,
    Video,
    Document,
    Audio,
}

impl ContentType {
    /// Valid stored values, matching `ContentType::Display` output.
    pub const ALL: &[&str] = &["text", "photo", "video", "document", "audio"];

    /// The media kind for non-text content, `None` for text.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            ContentType::Text => None,
            ContentType::Photo => Some(MediaKind::Photo),
            ContentType::Video => Some(MediaKind::Video),
            ContentType::Document => Some(MediaKind::Document),
            ContentType::Audio => Some(MediaKind::Audio),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentType::Text => write!(f, "text"),
            ContentType::Photo => write!(f, "photo"),
            ContentType::Video => write!(f, "video"),
            ContentType::Document => write!(f, "document"),
            ContentType::Audio => write!(f, "audio"),
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ContentType::Text),
            "photo" => Ok(ContentType::Photo),
            "video" => Ok(ContentType::Video),
            "document" => Ok(ContentType::Document),
            "audio" => Ok(ContentType::Audio),
            other => Err(other.to_string()),
        }
    }
}

/// Outcome status of a delivery log row.
///
/// `Delivered` and `Read` are written by channels outside the dispatch
/// engine (e.g. webhook callbacks); the engine only produces `Sent` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Read => "read",
            DeliveryStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sent" => Ok(DeliveryStatus::Sent),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "read" => Ok(DeliveryStatus::Read),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status '{}'", other)),
        }
    }
}

/// Transport-assigned identifier of a delivered message, kept for retraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub i64);

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered list of recipient ids a push targets.
///
/// Decoded from the stored JSON column by the persistence adapter. A value
/// that cannot be decoded is carried as `Malformed` so the dispatch run can
/// reject it instead of silently targeting nobody.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetList {
    Ids(Vec<RecipientId>),
    Malformed(String),
}

impl TargetList {
    /// Decode a stored target list.
    ///
    /// Accepts a JSON array of integers, or a string holding such an array
    /// (rows written by older clients double-encode the list).
    pub fn decode(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(raw) => match serde_json::from_str::<Vec<RecipientId>>(raw) {
                Ok(ids) => TargetList::Ids(ids),
                Err(_) => TargetList::Malformed(raw.clone()),
            },
            other => match serde_json::from_value::<Vec<RecipientId>>(other.clone()) {
                Ok(ids) => TargetList::Ids(ids),
                Err(_) => TargetList::Malformed(other.to_string()),
            },
        }
    }

    /// Encode for storage. A malformed list is written back verbatim.
    pub fn encode(&self) -> serde_json::Value {
        match self {
            TargetList::Ids(ids) => serde_json::json!(ids),
            TargetList::Malformed(raw) => serde_json::Value::String(raw.clone()),
        }
    }
}

/// One button as stored. Validation is deferred to the content resolver,
/// which drops entries that lack a label or don't carry exactly one action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredButton {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub callback_data: Option<String>,
}

/// Button specification of a push: ordered rows of buttons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ButtonSpec {
    pub rows: Vec<Vec<StoredButton>>,
}

impl ButtonSpec {
    /// Decode a stored button specification.
    ///
    /// Each top-level element is either one button (a row of one) or an array
    /// of buttons. Elements of any other shape become empty buttons so that
    /// the resolver reports and drops them. A string value is parsed as JSON
    /// first; anything unparseable yields an empty specification.
    pub fn decode(value: &serde_json::Value) -> Self {
        let parsed: serde_json::Value;
        let value = match value {
            serde_json::Value::String(raw) => match serde_json::from_str(raw) {
                Ok(v) => {
                    parsed = v;
                    &parsed
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Stored button specification is not valid JSON");
                    return Self::default();
                }
            },
            other => other,
        };

        let Some(elements) = value.as_array() else {
            tracing::warn!("Stored button specification is not an array");
            return Self::default();
        };

        let rows = elements
            .iter()
            .map(|element| match element {
                serde_json::Value::Array(row) => row.iter().map(Self::decode_button).collect(),
                single => vec![Self::decode_button(single)],
            })
            .collect();

        Self { rows }
    }

    fn decode_button(value: &serde_json::Value) -> StoredButton {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn encode(&self) -> serde_json::Value {
        serde_json::to_value(&self.rows).unwrap_or(serde_json::Value::Array(Vec::new()))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// An operator-authored broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Push {
    pub push_id: PushId,
    pub title: String,
    pub content: String,
    /// Raw stored content kind; see [`ContentType`].
    pub content_type: String,
    pub media_url: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub status: PushStatus,
    pub target_recipient_ids: TargetList,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub sent_count: i64,
    pub delivered_count: i64,
    pub read_count: i64,
    pub use_markdown: bool,
    pub buttons: Option<ButtonSpec>,
}

/// A registered subscriber reachable through the transport.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Recipient {
    pub recipient_id: RecipientId,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipient {
    /// Transport address of this recipient.
    pub fn address(&self) -> String {
        self.telegram_id.to_string()
    }
}

/// One persisted delivery attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryLog {
    pub log_id: i64,
    pub push_id: PushId,
    pub recipient_id: RecipientId,
    pub status: DeliveryStatus,
    pub error_message: Option<String>,
    pub message_ref: Option<MessageRef>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Result of a single delivery attempt, as it will be recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Sent {
        message_ref: MessageRef,
        sent_at: DateTime<Utc>,
    },
    Failed {
        error: String,
    },
}

/// A log row about to be appended.
///
/// The outcome enum keeps the presence rules intact: a message reference
/// exists only for sent rows and an error message only for failed ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeliveryLog {
    pub push_id: PushId,
    pub recipient_id: RecipientId,
    pub outcome: AttemptOutcome,
}

impl NewDeliveryLog {
    pub fn sent(push_id: PushId, recipient_id: RecipientId, message_ref: MessageRef) -> Self {
        Self {
            push_id,
            recipient_id,
            outcome: AttemptOutcome::Sent {
                message_ref,
                sent_at: Utc::now(),
            },
        }
    }

    pub fn failed(push_id: PushId, recipient_id: RecipientId, error: impl Into<String>) -> Self {
        Self {
            push_id,
            recipient_id,
            outcome: AttemptOutcome::Failed {
                error: error.into(),
            },
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        match self.outcome {
            AttemptOutcome::Sent { .. } => DeliveryStatus::Sent,
            AttemptOutcome::Failed { .. } => DeliveryStatus::Failed,
        }
    }

    pub fn message_ref(&self) -> Option<MessageRef> {
        match self.outcome {
            AttemptOutcome::Sent { message_ref, .. } => Some(message_ref),
            AttemptOutcome::Failed { .. } => None,
        }
    }

    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        match self.outcome {
            AttemptOutcome::Sent { sent_at, .. } => Some(sent_at),
            AttemptOutcome::Failed { .. } => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Sent { .. } => None,
            AttemptOutcome::Failed { error } => Some(error),
        }
    }
}
