//! Messaging transport capability consumed by the dispatch engine.

use async_trait::async_trait;
use thiserror::Error;

use crate::content::ResolvedContent;
use crate::types::MessageRef;

/// Classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    RateLimited,
    InvalidRecipient,
    NetworkError,
    Rejected,
}

impl std::fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportErrorKind::RateLimited => write!(f, "rate_limited"),
            TransportErrorKind::InvalidRecipient => write!(f, "invalid_recipient"),
            TransportErrorKind::NetworkError => write!(f, "network_error"),
            TransportErrorKind::Rejected => write!(f, "rejected"),
        }
    }
}

/// A failed transport call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NetworkError, detail)
    }

    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rejected, detail)
    }
}

/// Send/delete primitives of a messaging transport.
///
/// Implementations bound every call with their own timeout; a timed-out call
/// returns `TransportErrorKind::NetworkError`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver content to one address, returning the transport's message reference.
    async fn deliver(
        &self,
        address: &str,
        content: &ResolvedContent,
    ) -> Result<MessageRef, TransportError>;

    /// Delete a previously delivered message.
    async fn retract(&self, address: &str, message_ref: MessageRef) -> Result<(), TransportError>;
}
