//! Outbound messaging transports.

pub mod telegram;

pub use telegram::TelegramTransport;
