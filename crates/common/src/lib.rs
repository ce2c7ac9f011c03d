//! Shared types, configuration and collaborator interfaces for Pushcast.

pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod transport;
pub mod types;
