//! Shared types, error helpers, and utilities used across all concierge crates.

pub mod error;
pub mod text;
pub mod types;

pub use {
    error::FromMessage,
    text::normalize_text,
    types::InboundMessage,
};
