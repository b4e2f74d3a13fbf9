//! WhatsApp Cloud API adapter.
//!
//! Inbound: webhook payload types, subscription verification and extraction
//! of text messages. Outbound: a Graph API sender with bounded retry and the
//! owner notifier built on top of it.

pub mod notify;
pub mod outbound;
pub mod types;
pub mod webhook;

pub use {
    notify::WhatsAppOwnerNotifier,
    outbound::WhatsAppOutbound,
    types::WebhookPayload,
    webhook::{extract_messages, parse_payload, verify_subscription},
};
