//! WhatsApp webhook handling.

use std::collections::HashMap;

use {
    concierge_common::InboundMessage,
    tracing::{debug, warn},
};

use crate::types::WebhookPayload;

/// Parse a raw webhook body. Malformed payloads are logged and yield `None`.
pub fn parse_payload(body: &[u8]) -> Option<WebhookPayload> {
    match serde_json::from_slice(body) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(error = %e, bytes = body.len(), "malformed webhook payload");
            None
        },
    }
}

/// Turn a webhook payload into inbound text messages.
///
/// Only `messages` changes are read. A change whose metadata names a
/// different phone number id is skipped; an empty `phone_number_id` accepts
/// every change. Non-text messages are dropped.
pub fn extract_messages(payload: &WebhookPayload, phone_number_id: &str) -> Vec<InboundMessage> {
    let mut out = Vec::new();

    for entry in &payload.entry {
        for change in &entry.changes {
            if change.field != "messages" {
                debug!(field = %change.field, "ignoring non-message webhook");
                continue;
            }

            let value = &change.value;

            if !phone_number_id.is_empty()
                && let Some(metadata) = &value.metadata
                && metadata.phone_number_id != phone_number_id
            {
                warn!(
                    expected = %phone_number_id,
                    received = %metadata.phone_number_id,
                    "phone number ID mismatch"
                );
                continue;
            }

            let contacts: HashMap<&str, &str> = value
                .contacts
                .iter()
                .filter_map(|c| {
                    c.profile
                        .as_ref()
                        .filter(|p| !p.name.is_empty())
                        .map(|p| (c.wa_id.as_str(), p.name.as_str()))
                })
                .collect();

            for msg in &value.messages {
                let Some(text) = msg.text_body() else {
                    debug!(from = %msg.from, msg_type = %msg.message_type, "ignoring non-text message");
                    continue;
                };
                if msg.from.is_empty() {
                    debug!(message_id = %msg.id, "ignoring message without sender");
                    continue;
                }

                let mut inbound = InboundMessage::new(msg.from.clone(), text);
                if !msg.id.is_empty() {
                    inbound = inbound.with_message_id(msg.id.clone());
                }
                if let Some(name) = contacts.get(msg.from.as_str()) {
                    inbound = inbound.with_sender_name(*name);
                }
                out.push(inbound);
            }
        }
    }

    out
}

/// Verify webhook subscription (GET request).
///
/// WhatsApp sends a GET request with:
/// - `hub.mode=subscribe`
/// - `hub.verify_token=<your_verify_token>`
/// - `hub.challenge=<random_string>`
///
/// Returns `Some(challenge)` if verification succeeds.
pub fn verify_subscription(
    mode: Option<&str>,
    token: Option<&str>,
    challenge: Option<&str>,
    expected_token: &str,
) -> Option<String> {
    let mode = mode?;
    let token = token?;
    let challenge = challenge?;

    if mode == "subscribe" && !expected_token.is_empty() && token == expected_token {
        Some(challenge.to_string())
    } else {
        None
    }
}
