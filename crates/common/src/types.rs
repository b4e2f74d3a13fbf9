use serde::{Deserialize, Serialize};

/// A single inbound chat event as seen by the core pipeline.
///
/// Channel adapters build this from their wire format. Text extraction from
/// media is the adapter's job; the core only ever sees text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Stable sender key (WhatsApp `wa_id`).
    pub sender_id: String,
    /// Platform message id, used for redelivery suppression.
    pub message_id: Option<String>,
    pub text: String,
    /// Display name from the channel profile, when the platform sends one.
    pub sender_name: Option<String>,
}

impl InboundMessage {
    pub fn new(sender_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender_id.into(),
            message_id: None,
            text: text.into(),
            sender_name: None,
        }
    }

    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    #[must_use]
    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }
}
