use async_trait::async_trait;

use crate::Result;

/// Send messages to a channel.
///
/// Implementations own their transport retry policy: a returned error means
/// the message was not delivered and retrying is pointless or exhausted.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Deliver `text` to `to`. Callers never pass empty text.
    async fn send_text(&self, to: &str, text: &str) -> Result<()>;
}

/// A conversation that matched a hot term and needs a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscalationNotice {
    pub sender: String,
    pub sender_name: Option<String>,
    /// The hot term that matched.
    pub term: String,
    pub user_text: String,
    pub reply: String,
}

/// Internal notifications to the business operator.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    /// A sender wrote for the first time since the process started.
    async fn notify_first_contact(&self, sender: &str, sender_name: Option<&str>) -> Result<()>;

    async fn notify_escalation(&self, notice: &EscalationNotice) -> Result<()>;
}
