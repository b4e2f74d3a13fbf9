use std::sync::Arc;

use {
    async_trait::async_trait,
    tracing::{debug, info},
};

use concierge_channels::{ChannelOutbound, EscalationNotice, OperatorNotifier, Result};

const UNNAMED: &str = "Без имени";

/// Sends operator notices to the business owner's WhatsApp number.
pub struct WhatsAppOwnerNotifier {
    outbound: Arc<dyn ChannelOutbound>,
    owner_number: Option<String>,
    business_name: String,
}

impl WhatsAppOwnerNotifier {
    pub fn new(
        outbound: Arc<dyn ChannelOutbound>,
        owner_number: Option<String>,
        business_name: impl Into<String>,
    ) -> Self {
        Self {
            outbound,
            owner_number: owner_number
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            business_name: business_name.into(),
        }
    }

    async fn send_to_owner(&self, kind: &str, text: &str) -> Result<()> {
        let Some(owner) = &self.owner_number else {
            info!(kind, "owner number not configured, notice skipped");
            return Ok(());
        };
        self.outbound.send_text(owner, text).await?;
        debug!(kind, "owner notified");
        Ok(())
    }
}

#[must_use]
pub fn first_contact_text(sender: &str, sender_name: Option<&str>, business_name: &str) -> String {
    format!(
        "📢 *Новый клиент!*\n\n👤 Имя: {}\n📱 Номер: +{}\n\n💬 Написал впервые в WhatsApp {}",
        display_name(sender_name),
        sender.trim_start_matches('+'),
        business_name
    )
}

#[must_use]
pub fn escalation_text(notice: &EscalationNotice) -> String {
    format!(
        "🔥 *Горячий клиент!*\n\n👤 Имя: {}\n📱 Номер: +{}\n🔑 Триггер: {}\n\n💬 Сообщение: {}",
        display_name(notice.sender_name.as_deref()),
        notice.sender.trim_start_matches('+'),
        notice.term,
        notice.user_text
    )
}

fn display_name(name: Option<&str>) -> &str {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(UNNAMED)
}

#[async_trait]
impl OperatorNotifier for WhatsAppOwnerNotifier {
    async fn notify_first_contact(&self, sender: &str, sender_name: Option<&str>) -> Result<()> {
        let text = first_contact_text(sender, sender_name, &self.business_name);
        self.send_to_owner("first_contact", &text).await
    }

    async fn notify_escalation(&self, notice: &EscalationNotice) -> Result<()> {
        self.send_to_owner("escalation", &escalation_text(notice))
            .await
    }
}
