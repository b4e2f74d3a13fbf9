use std::{sync::Arc, time::Duration};

use {
    concierge_agents::{
        ChatMessage, CompletionOptions, CompletionOutcome, LlmProvider, ProviderErrorKind,
        complete_bounded,
    },
    concierge_config::GenerationConfig,
    concierge_sessions::Turn,
    tracing::warn,
};

/// Produces a candidate reply from the conversation history.
pub struct ReplyGenerator {
    provider: Option<Arc<dyn LlmProvider>>,
    policy: String,
    knowledge: String,
    history_turns: usize,
    options: CompletionOptions,
    timeout: Duration,
}

impl ReplyGenerator {
    pub fn new(
        provider: Option<Arc<dyn LlmProvider>>,
        policy: impl Into<String>,
        knowledge: impl Into<String>,
        history_turns: usize,
        options: CompletionOptions,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            policy: policy.into(),
            knowledge: knowledge.into(),
            history_turns,
            options,
            timeout,
        }
    }

    pub fn from_config(config: &GenerationConfig, provider: Option<Arc<dyn LlmProvider>>) -> Self {
        Self::new(
            provider,
            config.policy.clone(),
            config.knowledge.clone(),
            config.history_turns,
            CompletionOptions::default()
                .with_max_tokens(config.max_tokens)
                .with_temperature(config.temperature),
            Duration::from_secs(config.timeout_secs),
        )
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Policy first, then knowledge (if any), then the most recent turns.
    #[must_use]
    pub fn build_messages(&self, history: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len().min(self.history_turns) + 2);
        messages.push(ChatMessage::system(self.policy.clone()));
        if !self.knowledge.trim().is_empty() {
            messages.push(ChatMessage::system(self.knowledge.clone()));
        }
        let skip = history.len().saturating_sub(self.history_turns);
        messages.extend(history[skip..].iter().map(ChatMessage::from));
        messages
    }

    pub async fn generate(&self, history: &[Turn]) -> CompletionOutcome {
        let Some(provider) = &self.provider else {
            warn!("no reply provider configured");
            return CompletionOutcome::Failed(ProviderErrorKind::AuthError);
        };
        let messages = self.build_messages(history);
        complete_bounded(provider.as_ref(), &messages, &self.options, self.timeout).await
    }
}
