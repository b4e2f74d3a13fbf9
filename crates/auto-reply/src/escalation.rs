//! Hot-conversation detection with a per-sender cooldown.

use std::time::{Duration, Instant};

use {
    concierge_config::EscalationConfig,
    dashmap::{DashMap, mapref::entry::Entry},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use concierge_metrics::{counter, escalation as escalation_metrics};

/// What the caller should do about a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EscalationDecision {
    /// Notify the operator; `term` is the hot term that matched.
    Fire { term: String },
    /// No hot term, escalation disabled, or still in cooldown.
    Skip,
}

/// Detects hot terms and rate-limits escalations per sender.
pub struct EscalationThrottle {
    enabled: bool,
    hot_terms: Vec<String>,
    cooldown: Duration,
    last_fired: DashMap<String, Instant>,
}

impl EscalationThrottle {
    #[must_use]
    pub fn new(hot_terms: impl IntoIterator<Item = String>, cooldown: Duration) -> Self {
        Self {
            enabled: true,
            hot_terms: hot_terms
                .into_iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            cooldown,
            last_fired: DashMap::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &EscalationConfig) -> Self {
        let mut throttle = Self::new(
            config.hot_terms.iter().cloned(),
            Duration::from_secs(config.cooldown_secs),
        );
        throttle.enabled = config.enabled;
        throttle
    }

    /// First hot term contained in `text` (case-insensitive substring).
    #[must_use]
    pub fn matched_term(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.hot_terms
            .iter()
            .find(|term| lowered.contains(term.as_str()))
            .map(String::as_str)
    }

    pub fn maybe_escalate(&self, sender: &str, text: &str) -> EscalationDecision {
        self.check_at(sender, text, Instant::now())
    }

    /// Decide and, on `Fire`, stamp the sender's cooldown at `now`.
    pub fn check_at(&self, sender: &str, text: &str, now: Instant) -> EscalationDecision {
        if !self.enabled {
            return EscalationDecision::Skip;
        }
        let Some(term) = self.matched_term(text) else {
            return EscalationDecision::Skip;
        };

        let fire = match self.last_fired.entry(sender.to_string()) {
            Entry::Occupied(mut entry) => {
                if now.saturating_duration_since(*entry.get()) >= self.cooldown {
                    entry.insert(now);
                    true
                } else {
                    false
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            },
        };

        if fire {
            debug!(sender, term, "escalation fired");
            #[cfg(feature = "metrics")]
            counter!(escalation_metrics::FIRED_TOTAL).increment(1);
            EscalationDecision::Fire {
                term: term.to_string(),
            }
        } else {
            debug!(sender, term, "escalation suppressed by cooldown");
            #[cfg(feature = "metrics")]
            counter!(escalation_metrics::SUPPRESSED_TOTAL).increment(1);
            EscalationDecision::Skip
        }
    }
}
