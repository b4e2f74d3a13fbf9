use std::{collections::VecDeque, time::Instant};

use {
    serde::{Deserialize, Serialize},
    tracing::debug,
};

#[cfg(feature = "metrics")]
use concierge_metrics::{counter, sessions as session_metrics};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message exchanged in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// History bounds applied after every append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_turns: usize,
    /// Cumulative content size, in characters.
    pub max_chars: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_chars: 8_000,
        }
    }
}

/// Conversation state for a single sender.
#[derive(Debug)]
pub struct Session {
    turns: VecDeque<Turn>,
    chars: usize,
    last_reply: Option<String>,
    user_turns_total: u64,
    created_at: Instant,
    limits: SessionLimits,
}

impl Session {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            turns: VecDeque::new(),
            chars: 0,
            last_reply: None,
            user_turns_total: 0,
            created_at: Instant::now(),
            limits,
        }
    }

    /// Append a turn, then drop the oldest turns until both limits hold.
    ///
    /// The newest turn is never dropped, even when it alone exceeds
    /// `max_chars`. Returns how many turns were dropped.
    pub fn append_turn(&mut self, role: Role, content: impl Into<String>) -> usize {
        let content = content.into();
        self.chars += content.chars().count();
        self.turns.push_back(Turn { role, content });
        if role == Role::User {
            self.user_turns_total += 1;
        }

        let mut dropped = 0;
        while self.turns.len() > 1 && self.over_limits() {
            if let Some(old) = self.turns.pop_front() {
                self.chars -= old.content.chars().count();
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, retained = self.turns.len(), "truncated session history");
            #[cfg(feature = "metrics")]
            {
                counter!(session_metrics::TRUNCATED_TURNS_TOTAL).increment(dropped as u64);
            }
        }
        dropped
    }

    fn over_limits(&self) -> bool {
        self.turns.len() > self.limits.max_turns || self.chars > self.limits.max_chars
    }

    pub fn record_last_reply(&mut self, text: impl Into<String>) {
        self.last_reply = Some(text.into());
    }

    #[must_use]
    pub fn last_reply(&self) -> Option<&str> {
        self.last_reply.as_deref()
    }

    #[must_use]
    pub fn turns(&self) -> &VecDeque<Turn> {
        &self.turns
    }

    /// Owned snapshot of the retained turns, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    /// Number of user turns ever appended, unaffected by truncation.
    #[must_use]
    pub fn user_turns_total(&self) -> u64 {
        self.user_turns_total
    }

    #[must_use]
    pub fn total_chars(&self) -> usize {
        self.chars
    }

    #[must_use]
    pub fn created_at(&self) -> Instant {
        self.created_at
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}
