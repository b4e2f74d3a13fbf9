use {
    concierge_common::normalize_text, concierge_config::FallbackConfig,
    concierge_sessions::Session,
};

/// Canned replies used when generation yields nothing usable.
///
/// Selection is driven by the session's monotonic user-turn counter, so a
/// growing conversation walks through the list instead of repeating a line.
#[derive(Debug, Clone)]
pub struct FallbackRotator {
    replies: Vec<String>,
}

impl FallbackRotator {
    /// Blank entries are dropped; an empty list falls back to the built-in
    /// defaults so the rotator always has something to say.
    #[must_use]
    pub fn new(replies: impl IntoIterator<Item = String>) -> Self {
        let replies: Vec<String> = replies
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if replies.is_empty() {
            return Self {
                replies: FallbackConfig::default().replies,
            };
        }
        Self { replies }
    }

    #[must_use]
    pub fn from_config(config: &FallbackConfig) -> Self {
        Self::new(config.replies.iter().cloned())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.replies.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    fn index_for(&self, counter: u64) -> usize {
        (counter.saturating_sub(1) % self.replies.len() as u64) as usize
    }

    /// Reply for the session's current user-turn count.
    #[must_use]
    pub fn next(&self, session: &Session) -> &str {
        &self.replies[self.index_for(session.user_turns_total())]
    }

    /// Like [`next`](Self::next), but skips entries that normalize to the
    /// same text as `avoid` (normally the last reply sent).
    #[must_use]
    pub fn next_avoiding(&self, session: &Session, avoid: Option<&str>) -> &str {
        let start = self.index_for(session.user_turns_total());
        let Some(avoid) = avoid.map(normalize_text) else {
            return &self.replies[start];
        };
        (0..self.replies.len())
            .map(|step| &self.replies[(start + step) % self.replies.len()])
            .find(|candidate| normalize_text(candidate) != avoid)
            .unwrap_or(&self.replies[start])
    }
}
