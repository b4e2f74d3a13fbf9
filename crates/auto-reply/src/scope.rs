//! Topic-scope classification.
//!
//! Order of evaluation for one message:
//! 1. normalize the text,
//! 2. return a fresh cached decision if there is one,
//! 3. keyword fast path (in-domain beats out-domain),
//! 4. ask the remote classifier, failing open to [`Scope::In`].
//!
//! Keyword and remote decisions are cached; fail-open decisions are not, so
//! a provider outage is retried on the next message instead of being
//! remembered for the whole freshness window.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use {
    concierge_agents::{
        ChatMessage, CompletionOptions, CompletionOutcome, LlmProvider, complete_bounded,
    },
    concierge_common::normalize_text,
    concierge_config::ScopeConfig,
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use concierge_metrics::{counter, labels, scope as scope_metrics};

/// Binary topic decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    In,
    Out,
}

impl Scope {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

// ── Keywords ────────────────────────────────────────────────────────────────

/// In-domain and out-of-domain term lists.
///
/// A term matches when it occurs in the normalized text at the start of a
/// word, so "бот" matches "ботов" and "чат-бот" but "ии" does not match
/// inside "компании".
#[derive(Debug, Clone, Default)]
pub struct ScopeKeywords {
    in_domain: Vec<String>,
    out_domain: Vec<String>,
}

impl ScopeKeywords {
    pub fn new<I, O>(in_domain: I, out_domain: O) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        O: IntoIterator,
        O::Item: AsRef<str>,
    {
        Self {
            in_domain: normalize_terms(in_domain),
            out_domain: normalize_terms(out_domain),
        }
    }

    /// Keyword decision for already-normalized text, if any term matches.
    #[must_use]
    pub fn fast_path(&self, normalized: &str) -> Option<Scope> {
        if self.in_domain.iter().any(|t| matches_word_start(normalized, t)) {
            return Some(Scope::In);
        }
        if self.out_domain.iter().any(|t| matches_word_start(normalized, t)) {
            return Some(Scope::Out);
        }
        None
    }
}

fn normalize_terms<T>(terms: T) -> Vec<String>
where
    T: IntoIterator,
    T::Item: AsRef<str>,
{
    terms
        .into_iter()
        .map(|t| normalize_text(t.as_ref()))
        .filter(|t| !t.is_empty())
        .collect()
}

fn matches_word_start(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric())
    })
}

// ── Cache ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    decision: Scope,
    at: Instant,
    seq: u64,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    /// Insertion order as `(key, seq)`. A pair whose seq no longer matches
    /// the live entry was superseded by a re-insert and is skipped.
    order: VecDeque<(String, u64)>,
    next_seq: u64,
}

impl CacheState {
    fn is_live(&self, key: &str, seq: u64) -> bool {
        self.entries.get(key).is_some_and(|e| e.seq == seq)
    }

    /// Drop superseded pairs from the front so it always names a live entry.
    fn skip_superseded(&mut self) {
        while let Some((key, seq)) = self.order.front()
            && !self.is_live(key, *seq)
        {
            self.order.pop_front();
        }
    }
}

/// Decisions keyed by normalized text, trusted only within `freshness`.
///
/// Holds at most `capacity` entries. A full cache first drops stale entries
/// from the old end, then the oldest live one.
pub struct ScopeCache {
    state: Mutex<CacheState>,
    freshness: Duration,
    capacity: usize,
}

impl ScopeCache {
    #[must_use]
    pub fn new(freshness: Duration, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
                next_seq: 0,
            }),
            freshness,
            capacity,
        }
    }

    /// Cached decision for `key` if it is younger than the freshness window.
    #[must_use]
    pub fn get_at(&self, key: &str, now: Instant) -> Option<Scope> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let entry = state.entries.get(key)?;
        (now.saturating_duration_since(entry.at) < self.freshness).then_some(entry.decision)
    }

    pub fn insert_at(&self, key: String, decision: Scope, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        loop {
            state.skip_superseded();
            let Some((oldest, _)) = state.order.front() else {
                break;
            };
            let stale = state
                .entries
                .get(oldest)
                .is_some_and(|e| now.saturating_duration_since(e.at) >= self.freshness);
            let full =
                state.entries.len() >= self.capacity && !state.entries.contains_key(&key);
            if !stale && !full {
                break;
            }
            if let Some((oldest, _)) = state.order.pop_front() {
                state.entries.remove(&oldest);
            }
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(key.clone(), CacheEntry {
            decision,
            at: now,
            seq,
        });
        state.order.push_back((key, seq));

        // Re-inserts leave superseded pairs behind; compact once they dominate.
        if state.order.len() > self.capacity.saturating_mul(2) {
            let CacheState { entries, order, .. } = &mut *state;
            order.retain(|(k, seq)| entries.get(k).is_some_and(|e| e.seq == *seq));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entries
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ── Classifier ──────────────────────────────────────────────────────────────

const CLASSIFIER_PROMPT: &str = "You are a strict topic filter for the WhatsApp assistant of \
{business}, a company that builds AI agents, chatbots, business automation and CRM \
integrations. Decide whether the customer's message is something this business could \
reasonably answer: greetings, questions about the company, its services, prices, \
timelines, channels (WhatsApp, Telegram, Instagram, website), integrations or booking a \
call are IN. Unrelated topics (weather, recipes, sports, politics, homework, \
entertainment) are OUT. Reply with exactly one word: IN or OUT.";

/// Where a decision came from; used for logs and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecisionPath {
    Disabled,
    Empty,
    Cache,
    Keyword,
    Remote,
    FailOpen,
}

impl DecisionPath {
    fn as_str(self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Empty => "empty",
            Self::Cache => "cache",
            Self::Keyword => "keyword",
            Self::Remote => "remote",
            Self::FailOpen => "fail_open",
        }
    }
}

/// Decides whether a message is within the business's topic.
pub struct ScopeClassifier {
    enabled: bool,
    keywords: ScopeKeywords,
    cache: ScopeCache,
    provider: Option<Arc<dyn LlmProvider>>,
    prompt: String,
    timeout: Duration,
}

impl ScopeClassifier {
    #[must_use]
    pub fn new(
        keywords: ScopeKeywords,
        cache: ScopeCache,
        provider: Option<Arc<dyn LlmProvider>>,
        timeout: Duration,
    ) -> Self {
        Self {
            enabled: true,
            keywords,
            cache,
            provider,
            prompt: CLASSIFIER_PROMPT.replace("{business}", "the company"),
            timeout,
        }
    }

    #[must_use]
    pub fn from_config(
        config: &ScopeConfig,
        business_name: &str,
        provider: Option<Arc<dyn LlmProvider>>,
    ) -> Self {
        Self {
            enabled: config.enabled,
            keywords: ScopeKeywords::new(&config.in_domain, &config.out_domain),
            cache: ScopeCache::new(
                Duration::from_secs(config.freshness_secs),
                config.cache_capacity,
            ),
            provider,
            prompt: CLASSIFIER_PROMPT.replace("{business}", business_name),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ScopeCache {
        &self.cache
    }

    pub async fn classify(&self, text: &str) -> Scope {
        self.classify_at(text, Instant::now()).await
    }

    /// Same as [`classify`](Self::classify) with an explicit clock for the
    /// cache.
    pub async fn classify_at(&self, text: &str, now: Instant) -> Scope {
        let normalized = normalize_text(text);
        let (decision, path) = self.decide(&normalized, now).await;

        debug!(
            decision = decision.as_str(),
            path = path.as_str(),
            chars = normalized.chars().count(),
            "scope classified"
        );

        #[cfg(feature = "metrics")]
        counter!(
            scope_metrics::DECISIONS_TOTAL,
            labels::DECISION => decision.as_str(),
            labels::PATH => path.as_str(),
        )
        .increment(1);

        decision
    }

    async fn decide(&self, normalized: &str, now: Instant) -> (Scope, DecisionPath) {
        if !self.enabled {
            return (Scope::In, DecisionPath::Disabled);
        }
        if normalized.is_empty() {
            return (Scope::In, DecisionPath::Empty);
        }
        if let Some(decision) = self.cache.get_at(normalized, now) {
            return (decision, DecisionPath::Cache);
        }
        if let Some(decision) = self.keywords.fast_path(normalized) {
            self.cache.insert_at(normalized.to_string(), decision, now);
            return (decision, DecisionPath::Keyword);
        }
        match self.ask_remote(normalized).await {
            Some(decision) => {
                self.cache.insert_at(normalized.to_string(), decision, now);
                (decision, DecisionPath::Remote)
            },
            None => {
                #[cfg(feature = "metrics")]
                counter!(scope_metrics::FAIL_OPEN_TOTAL).increment(1);
                (Scope::In, DecisionPath::FailOpen)
            },
        }
    }

    /// `None` when the remote classifier is unavailable or answered outside
    /// the IN/OUT contract.
    async fn ask_remote(&self, text: &str) -> Option<Scope> {
        let provider = self.provider.as_deref()?;
        let messages = [ChatMessage::system(&self.prompt), ChatMessage::user(text)];
        let options = CompletionOptions::default()
            .with_max_tokens(2)
            .with_temperature(0.0);

        match complete_bounded(provider, &messages, &options, self.timeout).await {
            CompletionOutcome::Text(answer) => {
                let decision = parse_decision(&answer);
                if decision.is_none() {
                    warn!(answer = %answer, "scope classifier answered outside IN/OUT");
                }
                decision
            },
            CompletionOutcome::Empty => {
                warn!("scope classifier returned no text");
                None
            },
            CompletionOutcome::Failed(_) => None,
        }
    }
}

/// Accept `IN`/`OUT` in any case, ignoring surrounding whitespace and
/// punctuation.
fn parse_decision(answer: &str) -> Option<Scope> {
    let word = answer.trim().trim_matches(|c: char| !c.is_alphanumeric());
    if word.eq_ignore_ascii_case("in") {
        Some(Scope::In)
    } else if word.eq_ignore_ascii_case("out") {
        Some(Scope::Out)
    } else {
        None
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use {
        super::*,
        async_trait::async_trait,
        concierge_agents::CompletionResponse,
    };

    /// Returns scripted answers (or errors) and counts calls.
    struct ScriptedClassifier {
        answers: Mutex<Vec<anyhow::Result<Option<String>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        fn new(answers: Vec<anyhow::Result<Option<String>>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(answers),
                calls: AtomicUsize::new(0),
            })
        }

        fn always_failing() -> Arc<Self> {
            Self::new(Vec::new())
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedClassifier {
        fn name(&self) -> &str {
            "scripted"
        }

        fn id(&self) -> &str {
            "scripted-classifier"
        }

        async fn complete(
            &self,
            _messages: &[ChatMessage],
            options: &CompletionOptions,
        ) -> anyhow::Result<CompletionResponse> {
            assert_eq!(options.max_tokens, Some(2));
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut answers = self.answers.lock().unwrap();
            if answers.is_empty() {
                anyhow::bail!("OpenAI API error HTTP 503 Service Unavailable");
            }
            answers.remove(0).map(|text| CompletionResponse {
                text,
                ..Default::default()
            })
        }
    }

    fn keywords() -> ScopeKeywords {
        ScopeKeywords::new(["бот", "ии", "цена"], ["погод", "рецепт"])
    }

    fn classifier(provider: Arc<ScriptedClassifier>) -> ScopeClassifier {
        ScopeClassifier::new(
            keywords(),
            ScopeCache::new(Duration::from_secs(600), 16),
            Some(provider),
            Duration::from_millis(200),
        )
    }

    #[test]
    fn keyword_matching_is_word_start() {
        let kw = keywords();
        assert_eq!(kw.fast_path("нужен чат-бот"), Some(Scope::In));
        assert_eq!(kw.fast_path("сколько ботов"), Some(Scope::In));
        assert_eq!(kw.fast_path("какая погода завтра"), Some(Scope::Out));
        assert_eq!(kw.fast_path("о компании"), None);
        assert_eq!(kw.fast_path("что умеет ии?"), Some(Scope::In));
    }

    #[test]
    fn in_domain_wins_ties() {
        assert_eq!(
            keywords().fast_path("бот который пишет про погоду"),
            Some(Scope::In)
        );
    }

    #[test]
    fn parse_decision_accepts_loose_formatting() {
        assert_eq!(parse_decision("IN"), Some(Scope::In));
        assert_eq!(parse_decision(" out.\n"), Some(Scope::Out));
        assert_eq!(parse_decision("\"In\""), Some(Scope::In));
        assert_eq!(parse_decision("maybe"), None);
        assert_eq!(parse_decision("INSIDE"), None);
    }

    #[tokio::test]
    async fn out_domain_keyword_skips_remote() {
        let provider = ScriptedClassifier::always_failing();
        let c = classifier(Arc::clone(&provider));
        assert_eq!(c.classify("Какая погода в Алматы?").await, Scope::Out);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn remote_decision_is_cached_by_normalized_text() {
        let provider = ScriptedClassifier::new(vec![Ok(Some("OUT".into()))]);
        let c = classifier(Arc::clone(&provider));
        assert_eq!(c.classify("Расскажи анекдот").await, Scope::Out);
        assert_eq!(c.classify("  расскажи   АНЕКДОТ ").await, Scope::Out);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn stale_cache_entries_are_recomputed() {
        let provider = ScriptedClassifier::new(vec![Ok(Some("OUT".into())), Ok(Some("IN".into()))]);
        let c = classifier(Arc::clone(&provider));
        let t0 = Instant::now();
        assert_eq!(c.classify_at("расскажи анекдот", t0).await, Scope::Out);
        assert_eq!(
            c.classify_at("расскажи анекдот", t0 + Duration::from_secs(599)).await,
            Scope::Out
        );
        assert_eq!(
            c.classify_at("расскажи анекдот", t0 + Duration::from_secs(601)).await,
            Scope::In
        );
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn failing_remote_fails_open_and_is_not_cached() {
        let provider = ScriptedClassifier::always_failing();
        let c = classifier(Arc::clone(&provider));
        for text in ["Здравствуйте", "что вы делаете?", "12345", "расскажи анекдот"] {
            assert_eq!(c.classify(text).await, Scope::In, "{text}");
        }
        assert_eq!(c.classify("что вы делаете?").await, Scope::In);
        // "здравствуйте" has no keyword in this fixture, so all five went remote.
        assert_eq!(provider.calls(), 5);
        assert!(c.cache().is_empty());
    }

    #[tokio::test]
    async fn off_contract_and_empty_answers_fail_open() {
        let provider = ScriptedClassifier::new(vec![Ok(Some("Maybe".into())), Ok(None)]);
        let c = classifier(Arc::clone(&provider));
        assert_eq!(c.classify("первое сообщение").await, Scope::In);
        assert_eq!(c.classify("второе сообщение").await, Scope::In);
        assert!(c.cache().is_empty());
    }

    #[tokio::test]
    async fn no_provider_fails_open() {
        let c = ScopeClassifier::new(
            keywords(),
            ScopeCache::new(Duration::from_secs(600), 16),
            None,
            Duration::from_secs(1),
        );
        assert_eq!(c.classify("расскажи анекдот").await, Scope::In);
    }

    #[tokio::test]
    async fn empty_text_is_in_without_remote_call() {
        let provider = ScriptedClassifier::always_failing();
        let c = classifier(Arc::clone(&provider));
        assert_eq!(c.classify("   ").await, Scope::In);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn disabled_classifier_accepts_everything() {
        let config = ScopeConfig {
            enabled: false,
            ..Default::default()
        };
        let c = ScopeClassifier::from_config(&config, "ISTE AI", None);
        assert_eq!(c.classify("какая погода?").await, Scope::In);
    }

    #[test]
    fn full_cache_evicts_stale_then_oldest() {
        let cache = ScopeCache::new(Duration::from_secs(10), 2);
        let t0 = Instant::now();
        cache.insert_at("a".into(), Scope::In, t0);
        cache.insert_at("b".into(), Scope::Out, t0 + Duration::from_secs(5));
        cache.insert_at("c".into(), Scope::In, t0 + Duration::from_secs(6));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("a", t0 + Duration::from_secs(6)), None);
        assert_eq!(
            cache.get_at("b", t0 + Duration::from_secs(6)),
            Some(Scope::Out)
        );

        // At t0+15.5s "b" (age 10.5s) is stale and purged; "c" (age 9.5s) stays.
        let later = t0 + Duration::from_millis(15_500);
        cache.insert_at("d".into(), Scope::Out, later);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_at("b", later), None);
        assert_eq!(cache.get_at("c", later), Some(Scope::In));
        assert_eq!(cache.get_at("d", later), Some(Scope::Out));
    }

    #[test]
    fn concurrent_inserts_respect_capacity() {
        let cache = Arc::new(ScopeCache::new(Duration::from_secs(600), 4));
        let t0 = Instant::now();
        for key in ["a", "b", "c"] {
            cache.insert_at(key.into(), Scope::In, t0);
        }

        for round in 0..200 {
            let barrier = Arc::new(std::sync::Barrier::new(16));
            let workers: Vec<_> = (0..16)
                .map(|worker| {
                    let cache = Arc::clone(&cache);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        cache.insert_at(format!("{round}-{worker}"), Scope::Out, Instant::now());
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }
            assert!(cache.len() <= 4, "round {round}: {} entries", cache.len());
        }
    }

    #[test]
    fn reinserting_a_key_refreshes_it() {
        let cache = ScopeCache::new(Duration::from_secs(10), 2);
        let t0 = Instant::now();
        cache.insert_at("a".into(), Scope::In, t0);
        cache.insert_at("b".into(), Scope::In, t0 + Duration::from_secs(1));
        // "a" went stale and was recomputed; "b" is now the oldest.
        cache.insert_at("a".into(), Scope::Out, t0 + Duration::from_secs(10));
        assert_eq!(cache.len(), 2);

        cache.insert_at("c".into(), Scope::In, t0 + Duration::from_secs(10));
        let now = t0 + Duration::from_secs(10);
        assert_eq!(cache.get_at("a", now), Some(Scope::Out));
        assert_eq!(cache.get_at("b", now), None);
        assert_eq!(cache.get_at("c", now), Some(Scope::In));
    }
}
