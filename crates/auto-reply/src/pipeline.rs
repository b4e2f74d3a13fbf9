//! Per-event orchestration.
//!
//! One inbound message goes through dedup, first-contact notification, scope
//! classification, generation with fallback, escalation and delivery. The
//! sender's session lock is held for the whole event, so two messages from
//! the same sender never interleave while different senders run in parallel.

use std::sync::Arc;

use {
    concierge_agents::{CompletionOutcome, LlmProvider},
    concierge_channels::{ChannelOutbound, Deduplicator, EscalationNotice, OperatorNotifier},
    concierge_common::{InboundMessage, normalize_text},
    concierge_config::ConciergeConfig,
    concierge_sessions::{Role, Session, SessionLimits, SessionStore},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use {
    concierge_metrics::{auto_reply as auto_reply_metrics, counter, histogram, labels},
    std::time::Instant,
};

use crate::{
    escalation::{EscalationDecision, EscalationThrottle},
    fallback::FallbackRotator,
    reply::ReplyGenerator,
    scope::{Scope, ScopeClassifier},
};

/// Where the dispatched reply came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    Generated,
    Fallback,
}

impl ReplySource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Fallback => "fallback",
        }
    }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The message id was already processed.
    Duplicate,
    /// Nothing to answer (blank text).
    Ignored,
    /// Answered with the fixed out-of-scope reply; history untouched.
    OutOfScope { delivered: bool },
    Replied {
        reply: String,
        source: ReplySource,
        escalated: bool,
        delivered: bool,
    },
}

/// The auto-reply engine. Cheap to share behind an `Arc`.
pub struct Pipeline {
    dedup: Deduplicator,
    sessions: SessionStore,
    scope: ScopeClassifier,
    generator: ReplyGenerator,
    fallback: FallbackRotator,
    escalation: EscalationThrottle,
    outbound: Arc<dyn ChannelOutbound>,
    notifier: Arc<dyn OperatorNotifier>,
    out_of_scope_reply: String,
    placeholder: String,
}

impl Pipeline {
    pub fn from_config(
        config: &ConciergeConfig,
        reply_provider: Option<Arc<dyn LlmProvider>>,
        classifier_provider: Option<Arc<dyn LlmProvider>>,
        outbound: Arc<dyn ChannelOutbound>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        let placeholder = if config.generation.placeholder.trim().is_empty() {
            "…".to_string()
        } else {
            config.generation.placeholder.clone()
        };
        Self {
            dedup: Deduplicator::new(config.dedup.capacity),
            sessions: SessionStore::new(SessionLimits {
                max_turns: config.session.max_turns,
                max_chars: config.session.max_chars,
            }),
            scope: ScopeClassifier::from_config(
                &config.scope,
                &config.business.name,
                classifier_provider,
            ),
            generator: ReplyGenerator::from_config(&config.generation, reply_provider),
            fallback: FallbackRotator::from_config(&config.fallback),
            escalation: EscalationThrottle::from_config(&config.escalation),
            outbound,
            notifier,
            out_of_scope_reply: config.scope.out_of_scope_reply.clone(),
            placeholder,
        }
    }

    #[must_use]
    pub fn with_generator(mut self, generator: ReplyGenerator) -> Self {
        self.generator = generator;
        self
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Process one inbound event. Never fails; degraded paths are logged.
    pub async fn handle(&self, message: InboundMessage) -> PipelineOutcome {
        #[cfg(feature = "metrics")]
        let started = Instant::now();
        #[cfg(feature = "metrics")]
        counter!(auto_reply_metrics::MESSAGES_RECEIVED_TOTAL).increment(1);

        let outcome = self.process(message).await;

        #[cfg(feature = "metrics")]
        histogram!(auto_reply_metrics::PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        outcome
    }

    async fn process(&self, message: InboundMessage) -> PipelineOutcome {
        let InboundMessage {
            sender_id: sender,
            message_id,
            text,
            sender_name,
        } = message;

        if self.dedup.seen(message_id.as_deref()) {
            debug!(sender = %sender, message_id = ?message_id, "duplicate message dropped");
            #[cfg(feature = "metrics")]
            counter!(auto_reply_metrics::DUPLICATES_TOTAL).increment(1);
            return PipelineOutcome::Duplicate;
        }

        let text = text.trim().to_string();
        if text.is_empty() {
            debug!(sender = %sender, "blank message ignored");
            return PipelineOutcome::Ignored;
        }

        let handle = self.sessions.get_or_create(&sender);
        let mut session = handle.lock().await;

        if handle.first_contact() {
            info!(sender = %sender, name = ?sender_name, "new client");
            #[cfg(feature = "metrics")]
            counter!(auto_reply_metrics::FIRST_CONTACTS_TOTAL).increment(1);
            if let Err(e) = self
                .notifier
                .notify_first_contact(&sender, sender_name.as_deref())
                .await
            {
                warn!(sender = %sender, error = %e, "first-contact notification failed");
            }
        }

        if self.scope.classify(&text).await == Scope::Out {
            let reply = self.non_empty(&self.out_of_scope_reply).to_string();
            session.record_last_reply(reply.clone());
            let delivered = self.deliver(&sender, &reply).await;
            debug!(sender = %sender, delivered, "out-of-scope reply sent");
            return PipelineOutcome::OutOfScope { delivered };
        }

        session.append_turn(Role::User, text.clone());

        let outcome = self.generator.generate(&session.history()).await;
        let (reply, source) = self.choose_reply(&session, &sender, outcome);

        let escalated = match self
            .escalation
            .maybe_escalate(&sender, &format!("{text}\n{reply}"))
        {
            EscalationDecision::Fire { term } => {
                info!(sender = %sender, term = %term, "hot client, escalating");
                let notice = EscalationNotice {
                    sender: sender.clone(),
                    sender_name: sender_name.clone(),
                    term,
                    user_text: text.clone(),
                    reply: reply.clone(),
                };
                if let Err(e) = self.notifier.notify_escalation(&notice).await {
                    warn!(sender = %sender, error = %e, "escalation notification failed");
                }
                true
            },
            EscalationDecision::Skip => false,
        };

        session.append_turn(Role::Assistant, reply.clone());
        session.record_last_reply(reply.clone());

        let delivered = self.deliver(&sender, &reply).await;

        #[cfg(feature = "metrics")]
        counter!(auto_reply_metrics::REPLIES_TOTAL, labels::SOURCE => source.as_str())
            .increment(1);

        debug!(
            sender = %sender,
            source = source.as_str(),
            escalated,
            delivered,
            "reply processed"
        );

        PipelineOutcome::Replied {
            reply,
            source,
            escalated,
            delivered,
        }
    }

    /// Take the generated text unless it is missing or repeats the previous
    /// reply, in which case rotate to a fallback that differs from it.
    fn choose_reply(
        &self,
        session: &Session,
        sender: &str,
        outcome: CompletionOutcome,
    ) -> (String, ReplySource) {
        let last_reply = session.last_reply();
        let reason = match outcome {
            CompletionOutcome::Text(text) => {
                let repeats = last_reply.is_some_and(|last| normalize_text(last) == normalize_text(&text));
                if !repeats {
                    return (self.non_empty(&text).to_string(), ReplySource::Generated);
                }
                "repeat"
            },
            CompletionOutcome::Empty => "empty",
            CompletionOutcome::Failed(kind) => {
                debug!(sender, %kind, "generation failed");
                "failed"
            },
        };

        debug!(sender, reason, "using fallback reply");
        #[cfg(feature = "metrics")]
        counter!(auto_reply_metrics::FALLBACKS_TOTAL, labels::REASON => reason).increment(1);

        let reply = self.fallback.next_avoiding(session, last_reply);
        (self.non_empty(reply).to_string(), ReplySource::Fallback)
    }

    fn non_empty<'a>(&'a self, text: &'a str) -> &'a str {
        if text.trim().is_empty() {
            &self.placeholder
        } else {
            text
        }
    }

    async fn deliver(&self, sender: &str, text: &str) -> bool {
        match self.outbound.send_text(sender, text).await {
            Ok(()) => true,
            Err(e) => {
                warn!(sender, error = %e, "reply delivery failed");
                #[cfg(feature = "metrics")]
                counter!(auto_reply_metrics::DELIVERY_FAILURES_TOTAL).increment(1);
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::Mutex,
        time::Duration,
    };

    use {
        super::*,
        async_trait::async_trait,
        concierge_agents::{ChatMessage, CompletionOptions, CompletionResponse},
        concierge_channels::{Error as ChannelError, Result as ChannelResult},
    };

    // ── Mocks ───────────────────────────────────────────────────────────────

    enum Step {
        Say(&'static str),
        Hang,
    }

    /// Replies from a script; repeats the last step once exhausted.
    struct ScriptedProvider {
        steps: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedProvider {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Vec<ChatMessage>> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        fn id(&self) -> &str {
            "scripted-model"
        }

        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: &CompletionOptions,
        ) -> anyhow::Result<CompletionResponse> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(messages.to_vec());
            let step = {
                let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
                if steps.len() > 1 {
                    steps.pop_front()
                } else {
                    steps.front().map(|s| match s {
                        Step::Say(t) => Step::Say(t),
                        Step::Hang => Step::Hang,
                    })
                }
            };
            match step {
                Some(Step::Say(text)) => Ok(CompletionResponse {
                    text: Some(text.to_string()),
                    ..Default::default()
                }),
                Some(Step::Hang) => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(CompletionResponse::default())
                },
                None => Ok(CompletionResponse::default()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Mutex<Vec<(String, String)>>,
        fail: bool,
    }

    impl RecordingOutbound {
        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait]
    impl ChannelOutbound for RecordingOutbound {
        async fn send_text(&self, to: &str, text: &str) -> ChannelResult<()> {
            if self.fail {
                return Err(ChannelError::api(503, 3, "unavailable"));
            }
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((to.to_string(), text.to_string()));
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        first_contacts: Mutex<Vec<(String, Option<String>)>>,
        escalations: Mutex<Vec<EscalationNotice>>,
    }

    impl RecordingNotifier {
        fn first_contacts(&self) -> Vec<(String, Option<String>)> {
            self.first_contacts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }

        fn escalations(&self) -> Vec<EscalationNotice> {
            self.escalations
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .clone()
        }
    }

    #[async_trait]
    impl OperatorNotifier for RecordingNotifier {
        async fn notify_first_contact(
            &self,
            sender: &str,
            sender_name: Option<&str>,
        ) -> ChannelResult<()> {
            self.first_contacts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((sender.to_string(), sender_name.map(str::to_string)));
            Ok(())
        }

        async fn notify_escalation(&self, notice: &EscalationNotice) -> ChannelResult<()> {
            self.escalations
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(notice.clone());
            Ok(())
        }
    }

    // ── Harness ─────────────────────────────────────────────────────────────

    struct Harness {
        pipeline: Pipeline,
        provider: Arc<ScriptedProvider>,
        outbound: Arc<RecordingOutbound>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness_with(steps: Vec<Step>, outbound: RecordingOutbound) -> Harness {
        let config = ConciergeConfig::default();
        let provider = ScriptedProvider::new(steps);
        let outbound = Arc::new(outbound);
        let notifier = Arc::new(RecordingNotifier::default());
        let reply_provider: Arc<dyn LlmProvider> = provider.clone();
        let pipeline = Pipeline::from_config(
            &config,
            Some(Arc::clone(&reply_provider)),
            None,
            outbound.clone(),
            notifier.clone(),
        )
        .with_generator(
            ReplyGenerator::from_config(&config.generation, Some(reply_provider))
                .with_timeout(Duration::from_millis(50)),
        );
        Harness {
            pipeline,
            provider,
            outbound,
            notifier,
        }
    }

    fn harness(steps: Vec<Step>) -> Harness {
        harness_with(steps, RecordingOutbound::default())
    }

    fn fallbacks() -> Vec<String> {
        concierge_config::FallbackConfig::default().replies
    }

    fn msg(sender: &str, id: &str, text: &str) -> InboundMessage {
        InboundMessage::new(sender, text).with_message_id(id)
    }

    // ── Scenarios ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn first_contact_notifies_once_and_replies() {
        let h = harness(vec![Step::Say("Здравствуйте! Чем можем помочь?")]);

        let outcome = h
            .pipeline
            .handle(msg("77010000001", "m1", "Здравствуйте").with_sender_name("Айгерим"))
            .await;
        assert_eq!(outcome, PipelineOutcome::Replied {
            reply: "Здравствуйте! Чем можем помочь?".into(),
            source: ReplySource::Generated,
            escalated: false,
            delivered: true,
        });
        assert_eq!(h.notifier.first_contacts(), vec![(
            "77010000001".to_string(),
            Some("Айгерим".to_string())
        )]);
        assert_eq!(h.outbound.sent(), vec![(
            "77010000001".to_string(),
            "Здравствуйте! Чем можем помочь?".to_string()
        )]);

        h.pipeline
            .handle(msg("77010000001", "m2", "Нужен бот для WhatsApp"))
            .await;
        assert_eq!(h.notifier.first_contacts().len(), 1);

        let history = h.pipeline.sessions().history("77010000001").await;
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Здравствуйте");
        assert_eq!(history[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn history_is_sent_to_the_generator() {
        let h = harness(vec![Step::Say("Ответ один"), Step::Say("Ответ два")]);
        h.pipeline.handle(msg("A", "1", "Привет")).await;
        h.pipeline.handle(msg("A", "2", "Нужен чат-бот")).await;

        let calls = h.provider.calls();
        assert_eq!(calls.len(), 2);
        let second = &calls[1];
        assert_eq!(second[second.len() - 3], ChatMessage::user("Привет"));
        assert_eq!(second[second.len() - 2], ChatMessage::assistant("Ответ один"));
        assert_eq!(second[second.len() - 1], ChatMessage::user("Нужен чат-бот"));
    }

    #[tokio::test]
    async fn hot_messages_escalate_once_within_cooldown() {
        let h = harness(vec![Step::Say("Конечно, менеджер свяжется с вами.")]);

        let first = h
            .pipeline
            .handle(msg("B", "1", "Срочно нужен созвон по боту"))
            .await;
        assert!(matches!(first, PipelineOutcome::Replied { escalated: true, .. }));

        let second = h
            .pipeline
            .handle(msg("B", "2", "Срочно нужен созвон по боту!"))
            .await;
        assert!(matches!(second, PipelineOutcome::Replied { escalated: false, .. }));

        let escalations = h.notifier.escalations();
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].sender, "B");
        assert_eq!(escalations[0].term, "созвон");
        assert_eq!(escalations[0].user_text, "Срочно нужен созвон по боту");
        assert_eq!(escalations[0].reply, "Конечно, менеджер свяжется с вами.");
    }

    #[tokio::test]
    async fn timeouts_rotate_through_fallbacks() {
        let h = harness(vec![Step::Hang]);
        let replies = fallbacks();

        let first = h.pipeline.handle(msg("C", "1", "Нужен бот")).await;
        assert_eq!(first, PipelineOutcome::Replied {
            reply: replies[0].clone(),
            source: ReplySource::Fallback,
            escalated: false,
            delivered: true,
        });

        let second = h.pipeline.handle(msg("C", "2", "Для сайта")).await;
        let PipelineOutcome::Replied { reply, source, .. } = second else {
            panic!("expected a reply, got {second:?}");
        };
        assert_eq!(source, ReplySource::Fallback);
        assert_eq!(reply, replies[1]);
    }

    #[tokio::test]
    async fn repeated_generation_is_replaced_by_fallback() {
        let h = harness(vec![Step::Say("Одинаковый ответ")]);

        h.pipeline.handle(msg("D", "1", "Привет")).await;
        let second = h.pipeline.handle(msg("D", "2", "Привет ещё раз")).await;
        let PipelineOutcome::Replied { reply, source, .. } = second else {
            panic!("expected a reply, got {second:?}");
        };
        assert_eq!(source, ReplySource::Fallback);
        assert_ne!(reply, "Одинаковый ответ");
        assert_eq!(
            h.pipeline.sessions().last_reply("D").await.as_deref(),
            Some(reply.as_str())
        );
    }

    #[tokio::test]
    async fn redelivered_message_is_processed_once() {
        let h = harness(vec![Step::Say("Ответ")]);
        let first = h
            .pipeline
            .handle(msg("E", "wamid.1", "Давайте созвонимся"))
            .await;
        assert!(matches!(first, PipelineOutcome::Replied {
            escalated: true,
            ..
        }));

        let again = h
            .pipeline
            .handle(msg("E", "wamid.1", "Давайте созвонимся"))
            .await;
        assert_eq!(again, PipelineOutcome::Duplicate);
        assert_eq!(h.outbound.sent().len(), 1);
        assert_eq!(h.pipeline.sessions().history("E").await.len(), 2);
        assert_eq!(h.notifier.first_contacts().len(), 1);
        assert_eq!(h.notifier.escalations().len(), 1);
        assert_eq!(h.provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn out_of_scope_reply_leaves_history_untouched() {
        let h = harness(vec![Step::Say("не должен вызываться")]);
        let outcome = h
            .pipeline
            .handle(msg("F", "1", "Какая завтра погода?"))
            .await;
        assert_eq!(outcome, PipelineOutcome::OutOfScope { delivered: true });

        let expected = ConciergeConfig::default().scope.out_of_scope_reply;
        assert_eq!(h.outbound.sent(), vec![("F".to_string(), expected.clone())]);
        assert!(h.pipeline.sessions().history("F").await.is_empty());
        assert_eq!(
            h.pipeline.sessions().last_reply("F").await,
            Some(expected)
        );
        assert!(h.provider.calls().is_empty());
        assert_eq!(h.notifier.first_contacts().len(), 1);
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let h = harness(vec![Step::Say("Ответ")]);
        assert_eq!(
            h.pipeline.handle(msg("G", "1", "  \n ")).await,
            PipelineOutcome::Ignored
        );
        assert!(h.outbound.sent().is_empty());
        assert!(h.pipeline.sessions().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_reported_not_raised() {
        let h = harness_with(vec![Step::Say("Ответ")], RecordingOutbound {
            fail: true,
            ..Default::default()
        });
        let outcome = h.pipeline.handle(msg("H", "1", "Привет")).await;
        assert!(matches!(outcome, PipelineOutcome::Replied { delivered: false, .. }));
        assert_eq!(h.pipeline.sessions().history("H").await.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_messages_from_one_sender_serialize() {
        let h = Arc::new(harness(vec![Step::Say("Ответ")]));
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let h = Arc::clone(&h);
                tokio::spawn(async move {
                    h.pipeline
                        .handle(msg("I", &format!("id-{i}"), &format!("Вопрос про бота {i}")))
                        .await
                })
            })
            .collect();
        for task in tasks {
            assert!(matches!(
                task.await.unwrap_or(PipelineOutcome::Ignored),
                PipelineOutcome::Replied { .. }
            ));
        }

        let history = h.pipeline.sessions().history("I").await;
        assert_eq!(history.len(), 16);
        for pair in history.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
        }
        assert_eq!(h.notifier.first_contacts().len(), 1);
    }
}
