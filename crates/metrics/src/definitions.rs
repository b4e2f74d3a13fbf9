//! Metric name and label definitions.
//!
//! Every metric emitted by concierge is named here so the set of exported
//! series is documented in one place.

/// Inbound pipeline metrics
pub mod auto_reply {
    /// Total inbound messages handed to the pipeline
    pub const MESSAGES_RECEIVED_TOTAL: &str = "concierge_auto_reply_messages_received_total";
    /// Redelivered messages suppressed by the dedup window
    pub const DUPLICATES_TOTAL: &str = "concierge_auto_reply_duplicates_total";
    /// End-to-end event processing duration in seconds
    pub const PROCESSING_DURATION_SECONDS: &str =
        "concierge_auto_reply_processing_duration_seconds";
    /// Replies by source (generated, fallback, out_of_scope)
    pub const REPLIES_TOTAL: &str = "concierge_auto_reply_replies_total";
    /// Fallback replies by reason (empty, repeat)
    pub const FALLBACKS_TOTAL: &str = "concierge_auto_reply_fallbacks_total";
    /// Outbound delivery failures after retries
    pub const DELIVERY_FAILURES_TOTAL: &str = "concierge_auto_reply_delivery_failures_total";
    /// First-contact notifications raised
    pub const FIRST_CONTACTS_TOTAL: &str = "concierge_auto_reply_first_contacts_total";
}

/// Session store metrics
pub mod sessions {
    /// Sessions currently held in memory
    pub const ACTIVE: &str = "concierge_sessions_active";
    /// Turns dropped by history truncation
    pub const TRUNCATED_TURNS_TOTAL: &str = "concierge_sessions_truncated_turns_total";
}

/// Scope classification metrics
pub mod scope {
    /// Decisions by outcome and path (cache, keyword, remote, fail_open)
    pub const DECISIONS_TOTAL: &str = "concierge_scope_decisions_total";
    /// Remote classification calls that failed and defaulted to in-scope
    pub const FAIL_OPEN_TOTAL: &str = "concierge_scope_fail_open_total";
}

/// Escalation metrics
pub mod escalation {
    /// Escalation notifications fired
    pub const FIRED_TOTAL: &str = "concierge_escalation_fired_total";
    /// Hot-term matches suppressed by the cooldown window
    pub const SUPPRESSED_TOTAL: &str = "concierge_escalation_suppressed_total";
}

/// LLM provider metrics
pub mod llm {
    /// Total number of LLM completions requested
    pub const COMPLETIONS_TOTAL: &str = "concierge_llm_completions_total";
    /// Duration of LLM completion requests in seconds
    pub const COMPLETION_DURATION_SECONDS: &str = "concierge_llm_completion_duration_seconds";
    /// LLM completion errors by kind
    pub const COMPLETION_ERRORS_TOTAL: &str = "concierge_llm_completion_errors_total";
}

/// WhatsApp channel metrics
pub mod whatsapp {
    /// Outbound send attempts (including retries)
    pub const SEND_ATTEMPTS_TOTAL: &str = "concierge_whatsapp_send_attempts_total";
    /// Webhook payloads received
    pub const WEBHOOKS_TOTAL: &str = "concierge_whatsapp_webhooks_total";
}

/// Common label keys
pub mod labels {
    pub const CHANNEL: &str = "channel";
    pub const PROVIDER: &str = "provider";
    pub const MODEL: &str = "model";
    pub const ERROR_TYPE: &str = "error_type";
    pub const SOURCE: &str = "source";
    pub const REASON: &str = "reason";
    pub const DECISION: &str = "decision";
    pub const PATH: &str = "path";
    pub const SUCCESS: &str = "success";
}

/// Histogram bucket boundaries
pub mod buckets {
    /// Pipeline processing: dominated by one or two LLM round-trips.
    pub const PROCESSING_DURATION: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];
    /// LLM completion latency.
    pub const LLM_DURATION: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0];
}
