//! Inbound message processing pipeline: the glue between channels and agents.
//!
//! Flow: dedup → session (first contact) → scope classification → history
//! update → reply generation → fallback rotation → escalation throttle →
//! session append → channel outbound.

pub mod escalation;
pub mod fallback;
pub mod pipeline;
pub mod reply;
pub mod scope;

pub use {
    escalation::{EscalationDecision, EscalationThrottle},
    fallback::FallbackRotator,
    pipeline::{Pipeline, PipelineOutcome, ReplySource},
    reply::ReplyGenerator,
    scope::{Scope, ScopeCache, ScopeClassifier, ScopeKeywords},
};
