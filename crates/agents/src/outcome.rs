//! Bounded provider calls with an explicit outcome.
//!
//! The pipeline never sees provider errors: every call goes through
//! [`complete_bounded`], which applies a deadline and folds success, empty
//! output, timeout and failure into one [`CompletionOutcome`].

use std::time::{Duration, Instant};

use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use concierge_metrics::{counter, histogram, labels, llm as llm_metrics};

use crate::{
    model::{ChatMessage, CompletionOptions, LlmProvider},
    provider_error::{ProviderErrorKind, classify_error},
};

/// Result of one bounded completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// Non-empty visible text.
    Text(String),
    /// The call succeeded but produced no visible text.
    Empty,
    /// The call failed or timed out.
    Failed(ProviderErrorKind),
}

impl CompletionOutcome {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Empty | Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }
}

/// Run `provider.complete` under `timeout` and classify the result.
pub async fn complete_bounded(
    provider: &dyn LlmProvider,
    messages: &[ChatMessage],
    options: &CompletionOptions,
    timeout: Duration,
) -> CompletionOutcome {
    let started = Instant::now();
    let result = tokio::time::timeout(timeout, provider.complete(messages, options)).await;
    let elapsed = started.elapsed();

    let outcome = match result {
        Ok(Ok(resp)) => match resp.text.map(|t| t.trim().to_string()) {
            Some(text) if !text.is_empty() => CompletionOutcome::Text(text),
            _ => CompletionOutcome::Empty,
        },
        Ok(Err(err)) => {
            let kind = classify_error(&err);
            warn!(
                provider = provider.name(),
                model = provider.id(),
                %kind,
                transient = kind.is_transient(),
                error = %err,
                "completion failed"
            );
            CompletionOutcome::Failed(kind)
        },
        Err(_) => {
            warn!(
                provider = provider.name(),
                model = provider.id(),
                timeout_ms = timeout.as_millis() as u64,
                "completion timed out"
            );
            CompletionOutcome::Failed(ProviderErrorKind::Timeout)
        },
    };

    debug!(
        provider = provider.name(),
        model = provider.id(),
        elapsed_ms = elapsed.as_millis() as u64,
        outcome = outcome_label(&outcome),
        "completion finished"
    );

    #[cfg(feature = "metrics")]
    {
        let provider_name = provider.name().to_string();
        let model = provider.id().to_string();
        counter!(
            llm_metrics::COMPLETIONS_TOTAL,
            labels::PROVIDER => provider_name.clone(),
            labels::MODEL => model.clone(),
        )
        .increment(1);
        histogram!(
            llm_metrics::COMPLETION_DURATION_SECONDS,
            labels::PROVIDER => provider_name.clone(),
            labels::MODEL => model.clone(),
        )
        .record(elapsed.as_secs_f64());
        if let CompletionOutcome::Failed(kind) = &outcome {
            counter!(
                llm_metrics::COMPLETION_ERRORS_TOTAL,
                labels::PROVIDER => provider_name,
                labels::MODEL => model,
                labels::ERROR_TYPE => kind.as_str(),
            )
            .increment(1);
        }
    }

    outcome
}

fn outcome_label(outcome: &CompletionOutcome) -> &'static str {
    match outcome {
        CompletionOutcome::Text(_) => "text",
        CompletionOutcome::Empty => "empty",
        CompletionOutcome::Failed(kind) => kind.as_str(),
    }
}
