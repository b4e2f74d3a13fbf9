//! LLM access: the provider trait, an OpenAI-compatible client, error
//! classification, and the bounded-call outcome type the pipeline consumes.

pub mod model;
pub mod outcome;
pub mod provider_error;
pub mod providers;

pub use {
    model::{ChatMessage, CompletionOptions, CompletionResponse, LlmProvider, Usage},
    outcome::{CompletionOutcome, complete_bounded},
    provider_error::{ProviderErrorKind, classify_error},
};

/// Process-wide HTTP client shared by all providers.
pub fn shared_http_client() -> &'static reqwest::Client {
    static CLIENT: std::sync::LazyLock<reqwest::Client> =
        std::sync::LazyLock::new(reqwest::Client::new);
    &CLIENT
}
