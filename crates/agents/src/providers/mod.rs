pub mod openai;
pub mod openai_compat;

use std::sync::Arc;

use {
    concierge_config::ProviderConfig,
    secrecy::{ExposeSecret, Secret},
    tracing::warn,
};

use crate::model::LlmProvider;

/// Resolve the API key from config, falling back to `OPENAI_API_KEY`,
/// keeping the value wrapped in `Secret<String>`.
fn resolve_api_key(config: &ProviderConfig) -> Option<Secret<String>> {
    config
        .api_key
        .clone()
        .or_else(|| {
            std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|k| !k.is_empty())
                .map(Secret::new)
        })
        .filter(|s| !s.expose_secret().is_empty())
}

/// Build an OpenAI-compatible provider for `model`, or `None` when no API key
/// is available (callers then run on fallbacks only).
pub fn openai_from_config(config: &ProviderConfig, model: &str) -> Option<Arc<dyn LlmProvider>> {
    let Some(api_key) = resolve_api_key(config) else {
        warn!(model, "no API key configured for the LLM provider");
        return None;
    };
    let base_url = config.base_url.trim_end_matches('/').to_string();
    Some(Arc::new(openai::OpenAiProvider::new(
        api_key,
        model.to_string(),
        base_url,
    )))
}
