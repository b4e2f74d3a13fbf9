//! Provider error classification.
//!
//! Providers report failures as `anyhow::Error` with the HTTP status and body
//! in the message; [`classify_error`] turns that into a [`ProviderErrorKind`]
//! for logging, metrics and the pipeline's fallback decision.

/// Category of a failed provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// 429.
    RateLimit,
    /// 401/403: bad key or permissions.
    AuthError,
    /// 5xx.
    ServerError,
    /// Billing/usage limit exhausted.
    BillingExhausted,
    /// Context window exceeded.
    ContextWindow,
    /// 400, bad format.
    InvalidRequest,
    /// The call did not finish within its deadline.
    Timeout,
    /// Unrecognised error.
    Unknown,
}

impl ProviderErrorKind {
    /// Stable label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::AuthError => "auth",
            Self::ServerError => "server",
            Self::BillingExhausted => "billing",
            Self::ContextWindow => "context_window",
            Self::InvalidRequest => "invalid_request",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the same request may succeed later.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::ServerError | Self::Timeout | Self::Unknown
        )
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const CONTEXT_WINDOW_PATTERNS: &[&str] = &[
    "context_length_exceeded",
    "too many tokens",
    "request too large",
    "maximum context length",
    "context window",
    "token limit",
    "content_too_large",
    "request_too_large",
];

/// Classify an error into a `ProviderErrorKind` based on the error message.
#[must_use]
pub fn classify_error(err: &anyhow::Error) -> ProviderErrorKind {
    let msg = format!("{err:#}").to_lowercase();

    // Context window first: "request too large" overlaps with 4xx handling.
    if CONTEXT_WINDOW_PATTERNS.iter().any(|p| msg.contains(p)) {
        return ProviderErrorKind::ContextWindow;
    }

    if msg.contains("429")
        || msg.contains("rate limit")
        || msg.contains("rate_limit")
        || msg.contains("too many requests")
    {
        return ProviderErrorKind::RateLimit;
    }

    if msg.contains("401")
        || msg.contains("403")
        || msg.contains("unauthorized")
        || msg.contains("forbidden")
        || msg.contains("invalid api key")
        || msg.contains("invalid_api_key")
        || msg.contains("authentication")
    {
        return ProviderErrorKind::AuthError;
    }

    if msg.contains("billing")
        || msg.contains("quota")
        || msg.contains("insufficient_quota")
        || msg.contains("usage limit")
        || msg.contains("credit")
    {
        return ProviderErrorKind::BillingExhausted;
    }

    if msg.contains("500")
        || msg.contains("502")
        || msg.contains("503")
        || msg.contains("504")
        || msg.contains("internal server error")
        || msg.contains("bad gateway")
        || msg.contains("service unavailable")
        || msg.contains("overloaded")
    {
        return ProviderErrorKind::ServerError;
    }

    if msg.contains("timed out") || msg.contains("timeout") {
        return ProviderErrorKind::Timeout;
    }

    if msg.contains("400") || msg.contains("bad request") || msg.contains("invalid_request") {
        return ProviderErrorKind::InvalidRequest;
    }

    ProviderErrorKind::Unknown
}
