//! Configuration validation.
//!
//! Checks a loaded [`ConciergeConfig`] for values the bot cannot run with and
//! for settings that silently degrade behaviour (no owner number, no API key).

use std::path::{Path, PathBuf};

use crate::{
    env_subst::{substitute_env, unresolved_placeholders},
    loader::{apply_env_overrides, load_config},
    schema::ConciergeConfig,
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "value", "credentials", "placeholder", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "session.max_turns"
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "{} [{}] {}", self.severity, self.category, self.message)
        } else {
            write!(
                f,
                "{} [{}] {}: {}",
                self.severity, self.category, self.path, self.message
            )
        }
    }
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(
        &mut self,
        severity: Severity,
        category: &'static str,
        path: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.diagnostics.push(Diagnostic {
            severity,
            category,
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate an already-loaded config (after env overrides).
#[must_use]
pub fn validate(config: &ConciergeConfig) -> ValidationResult {
    let mut result = ValidationResult::default();
    check_values(config, &mut result);
    check_credentials(config, &mut result);
    result
}

/// Validate a config file on disk: syntax, unresolved `${VAR}` placeholders,
/// then the same checks as [`validate`] with deployment env overrides applied.
#[must_use]
pub fn validate_file(path: &Path) -> ValidationResult {
    let mut result = ValidationResult {
        config_path: Some(path.to_path_buf()),
        ..Default::default()
    };

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            result.push(Severity::Error, "file-ref", "", format!("cannot read file: {e}"));
            return result;
        },
    };

    for name in unresolved_placeholders(&substitute_env(&raw)) {
        result.push(
            Severity::Warning,
            "placeholder",
            "",
            format!("environment variable {name} is not set; ${{{name}}} left as-is"),
        );
    }

    match load_config(path) {
        Ok(mut config) => {
            apply_env_overrides(&mut config);
            let semantic = validate(&config);
            result.diagnostics.extend(semantic.diagnostics);
        },
        Err(e) => result.push(Severity::Error, "syntax", "", e.to_string()),
    }

    result
}

fn check_values(config: &ConciergeConfig, result: &mut ValidationResult) {
    let positive = [
        ("session.max_turns", config.session.max_turns),
        ("session.max_chars", config.session.max_chars),
        ("dedup.capacity", config.dedup.capacity),
        ("scope.cache_capacity", config.scope.cache_capacity),
    ];
    for (path, value) in positive {
        if value == 0 {
            result.push(Severity::Error, "value", path, "must be greater than zero");
        }
    }

    if config.whatsapp.send_attempts == 0 {
        result.push(
            Severity::Error,
            "value",
            "whatsapp.send_attempts",
            "must be at least 1",
        );
    }
    if config.generation.max_tokens == 0 {
        result.push(
            Severity::Error,
            "value",
            "generation.max_tokens",
            "must be greater than zero",
        );
    }
    if !(0.0..=2.0).contains(&config.generation.temperature) {
        result.push(
            Severity::Error,
            "value",
            "generation.temperature",
            "must be between 0.0 and 2.0",
        );
    }
    if config.fallback.replies.iter().all(|r| r.trim().is_empty()) {
        result.push(
            Severity::Error,
            "value",
            "fallback.replies",
            "at least one non-empty fallback reply is required",
        );
    }
    if config.scope.enabled && config.scope.out_of_scope_reply.trim().is_empty() {
        result.push(
            Severity::Error,
            "value",
            "scope.out_of_scope_reply",
            "must not be empty while scope filtering is enabled",
        );
    }
    if config.escalation.enabled && config.escalation.hot_terms.is_empty() {
        result.push(
            Severity::Warning,
            "value",
            "escalation.hot_terms",
            "escalation is enabled but no hot terms are configured",
        );
    }
    if config.generation.knowledge.trim().is_empty() {
        result.push(
            Severity::Info,
            "value",
            "generation.knowledge",
            "no business knowledge configured; replies rely on the policy prompt only",
        );
    }
}

fn check_credentials(config: &ConciergeConfig, result: &mut ValidationResult) {
    let wa = &config.whatsapp;
    if wa.verify_token.trim().is_empty() {
        result.push(
            Severity::Error,
            "credentials",
            "whatsapp.verify_token",
            "webhook verification token is not set (VERIFY_TOKEN)",
        );
    }
    if wa.access_token.is_none() {
        result.push(
            Severity::Error,
            "credentials",
            "whatsapp.access_token",
            "WhatsApp access token is not set (WHATSAPP_TOKEN)",
        );
    }
    if wa.phone_number_id.trim().is_empty() {
        result.push(
            Severity::Error,
            "credentials",
            "whatsapp.phone_number_id",
            "business phone number id is not set (WHATSAPP_PHONE_ID)",
        );
    }
    if wa.owner_number.as_deref().is_none_or(|n| n.trim().is_empty()) {
        result.push(
            Severity::Warning,
            "credentials",
            "whatsapp.owner_number",
            "no owner number; first-contact and escalation notices are disabled",
        );
    }
    if !config.provider.has_api_key() {
        result.push(
            Severity::Warning,
            "credentials",
            "provider.api_key",
            "no LLM API key (OPENAI_API_KEY); every reply will use the fallback rotation",
        );
    }
}
