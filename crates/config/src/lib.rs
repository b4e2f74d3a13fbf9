//! Configuration loading, validation, env substitution, and env overrides.
//!
//! Config files: `concierge.toml`, `concierge.yaml`, or `concierge.json`
//! Searched in `./` then `~/.config/concierge/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values, plus the plain
//! deployment variables (`VERIFY_TOKEN`, `WHATSAPP_TOKEN`, ...) applied on top.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{apply_env_overrides, config_dir, find_config_file, load_config},
    schema::{
        BusinessConfig, ConciergeConfig, DedupConfig, EscalationConfig, FallbackConfig,
        GenerationConfig, MetricsConfig, ProviderConfig, ScopeConfig, ServerConfig,
        SessionConfig, WhatsAppConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_file},
};
