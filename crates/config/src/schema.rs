/// Config schema types (server, whatsapp, provider, core pipeline policy).
use std::path::PathBuf;

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConciergeConfig {
    pub server: ServerConfig,
    pub whatsapp: WhatsAppConfig,
    pub provider: ProviderConfig,
    pub business: BusinessConfig,
    pub session: SessionConfig,
    pub dedup: DedupConfig,
    pub scope: ScopeConfig,
    pub generation: GenerationConfig,
    pub fallback: FallbackConfig,
    pub escalation: EscalationConfig,
    pub metrics: MetricsConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to. Defaults to "0.0.0.0" (webhooks arrive from outside).
    pub bind: String,
    /// Port to listen on. Defaults to 5000, overridable with `PORT`.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

/// WhatsApp Cloud API account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhatsAppConfig {
    /// Token echoed back during webhook subscription (`VERIFY_TOKEN`).
    pub verify_token: String,
    /// Graph API bearer token (`WHATSAPP_TOKEN`).
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub access_token: Option<Secret<String>>,
    /// Business phone number id (`WHATSAPP_PHONE_ID`).
    pub phone_number_id: String,
    pub api_base: String,
    pub api_version: String,
    /// Number that receives first-contact and escalation notices (`OWNER_NUMBER`).
    pub owner_number: Option<String>,
    /// Total send attempts per outbound message (first try included).
    pub send_attempts: u32,
    /// Base delay for exponential backoff between send attempts.
    pub retry_base_ms: u64,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            verify_token: String::new(),
            access_token: None,
            phone_number_id: String::new(),
            api_base: "https://graph.facebook.com".into(),
            api_version: "v21.0".into(),
            owner_number: None,
            send_attempts: 3,
            retry_base_ms: 500,
            request_timeout_secs: 15,
        }
    }
}

/// OpenAI-compatible chat completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// API key; falls back to `OPENAI_API_KEY`.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_key: Option<Secret<String>>,
    /// Model used for replies.
    pub model: String,
    /// Model used for scope classification. Defaults to `model`.
    pub classifier_model: Option<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            api_key: None,
            model: "gpt-4o-mini".into(),
            classifier_model: None,
        }
    }
}

impl ProviderConfig {
    #[must_use]
    pub fn classifier_model(&self) -> &str {
        self.classifier_model.as_deref().unwrap_or(&self.model)
    }

    #[must_use]
    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
    }
}

/// Business identity used in prompts and owner notices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusinessConfig {
    pub name: String,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: "ISTE AI".into(),
        }
    }
}

/// Per-sender history bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum retained turns per sender.
    pub max_turns: usize,
    /// Maximum cumulative characters of retained turn content per sender.
    pub max_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_chars: 8_000,
        }
    }
}

/// Redelivery suppression window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub capacity: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { capacity: 5_000 }
    }
}

/// Topic-scope classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// When false every message is treated as in scope.
    pub enabled: bool,
    /// Cached decisions older than this are recomputed.
    pub freshness_secs: u64,
    pub cache_capacity: usize,
    /// Bound on the remote classification call.
    pub timeout_secs: u64,
    /// Terms that mark a message as on-topic. Matching any of them wins ties.
    /// Terms match at the start of a word, so stems like "автоматиз" work.
    pub in_domain: Vec<String>,
    /// Terms that mark a message as off-topic when no in-domain term matches.
    pub out_domain: Vec<String>,
    /// Reply sent to off-topic messages.
    pub out_of_scope_reply: String,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            freshness_secs: 600,
            cache_capacity: 2_048,
            timeout_secs: 8,
            in_domain: to_strings(DEFAULT_IN_DOMAIN),
            out_domain: to_strings(DEFAULT_OUT_DOMAIN),
            out_of_scope_reply: "Извините, я могу помочь только с вопросами об ИИ-решениях \
                                 для бизнеса: чат-боты, ИИ-агенты, автоматизация и интеграции. \
                                 Чем могу помочь в этой области? 😊"
                .into(),
        }
    }
}

const DEFAULT_IN_DOMAIN: &[&str] = &[
    "здравствуй",
    "привет",
    "добрый день",
    "iste",
    "ии",
    "бот",
    "агент",
    "ассистент",
    "автоматиз",
    "интеграц",
    "crm",
    "битрикс",
    "amocrm",
    "whatsapp",
    "telegram",
    "instagram",
    "сайт",
    "заявк",
    "аналитик",
    "стоимост",
    "цена",
    "бюджет",
    "созвон",
    "казахстан",
    "алматы",
    "астана",
    "hello",
    "chatbot",
    "automation",
    "integration",
];

const DEFAULT_OUT_DOMAIN: &[&str] = &[
    "погод",
    "рецепт",
    "футбол",
    "гороскоп",
    "анекдот",
    "политик",
    "выборы",
    "кредит",
    "ставк",
    "казино",
    "фильм",
    "сериал",
    "домашнее задание",
    "weather",
    "recipe",
    "horoscope",
    "football",
    "movie",
];

/// Reply generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Only the most recent turns are sent to the model.
    pub history_turns: usize,
    /// Fixed policy/rules block placed first in the model input.
    pub policy: String,
    /// Inline knowledge block.
    pub knowledge: String,
    /// File whose contents replace `knowledge`; relative paths resolve
    /// against the config file's directory.
    pub knowledge_file: Option<PathBuf>,
    /// Text dispatched if a reply would otherwise be empty.
    pub placeholder: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 400,
            temperature: 0.6,
            timeout_secs: 30,
            history_turns: 12,
            policy: "Ты — дружелюбный, профессиональный виртуальный помощник компании ISTE AI. \
                     Отвечай кратко, понятно и по делу, используя корпоративный стиль и базу \
                     знаний. Не выдумывай цены и сроки; если не знаешь ответа, предложи \
                     связаться с менеджером."
                .into(),
            knowledge: "ISTE AI разрабатывает и внедряет ИИ-агентов, чат-ботов и \
                        автоматизированные решения для бизнеса: WhatsApp, Telegram, Instagram, \
                        сайт, интеграции с CRM (Bitrix, amoCRM, Notion, Google Sheets), \
                        аналитика. Контакты: support@iste-ai.com, iste-ai.kz."
                .into(),
            knowledge_file: None,
            placeholder: "…".into(),
        }
    }
}

/// Canned replies used when generation fails or repeats itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    pub replies: Vec<String>,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            replies: to_strings(&[
                "Спасибо за сообщение! 😊 Мы разрабатываем ИИ-агентов и чат-ботов для бизнеса. \
                 Расскажите, какую задачу вы хотите автоматизировать?",
                "Уточните, пожалуйста, для какого канала нужен бот: WhatsApp, Telegram, \
                 Instagram или сайт?",
                "Наш менеджер может рассказать подробнее и подобрать решение. Удобно \
                 созвониться? 📞",
                "Мы также настраиваем интеграции с CRM и аналитику. Что для вас сейчас \
                 важнее всего?",
            ]),
        }
    }
}

/// Owner escalation on "hot" conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub enabled: bool,
    /// Minimum time between two escalations for the same sender.
    pub cooldown_secs: u64,
    pub hot_terms: Vec<String>,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 300,
            hot_terms: to_strings(&[
                "созвон",
                "звонок",
                "позвон",
                "срочно",
                "бюджет",
                "цена",
                "стоимост",
                "сколько стоит",
                "прайс",
                "договор",
                "call",
                "urgent",
                "budget",
                "price",
            ]),
        }
    }
}

/// Metrics export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ConciergeConfig::default();
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.dedup.capacity, 5_000);
        assert_eq!(cfg.scope.freshness_secs, 600);
        assert_eq!(cfg.escalation.cooldown_secs, 300);
        assert_eq!(cfg.generation.max_tokens, 400);
        assert_eq!(cfg.provider.model, "gpt-4o-mini");
        assert!(cfg.fallback.replies.len() >= 2);
    }

    #[test]
    fn classifier_model_defaults_to_reply_model() {
        let mut provider = ProviderConfig::default();
        assert_eq!(provider.classifier_model(), "gpt-4o-mini");
        provider.classifier_model = Some("gpt-4.1-nano".into());
        assert_eq!(provider.classifier_model(), "gpt-4.1-nano");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: ConciergeConfig = toml::from_str(
            r#"
            [session]
            max_turns = 6

            [escalation]
            hot_terms = ["urgent"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.session.max_turns, 6);
        assert_eq!(cfg.session.max_chars, 8_000);
        assert_eq!(cfg.escalation.hot_terms, vec!["urgent".to_string()]);
        assert_eq!(cfg.escalation.cooldown_secs, 300);
    }

    #[test]
    fn secrets_serialize_when_present() {
        let mut cfg = ConciergeConfig::default();
        cfg.provider.api_key = Some(Secret::new("sk-test".into()));
        let out = toml::to_string(&cfg).unwrap();
        assert!(out.contains("sk-test"));
        assert!(!out.contains("access_token"));
    }
}
