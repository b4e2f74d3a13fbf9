use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{
    env_subst::substitute_env,
    error::{Context, Error, Result},
    schema::ConciergeConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "concierge.toml",
    "concierge.yaml",
    "concierge.yml",
    "concierge.json",
];

/// Load config from the given path (any supported format).
///
/// A relative `generation.knowledge_file` is resolved against the directory
/// containing `path` and its contents replace `generation.knowledge`.
pub fn load_config(path: &Path) -> Result<ConciergeConfig> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    let raw = substitute_env(&raw);
    let mut config = parse_config(&raw, path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    resolve_knowledge_file(&mut config, base_dir)?;
    Ok(config)
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/concierge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "concierge").map(|d| d.config_dir().to_path_buf())
}

/// Apply deployment environment variables on top of the loaded config.
///
/// Recognised: `VERIFY_TOKEN`, `WHATSAPP_TOKEN`, `WHATSAPP_PHONE_ID`,
/// `OPENAI_API_KEY`, `OWNER_NUMBER`, `PORT`. Set, non-empty values win over
/// file values.
pub fn apply_env_overrides(config: &mut ConciergeConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

pub(crate) fn apply_env_overrides_with(
    config: &mut ConciergeConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(token) = get("VERIFY_TOKEN") {
        config.whatsapp.verify_token = token;
    }
    if let Some(token) = get("WHATSAPP_TOKEN") {
        config.whatsapp.access_token = Some(Secret::new(token));
    }
    if let Some(id) = get("WHATSAPP_PHONE_ID") {
        config.whatsapp.phone_number_id = id;
    }
    if let Some(owner) = get("OWNER_NUMBER") {
        config.whatsapp.owner_number = Some(owner);
    }
    if let Some(key) = get("OPENAI_API_KEY") {
        config.provider.api_key = Some(Secret::new(key));
    }
    if let Some(port) = get("PORT") {
        match port.trim().parse::<u16>() {
            Ok(p) => config.server.port = p,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PORT"),
        }
    }
}

fn resolve_knowledge_file(config: &mut ConciergeConfig, base_dir: &Path) -> Result<()> {
    let Some(file) = config.generation.knowledge_file.as_ref() else {
        return Ok(());
    };
    let path = if file.is_absolute() {
        file.clone()
    } else {
        base_dir.join(file)
    };
    let knowledge = std::fs::read_to_string(&path)
        .with_context(|| format!("knowledge file {}", path.display()))?;
    debug!(path = %path.display(), chars = knowledge.chars().count(), "loaded knowledge file");
    config.generation.knowledge = knowledge;
    Ok(())
}

fn parse_config(raw: &str, path: &Path) -> Result<ConciergeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => toml::from_str(raw).map_err(|e| Error::parse("toml", e)),
        "yaml" | "yml" => serde_yaml::from_str(raw).map_err(|e| Error::parse("yaml", e)),
        "json" => serde_json::from_str(raw).map_err(|e| Error::parse("json", e)),
        other => Err(Error::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, secrecy::ExposeSecret};

    #[test]
    fn loads_toml_with_knowledge_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kb.md"), "Мы делаем чат-ботов.").unwrap();
        let path = dir.path().join("concierge.toml");
        std::fs::write(
            &path,
            r#"
            [generation]
            knowledge_file = "kb.md"
            max_tokens = 200
            "#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.generation.knowledge, "Мы делаем чат-ботов.");
        assert_eq!(cfg.generation.max_tokens, 200);
    }

    #[test]
    fn loads_yaml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let yaml = dir.path().join("concierge.yaml");
        std::fs::write(&yaml, "dedup:\n  capacity: 10\n").unwrap();
        assert_eq!(load_config(&yaml).unwrap().dedup.capacity, 10);

        let json = dir.path().join("concierge.json");
        std::fs::write(&json, r#"{"session": {"max_turns": 4}}"#).unwrap();
        assert_eq!(load_config(&json).unwrap().session.max_turns, 4);
    }

    #[test]
    fn missing_knowledge_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concierge.toml");
        std::fs::write(&path, "[generation]\nknowledge_file = \"nope.md\"\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("nope.md"));
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concierge.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let mut cfg = ConciergeConfig::default();
        cfg.whatsapp.verify_token = "from-file".into();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "VERIFY_TOKEN" => Some("from-env".into()),
            "WHATSAPP_TOKEN" => Some("wa".into()),
            "WHATSAPP_PHONE_ID" => Some("12345".into()),
            "OPENAI_API_KEY" => Some("sk".into()),
            "OWNER_NUMBER" => Some("77000000000".into()),
            "PORT" => Some("8081".into()),
            _ => None,
        });
        assert_eq!(cfg.whatsapp.verify_token, "from-env");
        assert_eq!(
            cfg.whatsapp.access_token.as_ref().map(|s| s.expose_secret().as_str()),
            Some("wa")
        );
        assert_eq!(cfg.whatsapp.phone_number_id, "12345");
        assert_eq!(cfg.whatsapp.owner_number.as_deref(), Some("77000000000"));
        assert!(cfg.provider.has_api_key());
        assert_eq!(cfg.server.port, 8081);
    }

    #[test]
    fn empty_or_invalid_env_values_are_ignored() {
        let mut cfg = ConciergeConfig::default();
        apply_env_overrides_with(&mut cfg, |name| match name {
            "VERIFY_TOKEN" => Some("   ".into()),
            "PORT" => Some("not-a-port".into()),
            _ => None,
        });
        assert!(cfg.whatsapp.verify_token.is_empty());
        assert_eq!(cfg.server.port, 5000);
    }
}
