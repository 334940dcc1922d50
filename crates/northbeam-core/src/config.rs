//! Site configuration loaded from TOML and environment.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::chat::{Locale, DEFAULT_COMPLETIONS_URL, DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION};
use crate::local_store::{DEFAULT_NAMESPACE, DEFAULT_STORE_PATH};

/// Gateway + store + chat settings.
///
/// | Env | Default | Description |
/// |-----|---------|-------------|
/// | NORTHBEAM_CONFIG | config/northbeam | TOML file (optional) |
/// | NORTHBEAM__BIND_ADDR | 127.0.0.1:8000 | Listen address |
/// | NORTHBEAM__STORAGE_PATH | ./data/northbeam/submissions | Sled directory |
/// | NORTHBEAM__NAMESPACE | northbeam_submissions | Storage key of the collection |
/// | NORTHBEAM__ADMIN_PASSPHRASE | (empty: admin disabled) | Review screen passphrase |
/// | NORTHBEAM__LLM_API_KEY / OPENROUTER_API_KEY | (empty) | Chat completion key |
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub app_name: String,
    pub bind_addr: String,
    pub storage_path: String,
    pub namespace: String,
    #[serde(default)]
    pub admin_passphrase: String,
    pub llm_api_url: String,
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_key: String,
    #[serde(default)]
    pub default_locale: Locale,
    pub system_instruction: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            app_name: "Northbeam Consulting".to_string(),
            bind_addr: "127.0.0.1:8000".to_string(),
            storage_path: DEFAULT_STORE_PATH.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            admin_passphrase: String::new(),
            llm_api_url: DEFAULT_COMPLETIONS_URL.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            llm_api_key: String::new(),
            default_locale: Locale::En,
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

impl SiteConfig {
    /// Precedence: env `NORTHBEAM__*` > `NORTHBEAM_CONFIG` file (or `config/northbeam.toml`) > defaults.
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("NORTHBEAM_CONFIG").unwrap_or_else(|_| "config/northbeam".to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(path: &Path) -> Result<Self, config::ConfigError> {
        let d = Self::default();
        let builder = config::Config::builder()
            .set_default("app_name", d.app_name)?
            .set_default("bind_addr", d.bind_addr)?
            .set_default("storage_path", d.storage_path)?
            .set_default("namespace", d.namespace)?
            .set_default("admin_passphrase", d.admin_passphrase)?
            .set_default("llm_api_url", d.llm_api_url)?
            .set_default("llm_model", d.llm_model)?
            .set_default("llm_api_key", d.llm_api_key)?
            .set_default("default_locale", "en")?
            .set_default("system_instruction", d.system_instruction)?;

        let builder = if path.exists() || path.with_extension("toml").exists() {
            builder.add_source(config::File::with_name(&path.to_string_lossy()))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("NORTHBEAM").separator("__"))
            .build()?;

        let mut cfg: Self = built.try_deserialize()?;
        if cfg.llm_api_key.trim().is_empty() {
            if let Ok(key) = std::env::var("OPENROUTER_API_KEY") {
                cfg.llm_api_key = key.trim().to_string();
            }
        }
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.toml");
        std::fs::write(
            &path,
            "app_name = \"Test Site\"\nnamespace = \"staging\"\nadmin_passphrase = \"pw\"\ndefault_locale = \"de\"\n",
        )
        .unwrap();
        let cfg = SiteConfig::load_from(&path).unwrap();
        assert_eq!(cfg.app_name, "Test Site");
        assert_eq!(cfg.namespace, "staging");
        assert_eq!(cfg.admin_passphrase, "pw");
        assert_eq!(cfg.default_locale, Locale::De);
        assert_eq!(cfg.bind_addr, "127.0.0.1:8000");
        assert_eq!(cfg.llm_api_url, DEFAULT_COMPLETIONS_URL);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = SiteConfig::load_from(&dir.path().join("absent")).unwrap();
        assert_eq!(cfg.namespace, DEFAULT_NAMESPACE);
        assert_eq!(cfg.storage_path, DEFAULT_STORE_PATH);
    }
}
