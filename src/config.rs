use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::providers::{DEFAULT_OPENAI_BASE_URL, DEFAULT_OPENAI_MODEL};
use crate::seeds::SeedCategory;

pub const DEFAULT_CONFIG_FILE: &str = "seedgame.yaml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind { Mock, OpenAI }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderCfg{
    pub kind: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Client-side pacing of completion calls; unset means unpaced.
    #[serde(default)]
    pub rate_per_min: Option<u32>,
}

/// Form defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameCfg{
    pub seed: i64,
    pub prompt: String,
    pub prefix: String,
    pub category: SeedCategory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCfg{
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub provider: ProviderCfg,
    #[serde(default)]
    pub game: GameCfg,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
}

fn default_model() -> String { DEFAULT_OPENAI_MODEL.into() }
fn default_base_url() -> String { DEFAULT_OPENAI_BASE_URL.into() }
fn default_api_key_env() -> String { "OPENAI_API_KEY".into() }
fn default_bind() -> String { "127.0.0.1:8080".into() }
fn default_credentials_file() -> PathBuf { PathBuf::from("creds.yaml") }

impl Default for ProviderCfg {
    fn default() -> Self {
        Self {
            kind: ProviderKind::OpenAI,
            model: default_model(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            rate_per_min: None,
        }
    }
}

impl Default for GameCfg {
    fn default() -> Self {
        Self {
            seed: 42,
            prompt: "Generate one baby name".into(),
            prefix: "Your mood is: ".into(),
            category: SeedCategory::Word,
        }
    }
}

impl Default for AppCfg {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            provider: ProviderCfg::default(),
            game: GameCfg::default(),
            credentials_file: default_credentials_file(),
        }
    }
}

impl AppCfg {
    pub fn from_yaml(txt: &str) -> Result<Self> {
        serde_yaml::from_str(txt).context("Failed to parse config YAML")
    }

    /// An explicit path must exist; without one, `seedgame.yaml` is used if
    /// present and built-in defaults otherwise. Env overrides apply last.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let txt = tokio::fs::read_to_string(p)
                    .await
                    .context(format!("Failed to read config file: {}", p.display()))?;
                Self::from_yaml(&txt)?
            }
            None => match tokio::fs::read_to_string(DEFAULT_CONFIG_FILE).await {
                Ok(txt) => Self::from_yaml(&txt)?,
                Err(_) => Self::default(),
            },
        };
        cfg.apply_env()?;
        Ok(cfg)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(bind) = std::env::var("SEEDGAME_BIND") {
            self.bind = bind;
        }
        if let Ok(kind) = std::env::var("SEEDGAME_PROVIDER") {
            self.provider.kind = match kind.to_ascii_lowercase().as_str() {
                "mock" => ProviderKind::Mock,
                "openai" => ProviderKind::OpenAI,
                other => anyhow::bail!("unknown SEEDGAME_PROVIDER: {other}"),
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_yaml_fills_defaults() {
        let cfg = AppCfg::from_yaml("provider:\n  kind: mock\n").unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Mock);
        assert_eq!(cfg.provider.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(cfg.provider.rate_per_min, None);
        assert_eq!(cfg.game, GameCfg::default());
        assert_eq!(cfg.bind, "127.0.0.1:8080");
        assert_eq!(cfg.credentials_file, PathBuf::from("creds.yaml"));
    }

    #[test]
    fn full_yaml() {
        let txt = r#"
bind: 0.0.0.0:9000
provider:
  kind: openai
  model: gpt-4o-mini
  base_url: http://localhost:4000/v1
  api_key_env: MY_KEY
  rate_per_min: 30
game:
  seed: 7
  prompt: Name a fruit
  prefix: "Seed:"
  category: large_number
credentials_file: /etc/seedgame/creds.yaml
"#;
        let cfg = AppCfg::from_yaml(txt).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:9000");
        assert_eq!(cfg.provider.api_key_env, "MY_KEY");
        assert_eq!(cfg.provider.rate_per_min, Some(30));
        assert_eq!(cfg.game.seed, 7);
        assert_eq!(cfg.game.category, SeedCategory::LargeNumber);
    }

    #[test]
    fn defaults_match_form() {
        let g = GameCfg::default();
        assert_eq!(g.seed, 42);
        assert_eq!(g.prompt, "Generate one baby name");
        assert_eq!(g.prefix, "Your mood is: ");
    }

    #[tokio::test]
    async fn missing_explicit_file_is_an_error() {
        assert!(AppCfg::load(Some(Path::new("/nonexistent/seedgame.yaml"))).await.is_err());
    }
}
