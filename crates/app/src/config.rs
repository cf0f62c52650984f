// Configuration de l'application voice-practice
//
// Fichier TOML optionnel : la section [session] reprend SessionConfig,
// la section [logging] règle les traces.
//
//   [logging]
//   level = "debug"
//   json = false
//
//   [session.network]
//   base_url = "https://voice.example.com/api"

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use session::SessionConfig;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filtre tracing par défaut ; `RUST_LOG` a priorité
    pub level: String,

    /// Sortie JSON (une ligne par événement)
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json: false }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub session: SessionConfig,
}

impl AppConfig {
    /// Charge le fichier s'il est fourni, sinon les valeurs par défaut
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("lecture de {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("configuration {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.session.validate()?;
        Ok(config)
    }
}
