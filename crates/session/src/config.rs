//! Configuration de la session de pratique vocale
//!
//! Chargeable depuis un fichier TOML ; chaque champ absent prend sa
//! valeur par défaut :
//!
//! ```toml
//! flush_threshold_ms = 100
//! commit_delay_ms = 500
//!
//! [audio]
//! sample_rate = 24000
//!
//! [network]
//! base_url = "https://voice.example.com/api"
//! poll_interval_ms = 600
//! ```

use audio::AudioConfig;
use network::NetworkConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{SessionError, SessionResult};

/// Configuration complète d'une session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub audio: AudioConfig,
    pub network: NetworkConfig,

    /// Durée d'audio accumulée avant envoi, en ms (défaut: 100)
    pub flush_threshold_ms: u32,

    /// Silence après lequel l'énoncé est commité, en ms (défaut: 500)
    pub commit_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            network: NetworkConfig::default(),
            flush_threshold_ms: 100,
            commit_delay_ms: 500,
        }
    }
}

impl SessionConfig {
    /// Seuil d'envoi en octets PCM16
    ///
    /// Exemple : 100ms à 24 kHz mono = 4800 octets
    pub fn flush_threshold_bytes(&self) -> usize {
        self.audio.bytes_for_ms(self.flush_threshold_ms)
    }

    pub fn commit_delay(&self) -> Duration {
        Duration::from_millis(self.commit_delay_ms)
    }

    /// Valide la configuration complète
    pub fn validate(&self) -> SessionResult<()> {
        self.audio.validate().map_err(SessionError::Config)?;
        self.network.validate().map_err(SessionError::Config)?;

        if self.flush_threshold_ms == 0 {
            return Err(SessionError::Config("flush_threshold_ms doit être > 0".to_string()));
        }

        if self.commit_delay_ms == 0 {
            return Err(SessionError::Config("commit_delay_ms doit être > 0".to_string()));
        }

        Ok(())
    }

    /// Lit et valide une configuration TOML
    pub fn from_toml_str(content: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SessionError::Config(format!("TOML invalide: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Charge une configuration depuis un fichier TOML
    pub fn load(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("Lecture de {} impossible: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }
}
