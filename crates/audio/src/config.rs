//! Configuration audio pour le pipeline de pratique vocale
//!
//! Le format est imposé par l'agent vocal distant : mono, 24 kHz,
//! PCM 16 bits signé little-endian. Toute divergence entre capture et
//! lecture fait jouer l'audio à la mauvaise vitesse ou le rend inaudible.

use serde::{Deserialize, Serialize};

/// Taille d'un échantillon PCM16 en octets
pub const BYTES_PER_SAMPLE: usize = 2;

/// Configuration principale pour tout le système audio
///
/// `#[serde(default)]` permet de ne surcharger que quelques champs
/// depuis un fichier TOML.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Fréquence d'échantillonnage en Hz (échantillons par seconde)
    ///
    /// 24000 Hz = format attendu par l'agent conversationnel
    pub sample_rate: u32,

    /// Nombre de canaux audio
    ///
    /// Le protocole ne transporte que du mono
    pub channels: u16,

    /// Nombre de chunks en attente entre le callback matériel et le pipeline
    ///
    /// Au-delà, les chunks sont perdus plutôt que de bloquer le thread audio
    pub capture_queue_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 24000,         // 24 kHz - format de l'agent distant
            channels: 1,                // Mono pour la voix
            capture_queue_size: 64,     // ~1s de callbacks typiques
        }
    }
}

impl AudioConfig {
    /// Débit brut en octets par seconde
    ///
    /// Exemple : 24000 * 1 * 2 = 48000 octets/s
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * BYTES_PER_SAMPLE
    }

    /// Nombre d'octets correspondant à une durée donnée
    ///
    /// Exemple : 100ms à 24 kHz mono = 4800 octets
    pub fn bytes_for_ms(&self, duration_ms: u32) -> usize {
        self.bytes_per_second() * duration_ms as usize / 1000
    }

    /// Durée (en secondes) d'un nombre d'échantillons mono
    pub fn duration_of_samples(&self, sample_count: usize) -> f64 {
        sample_count as f64 / self.sample_rate as f64
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate < 8000 || self.sample_rate > 48000 {
            return Err(format!("Sample rate invalide: {} (doit être entre 8000 et 48000)", self.sample_rate));
        }

        if self.channels != 1 {
            return Err(format!("Nombre de canaux invalide: {} (le protocole est mono)", self.channels));
        }

        if self.capture_queue_size == 0 {
            return Err("La file de capture doit contenir au moins un chunk".to_string());
        }

        Ok(())
    }
}
