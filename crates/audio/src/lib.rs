//! Crate audio pour la pratique vocale temps réel
//!
//! Ce crate gère toute la chaîne audio côté client :
//! - Capture microphone avec cpal (PCM16 mono)
//! - Transcodage PCM16 ⇄ float ⇄ base64
//! - Lecture audio avec cpal, sur l'horloge du périphérique
//! - Planification sans chevauchement de l'audio de l'assistant

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioChunk, Sample)
pub mod traits;      // Traits abstraits
pub mod capture;     // Implémentation capture avec cpal
pub mod playback;    // Implémentation lecture avec cpal
pub mod codec;       // PCM16 / base64
pub mod scheduler;   // Horloge et planification de lecture
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::CpalCapture;
pub use playback::{CpalOutputDevice, CpalPlayback};
pub use codec::Pcm16Codec;
pub use scheduler::{PlaybackClock, PlaybackScheduler, PlaybackStats, ScheduledChunk};
