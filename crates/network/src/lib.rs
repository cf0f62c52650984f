//! Crate network - Communication avec l'agent vocal distant
//!
//! Ce crate fournit tout ce qui parle à l'agent conversationnel :
//! création et fin de session, envoi d'audio encodé, commit d'énoncé,
//! et polling des événements (audio de l'assistant, transcriptions, erreurs).
//!
//! # Architecture
//!
//! Le crate est organisé en plusieurs modules :
//!
//! - `error` : Gestion d'erreurs, dont le statut distingué "not found"
//! - `types` : Types de données (handle, événements, configuration)
//! - `traits` : Trait `VoiceBackend`, contrat de l'agent distant
//! - `transport` : Implémentations HTTP (réelle) et simulée
//! - `poller` : Polling périodique avec garde anti-chevauchement
//!
//! # Examples
//!
//! ## Session basique
//!
//! ```rust,no_run
//! use network::{HttpVoiceBackend, NetworkConfig, SessionParams, VoiceBackend};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpVoiceBackend::new(&NetworkConfig::default())?;
//!
//! let created = backend.create_session(&SessionParams::default()).await?;
//! backend.send_audio(&created.handle, "AAAA".to_string()).await?;
//! backend.commit(&created.handle).await?;
//!
//! for event in backend.poll_events(&created.handle).await? {
//!     println!("Événement {}", event.kind());
//! }
//!
//! backend.end_session(&created.handle).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Tests et simulation
//!
//! ```rust
//! use network::{BackendOperation, SimulatedBackend, VoiceEvent};
//!
//! let backend = SimulatedBackend::new();
//! backend.push_events([VoiceEvent::AssistantAudioComplete]);
//! backend.set_failing(BackendOperation::Commit, true);
//! ```

// Modules internes
mod error;
mod types;
mod traits;
mod transport;
mod poller;

// Re-exports publics
pub use error::{NetworkError, NetworkResult};

pub use types::{
    CreatedSession, HandleCell, NetworkConfig, SessionHandle, SessionParams,
    TranscriptFragment, TranscriptRole, VoiceEvent,
};

pub use traits::VoiceBackend;

pub use transport::{BackendCall, BackendOperation, HttpVoiceBackend, SimulatedBackend};

pub use poller::{EventPoller, EventSink, PollerStats};

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Fonctions utilitaires pour l'utilisateur final
pub mod utils {
    /// Formate une durée de façon lisible
    ///
    /// # Example
    /// ```rust
    /// use network::utils;
    /// use std::time::Duration;
    ///
    /// let duration = Duration::from_millis(1234);
    /// assert_eq!(utils::format_duration(duration), "1.23s");
    ///
    /// let short_duration = Duration::from_millis(56);
    /// assert_eq!(utils::format_duration(short_duration), "56ms");
    /// ```
    pub fn format_duration(duration: std::time::Duration) -> String {
        let ms = duration.as_millis();

        if ms >= 1000 {
            format!("{:.2}s", ms as f64 / 1000.0)
        } else {
            format!("{}ms", ms)
        }
    }

    /// Formate une taille en bytes de façon lisible
    ///
    /// # Example
    /// ```rust
    /// use network::utils;
    ///
    /// assert_eq!(utils::format_bytes(1024), "1.0 KB");
    /// assert_eq!(utils::format_bytes(500), "500 B");
    /// ```
    pub fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB"];

        let mut size = bytes as f64;
        let mut unit_index = 0;

        while size >= 1024.0 && unit_index < UNITS.len() - 1 {
            size /= 1024.0;
            unit_index += 1;
        }

        if unit_index == 0 {
            format!("{} {}", bytes, UNITS[unit_index])
        } else {
            format!("{:.1} {}", size, UNITS[unit_index])
        }
    }
}
