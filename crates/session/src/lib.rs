//! Crate session pour la pratique vocale temps réel
//!
//! Ce crate orchestre une conversation vocale avec l'agent distant :
//! - Machine à états du cycle de vie (ready, active, paused, ending, ended)
//! - Buffer de chunks avec envoi par blocs et commit après silence
//! - Polling des événements et lecture de l'audio de l'assistant
//! - Nettoyage exhaustif sur chaque chemin de sortie

pub mod state;       // Machine à états
pub mod buffer;      // Accumulation des chunks capturés
pub mod debounce;    // Minuterie de commit
pub mod committer;   // Envoi et commit de l'audio
pub mod observer;    // Notifications vers l'interface
pub mod lifecycle;   // Rapport de nettoyage
pub mod config;      // Configuration TOML
pub mod session;     // Orchestration
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use state::{SessionState, StateCell};
pub use buffer::ChunkBuffer;
pub use debounce::DebounceTimer;
pub use committer::{ChunkCommitter, CommitterStats};
pub use observer::{SessionObserver, TracingObserver, TransportOperation};
pub use lifecycle::{CleanupReport, CleanupStep, TeardownMode};
pub use config::SessionConfig;
pub use session::{SessionStats, VoiceSession};
pub use error::{SessionError, SessionResult};
