//! Gestion d'erreurs pour le système audio
//!
//! Ce module définit tous les types d'erreurs possibles côté audio :
//! capture micro, transcodage PCM16/base64 et sortie haut-parleurs.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système audio
///
/// `thiserror::Error` génère automatiquement l'implémentation du trait Error
/// et nous permet de définir des messages d'erreur avec `#[error("...")]`
#[derive(Error, Debug)]
pub enum AudioError {
    /// Aucun périphérique audio (microphone ou haut-parleurs) n'a été trouvé
    #[error("Aucun périphérique audio trouvé")]
    NoDeviceFound,

    /// L'accès au microphone a été refusé (ou aucun micro utilisable)
    #[error("Accès au microphone refusé")]
    PermissionDenied,

    /// Erreur lors de la configuration des paramètres audio (sample rate, etc.)
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Erreur provenant de la librairie cpal (Cross-Platform Audio Library)
    /// `#[from]` génère automatiquement une conversion depuis l'erreur cpal
    #[error("Erreur cpal: {0}")]
    CpalError(#[from] cpal::PlayStreamError),

    /// Payload de transport illisible (base64 invalide)
    #[error("Payload audio invalide: {0}")]
    InvalidPayload(#[from] base64::DecodeError),

    /// Données PCM16 mal formées (nombre d'octets impair)
    #[error("Données PCM16 mal formées: {len} octets (doit être pair)")]
    MalformedPcm { len: usize },

    /// Le périphérique audio a été débranché pendant l'utilisation
    #[error("Périphérique audio déconnecté")]
    DeviceDisconnected,

    /// Erreur lors de l'initialisation d'un composant
    #[error("Erreur d'initialisation: {0}")]
    InitializationError(String),
}

/// Conversion des erreurs cpal::BuildStreamError
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AudioError::ConfigError(format!("Erreur construction stream: {:?}", err))
    }
}

/// Conversion des erreurs cpal::DefaultStreamConfigError
impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AudioError::ConfigError(format!("Erreur config par défaut: {:?}", err))
    }
}

/// Conversion des erreurs cpal::PauseStreamError
impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AudioError::ConfigError(format!("Erreur pause stream: {:?}", err))
    }
}

/// Type Result personnalisé pour notre crate
///
/// Au lieu d'écrire Result<T, AudioError> partout, on peut écrire AudioResult<T>
pub type AudioResult<T> = Result<T, AudioError>;
