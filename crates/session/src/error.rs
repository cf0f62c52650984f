//! Gestion d'erreurs pour la session de pratique vocale
//!
//! Les erreurs de session sont celles qui remontent à l'appelant : échec
//! du démarrage (permission, capture, création distante) et appels
//! illégaux vis-à-vis de la machine à états. Les erreurs de transport
//! pendant la session ne remontent jamais ici : elles sont rapportées à
//! l'observateur.

use thiserror::Error;

use crate::SessionState;

/// Énumération des erreurs de session
#[derive(Error, Debug)]
pub enum SessionError {
    /// L'utilisateur a refusé l'accès au microphone
    #[error("Accès au microphone refusé")]
    PermissionDenied,

    /// Opération appelée depuis un état qui ne l'autorise pas
    #[error("Opération {operation} invalide dans l'état {state}")]
    InvalidTransition { operation: &'static str, state: SessionState },

    /// La session distante a disparu (signalée "not found" par le polling)
    #[error("La session distante n'existe plus")]
    SessionLost,

    /// Erreur audio (capture, périphérique)
    #[error("Erreur audio: {0}")]
    Audio(#[from] audio::AudioError),

    /// Erreur réseau (création de session distante)
    #[error("Erreur réseau: {0}")]
    Network(#[from] network::NetworkError),

    /// Configuration invalide
    #[error("Configuration invalide: {0}")]
    Config(String),
}

impl SessionError {
    pub fn invalid_transition(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidTransition { operation, state }
    }
}

/// Type Result personnalisé pour le crate session
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SessionError::invalid_transition("pause", SessionState::Ready);
        assert_eq!(error.to_string(), "Opération pause invalide dans l'état ready");

        let error: SessionError = network::NetworkError::session_not_found("s-1").into();
        assert!(error.to_string().contains("s-1"));
    }
}
