//! Gestion d'erreurs pour le système networking
//!
//! Ce module définit toutes les erreurs possibles dans les échanges avec
//! l'agent vocal distant. Il suit les mêmes patterns que le module audio
//! pour la cohérence du code.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système réseau
///
/// `thiserror::Error` génère automatiquement l'implémentation du trait Error
/// avec des messages d'erreur descriptifs en français.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// La session distante n'existe plus (statut "not found")
    ///
    /// Ce n'est pas une erreur transitoire : c'est le signal que l'agent
    /// distant a terminé la session.
    #[error("Session distante {session_id} introuvable")]
    SessionNotFound { session_id: String },

    /// Réponse HTTP non-succès de l'agent distant
    #[error("Réponse HTTP {status} de l'agent distant: {body}")]
    Http { status: u16, body: String },

    /// Échec du transport (connexion refusée, DNS, TLS...)
    #[error("Erreur de transport: {0}")]
    Transport(#[from] reqwest::Error),

    /// Erreur lors de la sérialisation/désérialisation JSON
    #[error("Erreur de sérialisation: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// URL de l'agent distant invalide
    #[error("Adresse invalide: {addr}")]
    InvalidAddress { addr: String },

    /// Agent distant momentanément indisponible (utilisé par le backend simulé)
    #[error("Agent distant indisponible pendant {operation}")]
    Unavailable { operation: String },

    /// Erreur de configuration réseau
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Type Result personnalisé pour notre crate network
///
/// Au lieu d'écrire Result<T, NetworkError> partout, on peut écrire NetworkResult<T>
pub type NetworkResult<T> = Result<T, NetworkError>;

/// Fonctions utilitaires pour créer et classer les erreurs
impl NetworkError {
    /// Crée une erreur de session introuvable
    pub fn session_not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound { session_id: session_id.into() }
    }

    /// Crée une erreur d'indisponibilité pour une opération donnée
    pub fn unavailable(operation: impl Into<String>) -> Self {
        Self::Unavailable { operation: operation.into() }
    }

    /// Vérifie si l'erreur signale la fin de la session distante
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, NetworkError::SessionNotFound { .. })
    }

    /// Vérifie si l'erreur est récupérable
    ///
    /// Une erreur récupérable laisse la boucle appelante (intervalle de
    /// polling, cadence de capture) retenter plus tard.
    pub fn is_recoverable(&self) -> bool {
        match self {
            NetworkError::Transport(_) => true,
            NetworkError::Unavailable { .. } => true,
            NetworkError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = NetworkError::Http {
            status: 503,
            body: "maintenance".to_string()
        };
        assert!(error.to_string().contains("503"));
        assert!(error.to_string().contains("maintenance"));

        let error = NetworkError::session_not_found("abc");
        assert_eq!(error.to_string(), "Session distante abc introuvable");
    }

    #[test]
    fn test_error_classification() {
        let not_found = NetworkError::session_not_found("abc");
        assert!(not_found.is_session_not_found());
        assert!(!not_found.is_recoverable());

        assert!(NetworkError::unavailable("poll").is_recoverable());
        assert!(NetworkError::Http { status: 502, body: String::new() }.is_recoverable());
        assert!(!NetworkError::Http { status: 400, body: String::new() }.is_recoverable());
        assert!(!NetworkError::ConfigError("x".to_string()).is_recoverable());
    }

    #[test]
    fn test_serialization_error_conversion() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: NetworkError = parse.into();
        assert!(matches!(error, NetworkError::SerializationError(_)));
    }
}
