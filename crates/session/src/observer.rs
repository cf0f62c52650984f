//! Observation de la session
//!
//! L'observateur reçoit tout ce qui ne remonte pas comme erreur à
//! l'appelant : transcriptions, accueil, erreurs de transport non fatales,
//! perte de la session distante. Toutes les méthodes ont une
//! implémentation vide par défaut.

use network::{NetworkError, SessionHandle, TranscriptFragment, TranscriptRole};
use tracing::{debug, info, warn};

use crate::SessionState;

/// Opération réseau en échec, pour l'observateur
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportOperation {
    SendAudio,
    Commit,
    PollEvents,
    EndSession,
}

impl TransportOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportOperation::SendAudio => "send_audio",
            TransportOperation::Commit => "commit",
            TransportOperation::PollEvents => "poll_events",
            TransportOperation::EndSession => "end_session",
        }
    }
}

/// Collaborateur notifié des événements de la session
///
/// Appelé depuis les tâches de la session : une implémentation ne doit
/// pas bloquer.
pub trait SessionObserver: Send + Sync {
    fn on_state_changed(&self, _from: SessionState, _to: SessionState) {}

    /// Message d'accueil retourné à la création de la session
    fn on_greeting(&self, _text: &str) {}

    fn on_transcript(&self, _fragment: TranscriptFragment<'_>) {}

    /// L'assistant commence (`true`) ou finit (`false`) de parler
    fn on_speaking_changed(&self, _speaking: bool) {}

    /// Erreur signalée par l'agent distant (événement `error`)
    fn on_remote_error(&self, _message: &str) {}

    /// Erreur de transport non fatale ; l'opération n'est pas rejouée
    fn on_transport_error(&self, _operation: TransportOperation, _error: &NetworkError) {}

    /// La session distante n'existe plus
    fn on_session_lost(&self, _handle: &SessionHandle) {}
}

/// Observateur qui trace tout via `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_state_changed(&self, from: SessionState, to: SessionState) {
        info!(%from, %to, "changement d'état de session");
    }

    fn on_greeting(&self, text: &str) {
        info!(greeting = text, "accueil de l'assistant");
    }

    fn on_transcript(&self, fragment: TranscriptFragment<'_>) {
        let role = match fragment.role {
            TranscriptRole::Assistant => "assistant",
            TranscriptRole::User => "utilisateur",
        };

        if fragment.is_final {
            info!(role, text = fragment.text, "transcription");
        } else {
            debug!(role, text = fragment.text, "transcription partielle");
        }
    }

    fn on_speaking_changed(&self, speaking: bool) {
        debug!(speaking, "l'assistant parle");
    }

    fn on_remote_error(&self, message: &str) {
        warn!(remote = message, "erreur signalée par l'agent");
    }

    fn on_transport_error(&self, operation: TransportOperation, error: &NetworkError) {
        warn!(operation = operation.as_str(), %error, "erreur de transport ignorée");
    }

    fn on_session_lost(&self, handle: &SessionHandle) {
        warn!(session = %handle, "session distante perdue");
    }
}
