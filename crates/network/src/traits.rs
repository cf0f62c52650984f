//! Traits abstraits pour le système networking
//!
//! Ce module définit l'interface vers l'agent vocal distant. Cela permet
//! d'avoir du code modulaire et testable avec différentes implémentations.

use async_trait::async_trait;

use crate::{CreatedSession, NetworkResult, SessionHandle, SessionParams, VoiceEvent};

/// Trait pour l'agent vocal distant
///
/// Ce trait abstrait permet d'utiliser différentes implémentations :
/// - HttpVoiceBackend : API HTTP/JSON réelle avec reqwest
/// - SimulatedBackend : agent en mémoire pour les tests
///
/// Les méthodes prennent `&self` : le committer et le poller appellent
/// l'agent en parallèle sur la même session.
#[async_trait]
pub trait VoiceBackend: Send + Sync {
    /// Crée une session distante
    ///
    /// # Example
    /// ```rust,no_run
    /// use network::{HttpVoiceBackend, NetworkConfig, SessionParams, VoiceBackend};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let backend = HttpVoiceBackend::new(&NetworkConfig::default())?;
    /// let params = SessionParams { topic: "voyage".into(), level: "B1".into(), ..Default::default() };
    ///
    /// let created = backend.create_session(&params).await?;
    /// println!("Session {} créée", created.handle);
    /// # Ok(())
    /// # }
    /// ```
    async fn create_session(&self, params: &SessionParams) -> NetworkResult<CreatedSession>;

    /// Envoie un buffer audio encodé (base64 de PCM16 LE mono)
    async fn send_audio(&self, handle: &SessionHandle, payload: String) -> NetworkResult<()>;

    /// Signale la fin de l'énoncé courant
    async fn commit(&self, handle: &SessionHandle) -> NetworkResult<()>;

    /// Récupère les événements arrivés depuis le dernier polling
    ///
    /// # Erreurs
    /// - `NetworkError::SessionNotFound` : la session distante n'existe plus
    async fn poll_events(&self, handle: &SessionHandle) -> NetworkResult<Vec<VoiceEvent>>;

    /// Termine la session distante (best-effort)
    async fn end_session(&self, handle: &SessionHandle) -> NetworkResult<()>;

    /// Retourne des informations sur l'agent utilisé
    fn backend_info(&self) -> String {
        "Agent vocal".to_string()
    }
}
