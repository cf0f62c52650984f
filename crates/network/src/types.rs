//! Types de données pour le système networking
//!
//! Ce module définit les structures échangées avec l'agent vocal distant :
//! - SessionHandle : identifiant opaque attribué par l'agent distant
//! - SessionParams / CreatedSession : création de session
//! - VoiceEvent : événements poussés par l'agent, lus par polling
//! - NetworkConfig : configuration du système réseau
//! - HandleCell : référence partagée vers la session distante courante

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Identifiant opaque de la session distante
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(String);

impl SessionHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Contexte transmis une seule fois, à la création de la session
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionParams {
    /// Sujet de conversation
    pub topic: String,

    /// Niveau de langue de l'apprenant (ex: "B1")
    pub level: String,

    /// Objectifs pédagogiques de la séance
    #[serde(default)]
    pub goals: Vec<String>,

    /// Sélecteur de voix de l'assistant
    pub speaker: String,

    /// Résumé d'une conversation précédente, si on reprend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_context: Option<String>,
}

/// Réponse de l'agent distant à la création d'une session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CreatedSession {
    #[serde(rename = "session_id")]
    pub handle: SessionHandle,

    /// Message d'accueil optionnel de l'assistant
    #[serde(default)]
    pub greeting: Option<String>,
}

/// Événement poussé par l'agent distant
///
/// Le champ `type` du JSON sélectionne la variante. Chaque événement ne
/// porte qu'un seul type de contenu.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Chunk audio de l'assistant (PCM16 LE mono, base64)
    AssistantAudioChunk { payload: String },

    /// Fin de la réponse audio de l'assistant
    AssistantAudioComplete,

    /// Transcription partielle de la réponse de l'assistant
    AssistantTextDelta { text: String },

    /// Transcription finale de la réponse de l'assistant
    AssistantTextComplete { text: String },

    /// Transcription partielle de ce que l'utilisateur a dit
    UserTextDelta { text: String },

    /// Transcription finale de ce que l'utilisateur a dit
    UserTextComplete { text: String },

    /// Erreur signalée par l'agent distant
    Error { message: String },
}

/// Auteur d'une transcription
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TranscriptRole {
    Assistant,
    User,
}

/// Fragment de transcription extrait d'un événement
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TranscriptFragment<'a> {
    pub role: TranscriptRole,
    pub text: &'a str,
    pub is_final: bool,
}

impl VoiceEvent {
    /// Nom du tag, pour les logs
    pub fn kind(&self) -> &'static str {
        match self {
            VoiceEvent::AssistantAudioChunk { .. } => "assistant_audio_chunk",
            VoiceEvent::AssistantAudioComplete => "assistant_audio_complete",
            VoiceEvent::AssistantTextDelta { .. } => "assistant_text_delta",
            VoiceEvent::AssistantTextComplete { .. } => "assistant_text_complete",
            VoiceEvent::UserTextDelta { .. } => "user_text_delta",
            VoiceEvent::UserTextComplete { .. } => "user_text_complete",
            VoiceEvent::Error { .. } => "error",
        }
    }

    /// Extrait la transcription portée par l'événement, s'il y en a une
    pub fn as_transcript(&self) -> Option<TranscriptFragment<'_>> {
        let (role, text, is_final) = match self {
            VoiceEvent::AssistantTextDelta { text } => (TranscriptRole::Assistant, text, false),
            VoiceEvent::AssistantTextComplete { text } => (TranscriptRole::Assistant, text, true),
            VoiceEvent::UserTextDelta { text } => (TranscriptRole::User, text, false),
            VoiceEvent::UserTextComplete { text } => (TranscriptRole::User, text, true),
            _ => return None,
        };

        Some(TranscriptFragment { role, text, is_final })
    }
}

/// Configuration du système réseau
///
/// Centralise les paramètres d'accès à l'agent vocal distant.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// URL de base de l'API de l'agent vocal (défaut: http://127.0.0.1:8080)
    pub base_url: String,

    /// Intervalle de polling des événements en ms (défaut: 600)
    pub poll_interval_ms: u64,

    /// Jeton d'accès envoyé en `Authorization: Bearer`
    pub api_key: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            poll_interval_ms: 600,
            api_key: None,
        }
    }
}

// Debug manuel : le jeton ne doit jamais apparaître dans les logs
impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("base_url", &self.base_url)
            .field("poll_interval_ms", &self.poll_interval_ms)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl NetworkConfig {
    /// Configuration pour tests (polling accéléré)
    pub fn test_config() -> Self {
        Self {
            base_url: "http://127.0.0.1:0".to_string(),
            poll_interval_ms: 50,
            api_key: None,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(format!("URL invalide: {} (doit commencer par http:// ou https://)", self.base_url));
        }

        if self.poll_interval_ms == 0 {
            return Err("L'intervalle de polling doit être > 0".to_string());
        }

        Ok(())
    }
}

/// Référence partagée vers la session distante courante
///
/// Un seul écrivain pose le handle (la création de session) ; il n'est
/// effacé que par le teardown ou par le poller sur "not found". Tous les
/// lecteurs voient la dernière écriture, jamais une copie périmée.
#[derive(Clone, Debug, Default)]
pub struct HandleCell {
    inner: Arc<Mutex<Option<SessionHandle>>>,
}

impl HandleCell {
    pub fn new() -> Self {
        Self::default()
    }

    // Le contenu reste valide même si un thread a paniqué en le tenant
    fn lock(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self) -> Option<SessionHandle> {
        self.lock().clone()
    }

    pub fn set(&self, handle: SessionHandle) {
        *self.lock() = Some(handle);
    }

    /// Efface le handle et retourne l'ancien
    pub fn clear(&self) -> Option<SessionHandle> {
        self.lock().take()
    }

    /// Efface le handle seulement s'il désigne encore `handle`
    pub fn clear_if(&self, handle: &SessionHandle) -> bool {
        let mut current = self.lock();
        if current.as_ref() == Some(handle) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tags() {
        let event: VoiceEvent = serde_json::from_str(r#"{"type":"assistant_audio_chunk","payload":"AAA="}"#).unwrap();
        assert_eq!(event, VoiceEvent::AssistantAudioChunk { payload: "AAA=".to_string() });

        let event: VoiceEvent = serde_json::from_str(r#"{"type":"assistant_audio_complete"}"#).unwrap();
        assert_eq!(event.kind(), "assistant_audio_complete");

        let json = serde_json::to_value(VoiceEvent::Error { message: "boom".to_string() }).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");

        assert!(serde_json::from_str::<VoiceEvent>(r#"{"type":"unknown"}"#).is_err());
    }

    #[test]
    fn test_transcript_extraction() {
        let delta = VoiceEvent::UserTextDelta { text: "bonj".to_string() };
        let fragment = delta.as_transcript().unwrap();
        assert_eq!(fragment.role, TranscriptRole::User);
        assert_eq!(fragment.text, "bonj");
        assert!(!fragment.is_final);

        let complete = VoiceEvent::AssistantTextComplete { text: "Salut !".to_string() };
        assert!(complete.as_transcript().unwrap().is_final);

        assert!(VoiceEvent::AssistantAudioComplete.as_transcript().is_none());
    }

    #[test]
    fn test_created_session_wire_format() {
        let created: CreatedSession = serde_json::from_str(r#"{"session_id":"s-42"}"#).unwrap();
        assert_eq!(created.handle.as_str(), "s-42");
        assert!(created.greeting.is_none());

        let params = SessionParams { topic: "voyage".to_string(), ..Default::default() };
        let json = serde_json::to_value(&params).unwrap();
        assert!(json.get("prior_context").is_none());
    }

    #[test]
    fn test_network_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(600));
        assert!(config.validate().is_ok());

        let bad = NetworkConfig { base_url: "ftp://x".to_string(), ..Default::default() };
        assert!(bad.validate().is_err());

        let secret = NetworkConfig { api_key: Some("sk-secret".to_string()), ..Default::default() };
        assert!(!format!("{:?}", secret).contains("sk-secret"));

        assert!(NetworkConfig::test_config().poll_interval() < config.poll_interval());
    }

    #[test]
    fn test_handle_cell() {
        let cell = HandleCell::new();
        let shared = cell.clone();
        assert!(!cell.is_set());

        cell.set(SessionHandle::new("a"));
        assert_eq!(shared.get(), Some(SessionHandle::new("a")));

        // Un autre handle n'efface pas la session courante
        assert!(!shared.clear_if(&SessionHandle::new("b")));
        assert!(shared.clear_if(&SessionHandle::new("a")));
        assert!(cell.get().is_none());
        assert!(cell.clear().is_none());
    }
}
