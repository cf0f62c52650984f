//! Transports vers l'agent vocal distant
//!
//! Ce module fournit deux implémentations du trait `VoiceBackend` :
//! - `HttpVoiceBackend` : API HTTP/JSON avec reqwest
//! - `SimulatedBackend` : agent en mémoire qui enregistre chaque appel,
//!   utilisé par les tests de session
//!
//! Routes HTTP :
//!
//! | Opération | Requête |
//! |---|---|
//! | création | `POST /sessions` |
//! | envoi audio | `POST /sessions/{id}/audio` |
//! | commit | `POST /sessions/{id}/commit` |
//! | polling | `GET /sessions/{id}/events` (404 = session terminée) |
//! | fin | `DELETE /sessions/{id}` |

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    CreatedSession, NetworkConfig, NetworkError, NetworkResult, SessionHandle, SessionParams,
    VoiceBackend, VoiceEvent,
};

/// Implémentation HTTP de l'agent vocal
///
/// Aucun timeout par requête : les échecs remontent quand le transport
/// rejette la requête.
///
/// # Example
/// ```rust
/// use network::{HttpVoiceBackend, NetworkConfig};
///
/// let backend = HttpVoiceBackend::new(&NetworkConfig::default()).unwrap();
/// ```
pub struct HttpVoiceBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

/// Corps de réponse du polling : liste brute ou objet `{"events": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum EventBatch {
    Bare(Vec<serde_json::Value>),
    Wrapped { events: Vec<serde_json::Value> },
}

impl HttpVoiceBackend {
    /// Crée un client HTTP vers l'agent
    ///
    /// # Erreurs
    /// - `NetworkError::ConfigError` si la configuration est invalide
    pub fn new(config: &NetworkConfig) -> NetworkResult<Self> {
        let client = Client::builder().build()?;
        Self::with_client(client, config)
    }

    /// Crée le backend avec un client reqwest déjà configuré
    pub fn with_client(client: Client, config: &NetworkConfig) -> NetworkResult<Self> {
        config.validate().map_err(NetworkError::ConfigError)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn session_url(&self, handle: &SessionHandle, suffix: &str) -> String {
        self.url(&format!("/sessions/{}{}", handle, suffix))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Transforme une réponse non-succès en erreur
    ///
    /// Un 404 sur une route de session signifie que la session n'existe plus.
    async fn check(response: Response, handle: Option<&SessionHandle>) -> NetworkResult<Response> {
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            if let Some(handle) = handle {
                return Err(NetworkError::session_not_found(handle.as_str()));
            }
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NetworkError::Http { status: status.as_u16(), body });
        }

        Ok(response)
    }

    /// Décode un corps de polling
    ///
    /// Un événement au tag inconnu est ignoré (et loggé) sans perdre le
    /// reste du lot.
    pub fn parse_events(body: &str) -> NetworkResult<Vec<VoiceEvent>> {
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        let raw = match serde_json::from_str::<EventBatch>(body)? {
            EventBatch::Bare(events) | EventBatch::Wrapped { events } => events,
        };

        let mut events = Vec::with_capacity(raw.len());
        for value in raw {
            match serde_json::from_value::<VoiceEvent>(value) {
                Ok(event) => events.push(event),
                Err(e) => warn!(error = %e, "événement inconnu ignoré"),
            }
        }

        Ok(events)
    }
}

#[async_trait]
impl VoiceBackend for HttpVoiceBackend {
    async fn create_session(&self, params: &SessionParams) -> NetworkResult<CreatedSession> {
        let response = self
            .request(Method::POST, self.url("/sessions"))
            .json(params)
            .send()
            .await?;

        let body = Self::check(response, None).await?.text().await?;
        let created: CreatedSession = serde_json::from_str(&body)?;

        debug!(session = %created.handle, "session distante créée");
        Ok(created)
    }

    async fn send_audio(&self, handle: &SessionHandle, payload: String) -> NetworkResult<()> {
        let response = self
            .request(Method::POST, self.session_url(handle, "/audio"))
            .json(&json!({ "audio": payload }))
            .send()
            .await?;

        Self::check(response, Some(handle)).await?;
        Ok(())
    }

    async fn commit(&self, handle: &SessionHandle) -> NetworkResult<()> {
        let response = self
            .request(Method::POST, self.session_url(handle, "/commit"))
            .send()
            .await?;

        Self::check(response, Some(handle)).await?;
        Ok(())
    }

    async fn poll_events(&self, handle: &SessionHandle) -> NetworkResult<Vec<VoiceEvent>> {
        let response = self
            .request(Method::GET, self.session_url(handle, "/events"))
            .send()
            .await?;

        let body = Self::check(response, Some(handle)).await?.text().await?;
        Self::parse_events(&body)
    }

    async fn end_session(&self, handle: &SessionHandle) -> NetworkResult<()> {
        let response = self
            .request(Method::DELETE, self.session_url(handle, ""))
            .send()
            .await?;

        Self::check(response, Some(handle)).await?;
        Ok(())
    }

    fn backend_info(&self) -> String {
        format!("HTTP {}", self.base_url)
    }
}

/// Opérations de l'agent, pour cibler les pannes simulées
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    CreateSession,
    SendAudio,
    Commit,
    PollEvents,
    EndSession,
}

/// Appel enregistré par le backend simulé
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    CreateSession(SessionParams),
    SendAudio { handle: SessionHandle, payload: String },
    Commit { handle: SessionHandle },
    PollEvents { handle: SessionHandle },
    EndSession { handle: SessionHandle },
}

impl BackendCall {
    pub fn operation(&self) -> BackendOperation {
        match self {
            BackendCall::CreateSession(_) => BackendOperation::CreateSession,
            BackendCall::SendAudio { .. } => BackendOperation::SendAudio,
            BackendCall::Commit { .. } => BackendOperation::Commit,
            BackendCall::PollEvents { .. } => BackendOperation::PollEvents,
            BackendCall::EndSession { .. } => BackendOperation::EndSession,
        }
    }
}

#[derive(Default)]
struct SimulatedState {
    calls: Vec<BackendCall>,
    live_sessions: HashSet<SessionHandle>,
    pending_events: VecDeque<VoiceEvent>,
    failing: HashSet<BackendOperation>,
    latency: HashMap<BackendOperation, Duration>,
    greeting: Option<String>,
}

/// Agent vocal simulé pour les tests
///
/// Cette implémentation permet de tester le pipeline de session en
/// simulant différentes conditions : pannes par opération, latence,
/// expiration de session côté serveur.
#[derive(Default)]
pub struct SimulatedBackend {
    state: Mutex<SimulatedState>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ajoute des événements livrés au prochain polling
    pub fn push_events(&self, events: impl IntoIterator<Item = VoiceEvent>) {
        self.state().pending_events.extend(events);
    }

    /// Message d'accueil retourné par les prochaines créations
    pub fn set_greeting(&self, greeting: Option<String>) {
        self.state().greeting = greeting;
    }

    /// Fait échouer (ou réussir à nouveau) une opération
    pub fn set_failing(&self, operation: BackendOperation, failing: bool) {
        let mut state = self.state();
        if failing {
            state.failing.insert(operation);
        } else {
            state.failing.remove(&operation);
        }
    }

    /// Ajoute une latence simulée à une opération
    pub fn set_latency(&self, operation: BackendOperation, latency: Duration) {
        self.state().latency.insert(operation, latency);
    }

    /// Termine toutes les sessions côté serveur
    ///
    /// Les appels suivants sur ces sessions répondent "not found".
    pub fn expire_sessions(&self) {
        self.state().live_sessions.clear();
    }

    pub fn is_live(&self, handle: &SessionHandle) -> bool {
        self.state().live_sessions.contains(handle)
    }

    /// Copie de tous les appels reçus, dans l'ordre
    pub fn calls(&self) -> Vec<BackendCall> {
        self.state().calls.clone()
    }

    pub fn count(&self, operation: BackendOperation) -> usize {
        self.state().calls.iter().filter(|call| call.operation() == operation).count()
    }

    /// Payloads audio reçus, dans l'ordre d'envoi
    pub fn sent_payloads(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                BackendCall::SendAudio { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    /// Enregistre l'appel puis applique latence et panne simulées
    async fn enter(&self, call: BackendCall) -> NetworkResult<()> {
        let operation = call.operation();
        let latency = {
            let mut state = self.state();
            state.calls.push(call);
            state.latency.get(&operation).copied()
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.state().failing.contains(&operation) {
            return Err(NetworkError::unavailable(format!("{:?}", operation)));
        }
        Ok(())
    }

    fn ensure_live(&self, handle: &SessionHandle) -> NetworkResult<()> {
        if self.is_live(handle) {
            Ok(())
        } else {
            Err(NetworkError::session_not_found(handle.as_str()))
        }
    }
}

#[async_trait]
impl VoiceBackend for SimulatedBackend {
    async fn create_session(&self, params: &SessionParams) -> NetworkResult<CreatedSession> {
        self.enter(BackendCall::CreateSession(params.clone())).await?;

        let handle = SessionHandle::new(format!("sim-{:08x}", fastrand::u32(..)));
        let mut state = self.state();
        state.live_sessions.insert(handle.clone());

        Ok(CreatedSession { handle, greeting: state.greeting.clone() })
    }

    async fn send_audio(&self, handle: &SessionHandle, payload: String) -> NetworkResult<()> {
        self.enter(BackendCall::SendAudio { handle: handle.clone(), payload }).await?;
        self.ensure_live(handle)
    }

    async fn commit(&self, handle: &SessionHandle) -> NetworkResult<()> {
        self.enter(BackendCall::Commit { handle: handle.clone() }).await?;
        self.ensure_live(handle)
    }

    async fn poll_events(&self, handle: &SessionHandle) -> NetworkResult<Vec<VoiceEvent>> {
        self.enter(BackendCall::PollEvents { handle: handle.clone() }).await?;
        self.ensure_live(handle)?;
        Ok(self.state().pending_events.drain(..).collect())
    }

    async fn end_session(&self, handle: &SessionHandle) -> NetworkResult<()> {
        self.enter(BackendCall::EndSession { handle: handle.clone() }).await?;
        self.ensure_live(handle)?;
        self.state().live_sessions.remove(handle);
        Ok(())
    }

    fn backend_info(&self) -> String {
        "Agent simulé".to_string()
    }
}
