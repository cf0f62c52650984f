//! Orchestration d'une session de pratique vocale
//!
//! `VoiceSession` relie la capture micro, le committer, le poller
//! d'événements et la lecture de l'assistant autour de la machine à états :
//!
//! ```text
//! micro ──▶ pompe ──▶ committer ──▶ send_audio / commit
//!                                          │
//! haut-parleurs ◀── planificateur ◀── poller ◀── poll_events
//! ```
//!
//! Les opérations de cycle de vie (`start`, `pause`, `resume`, `end`,
//! `shutdown`) sont sérialisées par un verrou unique. Les erreurs de
//! transport pendant la session vont à l'observateur, jamais à l'appelant.

use async_trait::async_trait;
use audio::{AudioCapture, AudioChunk, OutputDevice, PlaybackScheduler, PlaybackStats};
use network::{
    EventPoller, EventSink, HandleCell, NetworkError, PollerStats, SessionHandle, SessionParams, VoiceBackend,
    VoiceEvent,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::{
    ChunkCommitter, CleanupReport, CleanupStep, CommitterStats, SessionConfig, SessionError, SessionObserver,
    SessionResult, SessionState, StateCell, TeardownMode, TransportOperation,
};

/// Statistiques agrégées d'une session
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionStats {
    pub committer: CommitterStats,
    pub playback: PlaybackStats,
    pub poller: PollerStats,

    /// Chunks capturés hors de l'état `active`, ignorés
    pub dropped_while_inactive: u64,
}

/// État partagé avec le poller (en tant que sink) et la pompe de capture
struct Shared {
    state: StateCell,
    handle: HandleCell,
    observer: Arc<dyn SessionObserver>,
    playback: Mutex<PlaybackScheduler>,
    speaking: AtomicBool,
    dropped_while_inactive: AtomicU64,
}

impl Shared {
    /// Répercute l'indicateur "l'assistant parle" vers l'observateur
    fn sync_speaking(&self, speaking: bool) {
        if self.speaking.swap(speaking, Ordering::AcqRel) != speaking {
            self.observer.on_speaking_changed(speaking);
        }
    }

    fn accepts_playback(&self) -> bool {
        matches!(self.state.get(), SessionState::Active | SessionState::Paused)
    }
}

#[async_trait]
impl EventSink for Shared {
    async fn handle_event(&self, event: VoiceEvent) {
        match event {
            VoiceEvent::AssistantAudioChunk { payload } => {
                let mut playback = self.playback.lock().await;

                // Vérifié sous le verrou : un teardown a pu libérer la sortie entre-temps
                if !self.accepts_playback() {
                    debug!(state = %self.state.get(), "audio de l'assistant ignoré hors session");
                    return;
                }

                if let Err(e) = playback.schedule_payload(&payload) {
                    debug!(error = %e, "chunk de l'assistant non programmé");
                }
                let speaking = playback.is_speaking();
                drop(playback);
                self.sync_speaking(speaking);
            }
            VoiceEvent::AssistantAudioComplete => {
                self.playback.lock().await.complete();
                self.sync_speaking(false);
            }
            VoiceEvent::Error { message } => self.observer.on_remote_error(&message),
            other => {
                if let Some(fragment) = other.as_transcript() {
                    self.observer.on_transcript(fragment);
                }
            }
        }
    }

    async fn on_session_lost(&self, handle: &SessionHandle) {
        self.observer.on_session_lost(handle);
    }

    async fn on_poll_error(&self, error: &NetworkError) {
        self.observer.on_transport_error(TransportOperation::PollEvents, error);
    }
}

/// Ressources manipulées uniquement sous le verrou de cycle de vie
struct Parts {
    capture: Box<dyn AudioCapture>,
    poller: EventPoller,
    pump: Option<JoinHandle<()>>,
}

/// Session de pratique vocale temps réel
///
/// # Example
/// ```rust,no_run
/// use audio::{AudioConfig, CpalCapture, CpalOutputDevice};
/// use network::{HttpVoiceBackend, SessionParams};
/// use session::{SessionConfig, TracingObserver, VoiceSession};
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = SessionConfig::default();
/// let session = VoiceSession::new(
///     config.clone(),
///     SessionParams::default(),
///     Arc::new(HttpVoiceBackend::new(&config.network)?),
///     Box::new(CpalCapture::new(config.audio.clone())?),
///     Box::new(CpalOutputDevice::new(config.audio.clone())),
///     Arc::new(TracingObserver),
/// )?;
///
/// session.start().await?;
/// // ... conversation ...
/// session.end().await?;
/// # Ok(())
/// # }
/// ```
pub struct VoiceSession {
    config: SessionConfig,
    params: SessionParams,
    backend: Arc<dyn VoiceBackend>,
    shared: Arc<Shared>,
    committer: ChunkCommitter,
    parts: Mutex<Parts>,
}

impl VoiceSession {
    /// Assemble une session en état `ready`
    ///
    /// Rien n'est ouvert ici : ni micro, ni sortie audio, ni session distante.
    pub fn new(
        config: SessionConfig,
        params: SessionParams,
        backend: Arc<dyn VoiceBackend>,
        capture: Box<dyn AudioCapture>,
        output: Box<dyn OutputDevice>,
        observer: Arc<dyn SessionObserver>,
    ) -> SessionResult<Self> {
        config.validate()?;

        let handle = HandleCell::new();
        let shared = Arc::new(Shared {
            state: StateCell::default(),
            handle: handle.clone(),
            observer: Arc::clone(&observer),
            playback: Mutex::new(PlaybackScheduler::new(output, config.audio.clone())),
            speaking: AtomicBool::new(false),
            dropped_while_inactive: AtomicU64::new(0),
        });

        let committer = ChunkCommitter::new(
            Arc::clone(&backend),
            handle.clone(),
            observer,
            config.flush_threshold_bytes(),
            config.commit_delay(),
        );

        let sink: Arc<dyn EventSink> = shared.clone();
        let poller = EventPoller::new(Arc::clone(&backend), sink, handle, config.network.poll_interval());

        Ok(Self {
            config,
            params,
            backend,
            shared,
            committer,
            parts: Mutex::new(Parts { capture, poller, pump: None }),
        })
    }

    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    pub fn is_ai_speaking(&self) -> bool {
        self.shared.speaking.load(Ordering::Acquire)
    }

    /// Handle de la session distante, s'il existe encore
    pub fn handle(&self) -> Option<SessionHandle> {
        self.shared.handle.get()
    }

    pub fn params(&self) -> &SessionParams {
        &self.params
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Démarre la session : micro, session distante, capture, polling
    ///
    /// Valide seulement depuis `ready`. En cas d'échec, la session revient
    /// en `ready` et la session distante éventuellement créée est terminée.
    pub async fn start(&self) -> SessionResult<()> {
        let mut parts = self.parts.lock().await;

        let state = self.state();
        if state != SessionState::Ready {
            return Err(SessionError::invalid_transition("start", state));
        }

        if !parts.capture.request_permission().await {
            warn!(device = %parts.capture.device_info(), "accès au microphone refusé");
            return Err(SessionError::PermissionDenied);
        }

        let created = self.backend.create_session(&self.params).await?;
        let handle = created.handle;
        info!(session = %handle, topic = %self.params.topic, "session distante créée");

        self.shared.handle.set(handle.clone());
        self.transition(SessionState::Ready, SessionState::Active);

        if let Some(greeting) = created.greeting.as_deref() {
            self.shared.observer.on_greeting(greeting);
        }

        if let Err(e) = self.start_capture(&mut parts).await {
            error!(error = %e, "démarrage de la capture impossible, abandon de la session");
            self.teardown(&mut parts, TeardownMode::Discard).await;
            self.force_state(SessionState::Ready);
            return Err(e);
        }

        parts.poller.start(handle);
        Ok(())
    }

    /// Met la session en pause
    ///
    /// Valide seulement depuis `active`. L'audio en attente est envoyé et
    /// commité, puis polling et capture s'arrêtent. La session distante et
    /// la sortie audio restent ouvertes.
    pub async fn pause(&self) -> SessionResult<CleanupReport> {
        let mut parts = self.parts.lock().await;

        if !self.transition(SessionState::Active, SessionState::Paused) {
            return Err(SessionError::invalid_transition("pause", self.state()));
        }

        let mut report = CleanupReport::new();
        self.cancel_commit_timer(&mut report);
        self.flush_audio(&mut report).await;
        Self::stop_poller(&mut parts, &mut report);
        Self::stop_capture(&mut parts, &mut report).await;

        Ok(report)
    }

    /// Reprend une session en pause
    ///
    /// Valide seulement depuis `paused`. Si la capture ne redémarre pas,
    /// la session reste en pause.
    pub async fn resume(&self) -> SessionResult<()> {
        let mut parts = self.parts.lock().await;

        let state = self.state();
        if state != SessionState::Paused {
            return Err(SessionError::invalid_transition("resume", state));
        }

        let Some(handle) = self.shared.handle.get() else {
            return Err(SessionError::SessionLost);
        };

        self.transition(SessionState::Paused, SessionState::Active);

        if let Err(e) = self.start_capture(&mut parts).await {
            warn!(error = %e, "reprise de la capture impossible");
            self.transition(SessionState::Active, SessionState::Paused);
            return Err(e);
        }

        parts.poller.start(handle);
        Ok(())
    }

    /// Termine la session
    ///
    /// Valide depuis `active` ou `paused` ; l'audio restant est envoyé et
    /// commité avant la fin distante. Retourne `Ok(None)` si la session
    /// est déjà terminée ou en cours de terminaison.
    pub async fn end(&self) -> SessionResult<Option<CleanupReport>> {
        let mut parts = self.parts.lock().await;

        let state = self.state();
        match state {
            SessionState::Ready => return Err(SessionError::invalid_transition("end", state)),
            SessionState::Ending | SessionState::Ended => return Ok(None),
            SessionState::Active | SessionState::Paused => {}
        }

        if !self.transition(state, SessionState::Ending) {
            return Ok(None);
        }

        let report = self.teardown(&mut parts, TeardownMode::Flush).await;
        self.transition(SessionState::Ending, SessionState::Ended);

        Ok(Some(report))
    }

    /// Démontage sans attente réseau pour l'audio restant
    ///
    /// Utilisable depuis n'importe quel état : l'audio en buffer est
    /// abandonné, toutes les étapes de nettoyage tournent et la session
    /// finit en `ended`. Retourne `None` s'il n'y avait rien à démonter.
    pub async fn shutdown(&self) -> Option<CleanupReport> {
        let mut parts = self.parts.lock().await;

        if matches!(self.state(), SessionState::Ready | SessionState::Ended) {
            return None;
        }

        self.force_state(SessionState::Ending);
        let report = self.teardown(&mut parts, TeardownMode::Discard).await;
        self.force_state(SessionState::Ended);

        Some(report)
    }

    pub async fn stats(&self) -> SessionStats {
        let poller = self.parts.lock().await.poller.stats();
        let playback = self.shared.playback.lock().await.stats().clone();

        SessionStats {
            committer: self.committer.stats(),
            playback,
            poller,
            dropped_while_inactive: self.shared.dropped_while_inactive.load(Ordering::Relaxed),
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        if !self.shared.state.transition(from, to) {
            return false;
        }
        info!(%from, %to, "transition de session");
        self.shared.observer.on_state_changed(from, to);
        true
    }

    fn force_state(&self, to: SessionState) {
        let from = self.state();
        if from == to {
            return;
        }
        self.shared.state.force(to);
        info!(%from, %to, "transition de session forcée");
        self.shared.observer.on_state_changed(from, to);
    }

    /// Démarre la capture et la pompe qui alimente le committer
    async fn start_capture(&self, parts: &mut Parts) -> SessionResult<()> {
        let (sink, chunks) = mpsc::channel(self.config.audio.capture_queue_size);
        parts.capture.start(sink).await?;
        info!(device = %parts.capture.device_info(), "capture démarrée");

        parts.pump = Some(spawn_pump(chunks, Arc::clone(&self.shared), self.committer.clone()));
        Ok(())
    }

    /// Enchaîne les six étapes de nettoyage, sans jamais s'arrêter en route
    async fn teardown(&self, parts: &mut Parts, mode: TeardownMode) -> CleanupReport {
        let mut report = CleanupReport::new();

        self.cancel_commit_timer(&mut report);
        match mode {
            TeardownMode::Flush => self.flush_audio(&mut report).await,
            TeardownMode::Discard => {
                self.committer.discard().await;
                report.done(CleanupStep::DiscardAudio);
            }
        }
        Self::stop_poller(parts, &mut report);
        Self::stop_capture(parts, &mut report).await;
        self.release_playback(&mut report).await;
        self.end_remote_session(&mut report).await;

        info!(
            completed = report.completed().len(),
            failed = report.failed().len(),
            skipped = report.skipped().len(),
            "nettoyage de session terminé"
        );
        report
    }

    fn cancel_commit_timer(&self, report: &mut CleanupReport) {
        self.committer.cancel_timer();
        report.done(CleanupStep::CancelCommitTimer);
    }

    /// Envoie le reste du buffer puis commit
    ///
    /// Les échecs ont déjà été remontés à l'observateur par le committer ;
    /// le rapport les reprend à partir des compteurs.
    async fn flush_audio(&self, report: &mut CleanupReport) {
        let before = self.committer.stats();
        self.committer.flush_and_commit().await;
        let after = self.committer.stats();

        let result = if after.failed_sends > before.failed_sends {
            Err("envoi de l'audio restant en échec")
        } else if after.failed_commits > before.failed_commits {
            Err("commit final en échec")
        } else {
            Ok(())
        };
        report.record(CleanupStep::FlushAudio, result);
    }

    fn stop_poller(parts: &mut Parts, report: &mut CleanupReport) {
        parts.poller.stop();
        report.done(CleanupStep::StopPoller);
    }

    async fn stop_capture(parts: &mut Parts, report: &mut CleanupReport) {
        let result = parts.capture.stop().await;

        if let Some(pump) = parts.pump.take() {
            pump.abort();
        }
        report.record(CleanupStep::StopCapture, result);
    }

    async fn release_playback(&self, report: &mut CleanupReport) {
        let mut playback = self.shared.playback.lock().await;
        let had_context = playback.has_context();
        let result = playback.release();
        drop(playback);

        self.shared.sync_speaking(false);

        if had_context {
            report.record(CleanupStep::ReleasePlayback, result);
        } else {
            report.skip(CleanupStep::ReleasePlayback);
        }
    }

    /// Efface le handle puis demande la fin de la session distante
    async fn end_remote_session(&self, report: &mut CleanupReport) {
        let Some(handle) = self.shared.handle.clear() else {
            debug!("pas de session distante à terminer");
            report.skip(CleanupStep::EndRemoteSession);
            return;
        };

        let result = self.backend.end_session(&handle).await;
        match &result {
            Ok(()) => info!(session = %handle, "session distante terminée"),
            Err(e) => self.shared.observer.on_transport_error(TransportOperation::EndSession, e),
        }
        report.record(CleanupStep::EndRemoteSession, result);
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        // Démontage sans attente : tâches de fond, sortie audio, session distante
        let parts = self.parts.get_mut();
        parts.poller.stop();
        if let Some(pump) = parts.pump.take() {
            pump.abort();
        }
        self.committer.cancel_timer();

        if let Ok(mut playback) = self.shared.playback.try_lock() {
            if let Err(e) = playback.release() {
                warn!(error = %e, "libération de la sortie audio en échec");
            }
        }

        let Some(handle) = self.shared.handle.clear() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(session = %handle, "session abandonnée sans shutdown(), fin distante en arrière-plan");
                let backend = Arc::clone(&self.backend);
                runtime.spawn(async move {
                    match backend.end_session(&handle).await {
                        Ok(()) => info!(session = %handle, "session distante terminée"),
                        Err(e) => warn!(session = %handle, error = %e, "fin de la session distante en échec"),
                    }
                });
            }
            Err(_) => warn!(session = %handle, "pas de runtime tokio, session distante laissée ouverte"),
        }
    }
}

/// Transfère les chunks capturés vers le committer
///
/// L'état est relu à chaque chunk : un callback arrivé après une pause ou
/// pendant le teardown est ignoré.
fn spawn_pump(
    mut chunks: mpsc::Receiver<AudioChunk>,
    shared: Arc<Shared>,
    committer: ChunkCommitter,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(chunk) = chunks.recv().await {
            if shared.state.get() != SessionState::Active {
                shared.dropped_while_inactive.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            committer.push(chunk).await;
        }
        debug!("pompe de capture terminée");
    })
}
