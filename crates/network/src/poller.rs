//! Polling des événements de la session distante
//!
//! Le poller interroge l'agent à intervalle fixe (600ms par défaut) et
//! transmet chaque événement à un `EventSink`.
//!
//! # Garanties
//! - Un polling immédiat au démarrage (greeting déjà en attente)
//! - Jamais deux pollings simultanés : un tick qui tombe pendant un polling
//!   en cours est simplement sauté
//! - "not found" arrête le poller et efface le handle partagé
//! - Toute autre erreur est loggée ; le tick suivant fait office de retry

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::{HandleCell, NetworkError, SessionHandle, VoiceBackend, VoiceEvent};

/// Destinataire des événements du poller
///
/// Les événements d'un même polling sont livrés dans l'ordre reçu.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Traite un événement
    async fn handle_event(&self, event: VoiceEvent);

    /// La session distante n'existe plus ; le handle a déjà été effacé
    async fn on_session_lost(&self, _handle: &SessionHandle) {}

    /// Erreur de polling non fatale
    async fn on_poll_error(&self, _error: &NetworkError) {}
}

/// Statistiques du poller
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollerStats {
    /// Requêtes de polling envoyées
    pub polls: u64,

    /// Ticks sautés car un polling était déjà en cours
    pub skipped: u64,

    /// Événements livrés au sink
    pub events: u64,

    /// Pollings en erreur (hors "not found")
    pub errors: u64,
}

/// État partagé entre le poller, sa boucle et les pollings en cours
struct PollContext {
    backend: Arc<dyn VoiceBackend>,
    sink: Arc<dyn EventSink>,
    handle_cell: HandleCell,

    /// Drapeau coopératif vérifié avant chaque polling
    running: AtomicBool,

    /// Un seul polling en vol à la fois
    in_flight: AtomicBool,

    /// Incrémenté à chaque démarrage : un polling lancé avant un arrêt
    /// ne livre pas ses événements après un redémarrage
    generation: AtomicU64,

    polls: AtomicU64,
    skipped: AtomicU64,
    events: AtomicU64,
    errors: AtomicU64,
}

impl PollContext {
    fn is_current(&self, generation: u64) -> bool {
        self.running.load(Ordering::Acquire) && self.generation.load(Ordering::Acquire) == generation
    }

    fn owns(&self, handle: &SessionHandle) -> bool {
        self.handle_cell.get().as_ref() == Some(handle)
    }

    /// Lance un polling si aucun n'est en cours
    fn try_poll(self: &Arc<Self>, handle: &SessionHandle, generation: u64) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(session = %handle, "polling précédent en cours, tick sauté");
            return;
        }

        let context = Arc::clone(self);
        let handle = handle.clone();
        tokio::spawn(async move {
            context.poll_once(&handle, generation).await;
            context.in_flight.store(false, Ordering::Release);
        });
    }

    async fn poll_once(&self, handle: &SessionHandle, generation: u64) {
        self.polls.fetch_add(1, Ordering::Relaxed);

        match self.backend.poll_events(handle).await {
            Ok(events) => {
                // Lot déjà consommé côté serveur : livré tant que le handle
                // désigne encore cette session, même après un `stop()`
                if !self.owns(handle) {
                    debug!(count = events.len(), "handle effacé ou remplacé, événements ignorés");
                    return;
                }

                if !self.is_current(generation) {
                    debug!(count = events.len(), "poller arrêté, livraison du lot en vol");
                }

                for event in events {
                    if !self.owns(handle) {
                        break;
                    }
                    debug!(kind = event.kind(), "événement reçu");
                    self.events.fetch_add(1, Ordering::Relaxed);
                    self.sink.handle_event(event).await;
                }
            }
            Err(e) if e.is_session_not_found() => {
                self.running.store(false, Ordering::Release);

                if self.handle_cell.clear_if(handle) {
                    info!(session = %handle, "session distante terminée, arrêt du polling");
                    self.sink.on_session_lost(handle).await;
                }
            }
            Err(e) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
                warn!(session = %handle, error = %e, "échec du polling");
                self.sink.on_poll_error(&e).await;
            }
        }
    }
}

/// Poller d'événements d'une session distante
///
/// # Example
/// ```rust,no_run
/// use network::{EventPoller, EventSink, HandleCell, SimulatedBackend, VoiceEvent};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// struct Printer;
///
/// #[async_trait::async_trait]
/// impl EventSink for Printer {
///     async fn handle_event(&self, event: VoiceEvent) {
///         println!("{:?}", event);
///     }
/// }
///
/// # async fn example(handle: network::SessionHandle) {
/// let cell = HandleCell::new();
/// cell.set(handle.clone());
///
/// let mut poller = EventPoller::new(Arc::new(SimulatedBackend::new()), Arc::new(Printer), cell, Duration::from_millis(600));
/// poller.start(handle);
/// // ...
/// poller.stop();
/// # }
/// ```
pub struct EventPoller {
    context: Arc<PollContext>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl EventPoller {
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        sink: Arc<dyn EventSink>,
        handle_cell: HandleCell,
        interval: Duration,
    ) -> Self {
        Self {
            context: Arc::new(PollContext {
                backend,
                sink,
                handle_cell,
                running: AtomicBool::new(false),
                in_flight: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                polls: AtomicU64::new(0),
                skipped: AtomicU64::new(0),
                events: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            }),
            interval,
            task: None,
        }
    }

    /// Démarre le polling de `handle`
    ///
    /// Un premier polling part immédiatement, puis un par intervalle.
    /// Sans effet si le poller tourne déjà.
    pub fn start(&mut self, handle: SessionHandle) {
        if self.is_running() {
            return;
        }

        let context = Arc::clone(&self.context);
        let generation = context.generation.fetch_add(1, Ordering::AcqRel) + 1;
        context.running.store(true, Ordering::Release);

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(session = %handle, interval_ms = self.interval.as_millis() as u64, "polling démarré");

        self.task = Some(tokio::spawn(async move {
            loop {
                // Le premier tick est immédiat
                ticker.tick().await;

                if !context.is_current(generation) {
                    break;
                }

                // Le handle a été effacé ailleurs (teardown, autre session)
                if context.handle_cell.get().as_ref() != Some(&handle) {
                    context.running.store(false, Ordering::Release);
                    break;
                }

                context.try_poll(&handle, generation);
            }
            debug!(session = %handle, "boucle de polling terminée");
        }));
    }

    /// Arrête le polling
    ///
    /// Idempotent. Un polling déjà en vol se termine et livre ses
    /// événements si le handle n'a pas changé entre-temps.
    pub fn stop(&mut self) {
        let was_running = self.context.running.swap(false, Ordering::AcqRel);

        if let Some(task) = self.task.take() {
            task.abort();
        }

        if was_running {
            info!("polling arrêté");
        }
    }

    /// Vérifie si le poller tourne
    ///
    /// Devient `false` de lui-même après un "not found".
    pub fn is_running(&self) -> bool {
        self.context.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PollerStats {
        PollerStats {
            polls: self.context.polls.load(Ordering::Relaxed),
            skipped: self.context.skipped.load(Ordering::Relaxed),
            events: self.context.events.load(Ordering::Relaxed),
            errors: self.context.errors.load(Ordering::Relaxed),
        }
    }
}

impl Drop for EventPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendOperation, SessionParams, SimulatedBackend};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<VoiceEvent>>,
        lost: Mutex<Vec<SessionHandle>>,
        errors: AtomicU64,
    }

    #[async_trait]
    impl EventSink for RecordingSink {
        async fn handle_event(&self, event: VoiceEvent) {
            self.events.lock().unwrap().push(event);
        }

        async fn on_session_lost(&self, handle: &SessionHandle) {
            self.lost.lock().unwrap().push(handle.clone());
        }

        async fn on_poll_error(&self, _error: &NetworkError) {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct Fixture {
        backend: Arc<SimulatedBackend>,
        sink: Arc<RecordingSink>,
        cell: HandleCell,
        handle: SessionHandle,
        poller: EventPoller,
    }

    async fn fixture() -> Fixture {
        let backend = Arc::new(SimulatedBackend::new());
        let sink = Arc::new(RecordingSink::default());
        let cell = HandleCell::new();

        let handle = backend.create_session(&SessionParams::default()).await.unwrap().handle;
        cell.set(handle.clone());

        let poller = EventPoller::new(backend.clone(), sink.clone(), cell.clone(), Duration::from_millis(600));
        Fixture { backend, sink, cell, handle, poller }
    }

    /// Laisse tourner les tâches sur l'horloge virtuelle
    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_then_periodic_polls() {
        let mut f = fixture().await;
        f.backend.push_events([VoiceEvent::AssistantTextComplete { text: "Bonjour".to_string() }]);

        f.poller.start(f.handle.clone());
        advance(10).await;

        // Le greeting en attente est livré sans attendre l'intervalle
        assert_eq!(f.backend.count(BackendOperation::PollEvents), 1);
        assert_eq!(f.sink.events.lock().unwrap().len(), 1);

        advance(1200).await;
        assert_eq!(f.backend.count(BackendOperation::PollEvents), 3);

        f.poller.stop();
        f.poller.stop();
        advance(3000).await;
        assert_eq!(f.backend.count(BackendOperation::PollEvents), 3);
        assert!(!f.poller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_poll_suppresses_overlap() {
        let mut f = fixture().await;
        f.backend.set_latency(BackendOperation::PollEvents, Duration::from_millis(1500));

        f.poller.start(f.handle.clone());
        advance(1300).await;

        // Ticks à 0, 600 et 1200ms : seul le premier est parti
        assert_eq!(f.backend.count(BackendOperation::PollEvents), 1);
        assert_eq!(f.poller.stats().skipped, 2);

        advance(600).await;
        assert_eq!(f.backend.count(BackendOperation::PollEvents), 2);
        f.poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_stops_and_clears_handle() {
        let mut f = fixture().await;
        f.poller.start(f.handle.clone());
        advance(10).await;

        f.backend.expire_sessions();
        advance(600).await;

        assert!(!f.poller.is_running());
        assert!(f.cell.get().is_none());
        assert_eq!(f.sink.lost.lock().unwrap().as_slice(), &[f.handle.clone()]);

        // Plus aucun appel réseau sur les ticks suivants
        let polls = f.backend.count(BackendOperation::PollEvents);
        advance(5000).await;
        assert_eq!(f.backend.count(BackendOperation::PollEvents), polls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_keep_polling() {
        let mut f = fixture().await;
        f.backend.set_failing(BackendOperation::PollEvents, true);

        f.poller.start(f.handle.clone());
        advance(1300).await;

        assert_eq!(f.sink.errors.load(Ordering::Relaxed), 3);
        assert!(f.poller.is_running());
        assert_eq!(f.cell.get(), Some(f.handle.clone()));

        f.backend.set_failing(BackendOperation::PollEvents, false);
        f.backend.push_events([VoiceEvent::AssistantAudioComplete]);
        advance(600).await;
        assert_eq!(f.sink.events.lock().unwrap().as_slice(), &[VoiceEvent::AssistantAudioComplete]);
        assert_eq!(f.poller.stats().errors, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_handle_stops_loop() {
        let mut f = fixture().await;
        f.poller.start(f.handle.clone());
        advance(10).await;

        f.cell.clear();
        advance(1300).await;

        assert!(!f.poller.is_running());
        assert_eq!(f.backend.count(BackendOperation::PollEvents), 1);
        // Effacement volontaire : pas de notification de perte
        assert!(f.sink.lost.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_after_stop() {
        let mut f = fixture().await;
        f.poller.start(f.handle.clone());
        advance(10).await;
        f.poller.stop();

        f.poller.start(f.handle.clone());
        advance(10).await;

        assert!(f.poller.is_running());
        assert_eq!(f.backend.count(BackendOperation::PollEvents), 2);
        f.poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_keeps_in_flight_batch() {
        let mut f = fixture().await;
        f.backend.set_latency(BackendOperation::PollEvents, Duration::from_millis(200));

        f.poller.start(f.handle.clone());
        advance(10).await;
        // Le polling en vol (parti à 0ms) répondra à 200ms
        f.backend.push_events([VoiceEvent::UserTextComplete { text: "bonjour".to_string() }]);
        advance(90).await;
        f.poller.stop();

        advance(300).await;
        assert_eq!(f.sink.events.lock().unwrap().len(), 1);

        // Pas de doublon après redémarrage
        f.poller.start(f.handle.clone());
        advance(1000).await;
        assert_eq!(f.sink.events.lock().unwrap().len(), 1);
        f.poller.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleared_handle_drops_in_flight_batch() {
        let mut f = fixture().await;
        f.backend.set_latency(BackendOperation::PollEvents, Duration::from_millis(200));

        f.poller.start(f.handle.clone());
        advance(10).await;
        f.backend.push_events([VoiceEvent::AssistantAudioComplete]);
        f.poller.stop();
        f.cell.clear();

        advance(500).await;
        assert!(f.sink.events.lock().unwrap().is_empty());
    }
}
