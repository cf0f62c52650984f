//! Doubles de test partagés par les scénarios de session

#![allow(dead_code)]

use async_trait::async_trait;
use audio::{AudioCapture, AudioChunk, AudioError, AudioResult, ChunkSink, OutputContext, OutputDevice, Sample};
use network::{NetworkConfig, NetworkError, SessionHandle, SessionParams, SimulatedBackend, TranscriptFragment};
use session::{SessionConfig, SessionObserver, SessionState, TransportOperation, VoiceSession};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Délai de commit des scénarios (valeur par défaut)
pub const COMMIT_DELAY: Duration = Duration::from_millis(500);

/// Intervalle de polling des scénarios
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Default)]
struct CaptureState {
    sink: Option<ChunkSink>,
    deny_permission: bool,
    fail_start: bool,
    starts: usize,
    stops: usize,
    sequence: u64,
}

/// Télécommande d'une capture factice
#[derive(Clone, Default)]
pub struct CaptureControl(Arc<Mutex<CaptureState>>);

impl CaptureControl {
    pub fn deny_permission(&self) {
        self.0.lock().unwrap().deny_permission = true;
    }

    pub fn fail_start(&self, failing: bool) {
        self.0.lock().unwrap().fail_start = failing;
    }

    /// Simule un callback matériel ; retourne `false` si la capture est arrêtée
    pub async fn emit(&self, bytes: Vec<u8>) -> bool {
        let (sink, chunk) = {
            let mut state = self.0.lock().unwrap();
            let Some(sink) = state.sink.clone() else {
                return false;
            };
            state.sequence += 1;
            (sink, AudioChunk::new(bytes, state.sequence))
        };
        sink.send(chunk).await.is_ok()
    }

    pub fn starts(&self) -> usize {
        self.0.lock().unwrap().starts
    }

    pub fn stops(&self) -> usize {
        self.0.lock().unwrap().stops
    }

    pub fn is_recording(&self) -> bool {
        self.0.lock().unwrap().sink.is_some()
    }
}

pub struct FakeCapture(CaptureControl);

#[async_trait]
impl AudioCapture for FakeCapture {
    async fn request_permission(&mut self) -> bool {
        !self.0.0.lock().unwrap().deny_permission
    }

    async fn start(&mut self, sink: ChunkSink) -> AudioResult<()> {
        let mut state = self.0.0.lock().unwrap();
        if state.fail_start {
            return Err(AudioError::NoDeviceFound);
        }
        state.starts += 1;
        state.sink = Some(sink);
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        let mut state = self.0.0.lock().unwrap();
        state.stops += 1;
        state.sink = None;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.0.is_recording()
    }
}

/// Horloge et programmation observées de la sortie factice
#[derive(Default)]
pub struct Timeline {
    pub now: f64,
    pub scheduled: Vec<(f64, usize)>,
    pub opened: usize,
    pub closed: usize,
}

#[derive(Clone, Default)]
pub struct OutputControl(pub Arc<Mutex<Timeline>>);

impl OutputControl {
    pub fn set_now(&self, now: f64) {
        self.0.lock().unwrap().now = now;
    }

    pub fn scheduled(&self) -> Vec<(f64, usize)> {
        self.0.lock().unwrap().scheduled.clone()
    }

    pub fn opened(&self) -> usize {
        self.0.lock().unwrap().opened
    }

    pub fn closed(&self) -> usize {
        self.0.lock().unwrap().closed
    }
}

struct FakeOutput(OutputControl);

impl OutputContext for FakeOutput {
    fn current_time(&self) -> f64 {
        self.0.0.lock().unwrap().now
    }

    fn schedule(&mut self, samples: Vec<Sample>, start_at: f64) -> AudioResult<()> {
        self.0.0.lock().unwrap().scheduled.push((start_at, samples.len()));
        Ok(())
    }

    fn close(&mut self) -> AudioResult<()> {
        self.0.0.lock().unwrap().closed += 1;
        Ok(())
    }
}

struct FakeDevice(OutputControl);

impl OutputDevice for FakeDevice {
    fn open(&self) -> AudioResult<Box<dyn OutputContext>> {
        self.0.0.lock().unwrap().opened += 1;
        Ok(Box::new(FakeOutput(self.0.clone())))
    }
}

/// Observateur qui garde une trace lisible de chaque notification
#[derive(Default)]
pub struct RecordingObserver {
    log: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn entries(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries().iter().any(|e| e == entry)
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl SessionObserver for RecordingObserver {
    fn on_state_changed(&self, from: SessionState, to: SessionState) {
        self.push(format!("state:{}->{}", from, to));
    }

    fn on_greeting(&self, text: &str) {
        self.push(format!("greeting:{}", text));
    }

    fn on_transcript(&self, fragment: TranscriptFragment<'_>) {
        self.push(format!("transcript:{}:{}", fragment.text, fragment.is_final));
    }

    fn on_speaking_changed(&self, speaking: bool) {
        self.push(format!("speaking:{}", speaking));
    }

    fn on_remote_error(&self, message: &str) {
        self.push(format!("remote_error:{}", message));
    }

    fn on_transport_error(&self, operation: TransportOperation, _error: &NetworkError) {
        self.push(format!("transport_error:{}", operation.as_str()));
    }

    fn on_session_lost(&self, _handle: &SessionHandle) {
        self.push("session_lost".to_string());
    }
}

/// Session montée sur des doubles de test
pub struct Harness {
    pub session: VoiceSession,
    pub backend: Arc<SimulatedBackend>,
    pub capture: CaptureControl,
    pub output: OutputControl,
    pub observer: Arc<RecordingObserver>,
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        network: NetworkConfig::test_config(),
        commit_delay_ms: COMMIT_DELAY.as_millis() as u64,
        ..SessionConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(SimulatedBackend::new())
}

pub fn harness_with(backend: SimulatedBackend) -> Harness {
    let backend = Arc::new(backend);
    let capture = CaptureControl::default();
    let output = OutputControl::default();
    let observer = Arc::new(RecordingObserver::default());

    let params = SessionParams {
        topic: "voyage".to_string(),
        level: "B1".to_string(),
        goals: vec!["passé composé".to_string()],
        speaker: "alloy".to_string(),
        prior_context: None,
    };

    let session = VoiceSession::new(
        test_config(),
        params,
        backend.clone(),
        Box::new(FakeCapture(capture.clone())),
        Box::new(FakeDevice(output.clone())),
        observer.clone(),
    )
    .unwrap();

    Harness { session, backend, capture, output, observer }
}

/// Laisse tourner les tâches de fond (temps en pause : avance automatique)
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
