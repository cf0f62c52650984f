//! Planification de la lecture de l'audio de l'assistant
//!
//! Chaque chunk `assistant_audio_chunk` est décodé puis programmé sur
//! l'horloge du périphérique de sortie, juste après le précédent :
//!
//! ```text
//! début = max(maintenant, prochain_début)
//! prochain_début = début + durée
//! ```
//!
//! Les chunks ne se chevauchent jamais et ne laissent pas de trou audible
//! au-delà de la gigue de planification.

use tracing::{debug, info, warn};

use crate::{AudioCodec, AudioConfig, AudioError, AudioResult, OutputContext, OutputDevice, Pcm16Codec, Sample};

/// Curseur monotone de planification
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaybackClock {
    next_start_time: f64,
}

impl PlaybackClock {
    /// Initialise le curseur au temps courant du périphérique
    pub fn new(device_now: f64) -> Self {
        Self { next_start_time: device_now }
    }

    /// Réserve un créneau de `duration` secondes et retourne sa date de début
    pub fn reserve(&mut self, device_now: f64, duration: f64) -> f64 {
        let start = device_now.max(self.next_start_time);
        self.next_start_time = start + duration;
        start
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }
}

/// Chunk effectivement programmé
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledChunk {
    /// Date de début (temps du périphérique, secondes)
    pub start_at: f64,

    /// Durée en secondes
    pub duration: f64,
}

/// Statistiques de lecture
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PlaybackStats {
    /// Chunks programmés sur le périphérique
    pub chunks_scheduled: u64,

    /// Chunks abandonnés (payload illisible ou périphérique en erreur)
    pub chunks_dropped: u64,

    /// Durée totale d'audio programmée, en secondes
    pub seconds_scheduled: f64,
}

/// Planificateur de lecture
///
/// Possède le contexte de sortie (ouvert paresseusement) et l'horloge de
/// planification. Les deux sont libérés ensemble par `release()`.
pub struct PlaybackScheduler {
    device: Box<dyn OutputDevice>,
    context: Option<Box<dyn OutputContext>>,
    clock: Option<PlaybackClock>,
    codec: Pcm16Codec,
    config: AudioConfig,
    speaking: bool,
    stats: PlaybackStats,
}

impl PlaybackScheduler {
    pub fn new(device: Box<dyn OutputDevice>, config: AudioConfig) -> Self {
        Self {
            device,
            context: None,
            clock: None,
            codec: Pcm16Codec::new(),
            config,
            speaking: false,
            stats: PlaybackStats::default(),
        }
    }

    /// Décode un payload base64 et le programme
    ///
    /// Un payload illisible est abandonné (et compté) sans toucher à
    /// l'horloge : la planification des chunks suivants reste intacte.
    pub fn schedule_payload(&mut self, payload: &str) -> AudioResult<ScheduledChunk> {
        match self.codec.decode(payload) {
            Ok(samples) => self.schedule_samples(samples),
            Err(e) => {
                self.stats.chunks_dropped += 1;
                warn!(error = %e, "chunk audio de l'assistant illisible, abandonné");
                Err(e)
            }
        }
    }

    /// Programme des échantillons déjà décodés
    ///
    /// L'indicateur "l'assistant parle" ne passe à vrai qu'une fois un
    /// buffer effectivement programmé.
    pub fn schedule_samples(&mut self, samples: Vec<Sample>) -> AudioResult<ScheduledChunk> {
        if self.context.is_none() {
            let context = self.device.open()?;
            let now = context.current_time();
            info!(device = %context.device_info(), device_time = now, "contexte de sortie ouvert");
            self.clock = Some(PlaybackClock::new(now));
            self.context = Some(context);
        }

        let (Some(context), Some(clock)) = (self.context.as_mut(), self.clock.as_mut()) else {
            return Err(AudioError::InitializationError("Contexte de sortie absent".to_string()));
        };

        let now = context.current_time();
        let duration = self.config.duration_of_samples(samples.len());

        if samples.is_empty() {
            return Ok(ScheduledChunk { start_at: clock.next_start_time().max(now), duration });
        }

        let start_at = clock.reserve(now, duration);
        if let Err(e) = context.schedule(samples, start_at) {
            self.stats.chunks_dropped += 1;
            return Err(e);
        }

        self.speaking = true;
        self.stats.chunks_scheduled += 1;
        self.stats.seconds_scheduled += duration;
        debug!(start_at, duration, device_time = now, "chunk de l'assistant programmé");

        Ok(ScheduledChunk { start_at, duration })
    }

    /// Fin de la réponse de l'assistant (`assistant_audio_complete`)
    pub fn complete(&mut self) {
        self.speaking = false;
    }

    /// Ferme le contexte de sortie et oublie l'horloge
    ///
    /// Sans effet si aucun contexte n'a été ouvert.
    pub fn release(&mut self) -> AudioResult<()> {
        self.speaking = false;
        self.clock = None;

        match self.context.take() {
            Some(mut context) => {
                context.close()?;
                info!("contexte de sortie libéré");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn clock(&self) -> Option<PlaybackClock> {
        self.clock
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioChunk;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Timeline {
        now: f64,
        scheduled: Vec<(f64, usize)>,
        opened: usize,
        closed: usize,
    }

    /// Sortie factice dont l'horloge est pilotée par le test
    struct FakeOutput(Arc<Mutex<Timeline>>);

    impl OutputContext for FakeOutput {
        fn current_time(&self) -> f64 {
            self.0.lock().unwrap().now
        }

        fn schedule(&mut self, samples: Vec<Sample>, start_at: f64) -> AudioResult<()> {
            self.0.lock().unwrap().scheduled.push((start_at, samples.len()));
            Ok(())
        }

        fn close(&mut self) -> AudioResult<()> {
            self.0.lock().unwrap().closed += 1;
            Ok(())
        }
    }

    struct FakeDevice(Arc<Mutex<Timeline>>);

    impl OutputDevice for FakeDevice {
        fn open(&self) -> AudioResult<Box<dyn OutputContext>> {
            self.0.lock().unwrap().opened += 1;
            Ok(Box::new(FakeOutput(Arc::clone(&self.0))))
        }
    }

    /// Périphérique qui refuse toute ouverture
    struct UnavailableDevice;

    impl OutputDevice for UnavailableDevice {
        fn open(&self) -> AudioResult<Box<dyn OutputContext>> {
            Err(AudioError::NoDeviceFound)
        }
    }

    fn scheduler() -> (PlaybackScheduler, Arc<Mutex<Timeline>>) {
        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let scheduler = PlaybackScheduler::new(Box::new(FakeDevice(Arc::clone(&timeline))), AudioConfig::default());
        (scheduler, timeline)
    }

    fn payload(sample_count: usize) -> String {
        let chunk = AudioChunk::from_samples(&vec![1000i16; sample_count], 0);
        Pcm16Codec::new().encode(chunk.as_bytes())
    }

    #[test]
    fn test_clock_never_overlaps() {
        let mut clock = PlaybackClock::new(0.0);
        let durations = [0.1, 0.05, 0.3, 0.0, 0.2, 0.1, 0.4];
        let device_times = [0.0, 0.02, 0.5, 0.51, 0.6, 2.0, 2.05];

        let mut previous: Option<(f64, f64)> = None;
        for (&duration, &now) in durations.iter().zip(device_times.iter()) {
            let start = clock.reserve(now, duration);
            assert!(start >= now);
            if let Some((prev_start, prev_duration)) = previous {
                assert!(start >= prev_start + prev_duration);
            }
            previous = Some((start, duration));
        }
    }

    #[test]
    fn test_chunks_are_back_to_back() {
        let (mut scheduler, timeline) = scheduler();
        timeline.lock().unwrap().now = 1.0;

        // 2400 échantillons à 24 kHz = 100ms
        let first = scheduler.schedule_payload(&payload(2400)).unwrap();
        let second = scheduler.schedule_payload(&payload(2400)).unwrap();

        assert_eq!(first.start_at, 1.0);
        assert!((first.duration - 0.1).abs() < 1e-9);
        assert!((second.start_at - 1.1).abs() < 1e-9);
        assert!(scheduler.is_speaking());
        assert_eq!(timeline.lock().unwrap().opened, 1);
    }

    #[test]
    fn test_late_chunk_starts_now() {
        let (mut scheduler, timeline) = scheduler();

        scheduler.schedule_payload(&payload(240)).unwrap();
        timeline.lock().unwrap().now = 5.0;
        let late = scheduler.schedule_payload(&payload(240)).unwrap();

        assert_eq!(late.start_at, 5.0);
        assert_eq!(scheduler.stats().chunks_scheduled, 2);
    }

    #[test]
    fn test_malformed_payload_is_dropped() {
        let (mut scheduler, timeline) = scheduler();

        assert!(scheduler.schedule_payload("%%%").is_err());
        scheduler.schedule_payload(&payload(10)).unwrap();

        assert_eq!(scheduler.stats().chunks_dropped, 1);
        assert_eq!(timeline.lock().unwrap().scheduled, vec![(0.0, 10)]);
    }

    #[test]
    fn test_release_discards_clock() {
        let (mut scheduler, timeline) = scheduler();

        // Libérer sans contexte est sans effet
        assert!(scheduler.release().is_ok());
        assert_eq!(timeline.lock().unwrap().closed, 0);

        scheduler.schedule_payload(&payload(24)).unwrap();
        assert!(scheduler.has_context());
        scheduler.complete();
        assert!(!scheduler.is_speaking());

        scheduler.release().unwrap();
        assert!(!scheduler.has_context());
        assert!(scheduler.clock().is_none());
        assert_eq!(timeline.lock().unwrap().closed, 1);

        // Un nouveau chunk rouvre un contexte
        scheduler.schedule_payload(&payload(24)).unwrap();
        assert_eq!(timeline.lock().unwrap().opened, 2);
    }

    #[test]
    fn test_open_failure_does_not_mark_speaking() {
        let mut scheduler = PlaybackScheduler::new(Box::new(UnavailableDevice), AudioConfig::default());

        assert!(matches!(scheduler.schedule_payload(&payload(240)), Err(AudioError::NoDeviceFound)));
        assert!(!scheduler.is_speaking());
        assert!(!scheduler.has_context());
        assert_eq!(scheduler.stats().chunks_scheduled, 0);
    }
}
