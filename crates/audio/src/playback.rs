//! Module de lecture audio utilisant cpal
//!
//! Ce module implémente `OutputContext` avec un stream de sortie cpal.
//! Contrairement à une simple file FIFO, chaque buffer est programmé à une
//! date précise de l'horloge du périphérique :
//! - L'horloge est le nombre de frames déjà rendues par le callback
//! - Un buffer est rendu à partir de sa frame de départ
//! - Entre deux buffers, le callback produit du silence
//!
//! Le planificateur (`PlaybackScheduler`) garantit que les buffers ne se
//! chevauchent pas ; ce module se contente de les rendre à l'heure.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::{AudioConfig, AudioError, AudioResult, OutputContext, OutputDevice, Pcm16Codec, Sample};

/// Buffer programmé sur la timeline du périphérique
#[derive(Debug)]
struct ScheduledBuffer {
    /// Frame de départ (horloge du périphérique)
    start_frame: u64,

    /// Échantillons mono à rendre
    samples: Vec<Sample>,
}

impl ScheduledBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Timeline partagée entre le thread principal et le callback temps réel
type Timeline = Arc<Mutex<VecDeque<ScheduledBuffer>>>;

/// Fabrique de contextes de sortie cpal
///
/// Le stream n'est ouvert qu'au premier appel à `open()`, c'est-à-dire au
/// premier chunk de l'assistant.
#[derive(Clone, Debug)]
pub struct CpalOutputDevice {
    config: AudioConfig,
}

impl CpalOutputDevice {
    pub fn new(config: AudioConfig) -> Self {
        Self { config }
    }
}

impl OutputDevice for CpalOutputDevice {
    fn open(&self) -> AudioResult<Box<dyn OutputContext>> {
        let mut playback = CpalPlayback::new(self.config.clone())?;
        playback.start()?;
        Ok(Box::new(playback))
    }
}

/// Contexte de sortie cpal
///
/// # Architecture thread
///
/// Le thread principal ajoute des buffers à la timeline via `schedule()`.
/// Le callback cpal (thread temps réel) lit la timeline avec `try_lock`,
/// rend les échantillons programmés et fait avancer l'horloge.
pub struct CpalPlayback {
    /// Périphérique audio de sortie (haut-parleurs)
    device: Device,

    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None si arrêté)
    stream: Option<Stream>,

    /// Buffers programmés, triés par frame de départ
    timeline: Timeline,

    /// Horloge du périphérique, en frames rendues
    rendered_frames: Arc<AtomicU64>,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalPlayback {
    /// Crée une nouvelle instance de lecture
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun haut-parleur n'est disponible
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDeviceFound)?;

        let device_name = device.description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        info!(device = %device_name, "périphérique de lecture trouvé");

        Ok(Self {
            device,
            config,
            stream: None,
            timeline: Arc::new(Mutex::new(VecDeque::new())),
            rendered_frames: Arc::new(AtomicU64::new(0)),
            device_name,
        })
    }

    /// Vérifie que le périphérique sait jouer à notre fréquence
    fn negotiate_config(&self) -> AudioResult<(StreamConfig, SampleFormat)> {
        let default_config = self.device.default_output_config()?;

        debug!(
            sample_rate = default_config.sample_rate(),
            channels = default_config.channels(),
            format = ?default_config.sample_format(),
            "config par défaut du périphérique de sortie"
        );

        let supported = self.device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(format!("Impossible d'obtenir configs supportées: {}", e)))?
            .any(|range| {
                self.config.sample_rate >= range.min_sample_rate()
                    && self.config.sample_rate <= range.max_sample_rate()
            });

        if !supported {
            return Err(AudioError::ConfigError(format!(
                "Sample rate {} Hz non supporté par le périphérique de sortie",
                self.config.sample_rate
            )));
        }

        let stream_config = StreamConfig {
            channels: default_config.channels(),
            sample_rate: self.config.sample_rate,
            buffer_size: BufferSize::Default,
        };

        Ok((stream_config, default_config.sample_format()))
    }

    /// Construit et démarre le stream de sortie
    fn start(&mut self) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let (stream_config, sample_format) = self.negotiate_config()?;
        let channels = stream_config.channels.max(1) as usize;
        let timeline = Arc::clone(&self.timeline);
        let clock = Arc::clone(&self.rendered_frames);

        let on_error = |err: cpal::StreamError| {
            warn!(error = %err, "erreur stream audio de sortie");
        };

        let stream = match sample_format {
            SampleFormat::F32 => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    render(data, channels, &timeline, &clock, |s| s);
                },
                on_error,
                None,
            )?,
            SampleFormat::I16 => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    render(data, channels, &timeline, &clock, Pcm16Codec::float_to_pcm16);
                },
                on_error,
                None,
            )?,
            SampleFormat::U16 => self.device.build_output_stream(
                &stream_config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    render(data, channels, &timeline, &clock, |s| {
                        (Pcm16Codec::float_to_pcm16(s) as i32 + 32768) as u16
                    });
                },
                on_error,
                None,
            )?,
            _ => return Err(AudioError::ConfigError(format!("Format d'échantillon non supporté : {:?}", sample_format))),
        };

        stream.play()?;
        self.stream = Some(stream);

        info!(device = %self.device_name, "lecture audio démarrée");
        Ok(())
    }
}

/// Remplit le buffer de sortie à partir de la timeline
///
/// Appelée par le callback audio (thread temps réel) : ne bloque jamais.
/// Si la timeline est verrouillée, on rend du silence mais l'horloge avance
/// quand même, pour rester fidèle au temps réel du périphérique.
fn render<T: Copy>(
    output: &mut [T],
    channels: usize,
    timeline: &Mutex<VecDeque<ScheduledBuffer>>,
    clock: &AtomicU64,
    convert: impl Fn(Sample) -> T,
) {
    let first_frame = clock.load(Ordering::Acquire);
    let frame_count = output.len() / channels;
    let mut queue = timeline.try_lock().ok();

    for (offset, frame) in output.chunks_mut(channels).enumerate() {
        let now = first_frame + offset as u64;
        let mut value = 0.0;

        if let Some(queue) = queue.as_mut() {
            // Retire les buffers entièrement joués
            while queue.front().is_some_and(|buffer| buffer.end_frame() <= now) {
                queue.pop_front();
            }

            if let Some(buffer) = queue.front() {
                if buffer.start_frame <= now {
                    value = buffer.samples[(now - buffer.start_frame) as usize];
                }
            }
        }

        let converted = convert(value);
        for sample in frame.iter_mut() {
            *sample = converted;
        }
    }

    clock.fetch_add(frame_count as u64, Ordering::Release);
}

impl OutputContext for CpalPlayback {
    fn current_time(&self) -> f64 {
        self.rendered_frames.load(Ordering::Acquire) as f64 / self.config.sample_rate as f64
    }

    fn schedule(&mut self, samples: Vec<Sample>, start_at: f64) -> AudioResult<()> {
        if self.stream.is_none() {
            return Err(AudioError::InitializationError("Contexte de sortie fermé".to_string()));
        }

        let start_frame = (start_at * self.config.sample_rate as f64).round().max(0.0) as u64;
        let mut timeline = self.timeline
            .lock()
            .map_err(|_| AudioError::InitializationError("Timeline de lecture empoisonnée".to_string()))?;
        timeline.push_back(ScheduledBuffer { start_frame, samples });
        Ok(())
    }

    fn close(&mut self) -> AudioResult<()> {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.clear();
        }

        if let Some(stream) = self.stream.take() {
            stream.pause()?;
            info!("lecture audio arrêtée");
        }
        Ok(())
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline_with(buffers: Vec<ScheduledBuffer>) -> Mutex<VecDeque<ScheduledBuffer>> {
        Mutex::new(buffers.into_iter().collect())
    }

    #[test]
    fn test_render_places_buffers_at_their_frame() {
        let timeline = timeline_with(vec![
            ScheduledBuffer { start_frame: 2, samples: vec![0.5, 0.5] },
            ScheduledBuffer { start_frame: 4, samples: vec![-0.5] },
        ]);
        let clock = AtomicU64::new(0);
        let mut output = [1.0f32; 6];

        render(&mut output, 1, &timeline, &clock, |s| s);

        assert_eq!(output, [0.0, 0.0, 0.5, 0.5, -0.5, 0.0]);
        assert_eq!(clock.load(Ordering::Acquire), 6);
        // Tous les buffers ont été joués
        assert!(timeline.lock().unwrap().is_empty());
    }

    #[test]
    fn test_render_duplicates_mono_on_all_channels() {
        let timeline = timeline_with(vec![ScheduledBuffer { start_frame: 0, samples: vec![0.25, -0.25] }]);
        let clock = AtomicU64::new(0);
        let mut output = [0i16; 4];

        render(&mut output, 2, &timeline, &clock, Pcm16Codec::float_to_pcm16);

        assert_eq!(output, [8192, 8192, -8192, -8192]);
        assert_eq!(clock.load(Ordering::Acquire), 2);
    }

    #[test]
    fn test_render_continues_across_callbacks() {
        let timeline = timeline_with(vec![ScheduledBuffer { start_frame: 1, samples: vec![0.1, 0.2, 0.3] }]);
        let clock = AtomicU64::new(0);

        let mut first = [0.0f32; 2];
        render(&mut first, 1, &timeline, &clock, |s| s);
        let mut second = [0.0f32; 3];
        render(&mut second, 1, &timeline, &clock, |s| s);

        assert_eq!(first, [0.0, 0.1]);
        assert_eq!(second, [0.2, 0.3, 0.0]);
    }

    #[test]
    fn test_playback_creation() {
        match CpalPlayback::new(AudioConfig::default()) {
            Ok(playback) => {
                assert!(!playback.device_info().is_empty());
                assert_eq!(playback.current_time(), 0.0);
            },
            Err(AudioError::NoDeviceFound) => {
                println!("⚠️  Pas de haut-parleur disponible pour le test");
            },
            Err(e) => println!("⚠️  Lecture indisponible: {}", e),
        }
    }

    // Nécessite de vrais haut-parleurs
    #[test]
    #[ignore]
    fn test_open_and_close_device() {
        let device = CpalOutputDevice::new(AudioConfig::default());
        if let Ok(mut context) = device.open() {
            let start = context.current_time() + 0.1;
            assert!(context.schedule(vec![0.0; 2400], start).is_ok());
            assert!(context.close().is_ok());
            assert!(context.schedule(vec![0.0; 10], start).is_err());
        }
    }
}
