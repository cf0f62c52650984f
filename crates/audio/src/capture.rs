//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait AudioCapture en utilisant la librairie cpal
//! (Cross-Platform Audio Library) pour capturer l'audio depuis le microphone.
//!
//! Chaque callback matériel produit un `AudioChunk` PCM16 mono au format
//! de la configuration (24 kHz par défaut), poussé sans bloquer vers le
//! pipeline de session.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Device, SampleFormat, Stream, StreamConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

use crate::{AudioCapture, AudioChunk, AudioConfig, AudioError, AudioResult, ChunkSink, Pcm16Codec};

/// Implémentation de capture audio avec cpal
///
/// # Architecture thread
///
/// cpal fonctionne avec des callbacks sur un thread temps réel. Le callback
/// convertit les échantillons du périphérique en PCM16, ne garde que le
/// premier canal, et envoie le chunk via `try_send` : jamais de blocage,
/// jamais de log dans le callback.
pub struct CpalCapture {
    /// Périphérique audio d'entrée (microphone)
    device: Device,

    /// Configuration audio de notre application
    config: AudioConfig,

    /// Stream audio actif (None si arrêté)
    stream: Option<Stream>,

    /// Compteur de séquence pour les chunks
    sequence_counter: Arc<AtomicU64>,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalCapture {
    /// Crée une nouvelle instance de capture
    ///
    /// Découvre le périphérique d'entrée par défaut, sans démarrer la capture.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun microphone n'est disponible
    /// - `AudioError::ConfigError` si la configuration est invalide
    pub fn new(config: AudioConfig) -> AudioResult<Self> {
        config.validate().map_err(AudioError::ConfigError)?;

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::NoDeviceFound)?;

        let device_name = device.description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        info!(device = %device_name, "périphérique de capture trouvé");

        Ok(Self {
            device,
            config,
            stream: None,
            sequence_counter: Arc::new(AtomicU64::new(0)),
            device_name,
        })
    }

    /// Vérifie que le périphérique sait capturer à notre fréquence
    ///
    /// Retourne la config de stream à utiliser et le format d'échantillons.
    fn negotiate_config(&self) -> AudioResult<(StreamConfig, SampleFormat)> {
        let default_config = self.device.default_input_config()?;

        debug!(
            sample_rate = default_config.sample_rate(),
            channels = default_config.channels(),
            format = ?default_config.sample_format(),
            "config par défaut du périphérique d'entrée"
        );

        let supported = self.device
            .supported_input_configs()
            .map_err(|e| AudioError::ConfigError(format!("Impossible d'obtenir configs supportées: {}", e)))?
            .any(|range| {
                self.config.sample_rate >= range.min_sample_rate()
                    && self.config.sample_rate <= range.max_sample_rate()
            });

        if !supported {
            return Err(AudioError::ConfigError(format!(
                "Sample rate {} Hz non supporté par le périphérique",
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

    /// Construit le stream d'entrée selon le format d'échantillons du périphérique
    fn build_stream(&self, sink: ChunkSink) -> AudioResult<Stream> {
        let (stream_config, sample_format) = self.negotiate_config()?;
        let channels = stream_config.channels.max(1) as usize;
        let sequence_counter = Arc::clone(&self.sequence_counter);

        let on_error = |err: cpal::StreamError| {
            warn!(error = %err, "erreur stream audio d'entrée");
        };

        let stream = match sample_format {
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    Self::deliver(data, channels, Pcm16Codec::float_to_pcm16, &sink, &sequence_counter);
                },
                on_error,
                None,
            )?,
            SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    Self::deliver(data, channels, |s| s, &sink, &sequence_counter);
                },
                on_error,
                None,
            )?,
            SampleFormat::U16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    Self::deliver(data, channels, Pcm16Codec::u16_to_pcm16, &sink, &sequence_counter);
                },
                on_error,
                None,
            )?,
            _ => return Err(AudioError::ConfigError(format!("Format d'échantillon non supporté : {:?}", sample_format))),
        };

        Ok(stream)
    }

    /// Convertit un buffer du callback en chunk PCM16 mono et le livre
    ///
    /// Appelée sur le thread temps réel : pas de lock, pas de log.
    fn deliver<T: Copy>(
        data: &[T],
        channels: usize,
        to_pcm16: impl Fn(T) -> i16,
        sink: &ChunkSink,
        sequence_counter: &AtomicU64,
    ) {
        let mut bytes = Vec::with_capacity(data.len() / channels * 2);
        for frame in data.chunks(channels) {
            bytes.extend_from_slice(&to_pcm16(frame[0]).to_le_bytes());
        }

        if bytes.is_empty() {
            return;
        }

        let sequence = sequence_counter.fetch_add(1, Ordering::Relaxed);

        // File pleine ou pipeline fermé : le chunk est perdu
        let _ = sink.try_send(AudioChunk::new(bytes, sequence));
    }
}

#[async_trait]
impl AudioCapture for CpalCapture {
    async fn request_permission(&mut self) -> bool {
        // cpal n'expose pas de permission : un micro configurable vaut accord
        match self.device.default_input_config() {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "microphone inutilisable");
                false
            }
        }
    }

    async fn start(&mut self, sink: ChunkSink) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(()); // Déjà démarré
        }

        let stream = self.build_stream(sink)?;
        stream.play()?;
        self.stream = Some(stream);

        info!(device = %self.device_name, sample_rate = self.config.sample_rate, "capture audio démarrée");
        Ok(())
    }

    async fn stop(&mut self) -> AudioResult<()> {
        let Some(stream) = self.stream.take() else {
            return Ok(()); // Déjà arrêté
        };

        // Le stream est libéré même si la pause échoue
        stream.pause()?;

        info!("capture audio arrêtée");
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}
