//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces (traits) que doivent implémenter
//! tous les composants audio. Cela permet d'avoir du code modulaire
//! et testable avec différentes implémentations (cpal ou factices).

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{AudioChunk, AudioResult, Sample};

/// Destination des chunks capturés
///
/// Le callback matériel y pousse les chunks avec `try_send` : si la file
/// est pleine, le chunk est perdu plutôt que de bloquer le thread audio.
pub type ChunkSink = mpsc::Sender<AudioChunk>;

/// Trait pour capturer l'audio depuis un périphérique d'entrée
///
/// Ce trait abstrait permet d'utiliser différentes implémentations :
/// - CpalCapture : Implémentation avec la librairie cpal
/// - Captures factices pour les tests de session
///
/// `#[async_trait]` permet d'avoir des fonctions async dans les traits.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Demande l'accès au microphone
    ///
    /// Retourne `false` si l'accès est refusé ou si aucun micro n'est utilisable.
    async fn request_permission(&mut self) -> bool;

    /// Démarre la capture audio
    ///
    /// Chaque callback matériel livre un chunk PCM16 mono au `sink`.
    /// Pendant la capture, le périphérique d'entrée est réservé à cette session.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` : Aucun microphone trouvé
    /// - `AudioError::ConfigError` : Format non supporté par le périphérique
    ///
    /// # Example
    /// ```rust,no_run
    /// use audio::{AudioCapture, CpalCapture, AudioConfig};
    /// use tokio::sync::mpsc;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let mut capture = CpalCapture::new(AudioConfig::default())?;
    /// let (sink, mut chunks) = mpsc::channel(64);
    ///
    /// capture.start(sink).await?;
    /// while let Some(chunk) = chunks.recv().await {
    ///     println!("Reçu chunk de {} octets", chunk.len());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    async fn start(&mut self, sink: ChunkSink) -> AudioResult<()>;

    /// Arrête la capture audio
    ///
    /// Doit pouvoir être appelé plusieurs fois et depuis n'importe quel état.
    async fn stop(&mut self) -> AudioResult<()>;

    /// Vérifie si la capture est active
    fn is_recording(&self) -> bool;

    /// Retourne des informations sur le périphérique utilisé
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Trait pour le transcodage audio ⇄ texte de transport
///
/// Les implémentations sont pures et sans état : aucune I/O.
pub trait AudioCodec: Send + Sync {
    /// Encode des octets PCM16 bruts en texte transportable
    fn encode(&self, raw: &[u8]) -> String;

    /// Décode un texte transporté en échantillons normalisés [-1, 1]
    ///
    /// # Erreurs
    /// - `AudioError::InvalidPayload` : texte illisible
    /// - `AudioError::MalformedPcm` : nombre d'octets impair
    fn decode(&self, payload: &str) -> AudioResult<Vec<Sample>>;

    /// Retourne des informations sur le codec
    fn codec_info(&self) -> String {
        "Codec audio".to_string()
    }
}

/// Contexte de sortie ouvert sur un périphérique (haut-parleurs)
///
/// Le contexte expose une horloge monotone (en secondes, temps du
/// périphérique) et accepte des buffers programmés à une date précise.
pub trait OutputContext: Send {
    /// Temps courant du périphérique, en secondes
    fn current_time(&self) -> f64;

    /// Programme la lecture d'un buffer mono à `start_at` (temps périphérique)
    fn schedule(&mut self, samples: Vec<Sample>, start_at: f64) -> AudioResult<()>;

    /// Ferme le contexte et libère le périphérique
    fn close(&mut self) -> AudioResult<()>;

    /// Retourne des informations sur le périphérique de sortie
    fn device_info(&self) -> String {
        "Périphérique de sortie inconnu".to_string()
    }
}

/// Fabrique de contextes de sortie
///
/// Le contexte est créé paresseusement au premier chunk à jouer.
pub trait OutputDevice: Send + Sync {
    fn open(&self) -> AudioResult<Box<dyn OutputContext>>;
}
