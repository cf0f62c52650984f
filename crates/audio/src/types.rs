//! Types de données pour le système audio
//!
//! Ce module définit les structures principales pour manipuler l'audio :
//! - AudioChunk : buffer brut PCM16 livré par un callback matériel
//! - Sample : échantillon normalisé utilisé pour la lecture

use std::time::Instant;

/// Type pour un échantillon audio décodé
///
/// - Valeurs entre -1.0 et +1.0
/// - 0.0 = silence
pub type Sample = f32;

/// Chunk d'audio capturé (PCM16 little-endian, mono)
///
/// Un chunk correspond à un appel du callback matériel. Il est immuable :
/// la fusion de plusieurs chunks produit un nouveau buffer, jamais une
/// modification en place.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    /// Octets PCM16 bruts, dans l'ordre de capture
    data: Vec<u8>,

    /// Moment de la capture (pour mesurer la latence d'envoi)
    captured_at: Instant,

    /// Numéro de séquence attribué par l'adaptateur de capture
    sequence_number: u64,
}

impl AudioChunk {
    /// Crée un nouveau chunk à partir d'octets PCM16
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioChunk;
    ///
    /// let chunk = AudioChunk::new(vec![0x01, 0x00, 0xff, 0x7f], 1);
    /// assert_eq!(chunk.len(), 4);
    /// ```
    pub fn new(data: Vec<u8>, sequence_number: u64) -> Self {
        Self {
            data,
            captured_at: Instant::now(),
            sequence_number,
        }
    }

    /// Crée un chunk à partir d'échantillons PCM16
    pub fn from_samples(samples: &[i16], sequence_number: u64) -> Self {
        let mut data = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            data.extend_from_slice(&sample.to_le_bytes());
        }
        Self::new(data, sequence_number)
    }

    /// Octets bruts du chunk
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Taille en octets
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Âge du chunk depuis sa capture
    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }

    /// Concatène des chunks dans l'ordre donné
    ///
    /// L'ordre d'arrivée doit être préservé octet pour octet : c'est
    /// l'invariant critique de la fusion avant envoi.
    pub fn concat(chunks: &[AudioChunk]) -> Vec<u8> {
        let total: usize = chunks.iter().map(AudioChunk::len).sum();
        let mut merged = Vec::with_capacity(total);
        for chunk in chunks {
            merged.extend_from_slice(&chunk.data);
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_creation() {
        let chunk = AudioChunk::new(vec![1, 2, 3, 4], 42);

        assert_eq!(chunk.as_bytes(), &[1, 2, 3, 4]);
        assert_eq!(chunk.sequence_number(), 42);
        assert!(chunk.age().as_millis() < 100);
    }

    #[test]
    fn test_from_samples_is_little_endian() {
        let chunk = AudioChunk::from_samples(&[1, -1, i16::MAX], 0);
        assert_eq!(chunk.as_bytes(), &[0x01, 0x00, 0xff, 0xff, 0xff, 0x7f]);
    }

    #[test]
    fn test_concat_preserves_order() {
        let chunks = vec![
            AudioChunk::new(vec![1, 2], 0),
            AudioChunk::new(vec![], 1),
            AudioChunk::new(vec![3], 2),
            AudioChunk::new(vec![4, 5, 6], 3),
        ];

        assert_eq!(AudioChunk::concat(&chunks), vec![1, 2, 3, 4, 5, 6]);
        assert!(AudioChunk::concat(&[]).is_empty());
    }
}
