//! Accumulation des chunks capturés avant envoi

use audio::AudioChunk;

/// Buffer ordonné de chunks audio
///
/// Les chunks sont possédés par le buffer de leur capture jusqu'à leur
/// fusion ; une fois fusionnés et envoyés, ils ne sont pas conservés.
#[derive(Debug)]
pub struct ChunkBuffer {
    chunks: Vec<AudioChunk>,
    total_bytes: usize,
    threshold: usize,
}

impl ChunkBuffer {
    /// Crée un buffer qui demande un envoi à partir de `threshold` octets
    pub fn new(threshold: usize) -> Self {
        Self { chunks: Vec::new(), total_bytes: 0, threshold }
    }

    /// Ajoute un chunk et indique si le seuil d'envoi est atteint
    pub fn push(&mut self, chunk: AudioChunk) -> bool {
        self.total_bytes += chunk.len();
        self.chunks.push(chunk);
        self.threshold_reached()
    }

    pub fn threshold_reached(&self) -> bool {
        self.total_bytes >= self.threshold
    }

    /// Fusionne les chunks dans l'ordre d'arrivée et vide le buffer
    ///
    /// Retourne `None` si le buffer est vide.
    pub fn take_merged(&mut self) -> Option<Vec<u8>> {
        if self.chunks.is_empty() {
            return None;
        }

        let merged = AudioChunk::concat(&self.chunks);
        self.clear();
        Some(merged)
    }

    /// Abandonne le contenu du buffer, retourne le nombre de chunks perdus
    pub fn clear(&mut self) -> usize {
        let dropped = self.chunks.len();
        self.chunks.clear();
        self.total_bytes = 0;
        dropped
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
