//! Transcodage PCM16 ⇄ float ⇄ base64
//!
//! L'agent vocal distant échange de l'audio brut PCM 16 bits signé
//! little-endian, transporté en base64 dans des messages JSON.
//!
//! Le format est exact au bit près : pour une entrée PCM16,
//! `decode(encode(x))` restitue exactement les échantillons de `x`
//! (division par 32768, représentable sans perte en f32).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::{AudioCodec, AudioError, AudioResult, Sample};

/// Facteur de normalisation PCM16 → float
const PCM16_SCALE: f32 = 32768.0;

/// Codec PCM16 + base64, pur et sans état
#[derive(Clone, Copy, Debug, Default)]
pub struct Pcm16Codec;

impl Pcm16Codec {
    pub fn new() -> Self {
        Self
    }

    /// Interprète des octets little-endian comme des échantillons i16
    ///
    /// # Erreurs
    /// - `AudioError::MalformedPcm` si le nombre d'octets est impair
    pub fn bytes_to_pcm16(bytes: &[u8]) -> AudioResult<Vec<i16>> {
        if bytes.len() % 2 != 0 {
            return Err(AudioError::MalformedPcm { len: bytes.len() });
        }

        Ok(bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect())
    }

    /// Normalise un échantillon PCM16 dans [-1, 1)
    pub fn pcm16_to_float(sample: i16) -> Sample {
        sample as f32 / PCM16_SCALE
    }

    /// Convertit un échantillon float (capture) vers PCM16
    ///
    /// Les valeurs hors de [-1, 1] sont écrêtées.
    pub fn float_to_pcm16(sample: Sample) -> i16 {
        (sample * PCM16_SCALE).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
    }

    /// Convertit un échantillon u16 (format non signé de certains périphériques)
    pub fn u16_to_pcm16(sample: u16) -> i16 {
        (sample as i32 - 32768) as i16
    }
}

impl AudioCodec for Pcm16Codec {
    fn encode(&self, raw: &[u8]) -> String {
        BASE64.encode(raw)
    }

    fn decode(&self, payload: &str) -> AudioResult<Vec<Sample>> {
        let bytes = BASE64.decode(payload.trim())?;
        let samples = Self::bytes_to_pcm16(&bytes)?;

        Ok(samples.into_iter().map(Self::pcm16_to_float).collect())
    }

    fn codec_info(&self) -> String {
        "PCM16 LE mono / base64".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AudioChunk;

    #[test]
    fn test_round_trip_is_exact() {
        let samples: Vec<i16> = vec![i16::MIN, -12345, -1, 0, 1, 257, 12345, i16::MAX];
        let raw = AudioChunk::from_samples(&samples, 0);

        let codec = Pcm16Codec::new();
        let decoded = codec.decode(&codec.encode(raw.as_bytes())).unwrap();

        let restored: Vec<i16> = decoded.iter().map(|&s| (s * PCM16_SCALE) as i16).collect();
        assert_eq!(restored, samples);
    }

    #[test]
    fn test_decode_range() {
        let raw = AudioChunk::from_samples(&[i16::MIN, 0, i16::MAX], 0);
        let codec = Pcm16Codec::new();

        let decoded = codec.decode(&codec.encode(raw.as_bytes())).unwrap();
        assert_eq!(decoded[0], -1.0);
        assert_eq!(decoded[1], 0.0);
        assert!(decoded[2] < 1.0 && decoded[2] > 0.999);
    }

    #[test]
    fn test_malformed_payloads_are_rejected() {
        let codec = Pcm16Codec::new();

        assert!(matches!(codec.decode("pas du base64 !"), Err(AudioError::InvalidPayload(_))));

        // 3 octets : un échantillon incomplet
        let odd = codec.encode(&[1, 2, 3]);
        assert!(matches!(codec.decode(&odd), Err(AudioError::MalformedPcm { len: 3 })));
    }

    #[test]
    fn test_float_conversion_clamps() {
        assert_eq!(Pcm16Codec::float_to_pcm16(2.0), i16::MAX);
        assert_eq!(Pcm16Codec::float_to_pcm16(-2.0), i16::MIN);
        assert_eq!(Pcm16Codec::float_to_pcm16(0.0), 0);
        assert_eq!(Pcm16Codec::u16_to_pcm16(32768), 0);
        assert_eq!(Pcm16Codec::u16_to_pcm16(0), i16::MIN);
    }

    #[test]
    fn test_empty_payload() {
        let codec = Pcm16Codec::new();
        assert!(codec.decode(&codec.encode(&[])).unwrap().is_empty());
    }
}
