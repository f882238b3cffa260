use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

// Define standard sample rates for clarity and consistency
pub const GEMINI_LIVE_API_PCM16_SAMPLE_RATE: f64 = 16000.0;
/// Clients stream and play 24 kHz mono PCM16.
pub const CLIENT_PCM16_SAMPLE_RATE: f64 = 24000.0;

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,                     // No cutoff frequency, pass all frequencies
        PolynomialDegree::Cubic, // Cubic interpolation for quality
        chunk_size,
        1, // 1 channel (mono)
    )?;
    Ok(resampler)
}

/// Resamples mono audio that arrives in pieces of any size.
///
/// Only whole resampler blocks are processed; leftover samples wait for the
/// next push so no padding ends up in the middle of the stream.
pub struct StreamResampler {
    resampler: FastFixedIn<f32>,
    ratio: f64,
    pending: Vec<f32>,
}

impl StreamResampler {
    pub fn new(
        in_sampling_rate: f64,
        out_sampling_rate: f64,
        chunk_size: usize,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            resampler: create_resampler(in_sampling_rate, out_sampling_rate, chunk_size)?,
            ratio: out_sampling_rate / in_sampling_rate,
            pending: Vec::with_capacity(chunk_size),
        })
    }

    /// Queues `samples` and returns whatever whole blocks produced.
    pub fn push(&mut self, samples: &[f32]) -> Vec<f32> {
        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            match self.resampler.process(&[&self.pending[..needed]], None) {
                Ok(frames) => {
                    if let Some(channel) = frames.first() {
                        out.extend_from_slice(channel);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Dropping audio block that failed to resample"),
            }
            self.pending.drain(..needed);
        }
        out
    }

    /// Resamples the leftover partial block. Used once, when the stream ends.
    pub fn flush(&mut self) -> Vec<f32> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let tail = std::mem::take(&mut self.pending);
        let expected = (tail.len() as f64 * self.ratio).ceil() as usize;
        match self.resampler.process_partial(Some(&[tail.as_slice()]), None) {
            Ok(frames) => {
                let mut channel = frames.into_iter().next().unwrap_or_default();
                // Drop the padding that completed the partial block.
                channel.truncate(expected);
                channel
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping audio tail that failed to resample");
                Vec::new()
            }
        }
    }
}

/// Interprets little-endian PCM16 bytes as f32 samples in [-1.0, 1.0).
/// A trailing odd byte is ignored.
pub fn pcm16_bytes_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]) as f32 / 32768.0)
        .collect()
}

/// Converts f32 samples to little-endian PCM16 bytes, clamping out-of-range values.
pub fn f32_to_pcm16_bytes(pcm32: &[f32]) -> Vec<u8> {
    pcm32
        .iter()
        .flat_map(|&sample| {
            let v = (sample * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            v.to_le_bytes()
        })
        .collect()
}

/// Decodes a base64 string representing PCM16 audio into a vector of f32 samples.
pub fn decode_f32_from_base64_i16(base64_fragment: &str) -> Vec<f32> {
    match base64::engine::general_purpose::STANDARD.decode(base64_fragment) {
        Ok(pcm16_bytes) => pcm16_bytes_to_f32(&pcm16_bytes),
        Err(_) => {
            tracing::error!("Failed to decode base64 fragment to f32");
            Vec::new()
        }
    }
}

/// Encodes a slice of f32 samples into a base64 string (converting to i16 PCM first).
pub fn encode_f32_to_base64_i16(pcm32: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(f32_to_pcm16_bytes(pcm32))
}

/// Base64 for raw PCM16 bytes that need no resampling.
pub fn encode_pcm16(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_pcm16(base64_fragment: &str) -> Option<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(base64_fragment)
        .ok()
}
