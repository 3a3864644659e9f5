//! PCM helpers and in-memory WAV encoding.

use std::io::{self, Cursor};

use hound::{SampleFormat, WavSpec, WavWriter};
use tts_core::{TtsError, TtsResult};

/// Scale samples by `volume`, saturating at the i16 range.
pub fn apply_volume(samples: &mut [i16], volume: f32) {
    if (volume - 1.0).abs() < f32::EPSILON {
        return;
    }
    for sample in samples.iter_mut() {
        let scaled = (*sample as f32 * volume).round();
        *sample = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
    }
}

/// Convert samples to raw PCM (16-bit LE).
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Encode mono 16-bit samples as a WAV file in memory.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> TtsResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    let mut writer = WavWriter::new(&mut cursor, spec)
        .map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?;

    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?;
    }

    writer
        .finalize()
        .map_err(|e| TtsError::Io(io::Error::other(e.to_string())))?;

    Ok(cursor.into_inner())
}
