//! Trait definitions for the voice model runtime seam.

use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{TtsError, TtsResult};
use crate::types::{DEFAULT_SAMPLE_RATE, SynthesisParams};

/// Receiver for incrementally produced PCM.
///
/// Returning `ControlFlow::Break` asks the model to stop producing audio.
pub type PcmSink<'a> = dyn FnMut(Vec<i16>) -> ControlFlow<()> + 'a;

/// A loaded voice model.
///
/// Implementations are shared read-only between concurrent requests, so every
/// method takes `&self` and may be called from several threads at once.
/// Both synthesis methods block and are CPU-bound; callers must run them off
/// the async runtime's worker threads.
pub trait VoiceModel: Send + Sync {
    /// Sample rate of the produced PCM in Hz.
    fn sample_rate(&self) -> u32;

    /// Number of speakers for multi-speaker voices.
    fn num_speakers(&self) -> u32 {
        1
    }

    /// Synthesize the whole text into mono 16-bit PCM.
    ///
    /// `params.volume` is applied by the caller, not the model.
    fn synthesize(&self, text: &str, params: &SynthesisParams) -> TtsResult<Vec<i16>>;

    /// Synthesize incrementally, handing PCM chunks to `sink` in order.
    ///
    /// Returns `Ok(())` when the text is exhausted or the sink broke off.
    fn synthesize_stream(
        &self,
        text: &str,
        params: &SynthesisParams,
        sink: &mut PcmSink<'_>,
    ) -> TtsResult<()>;
}

/// Settings read from a voice's `.onnx.json` sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VoiceConfigFile {
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Number of speakers.
    pub num_speakers: u32,
}

impl Default for VoiceConfigFile {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            num_speakers: 1,
        }
    }
}

impl VoiceConfigFile {
    /// Read a sidecar file.
    ///
    /// Fails only when the file cannot be read or is not JSON; missing or
    /// malformed fields fall back to their defaults.
    pub fn read(path: &Path) -> TtsResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse sidecar JSON text.
    pub fn parse(raw: &str) -> TtsResult<Self> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| TtsError::Serialization(e.to_string()))?;

        let sample_rate = value
            .pointer("/audio/sample_rate")
            .and_then(Value::as_u64)
            .and_then(|rate| u32::try_from(rate).ok())
            .filter(|&rate| rate > 0)
            .unwrap_or(DEFAULT_SAMPLE_RATE);

        let num_speakers = value
            .get("num_speakers")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .filter(|&n| n > 0)
            .unwrap_or(1);

        Ok(Self {
            sample_rate,
            num_speakers,
        })
    }
}

/// Loads voice models from files on disk.
pub trait VoiceLoader: Send + Sync {
    /// Load the model at `model_path` described by `config`.
    fn load(&self, model_path: &Path, config: &VoiceConfigFile) -> TtsResult<Arc<dyn VoiceModel>>;
}
