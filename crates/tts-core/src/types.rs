//! Core data types for the TTS service.

use serde::{Deserialize, Serialize};

use crate::error::{TtsError, TtsResult};

/// Lowest accepted volume multiplier.
pub const MIN_VOLUME: f32 = 0.0;

/// Highest accepted volume multiplier.
pub const MAX_VOLUME: f32 = 5.0;

/// Sample rate assumed when a voice's sidecar does not declare one.
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Display metadata derived once per loaded voice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceMetadata {
    /// Voice key, e.g. `en_US-lessac-medium`.
    pub key: String,
    /// Locale segment of the key, e.g. `en_US`.
    pub locale: String,
    /// Short language code, e.g. `en`.
    pub language: String,
    /// Human readable language name.
    pub language_name: String,
    /// Speaker segment of the key.
    pub speaker: String,
    /// Quality segment of the key.
    pub quality: String,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
}

/// Per-call synthesis controls handed to the voice model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynthesisParams {
    /// Speaker index for multi-speaker voices.
    pub speaker_id: Option<u32>,
    /// Speaking rate; below 1.0 is faster, above 1.0 slower.
    pub length_scale: Option<f32>,
    /// Phoneme noise.
    pub noise_scale: Option<f32>,
    /// Phoneme width noise.
    pub noise_w_scale: Option<f32>,
    /// Output volume multiplier, applied to the model's PCM.
    pub volume: f32,
}

impl Default for SynthesisParams {
    fn default() -> Self {
        Self {
            speaker_id: None,
            length_scale: None,
            noise_scale: None,
            noise_w_scale: None,
            volume: 1.0,
        }
    }
}

impl SynthesisParams {
    /// Set the speaker index.
    pub fn with_speaker(mut self, speaker_id: u32) -> Self {
        self.speaker_id = Some(speaker_id);
        self
    }

    /// Set the length scale.
    pub fn with_length_scale(mut self, length_scale: f32) -> Self {
        self.length_scale = Some(length_scale);
        self
    }

    /// Set the volume multiplier.
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }
}

/// A synthesis request as accepted by the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text to synthesize.
    pub text: String,
    /// Exact voice key.
    pub voice: Option<String>,
    /// Language code or locale hint.
    pub language: Option<String>,
    /// Model controls.
    pub params: SynthesisParams,
    /// Stream Opus/WebM instead of returning a WAV file.
    pub stream: bool,
}

impl SynthesisRequest {
    /// Create a new request with default settings.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: None,
            language: None,
            params: SynthesisParams::default(),
            stream: false,
        }
    }

    /// Set the explicit voice key.
    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    /// Set the language hint.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the synthesis parameters.
    pub fn with_params(mut self, params: SynthesisParams) -> Self {
        self.params = params;
        self
    }

    /// Request streaming output.
    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    /// Check text length and parameter ranges.
    ///
    /// Runs before any voice resolution, so invalid requests never touch a model.
    pub fn validate(&self, max_text_length: usize) -> TtsResult<()> {
        let chars = self.text.chars().count();
        if chars == 0 {
            return Err(TtsError::validation("text must not be empty"));
        }
        if chars > max_text_length {
            return Err(TtsError::validation(format!(
                "text too long ({chars} chars, max {max_text_length})"
            )));
        }

        let volume = self.params.volume;
        if !volume.is_finite() || !(MIN_VOLUME..=MAX_VOLUME).contains(&volume) {
            return Err(TtsError::validation(format!(
                "volume must be between {MIN_VOLUME} and {MAX_VOLUME}, got {volume}"
            )));
        }

        for (name, value) in [
            ("length_scale", self.params.length_scale),
            ("noise_scale", self.params.noise_scale),
            ("noise_w_scale", self.params.noise_w_scale),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(TtsError::validation(format!("{name} must be a finite number")));
            }
        }

        Ok(())
    }
}
