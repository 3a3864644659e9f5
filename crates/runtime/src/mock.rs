//! Mock voice backend producing deterministic tones (no model runtime needed).

use std::f32::consts::PI;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;

use tts_core::{
    PcmSink, SynthesisParams, TtsError, TtsResult, VoiceConfigFile, VoiceLoader, VoiceModel,
};

/// Tone duration per character at `length_scale = 1.0`.
const MS_PER_CHAR: f32 = 20.0;

/// Peak amplitude of the generated tones.
const AMPLITUDE: f32 = 8000.0;

/// A voice that renders every character as a short sine tone.
///
/// Output length is proportional to the text length, which keeps tests
/// deterministic while exercising the same code paths as a real model.
#[derive(Debug, Clone)]
pub struct MockVoice {
    sample_rate: u32,
    num_speakers: u32,
}

impl MockVoice {
    /// Create a mock voice with the given sample rate.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            num_speakers: 1,
        }
    }

    /// Set the number of speakers.
    pub fn with_speakers(mut self, num_speakers: u32) -> Self {
        self.num_speakers = num_speakers;
        self
    }

    fn check_speaker(&self, params: &SynthesisParams) -> TtsResult<()> {
        match params.speaker_id {
            Some(id) if id >= self.num_speakers => Err(TtsError::synthesis(format!(
                "speaker {id} out of range (voice has {})",
                self.num_speakers
            ))),
            _ => Ok(()),
        }
    }

    fn render(&self, text: &str, params: &SynthesisParams) -> Vec<i16> {
        let scale = params.length_scale.unwrap_or(1.0).max(0.05);
        let per_char = ((MS_PER_CHAR * scale / 1000.0) * self.sample_rate as f32) as usize;
        let speaker_offset = params.speaker_id.unwrap_or(0) as f32 * 25.0;

        let mut samples = Vec::with_capacity(per_char * text.chars().count());
        for c in text.chars() {
            if c.is_whitespace() {
                samples.extend(std::iter::repeat_n(0i16, per_char));
                continue;
            }
            let freq = 180.0 + speaker_offset + (c as u32 % 40) as f32 * 12.0;
            for i in 0..per_char {
                let t = i as f32 / self.sample_rate as f32;
                samples.push((AMPLITUDE * (2.0 * PI * freq * t).sin()) as i16);
            }
        }
        samples
    }
}

impl VoiceModel for MockVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn num_speakers(&self) -> u32 {
        self.num_speakers
    }

    fn synthesize(&self, text: &str, params: &SynthesisParams) -> TtsResult<Vec<i16>> {
        self.check_speaker(params)?;
        Ok(self.render(text, params))
    }

    fn synthesize_stream(
        &self,
        text: &str,
        params: &SynthesisParams,
        sink: &mut PcmSink<'_>,
    ) -> TtsResult<()> {
        self.check_speaker(params)?;
        // One chunk per word, trailing whitespace included.
        for word in text.split_inclusive(char::is_whitespace) {
            let pcm = self.render(word, params);
            if pcm.is_empty() {
                continue;
            }
            if sink(pcm).is_break() {
                break;
            }
        }
        Ok(())
    }
}

/// Loader creating [`MockVoice`]s for every model file.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockLoader;

impl VoiceLoader for MockLoader {
    fn load(&self, model_path: &Path, config: &VoiceConfigFile) -> TtsResult<Arc<dyn VoiceModel>> {
        std::fs::metadata(model_path).map_err(|source| TtsError::ModelLoad {
            path: model_path.to_path_buf(),
            source,
        })?;
        Ok(Arc::new(
            MockVoice::new(config.sample_rate).with_speakers(config.num_speakers),
        ))
    }
}
