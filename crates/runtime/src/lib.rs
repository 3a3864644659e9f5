//! # runtime
//!
//! Runtime orchestration for the voice TTS service.
//!
//! This crate provides:
//! - Voice discovery and the immutable voice registry
//! - Voice resolution (explicit key, language hint, default, fallback)
//! - Voice backends: the `piper` CLI and a deterministic mock
//! - Bounded batch synthesis to WAV
//! - Streaming synthesis through an external transcoder
//! - Structured logging and metrics

pub mod batch;
pub mod locale;
pub mod logging;
pub mod metrics;
pub mod mock;
pub mod piper;
pub mod registry;
pub mod resolver;
pub mod transcode;
pub mod wav;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};
use tts_core::{AppConfig, SynthesisRequest, TtsResult, VoiceBackend, VoiceLoader, VoicesConfig};

pub use batch::BatchExecutor;
pub use metrics::TtsMetrics;
pub use mock::{MockLoader, MockVoice};
pub use piper::{PiperLoader, PiperVoice};
pub use registry::{VoiceEntry, VoiceRegistry};
pub use resolver::{ResolvedVoice, VoiceResolver};
pub use transcode::{StreamingPipeline, TranscodeStream};

/// Loader for the configured voice backend.
pub fn loader_for(config: &VoicesConfig) -> Box<dyn VoiceLoader> {
    match config.backend {
        VoiceBackend::Piper => Box::new(PiperLoader::new(&config.piper_bin)),
        VoiceBackend::Mock => Box::new(MockLoader),
    }
}

/// A finished batch synthesis.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    /// Key of the voice that produced the audio.
    pub voice: String,
    /// Complete WAV file.
    pub wav: Vec<u8>,
}

/// TTS runtime orchestrator.
///
/// Validates requests, resolves voices and dispatches to the batch executor
/// or the streaming pipeline.
#[derive(Debug, Clone)]
pub struct TtsRuntime {
    resolver: VoiceResolver,
    executor: BatchExecutor,
    pipeline: StreamingPipeline,
    max_text_length: usize,
    metrics: TtsMetrics,
}

impl TtsRuntime {
    /// Create a runtime over an already loaded registry.
    pub fn new(registry: Arc<VoiceRegistry>, config: &AppConfig) -> Self {
        TtsMetrics.set_voices_loaded(registry.len());
        Self {
            resolver: VoiceResolver::new(registry, config.voices.default_voice.clone()),
            executor: BatchExecutor::new(config.synthesis.workers),
            pipeline: StreamingPipeline::new(config.transcoder.clone()),
            max_text_length: config.synthesis.max_text_length,
            metrics: TtsMetrics,
        }
    }

    /// Scan the configured voices directory with the configured backend.
    pub fn load(config: &AppConfig) -> Self {
        info!(
            dir = %config.voices.dir.display(),
            backend = ?config.voices.backend,
            "Initializing TTS runtime"
        );
        let loader = loader_for(&config.voices);
        let registry = VoiceRegistry::load(&config.voices.dir, loader.as_ref());
        Self::new(Arc::new(registry), config)
    }

    /// Loaded voices.
    pub fn registry(&self) -> &VoiceRegistry {
        self.resolver.registry()
    }

    /// Voice resolver.
    pub fn resolver(&self) -> &VoiceResolver {
        &self.resolver
    }

    /// Batch executor.
    pub fn executor(&self) -> &BatchExecutor {
        &self.executor
    }

    /// Maximum accepted text length in characters.
    pub fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    /// Synthesize a whole utterance to WAV.
    #[instrument(skip_all, fields(chars = request.text.chars().count()))]
    pub async fn synthesize(&self, request: SynthesisRequest) -> TtsResult<SynthesizedAudio> {
        self.metrics.request_received("batch");
        let started = Instant::now();
        let result = self.run_batch(request).await;
        match &result {
            Ok(audio) => {
                let ms = started.elapsed().as_secs_f64() * 1000.0;
                self.metrics.record_synthesis_latency(ms);
                info!(voice = %audio.voice, bytes = audio.wav.len(), elapsed_ms = ms as u64, "Synthesized");
            }
            Err(e) => self.metrics.request_failed(e.kind()),
        }
        result
    }

    async fn run_batch(&self, request: SynthesisRequest) -> TtsResult<SynthesizedAudio> {
        request.validate(self.max_text_length)?;
        let voice = self
            .resolver
            .resolve(request.voice.as_deref(), request.language.as_deref())?;
        let wav = self
            .executor
            .synthesize(voice.model, request.text, request.params)
            .await?;
        Ok(SynthesizedAudio {
            voice: voice.key,
            wav,
        })
    }

    /// Start streaming synthesis; the stream yields transcoded bytes.
    pub fn synthesize_stream(&self, request: SynthesisRequest) -> TtsResult<TranscodeStream> {
        self.metrics.request_received("stream");
        let result = self.start_stream(request);
        if let Err(e) = &result {
            self.metrics.request_failed(e.kind());
        }
        result
    }

    fn start_stream(&self, request: SynthesisRequest) -> TtsResult<TranscodeStream> {
        request.validate(self.max_text_length)?;
        let voice = self
            .resolver
            .resolve(request.voice.as_deref(), request.language.as_deref())?;
        self.pipeline
            .start(&voice.key, voice.model, request.text, request.params)
    }
}
