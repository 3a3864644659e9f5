//! # tts-core
//!
//! Core types, traits, and error definitions for the voice TTS service.
//!
//! This crate provides the foundational abstractions used across all other crates
//! in the workspace, including:
//!
//! - Common data types (`VoiceMetadata`, `SynthesisParams`, `SynthesisRequest`)
//! - The `VoiceModel` / `VoiceLoader` seam to the neural model runtime
//! - Unified error handling via `TtsError`
//! - Configuration structures

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{
    AppConfig, LoggingConfig, MetricsConfig, ServerConfig, SynthesisConfig, TranscoderConfig,
    VoiceBackend, VoicesConfig,
};
pub use error::{TtsError, TtsResult};
pub use traits::{PcmSink, VoiceConfigFile, VoiceLoader, VoiceModel};
pub use types::{SynthesisParams, SynthesisRequest, VoiceMetadata};
