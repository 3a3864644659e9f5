//! # tts-server
//!
//! HTTP server for the voice TTS service.
//!
//! Provides:
//! - Health and voice listing endpoints
//! - Batch (WAV) and streaming (Opus/WebM) synthesis at `/api/tts`
//! - Service info and Prometheus metrics endpoints

pub mod error;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, TtsServer, create_router};
