//! HTTP handlers.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info_span};
use tts_core::{SynthesisParams, SynthesisRequest, TtsError, VoiceMetadata};
use uuid::Uuid;

use crate::error::ApiError;
use crate::server::AppState;

/// Header carrying the key of the voice that answered.
pub const X_VOICE: HeaderName = HeaderName::from_static("x-voice");

/// `GET /health` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok`, or `no_voices` when the registry is empty.
    pub status: String,
    /// Number of loaded voices.
    pub voices_loaded: usize,
    /// Voice keys in registry order.
    pub available_voices: Vec<String>,
    /// Configured default voice key, loaded or not.
    pub default_voice: String,
}

/// `GET /info` response.
#[derive(Debug, Serialize, Deserialize)]
pub struct InfoResponse {
    /// Service name.
    pub name: String,
    /// Service version.
    pub version: String,
    /// Configured default voice key.
    pub default_voice: String,
    /// Maximum accepted text length in characters.
    pub max_text_length: usize,
    /// Concurrent batch syntheses.
    pub synth_workers: usize,
    /// Number of loaded voices.
    pub voices_loaded: usize,
    /// Seconds since the server started.
    pub uptime_secs: u64,
}

fn default_volume() -> f32 {
    1.0
}

/// JSON body of `POST /api/tts`.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsBody {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub speaker_id: Option<u32>,
    #[serde(default)]
    pub length_scale: Option<f32>,
    #[serde(default)]
    pub noise_scale: Option<f32>,
    #[serde(default)]
    pub noise_w_scale: Option<f32>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub stream: bool,
}

impl From<TtsBody> for SynthesisRequest {
    fn from(body: TtsBody) -> Self {
        SynthesisRequest {
            text: body.text,
            voice: body.voice,
            language: body.language,
            params: SynthesisParams {
                speaker_id: body.speaker_id,
                length_scale: body.length_scale,
                noise_scale: body.noise_scale,
                noise_w_scale: body.noise_w_scale,
                volume: body.volume,
            },
            stream: body.stream,
        }
    }
}

/// Query string of `GET /api/tts`. Speaker and noise controls are not exposed here.
#[derive(Debug, Clone, Deserialize)]
pub struct TtsQuery {
    pub text: String,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub length_scale: Option<f32>,
    #[serde(default = "default_volume")]
    pub volume: f32,
    #[serde(default)]
    pub stream: bool,
}

impl From<TtsQuery> for SynthesisRequest {
    fn from(query: TtsQuery) -> Self {
        SynthesisRequest {
            text: query.text,
            voice: query.voice,
            language: query.language,
            params: SynthesisParams {
                length_scale: query.length_scale,
                volume: query.volume,
                ..SynthesisParams::default()
            },
            stream: query.stream,
        }
    }
}

/// Health check handler.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let registry = state.runtime.registry();
    Json(HealthResponse {
        status: if registry.is_empty() { "no_voices" } else { "ok" }.to_string(),
        voices_loaded: registry.len(),
        available_voices: registry.keys(),
        default_voice: state.runtime.resolver().default_voice().to_string(),
    })
}

/// Voice listing handler.
pub async fn list_voices(State(state): State<Arc<AppState>>) -> Json<Vec<VoiceMetadata>> {
    Json(state.runtime.registry().metadata())
}

/// Service info handler.
pub async fn info(State(state): State<Arc<AppState>>) -> Json<InfoResponse> {
    Json(InfoResponse {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        default_voice: state.runtime.resolver().default_voice().to_string(),
        max_text_length: state.runtime.max_text_length(),
        synth_workers: state.runtime.executor().workers(),
        voices_loaded: state.runtime.registry().len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// Prometheus exposition, or 404 when metrics are disabled.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => ApiError::new(StatusCode::NOT_FOUND, "metrics are disabled").into_response(),
    }
}

/// Synthesis from a JSON body.
pub async fn tts_post(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TtsBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    synthesize(&state, body.into()).await
}

/// Synthesis from query parameters.
pub async fn tts_get(
    State(state): State<Arc<AppState>>,
    query: Result<Query<TtsQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query?;
    synthesize(&state, query.into()).await
}

async fn synthesize(state: &AppState, request: SynthesisRequest) -> Result<Response, ApiError> {
    let span = info_span!("tts", request_id = %Uuid::new_v4(), stream = request.stream);
    respond(state, request).instrument(span).await
}

async fn respond(state: &AppState, request: SynthesisRequest) -> Result<Response, ApiError> {
    if request.stream {
        let stream = state.runtime.synthesize_stream(request)?;
        let voice = stream.voice().to_string();
        return audio_response("audio/webm", &voice, None, Body::from_stream(stream));
    }

    let audio = state.runtime.synthesize(request).await?;
    audio_response(
        "audio/wav",
        &audio.voice,
        Some("inline; filename=\"tts.wav\""),
        Body::from(audio.wav),
    )
}

fn audio_response(
    content_type: &'static str,
    voice: &str,
    disposition: Option<&'static str>,
    body: Body,
) -> Result<Response, ApiError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(X_VOICE, voice);
    if let Some(disposition) = disposition {
        builder = builder.header(header::CONTENT_DISPOSITION, disposition);
    }
    builder
        .body(body)
        .map_err(|e| TtsError::internal(format!("cannot build response: {e}")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_defaults() {
        let body: TtsBody = serde_json::from_str(r#"{"text": "hello"}"#).unwrap();
        assert_eq!(body.volume, 1.0);
        assert!(!body.stream);
        assert!(body.voice.is_none());

        let request = SynthesisRequest::from(body);
        assert_eq!(request.params, SynthesisParams::default());
    }

    #[test]
    fn test_body_rejects_negative_speaker() {
        assert!(serde_json::from_str::<TtsBody>(r#"{"text": "hi", "speaker_id": -1}"#).is_err());
    }

    #[test]
    fn test_body_carries_all_controls() {
        let body: TtsBody = serde_json::from_str(
            r#"{"text": "hi", "voice": "de_DE-thorsten-medium", "speaker_id": 2,
                "length_scale": 1.2, "noise_scale": 0.5, "noise_w_scale": 0.7,
                "volume": 2.0, "stream": true}"#,
        )
        .unwrap();
        let request = SynthesisRequest::from(body);
        assert_eq!(request.voice.as_deref(), Some("de_DE-thorsten-medium"));
        assert_eq!(request.params.speaker_id, Some(2));
        assert_eq!(request.params.noise_w_scale, Some(0.7));
        assert_eq!(request.params.volume, 2.0);
        assert!(request.stream);
    }
}
