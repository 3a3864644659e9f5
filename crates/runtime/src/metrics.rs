//! Metrics collection and Prometheus export.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tts_core::{TtsError, TtsResult};

/// Metrics recorder for TTS operations.
///
/// Without an installed recorder every call is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct TtsMetrics;

impl TtsMetrics {
    /// Install the global Prometheus recorder and register metric descriptions.
    ///
    /// The returned handle renders the text exposition format for `/metrics`.
    pub fn install() -> TtsResult<PrometheusHandle> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| TtsError::internal(format!("metrics init failed: {e}")))?;
        Self::register_metrics();
        Ok(handle)
    }

    fn register_metrics() {
        describe_counter!("tts_requests_total", "Synthesis requests received, by mode");
        describe_counter!("tts_requests_failed", "Synthesis requests that failed, by error kind");
        describe_histogram!(
            "tts_synthesis_latency_ms",
            "Batch synthesis latency in milliseconds"
        );
        describe_gauge!("tts_active_streams", "Streaming responses currently open");
        describe_gauge!("tts_voices_loaded", "Voices loaded at startup");
    }

    /// Record a request; `mode` is `batch` or `stream`.
    pub fn request_received(&self, mode: &'static str) {
        counter!("tts_requests_total", "mode" => mode).increment(1);
    }

    /// Record a failed request by error kind.
    pub fn request_failed(&self, kind: &'static str) {
        counter!("tts_requests_failed", "kind" => kind).increment(1);
    }

    /// Record batch synthesis latency.
    pub fn record_synthesis_latency(&self, ms: f64) {
        histogram!("tts_synthesis_latency_ms").record(ms);
    }

    pub fn stream_opened(&self) {
        gauge!("tts_active_streams").increment(1.0);
    }

    pub fn stream_closed(&self) {
        gauge!("tts_active_streams").decrement(1.0);
    }

    /// Set the number of loaded voices.
    pub fn set_voices_loaded(&self, count: usize) {
        gauge!("tts_voices_loaded").set(count as f64);
    }
}
