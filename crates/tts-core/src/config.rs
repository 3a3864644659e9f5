//! Configuration structures for the TTS service.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{TtsError, TtsResult};

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Voice discovery settings.
    #[serde(default)]
    pub voices: VoicesConfig,

    /// Synthesis limits and worker pool.
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    /// Streaming transcoder settings.
    #[serde(default)]
    pub transcoder: TranscoderConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> TtsResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| TtsError::config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(raw: &str) -> TtsResult<Self> {
        toml::from_str(raw).map_err(|e| TtsError::config(e.to_string()))
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> TtsResult<()> {
        if self.synthesis.workers == 0 {
            return Err(TtsError::config("synthesis.workers must be at least 1"));
        }
        if self.synthesis.max_text_length == 0 {
            return Err(TtsError::config("synthesis.max_text_length must be at least 1"));
        }
        if self.transcoder.read_block_size == 0 {
            return Err(TtsError::config("transcoder.read_block_size must be at least 1"));
        }
        if self.transcoder.queue_capacity == 0 {
            return Err(TtsError::config("transcoder.queue_capacity must be at least 1"));
        }
        if self.transcoder.program.as_os_str().is_empty() {
            return Err(TtsError::config("transcoder.program must not be empty"));
        }
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address.
    #[serde(default = "default_server_host")]
    pub host: String,
    /// Server port.
    #[serde(default = "default_server_port")]
    pub port: u16,
    /// Request body size limit in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    10200
}

fn default_max_body_size() -> usize {
    1024 * 1024 // 1 MiB
}

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
            max_body_size: default_max_body_size(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Which voice runtime backs the loaded models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceBackend {
    /// Drive the `piper` command-line runtime.
    #[default]
    Piper,
    /// Deterministic tone generator (no model runtime needed).
    Mock,
}

impl std::str::FromStr for VoiceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "piper" => Ok(Self::Piper),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("unknown voice backend: {s}")),
        }
    }
}

/// Voice discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoicesConfig {
    /// Directory holding `<key>.onnx` + `<key>.onnx.json` pairs.
    #[serde(default = "default_voices_dir")]
    pub dir: PathBuf,
    /// Voice used when a request names neither voice nor language.
    #[serde(default = "default_voice")]
    pub default_voice: String,
    /// Voice runtime backend.
    #[serde(default)]
    pub backend: VoiceBackend,
    /// Path or name of the `piper` executable.
    #[serde(default = "default_piper_bin")]
    pub piper_bin: PathBuf,
}

fn default_voices_dir() -> PathBuf {
    PathBuf::from("/voices")
}

fn default_voice() -> String {
    "en_US-lessac-medium".to_string()
}

fn default_piper_bin() -> PathBuf {
    PathBuf::from("piper")
}

impl Default for VoicesConfig {
    fn default() -> Self {
        Self {
            dir: default_voices_dir(),
            default_voice: default_voice(),
            backend: VoiceBackend::default(),
            piper_bin: default_piper_bin(),
        }
    }
}

/// Synthesis limits and worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Maximum text length in characters.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
    /// Number of concurrent batch syntheses.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_max_text_length() -> usize {
    5000
}

fn default_workers() -> usize {
    4
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
            workers: default_workers(),
        }
    }
}

/// Placeholder substituted with the voice's sample rate in transcoder args.
pub const SAMPLE_RATE_PLACEHOLDER: &str = "{sample_rate}";

/// PCM to Opus/WebM transcoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscoderConfig {
    /// Transcoder executable.
    #[serde(default = "default_transcoder_program")]
    pub program: PathBuf,
    /// Arguments; `{sample_rate}` is replaced per voice.
    #[serde(default = "default_transcoder_args")]
    pub args: Vec<String>,
    /// Size of the blocks read from the transcoder's output.
    #[serde(default = "default_read_block_size")]
    pub read_block_size: usize,
    /// Capacity of the PCM hand-off queue, in chunks.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_transcoder_program() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_transcoder_args() -> Vec<String> {
    [
        "-hide_banner",
        "-loglevel",
        "error",
        "-f",
        "s16le",
        "-ar",
        SAMPLE_RATE_PLACEHOLDER,
        "-ac",
        "1",
        "-i",
        "-",
        "-c:a",
        "libopus",
        "-b:a",
        "64k",
        "-f",
        "webm",
        "-",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_read_block_size() -> usize {
    4096
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: default_transcoder_program(),
            args: default_transcoder_args(),
            read_block_size: default_read_block_size(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl TranscoderConfig {
    /// Arguments for a voice with the given sample rate.
    pub fn args_for(&self, sample_rate: u32) -> Vec<String> {
        let rate = sample_rate.to_string();
        self.args
            .iter()
            .map(|arg| arg.replace(SAMPLE_RATE_PLACEHOLDER, &rate))
            .collect()
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format (json or text).
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 10200);
        assert_eq!(config.voices.dir, PathBuf::from("/voices"));
        assert_eq!(config.voices.default_voice, "en_US-lessac-medium");
        assert_eq!(config.voices.backend, VoiceBackend::Piper);
        assert_eq!(config.synthesis.max_text_length, 5000);
        assert_eq!(config.synthesis.workers, 4);
        assert_eq!(config.transcoder.read_block_size, 4096);
        assert!(config.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_transcoder_args_substitute_sample_rate() {
        let config = TranscoderConfig::default();
        let args = config.args_for(16000);
        let pos = args.iter().position(|a| a == "-ar").unwrap();
        assert_eq!(args[pos + 1], "16000");
        assert!(args.iter().all(|a| !a.contains(SAMPLE_RATE_PLACEHOLDER)));
        assert!(args.windows(2).any(|w| w == ["-c:a", "libopus"]));
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [voices]
            dir = "/srv/voices"
            backend = "mock"

            [synthesis]
            workers = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.voices.dir, PathBuf::from("/srv/voices"));
        assert_eq!(config.voices.backend, VoiceBackend::Mock);
        assert_eq!(config.voices.default_voice, "en_US-lessac-medium");
        assert_eq!(config.synthesis.workers, 2);
        assert_eq!(config.synthesis.max_text_length, 5000);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            AppConfig::from_toml_str("[synthesis]\nworkers = \"many\""),
            Err(TtsError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = AppConfig::default();
        config.synthesis.workers = 0;
        assert!(matches!(config.validate(), Err(TtsError::Config(_))));
    }

    #[test]
    fn test_backend_parsing() {
        assert_eq!("Piper".parse::<VoiceBackend>().unwrap(), VoiceBackend::Piper);
        assert_eq!("mock".parse::<VoiceBackend>().unwrap(), VoiceBackend::Mock);
        assert!("onnx".parse::<VoiceBackend>().is_err());
    }
}
