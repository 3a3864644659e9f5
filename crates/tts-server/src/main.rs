//! Voice TTS HTTP Server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use runtime::TtsMetrics;
use runtime::logging::{LogFormat, init_logging};
use tts_core::{AppConfig, VoiceBackend};
use tts_server::TtsServer;

/// Voice TTS HTTP Server
#[derive(Debug, Parser)]
#[command(name = "tts-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address
    #[arg(long)]
    host: Option<String>,

    /// Listen port
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Directory of `<key>.onnx` models with `<key>.onnx.json` sidecars
    #[arg(long, env = "VOICES_DIR")]
    voices_dir: Option<PathBuf>,

    /// Voice used when a request names neither voice nor language
    #[arg(long, env = "DEFAULT_VOICE")]
    default_voice: Option<String>,

    /// Maximum text length in characters
    #[arg(long, env = "MAX_TEXT_LENGTH")]
    max_text_length: Option<usize>,

    /// Concurrent batch syntheses
    #[arg(long, env = "SYNTH_WORKERS")]
    synth_workers: Option<usize>,

    /// Voice runtime backend (piper or mock)
    #[arg(long, env = "TTS_BACKEND")]
    backend: Option<VoiceBackend>,

    /// piper executable
    #[arg(long, env = "PIPER_BIN")]
    piper_bin: Option<PathBuf>,

    /// ffmpeg executable used for streaming
    #[arg(long, env = "FFMPEG_BIN")]
    ffmpeg_bin: Option<PathBuf>,

    /// Log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long)]
    json_logs: bool,

    /// Disable metrics collection and the /metrics endpoint
    #[arg(long)]
    no_metrics: bool,
}

impl Args {
    /// Overlay command-line and environment settings on `config`.
    fn apply(self, config: &mut AppConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = self.voices_dir {
            config.voices.dir = dir;
        }
        if let Some(voice) = self.default_voice {
            config.voices.default_voice = voice;
        }
        if let Some(backend) = self.backend {
            config.voices.backend = backend;
        }
        if let Some(bin) = self.piper_bin {
            config.voices.piper_bin = bin;
        }
        if let Some(max) = self.max_text_length {
            config.synthesis.max_text_length = max;
        }
        if let Some(workers) = self.synth_workers {
            config.synthesis.workers = workers;
        }
        if let Some(bin) = self.ffmpeg_bin {
            config.transcoder.program = bin;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if self.json_logs {
            config.logging.format = "json".to_string();
        }
        if self.no_metrics {
            config.metrics.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AppConfig::from_toml_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::default(),
    };
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    let format: LogFormat = config
        .logging
        .format
        .parse()
        .map_err(anyhow::Error::msg)?;
    init_logging(&config.logging.level, format);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        voices_dir = %config.voices.dir.display(),
        default_voice = %config.voices.default_voice,
        workers = config.synthesis.workers,
        "Starting TTS server"
    );

    let metrics = if config.metrics.enabled {
        Some(TtsMetrics::install().context("Failed to install metrics recorder")?)
    } else {
        None
    };

    let server = TtsServer::new(config, metrics);
    server.run().await.context("Server failed")?;

    info!("Server shutdown complete");
    Ok(())
}
