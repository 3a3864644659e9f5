//! Streaming synthesis: PCM from a voice model piped through an external
//! transcoder (ffmpeg by default) and served as a byte stream.
//!
//! Three stages run concurrently:
//!
//! 1. a producer thread runs the model and pushes PCM chunks into a bounded queue,
//! 2. a feeder task drains the queue into the transcoder's stdin,
//! 3. [`TranscodeStream`] yields the transcoder's stdout in fixed-size blocks.
//!
//! Dropping the stream at any point kills the transcoder and unwinds the
//! other two stages.

use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use bytes::Bytes;
use futures::Stream;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};
use tts_core::{SynthesisParams, TranscoderConfig, TtsError, TtsResult, VoiceModel};

use crate::metrics::TtsMetrics;
use crate::wav::{apply_volume, pcm_to_bytes};

/// Message passed from the producer thread to the feeder task.
#[derive(Debug)]
pub enum Handoff {
    /// Raw 16-bit LE PCM.
    Chunk(Bytes),
    /// Producer is done; synthesis may have ended early on error.
    End,
}

/// Spawns transcoders and wires them to voice models.
#[derive(Debug, Clone)]
pub struct StreamingPipeline {
    config: TranscoderConfig,
}

impl StreamingPipeline {
    /// Create a pipeline using the given transcoder settings.
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    /// Start streaming synthesis of `text`.
    ///
    /// Must be called within a Tokio runtime. Fails only if the transcoder or
    /// the producer thread cannot be started; synthesis errors after that
    /// point end the stream early and are logged.
    pub fn start(
        &self,
        voice_key: &str,
        model: Arc<dyn VoiceModel>,
        text: String,
        params: SynthesisParams,
    ) -> TtsResult<TranscodeStream> {
        let sample_rate = model.sample_rate();
        let mut child = Command::new(&self.config.program)
            .args(self.config.args_for(sample_rate))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TtsError::subprocess(format!(
                    "failed to spawn {}: {e}",
                    self.config.program.display()
                ))
            })?;

        let pid = child.id();
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TtsError::internal("transcoder stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TtsError::internal("transcoder stdout not captured"))?;

        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        if let Err(e) = spawn_producer(voice_key, model, text, params, tx) {
            let _ = child.start_kill();
            tokio::spawn(async move {
                let _ = child.wait().await;
            });
            return Err(e);
        }
        let feeder = tokio::spawn(feed_transcoder(rx, stdin, voice_key.to_string()));

        info!(voice = %voice_key, pid, sample_rate, "Streaming synthesis started");
        TtsMetrics.stream_opened();

        Ok(TranscodeStream {
            output: ReaderStream::with_capacity(stdout, self.config.read_block_size.max(1)),
            processes: Some(Processes { child, feeder }),
            finishing: None,
            done: false,
            pid,
            voice: voice_key.to_string(),
        })
    }
}

fn spawn_producer(
    voice_key: &str,
    model: Arc<dyn VoiceModel>,
    text: String,
    params: SynthesisParams,
    tx: mpsc::Sender<Handoff>,
) -> TtsResult<()> {
    let voice = voice_key.to_string();
    std::thread::Builder::new()
        .name(format!("synth-{voice_key}"))
        .spawn(move || {
            let volume = params.volume;
            let result = model.synthesize_stream(&text, &params, &mut |mut pcm| {
                apply_volume(&mut pcm, volume);
                let chunk = Bytes::from(pcm_to_bytes(&pcm));
                match tx.blocking_send(Handoff::Chunk(chunk)) {
                    Ok(()) => std::ops::ControlFlow::Continue(()),
                    // Consumer is gone.
                    Err(_) => std::ops::ControlFlow::Break(()),
                }
            });
            if let Err(e) = result {
                error!(voice = %voice, "Streaming synthesis failed: {e}");
            }
            let _ = tx.blocking_send(Handoff::End);
        })
        .map(drop)
        .map_err(|e| TtsError::internal(format!("cannot start synthesis thread: {e}")))
}

async fn feed_transcoder(mut rx: mpsc::Receiver<Handoff>, mut stdin: ChildStdin, voice: String) {
    let mut completed = false;
    while let Some(msg) = rx.recv().await {
        match msg {
            Handoff::Chunk(chunk) => {
                if let Err(e) = stdin.write_all(&chunk).await {
                    warn!(voice = %voice, "Transcoder stdin write failed: {e}");
                    return;
                }
            }
            Handoff::End => {
                completed = true;
                break;
            }
        }
    }
    if !completed {
        debug!(voice = %voice, "Producer stopped without finishing");
    }
    if let Err(e) = stdin.shutdown().await {
        debug!(voice = %voice, "Transcoder stdin close failed: {e}");
    }
}

/// The transcoder process and the task feeding it.
struct Processes {
    child: Child,
    feeder: JoinHandle<()>,
}

impl Processes {
    /// Normal end of output: let the feeder finish, then reap the transcoder.
    async fn finish(mut self, voice: String) {
        if let Err(e) = self.feeder.await {
            debug!(voice = %voice, "Feeder task ended abnormally: {e}");
        }
        if matches!(self.child.try_wait(), Ok(None)) {
            if let Err(e) = self.child.start_kill() {
                if e.kind() != io::ErrorKind::InvalidInput {
                    warn!(voice = %voice, "Cannot kill transcoder: {e}");
                }
            }
        }
        match self.child.wait().await {
            Ok(status) => debug!(voice = %voice, %status, "Transcoder exited"),
            Err(e) => warn!(voice = %voice, "Cannot reap transcoder: {e}"),
        }
    }

    /// Early drop: kill first so a blocked feeder or producer cannot wedge.
    fn abort(mut self, voice: String) {
        let _ = self.child.start_kill();
        self.feeder.abort();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = self.child.wait().await;
                    debug!(voice = %voice, "Transcoder reaped after client disconnect");
                });
            }
            Err(_) => debug!(voice = %voice, "No runtime to reap transcoder"),
        }
    }
}

/// Transcoded audio as a stream of byte blocks.
pub struct TranscodeStream {
    output: ReaderStream<ChildStdout>,
    processes: Option<Processes>,
    finishing: Option<BoxFuture<'static, ()>>,
    done: bool,
    pid: Option<u32>,
    voice: String,
}

impl TranscodeStream {
    /// OS process id of the transcoder.
    pub fn transcoder_pid(&self) -> Option<u32> {
        self.pid
    }

    /// Key of the voice being streamed.
    pub fn voice(&self) -> &str {
        &self.voice
    }
}

impl std::fmt::Debug for TranscodeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeStream")
            .field("voice", &self.voice)
            .field("pid", &self.pid)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl Stream for TranscodeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(finishing) = this.finishing.as_mut() {
                ready!(finishing.as_mut().poll(cx));
                this.finishing = None;
                this.done = true;
                debug!(voice = %this.voice, "Streaming synthesis finished");
            }
            if this.done {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.output).poll_next(cx)) {
                Some(Ok(block)) => return Poll::Ready(Some(Ok(block))),
                Some(Err(e)) => {
                    warn!(voice = %this.voice, "Transcoder read failed: {e}");
                    return Poll::Ready(Some(Err(e)));
                }
                None => match this.processes.take() {
                    Some(processes) => {
                        this.finishing = Some(Box::pin(processes.finish(this.voice.clone())));
                    }
                    None => this.done = true,
                },
            }
        }
    }
}

impl Drop for TranscodeStream {
    fn drop(&mut self) {
        if let Some(processes) = self.processes.take() {
            processes.abort(self.voice.clone());
        }
        TtsMetrics.stream_closed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockVoice;
    use futures::StreamExt;
    use std::path::PathBuf;
    use std::time::Duration;

    fn pipeline(program: &str, args: &[&str]) -> StreamingPipeline {
        StreamingPipeline::new(TranscoderConfig {
            program: PathBuf::from(program),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..TranscoderConfig::default()
        })
    }

    async fn collect(mut stream: TranscodeStream) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(block) = stream.next().await {
            out.extend_from_slice(&block.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_passthrough_transcoder_gets_scaled_pcm() {
        let voice = MockVoice::new(22050);
        let params = SynthesisParams::default().with_volume(0.5);
        let text = "stream me please";

        let stream = pipeline("cat", &[])
            .start("en_US-test-low", Arc::new(voice.clone()), text.into(), params)
            .unwrap();
        assert!(stream.transcoder_pid().is_some());
        let out = collect(stream).await;

        let mut expected = Vec::new();
        voice
            .synthesize_stream(text, &params, &mut |mut pcm| {
                apply_volume(&mut pcm, 0.5);
                expected.extend(pcm_to_bytes(&pcm));
                std::ops::ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(out, expected);
    }

    #[tokio::test]
    async fn test_sample_rate_reaches_transcoder_args() {
        let stream = pipeline("sh", &["-c", "cat >/dev/null; echo rate={sample_rate}"])
            .start(
                "de_DE-test-low",
                Arc::new(MockVoice::new(16000)),
                "hallo".into(),
                SynthesisParams::default(),
            )
            .unwrap();
        let out = collect(stream).await;
        assert_eq!(String::from_utf8(out).unwrap(), "rate=16000\n");
    }

    #[tokio::test]
    async fn test_transcoder_exiting_early_ends_stream() {
        let stream = pipeline("true", &[])
            .start(
                "en_US-test-low",
                Arc::new(MockVoice::new(22050)),
                "some words here".into(),
                SynthesisParams::default(),
            )
            .unwrap();
        let out = tokio::time::timeout(Duration::from_secs(10), collect(stream))
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    /// Emits one chunk of 100 samples, then fails or panics.
    struct BreaksAfterOneChunk {
        panics: bool,
    }

    impl VoiceModel for BreaksAfterOneChunk {
        fn sample_rate(&self) -> u32 {
            22050
        }

        fn synthesize(&self, _text: &str, _params: &SynthesisParams) -> TtsResult<Vec<i16>> {
            Err(TtsError::synthesis("batch not supported"))
        }

        fn synthesize_stream(
            &self,
            _text: &str,
            _params: &SynthesisParams,
            sink: &mut tts_core::PcmSink<'_>,
        ) -> TtsResult<()> {
            let _ = sink(vec![1000; 100]);
            if self.panics {
                panic!("model exploded mid-stream");
            }
            Err(TtsError::synthesis("model failed mid-stream"))
        }
    }

    #[tokio::test]
    async fn test_producer_failure_ends_stream_with_partial_audio() {
        for panics in [false, true] {
            let stream = pipeline("cat", &[])
                .start(
                    "en_US-test-low",
                    Arc::new(BreaksAfterOneChunk { panics }),
                    "doomed".into(),
                    SynthesisParams::default(),
                )
                .unwrap();
            let out = tokio::time::timeout(Duration::from_secs(10), collect(stream))
                .await
                .unwrap();
            assert_eq!(out, pcm_to_bytes(&[1000; 100]), "panics={panics}");
        }
    }

    #[tokio::test]
    async fn test_missing_transcoder_is_subprocess_error() {
        let err = pipeline("/nonexistent/transcoder", &[])
            .start(
                "en_US-test-low",
                Arc::new(MockVoice::new(22050)),
                "hello".into(),
                SynthesisParams::default(),
            )
            .unwrap_err();
        assert!(matches!(err, TtsError::Subprocess(_)));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_stream_kills_transcoder() {
        let text = "long ".repeat(2000);
        let mut stream = pipeline("cat", &[])
            .start(
                "en_US-test-low",
                Arc::new(MockVoice::new(22050)),
                text,
                SynthesisParams::default(),
            )
            .unwrap();
        let pid = stream.transcoder_pid().unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert!(!first.is_empty());
        drop(stream);

        let proc_path = PathBuf::from(format!("/proc/{pid}"));
        let mut gone = false;
        for _ in 0..100 {
            if !proc_path.exists() {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "transcoder {pid} still running");
    }
}
