//! Voice backend driving the `piper` command-line runtime.
//!
//! Each synthesis call runs `piper --output-raw` with the text on stdin and
//! reads raw 16-bit mono PCM from stdout. The process is short-lived, so one
//! voice can serve any number of concurrent calls.

use std::ffi::OsString;
use std::io::{Read, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;

use tracing::{debug, warn};
use tts_core::{
    PcmSink, SynthesisParams, TtsError, TtsResult, VoiceConfigFile, VoiceLoader, VoiceModel,
};

/// Bytes read from piper's stdout per chunk.
const READ_BLOCK_BYTES: usize = 8192;

/// Loader for piper voices.
#[derive(Debug, Clone)]
pub struct PiperLoader {
    program: PathBuf,
    launcher_args: Vec<OsString>,
}

impl PiperLoader {
    /// Create a loader that runs `program` as the piper executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            launcher_args: Vec::new(),
        }
    }

    /// Arguments placed before piper's own, for wrappers such as `python3 -m piper`.
    pub fn with_launcher_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.launcher_args = args.into_iter().map(Into::into).collect();
        self
    }
}

impl VoiceLoader for PiperLoader {
    fn load(&self, model_path: &Path, config: &VoiceConfigFile) -> TtsResult<Arc<dyn VoiceModel>> {
        let meta = std::fs::metadata(model_path).map_err(|source| TtsError::ModelLoad {
            path: model_path.to_path_buf(),
            source,
        })?;
        if !meta.is_file() {
            return Err(TtsError::ModelLoad {
                path: model_path.to_path_buf(),
                source: std::io::Error::other("not a regular file"),
            });
        }

        let mut config_path = model_path.as_os_str().to_owned();
        config_path.push(".json");

        Ok(Arc::new(PiperVoice {
            program: self.program.clone(),
            launcher_args: self.launcher_args.clone(),
            model_path: model_path.to_path_buf(),
            config_path: PathBuf::from(config_path),
            sample_rate: config.sample_rate,
            num_speakers: config.num_speakers,
        }))
    }
}

/// A piper voice model on disk.
#[derive(Debug, Clone)]
pub struct PiperVoice {
    program: PathBuf,
    launcher_args: Vec<OsString>,
    model_path: PathBuf,
    config_path: PathBuf,
    sample_rate: u32,
    num_speakers: u32,
}

impl PiperVoice {
    /// Piper arguments for one synthesis call.
    fn piper_args(&self, params: &SynthesisParams) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--model".into(),
            self.model_path.clone().into(),
            "--config".into(),
            self.config_path.clone().into(),
            "--output-raw".into(),
        ];
        if let Some(speaker) = params.speaker_id {
            args.push("--speaker".into());
            args.push(speaker.to_string().into());
        }
        if let Some(v) = params.length_scale {
            args.push("--length_scale".into());
            args.push(v.to_string().into());
        }
        if let Some(v) = params.noise_scale {
            args.push("--noise_scale".into());
            args.push(v.to_string().into());
        }
        if let Some(v) = params.noise_w_scale {
            args.push("--noise_w".into());
            args.push(v.to_string().into());
        }
        args
    }

    fn spawn(&self, params: &SynthesisParams) -> TtsResult<Child> {
        Command::new(&self.program)
            .args(&self.launcher_args)
            .args(self.piper_args(params))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                TtsError::subprocess(format!("failed to spawn {}: {e}", self.program.display()))
            })
    }

    /// Run piper once, handing PCM blocks to `on_pcm` as they arrive.
    fn run(
        &self,
        text: &str,
        params: &SynthesisParams,
        on_pcm: &mut PcmSink<'_>,
    ) -> TtsResult<()> {
        if let Some(id) = params.speaker_id.filter(|&id| id >= self.num_speakers) {
            return Err(TtsError::synthesis(format!(
                "speaker {id} out of range (voice has {})",
                self.num_speakers
            )));
        }

        let mut child = self.spawn(params)?;
        let missing = || TtsError::internal("piper stdio not captured");
        let mut stdin = child.stdin.take().ok_or_else(missing)?;
        let mut stdout = child.stdout.take().ok_or_else(missing)?;
        let mut stderr = child.stderr.take().ok_or_else(missing)?;

        // Piper synthesizes one utterance per input line.
        let mut input = text.to_string();
        if !input.ends_with('\n') {
            input.push('\n');
        }

        let (read_result, stopped, diagnostics) = std::thread::scope(|s| {
            s.spawn(move || {
                if let Err(e) = stdin.write_all(input.as_bytes()) {
                    debug!("piper stdin closed early: {e}");
                }
            });
            let diagnostics = s.spawn(move || {
                let mut buf = String::new();
                let _ = stderr.read_to_string(&mut buf);
                buf
            });

            let mut stopped = false;
            let read_result = read_pcm_blocks(&mut stdout, |pcm| {
                let flow = on_pcm(pcm);
                stopped = flow.is_break();
                flow
            });
            if stopped || read_result.is_err() {
                // Unblocks the stderr reader and ends the process early.
                let _ = child.kill();
            }
            drop(stdout);
            (read_result, stopped, diagnostics.join().unwrap_or_default())
        });

        let status = child.wait()?;
        read_result?;

        if stopped {
            debug!(model = %self.model_path.display(), "piper stopped by consumer");
            return Ok(());
        }
        if !status.success() {
            let detail = diagnostics.trim();
            warn!(model = %self.model_path.display(), %status, "piper failed");
            return Err(TtsError::synthesis(format!("piper exited with {status}: {detail}")));
        }
        Ok(())
    }
}

/// Read `reader` to the end in sample-aligned blocks.
fn read_pcm_blocks<R: Read>(
    reader: &mut R,
    mut on_block: impl FnMut(Vec<i16>) -> ControlFlow<()>,
) -> std::io::Result<()> {
    let mut buf = vec![0u8; READ_BLOCK_BYTES];
    let mut carry: Option<u8> = None;

    loop {
        let offset = usize::from(carry.is_some());
        if let Some(byte) = carry.take() {
            buf[0] = byte;
        }
        let n = match reader.read(&mut buf[offset..]) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        let filled = offset + n;
        let aligned = filled & !1;
        if aligned < filled {
            carry = Some(buf[aligned]);
        }
        if aligned == 0 {
            continue;
        }

        let samples = buf[..aligned]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        if on_block(samples).is_break() {
            return Ok(());
        }
    }
}

impl VoiceModel for PiperVoice {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn num_speakers(&self) -> u32 {
        self.num_speakers
    }

    fn synthesize(&self, text: &str, params: &SynthesisParams) -> TtsResult<Vec<i16>> {
        let mut samples = Vec::new();
        self.run(text, params, &mut |pcm| {
            samples.extend(pcm);
            ControlFlow::Continue(())
        })?;
        Ok(samples)
    }

    fn synthesize_stream(
        &self,
        text: &str,
        params: &SynthesisParams,
        sink: &mut PcmSink<'_>,
    ) -> TtsResult<()> {
        self.run(text, params, sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn voice(script: &str, dir: &Path) -> PiperVoice {
        let model = dir.join("en_US-test-low.onnx");
        std::fs::write(&model, b"model").unwrap();
        let loaded = PiperLoader::new("/bin/sh")
            .with_launcher_args(["-c", script, "piper"])
            .load(&model, &VoiceConfigFile::default())
            .ok()
            .unwrap();
        assert_eq!(loaded.sample_rate(), 22050);

        PiperVoice {
            program: PathBuf::from("/bin/sh"),
            launcher_args: vec!["-c".into(), script.into(), "piper".into()],
            model_path: model.clone(),
            config_path: dir.join("en_US-test-low.onnx.json"),
            sample_rate: 22050,
            num_speakers: 1,
        }
    }

    #[test]
    fn test_piper_args() {
        let dir = tempfile::tempdir().unwrap();
        let v = voice("true", dir.path());
        let params = SynthesisParams {
            speaker_id: Some(0),
            length_scale: Some(1.5),
            noise_scale: None,
            noise_w_scale: Some(0.8),
            volume: 1.0,
        };
        let args: Vec<String> = v
            .piper_args(&params)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        assert_eq!(args[0], "--model");
        assert!(args[1].ends_with("en_US-test-low.onnx"));
        assert_eq!(args[2], "--config");
        assert!(args[3].ends_with("en_US-test-low.onnx.json"));
        assert!(args.contains(&"--output-raw".to_string()));
        assert!(args.windows(2).any(|w| w == ["--speaker", "0"]));
        assert!(args.windows(2).any(|w| w == ["--length_scale", "1.5"]));
        assert!(args.windows(2).any(|w| w == ["--noise_w", "0.8"]));
        assert!(!args.contains(&"--noise_scale".to_string()));
    }

    #[test]
    fn test_read_pcm_blocks_keeps_alignment() {
        // Odd-sized reads must not split a sample.
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let limit = buf.len().min(3);
                self.0.read(&mut buf[..limit])
            }
        }

        let bytes: Vec<u8> = [1i16, -2, 300, -400]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let mut reader = Trickle(Cursor::new(bytes));
        let mut samples = Vec::new();
        read_pcm_blocks(&mut reader, |pcm| {
            samples.extend(pcm);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(samples, vec![1, -2, 300, -400]);
    }

    #[cfg(unix)]
    #[test]
    fn test_synthesize_reads_raw_pcm() {
        let dir = tempfile::tempdir().unwrap();
        let v = voice(r"cat >/dev/null; printf '\001\000\002\000\003\000'", dir.path());
        let samples = v.synthesize("hello", &SynthesisParams::default()).unwrap();
        assert_eq!(samples, vec![1, 2, 3]);
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_synthesis_error() {
        let dir = tempfile::tempdir().unwrap();
        let v = voice(r#"cat >/dev/null; echo "bad args: $@" >&2; exit 3"#, dir.path());
        let params = SynthesisParams::default().with_speaker(0);
        match v.synthesize("hello", &params).unwrap_err() {
            TtsError::Synthesis(msg) => {
                assert!(msg.contains("bad args"), "{msg}");
                assert!(msg.contains("--speaker 0"), "{msg}");
            }
            other => panic!("expected Synthesis error, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_stream_stops_endless_output() {
        let dir = tempfile::tempdir().unwrap();
        let v = voice(r"while :; do printf '\001\000\001\000'; done", dir.path());
        let mut chunks = 0;
        v.synthesize_stream("hello", &SynthesisParams::default(), &mut |pcm| {
            assert!(!pcm.is_empty());
            chunks += 1;
            if chunks == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        assert_eq!(chunks, 3);
    }

    #[test]
    fn test_spawn_failure_is_subprocess_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = voice("true", dir.path());
        v.program = dir.path().join("no-such-piper");
        v.launcher_args.clear();
        assert!(matches!(
            v.synthesize("hello", &SynthesisParams::default()),
            Err(TtsError::Subprocess(_))
        ));
    }

    #[test]
    fn test_speaker_out_of_range_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let mut v = voice("true", dir.path());
        v.program = dir.path().join("no-such-piper");
        assert!(matches!(
            v.synthesize("hello", &SynthesisParams::default().with_speaker(4)),
            Err(TtsError::Synthesis(_))
        ));
    }
}
