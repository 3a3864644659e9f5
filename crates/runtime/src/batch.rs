//! Bounded executor for whole-utterance synthesis.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::debug;
use tts_core::{SynthesisParams, TtsError, TtsResult, VoiceModel};

use crate::wav::{apply_volume, encode_wav};

/// Runs batch syntheses on blocking threads, at most `workers` at a time.
///
/// Waiters are admitted in arrival order.
#[derive(Debug, Clone)]
pub struct BatchExecutor {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl BatchExecutor {
    /// Create an executor allowing `workers` concurrent syntheses (minimum 1).
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Configured concurrency.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Workers not currently busy.
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Synthesize `text` and return a complete WAV file.
    pub async fn synthesize(
        &self,
        model: Arc<dyn VoiceModel>,
        text: String,
        params: SynthesisParams,
    ) -> TtsResult<Vec<u8>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| TtsError::service_unavailable("synthesis executor closed"))?;

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let started = Instant::now();
            let mut samples = model.synthesize(&text, &params)?;
            apply_volume(&mut samples, params.volume);
            let wav = encode_wav(&samples, model.sample_rate())?;
            debug!(
                samples = samples.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Batch synthesis done"
            );
            Ok(wav)
        });

        match task.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(TtsError::synthesis("synthesis worker panicked")),
            Err(e) => Err(TtsError::internal(format!("synthesis task failed: {e}"))),
        }
    }
}
