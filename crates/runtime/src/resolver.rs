//! Picks the voice that answers a request.

use std::sync::Arc;

use tracing::debug;
use tts_core::{TtsError, TtsResult, VoiceMetadata, VoiceModel};

use crate::registry::{VoiceEntry, VoiceRegistry};

/// The voice chosen for a request.
#[derive(Clone)]
pub struct ResolvedVoice {
    /// Voice key, echoed in the `X-Voice` response header.
    pub key: String,
    /// Model handle.
    pub model: Arc<dyn VoiceModel>,
    /// Voice metadata.
    pub metadata: VoiceMetadata,
}

impl std::fmt::Debug for ResolvedVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedVoice").field("key", &self.key).finish_non_exhaustive()
    }
}

impl ResolvedVoice {
    fn from_entry(key: &str, entry: &VoiceEntry) -> Self {
        Self {
            key: key.to_string(),
            model: Arc::clone(&entry.model),
            metadata: entry.metadata.clone(),
        }
    }
}

/// Resolves explicit keys and language hints against the registry.
#[derive(Debug, Clone)]
pub struct VoiceResolver {
    registry: Arc<VoiceRegistry>,
    default_voice: String,
}

impl VoiceResolver {
    /// Create a resolver over `registry` falling back to `default_voice`.
    pub fn new(registry: Arc<VoiceRegistry>, default_voice: impl Into<String>) -> Self {
        Self {
            registry,
            default_voice: default_voice.into(),
        }
    }

    /// The registry being resolved against.
    pub fn registry(&self) -> &Arc<VoiceRegistry> {
        &self.registry
    }

    /// The configured default voice key.
    pub fn default_voice(&self) -> &str {
        &self.default_voice
    }

    /// Pick exactly one voice.
    ///
    /// Precedence: explicit key, then language hint, then the configured
    /// default, then the first voice in registry order. An explicit key that
    /// is not loaded fails without trying the later steps. Empty strings count
    /// as absent.
    pub fn resolve(&self, voice: Option<&str>, language: Option<&str>) -> TtsResult<ResolvedVoice> {
        if self.registry.is_empty() {
            return Err(TtsError::service_unavailable("No voices loaded on server"));
        }

        if let Some(key) = voice.filter(|k| !k.is_empty()) {
            return match self.registry.get(key) {
                Some(entry) => Ok(ResolvedVoice::from_entry(key, entry)),
                None => Err(TtsError::not_found(format!(
                    "Voice '{key}' not found. Available: {:?}",
                    self.registry.keys()
                ))),
            };
        }

        if let Some(hint) = language.filter(|l| !l.is_empty()) {
            let lang = hint.trim().to_lowercase();
            let found = self.registry.iter().find(|(_, entry)| {
                entry.metadata.language == lang || entry.metadata.locale.to_lowercase() == lang
            });
            return match found {
                Some((key, entry)) => {
                    debug!(language = %lang, voice = %key, "Resolved voice by language");
                    Ok(ResolvedVoice::from_entry(key, entry))
                }
                None => Err(TtsError::not_found(format!(
                    "No voice for language '{hint}'. Available: {}",
                    self.registry.language_codes().join(", ")
                ))),
            };
        }

        if let Some(entry) = self.registry.get(&self.default_voice) {
            return Ok(ResolvedVoice::from_entry(&self.default_voice, entry));
        }

        let (key, entry) = self
            .registry
            .iter()
            .next()
            .ok_or_else(|| TtsError::internal("registry emptied during resolution"))?;
        debug!(voice = %key, "Default voice not loaded, using first available");
        Ok(ResolvedVoice::from_entry(key, entry))
    }
}
