//! Voice registry: discovers, loads and indexes voice models on disk.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{error, info, instrument, warn};
use tts_core::{VoiceConfigFile, VoiceLoader, VoiceMetadata, VoiceModel};

use crate::locale::parse_voice_key;

/// File extension of voice models.
pub const MODEL_EXTENSION: &str = "onnx";

/// A loaded voice and its metadata.
#[derive(Clone)]
pub struct VoiceEntry {
    /// Shared model handle.
    pub model: Arc<dyn VoiceModel>,
    /// Metadata derived at load time.
    pub metadata: VoiceMetadata,
}

impl std::fmt::Debug for VoiceEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceEntry")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Immutable index of loaded voices in load order.
///
/// Model and metadata live in one entry per key, so both views always cover
/// the same set of voices. Iteration follows the sorted model file names of
/// the scan, which differs from key order when one key prefixes another.
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    voices: Vec<VoiceEntry>,
    index: HashMap<String, usize>,
}

impl VoiceRegistry {
    /// Create an empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a registry from already loaded voices, keeping their order.
    ///
    /// A repeated key replaces the earlier entry in place.
    pub fn from_entries(entries: impl IntoIterator<Item = VoiceEntry>) -> Self {
        let mut registry = Self::default();
        for entry in entries {
            registry.insert(entry);
        }
        registry
    }

    fn insert(&mut self, entry: VoiceEntry) {
        match self.index.get(&entry.metadata.key) {
            Some(&slot) => self.voices[slot] = entry,
            None => {
                self.index.insert(entry.metadata.key.clone(), self.voices.len());
                self.voices.push(entry);
            }
        }
    }

    /// Scan `dir` for `<key>.onnx` models with a `<key>.onnx.json` sidecar and load them.
    ///
    /// A missing directory, a missing sidecar or a failing model never aborts
    /// the scan; the affected voices are logged and left out.
    #[instrument(skip(loader), fields(dir = %dir.display()))]
    pub fn load(dir: &Path, loader: &dyn VoiceLoader) -> Self {
        if !dir.is_dir() {
            warn!("Voices directory does not exist: {}", dir.display());
            return Self::empty();
        }

        let model_paths = match discover_models(dir) {
            Ok(paths) => paths,
            Err(e) => {
                warn!("Cannot read voices directory {}: {e}", dir.display());
                return Self::empty();
            }
        };

        let mut registry = Self::default();
        for model_path in model_paths {
            let Some(file_name) = model_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let config_path = model_path.with_file_name(format!("{file_name}.json"));
            if !config_path.is_file() {
                warn!("Missing config for {file_name}, skipping");
                continue;
            }

            let key = file_name
                .strip_suffix(&format!(".{MODEL_EXTENSION}"))
                .unwrap_or(file_name)
                .to_string();

            let config = VoiceConfigFile::read(&config_path).unwrap_or_else(|e| {
                warn!(voice = %key, "Unreadable voice config, using defaults: {e}");
                VoiceConfigFile::default()
            });

            match loader.load(&model_path, &config) {
                Ok(model) => {
                    let metadata = parse_voice_key(&key, config.sample_rate);
                    info!(
                        voice = %key,
                        language = %metadata.language_name,
                        sample_rate = metadata.sample_rate,
                        "Loaded voice"
                    );
                    registry.insert(VoiceEntry { model, metadata });
                }
                Err(e) => {
                    error!(voice = %key, "Failed to load voice: {e}");
                }
            }
        }

        registry
    }

    /// Number of loaded voices.
    pub fn len(&self) -> usize {
        self.voices.len()
    }

    /// Check if no voices are loaded.
    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Look up a voice by key.
    pub fn get(&self, key: &str) -> Option<&VoiceEntry> {
        self.index.get(key).map(|&slot| &self.voices[slot])
    }

    /// Check if a voice key is loaded.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Voice keys in iteration order.
    pub fn keys(&self) -> Vec<String> {
        self.voices.iter().map(|v| v.metadata.key.clone()).collect()
    }

    /// Iterate over voices in load order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &VoiceEntry)> {
        self.voices.iter().map(|v| (v.metadata.key.as_str(), v))
    }

    /// Metadata of every voice, in load order.
    pub fn metadata(&self) -> Vec<VoiceMetadata> {
        self.voices.iter().map(|v| v.metadata.clone()).collect()
    }

    /// Distinct language codes, sorted.
    pub fn language_codes(&self) -> Vec<String> {
        self.voices
            .iter()
            .map(|v| v.metadata.language.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Model files in `dir`, sorted by file name.
fn discover_models(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_model = path
            .extension()
            .is_some_and(|ext| ext == MODEL_EXTENSION);
        if is_model && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockLoader;
    use std::fs;
    use tts_core::{TtsError, TtsResult};

    fn write_voice(dir: &Path, key: &str, sidecar: Option<&str>) {
        fs::write(dir.join(format!("{key}.onnx")), b"model").unwrap();
        if let Some(json) = sidecar {
            fs::write(dir.join(format!("{key}.onnx.json")), json).unwrap();
        }
    }

    #[test]
    fn test_missing_directory_gives_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = VoiceRegistry::load(&dir.path().join("nope"), &MockLoader);
        assert!(registry.is_empty());
        assert!(registry.keys().is_empty());
    }

    #[test]
    fn test_load_skips_models_without_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "en_US-lessac-medium", Some("{}"));
        write_voice(dir.path(), "de_DE-thorsten-medium", Some(r#"{"audio":{"sample_rate":16000}}"#));
        write_voice(dir.path(), "fr_FR-siwis-low", None);
        fs::write(dir.path().join("README.txt"), "not a model").unwrap();

        let registry = VoiceRegistry::load(dir.path(), &MockLoader);

        assert_eq!(registry.len(), 2);
        assert_eq!(
            registry.keys(),
            vec!["de_DE-thorsten-medium", "en_US-lessac-medium"]
        );
        assert!(!registry.contains("fr_FR-siwis-low"));
        assert_eq!(registry.get("de_DE-thorsten-medium").unwrap().metadata.sample_rate, 16000);
        assert_eq!(registry.get("en_US-lessac-medium").unwrap().metadata.sample_rate, 22050);
    }

    #[test]
    fn test_malformed_sidecar_defaults_sample_rate() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "es_ES-davefx-medium", Some("{ broken"));

        let registry = VoiceRegistry::load(dir.path(), &MockLoader);
        let entry = registry.get("es_ES-davefx-medium").unwrap();
        assert_eq!(entry.metadata.sample_rate, 22050);
        assert_eq!(entry.metadata.language_name, "Spanish");
    }

    struct PickyLoader;

    impl VoiceLoader for PickyLoader {
        fn load(&self, model_path: &Path, config: &VoiceConfigFile) -> TtsResult<Arc<dyn VoiceModel>> {
            if model_path.to_string_lossy().contains("broken") {
                return Err(TtsError::internal("corrupt model"));
            }
            MockLoader.load(model_path, config)
        }
    }

    #[test]
    fn test_failing_model_does_not_abort_scan() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "aa_AA-broken-low", Some("{}"));
        write_voice(dir.path(), "en_US-lessac-medium", Some("{}"));
        write_voice(dir.path(), "ru_RU-irina-medium", Some("{}"));

        let registry = VoiceRegistry::load(dir.path(), &PickyLoader);
        assert_eq!(registry.keys(), vec!["en_US-lessac-medium", "ru_RU-irina-medium"]);
    }

    #[test]
    fn test_language_codes_sorted_and_distinct() {
        let dir = tempfile::tempdir().unwrap();
        for key in ["en_US-lessac-medium", "en_GB-alan-low", "de_DE-thorsten-medium"] {
            write_voice(dir.path(), key, Some("{}"));
        }
        let registry = VoiceRegistry::load(dir.path(), &MockLoader);
        assert_eq!(registry.language_codes(), vec!["de", "en"]);
        assert_eq!(registry.metadata().len(), 3);
    }

    #[test]
    fn test_iteration_follows_file_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "en_US", Some("{}"));
        write_voice(dir.path(), "en_US-lessac-medium", Some("{}"));

        let registry = VoiceRegistry::load(dir.path(), &MockLoader);
        // "en_US-lessac-medium.onnx" sorts before "en_US.onnx".
        assert_eq!(registry.keys(), vec!["en_US-lessac-medium", "en_US"]);
        let listed: Vec<_> = registry.iter().map(|(key, _)| key).collect();
        assert_eq!(listed, ["en_US-lessac-medium", "en_US"]);
    }

    #[test]
    fn test_from_entries_keeps_order_and_replaces_duplicates() {
        let entry = |key: &str, rate: u32| VoiceEntry {
            model: Arc::new(crate::mock::MockVoice::new(rate)),
            metadata: parse_voice_key(key, rate),
        };
        let registry = VoiceRegistry::from_entries([
            entry("ru_RU-irina-medium", 22050),
            entry("de_DE-thorsten-medium", 22050),
            entry("ru_RU-irina-medium", 16000),
        ]);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.keys(), vec!["ru_RU-irina-medium", "de_DE-thorsten-medium"]);
        assert_eq!(registry.get("ru_RU-irina-medium").unwrap().metadata.sample_rate, 16000);
    }

    #[test]
    fn test_sidecar_is_never_a_model() {
        let dir = tempfile::tempdir().unwrap();
        write_voice(dir.path(), "en_US-lessac-medium", Some("{}"));
        let paths = discover_models(dir.path()).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].ends_with("en_US-lessac-medium.onnx"));
    }
}
