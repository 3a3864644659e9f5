//! Locale table and voice key parsing.

use tts_core::VoiceMetadata;

/// Known locales: (locale, language code, display name).
const LANGUAGES: &[(&str, &str, &str)] = &[
    ("en_US", "en", "English (US)"),
    ("en_GB", "en", "English (UK)"),
    ("de_DE", "de", "German"),
    ("es_ES", "es", "Spanish"),
    ("es_MX", "es", "Spanish (Mexico)"),
    ("tr_TR", "tr", "Turkish"),
    ("ru_RU", "ru", "Russian"),
    ("fa_IR", "fa", "Persian"),
    ("fr_FR", "fr", "French"),
    ("it_IT", "it", "Italian"),
    ("pt_BR", "pt", "Portuguese (Brazil)"),
    ("zh_CN", "zh", "Chinese (Mandarin)"),
    ("ar_JO", "ar", "Arabic"),
];

/// Language code and display name for a locale.
///
/// Unknown locales map to their first two characters and keep the locale as name.
pub fn language_for_locale(locale: &str) -> (String, String) {
    match LANGUAGES.iter().find(|(l, _, _)| *l == locale) {
        Some((_, code, name)) => (code.to_string(), name.to_string()),
        None => {
            let code: String = locale.chars().take(2).collect();
            (code.to_lowercase(), locale.to_string())
        }
    }
}

/// Derive metadata from a `locale-speaker-quality` voice key.
pub fn parse_voice_key(key: &str, sample_rate: u32) -> VoiceMetadata {
    let mut parts = key.split('-');
    let locale = parts.next().unwrap_or(key).to_string();
    let speaker = parts.next().unwrap_or("default").to_string();
    let quality = parts.next().unwrap_or("unknown").to_string();
    let (language, language_name) = language_for_locale(&locale);

    VoiceMetadata {
        key: key.to_string(),
        locale,
        language,
        language_name,
        speaker,
        quality,
        sample_rate,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_key() {
        let meta = parse_voice_key("de_DE-thorsten-medium", 22050);
        assert_eq!(meta.key, "de_DE-thorsten-medium");
        assert_eq!(meta.locale, "de_DE");
        assert_eq!(meta.language, "de");
        assert_eq!(meta.language_name, "German");
        assert_eq!(meta.speaker, "thorsten");
        assert_eq!(meta.quality, "medium");
        assert_eq!(meta.sample_rate, 22050);
    }

    #[test]
    fn test_parse_missing_segments() {
        let meta = parse_voice_key("en_GB", 16000);
        assert_eq!(meta.locale, "en_GB");
        assert_eq!(meta.language_name, "English (UK)");
        assert_eq!(meta.speaker, "default");
        assert_eq!(meta.quality, "unknown");

        let meta = parse_voice_key("tr_TR-dfki", 22050);
        assert_eq!(meta.speaker, "dfki");
        assert_eq!(meta.quality, "unknown");
    }

    #[test]
    fn test_extra_segments_ignored() {
        let meta = parse_voice_key("en_US-libritts_r-medium-extra", 22050);
        assert_eq!(meta.speaker, "libritts_r");
        assert_eq!(meta.quality, "medium");
    }

    #[test]
    fn test_unknown_locale() {
        let meta = parse_voice_key("NL_be-nathalie-x_low", 22050);
        assert_eq!(meta.language, "nl");
        assert_eq!(meta.language_name, "NL_be");
    }
}
