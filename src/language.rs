use std::collections::BTreeMap;

use tracing::debug;

use crate::config::LanguageConfig;

/// Maps plain text to the language tag the analyzer expects.
#[derive(Clone, Debug)]
pub struct LanguageDetector {
    default_language: String,
    force_language: Option<String>,
    min_detect_chars: usize,
    map: BTreeMap<String, String>,
}

impl LanguageDetector {
    pub fn new(config: &LanguageConfig) -> Self {
        Self {
            default_language: config.default_language.clone(),
            force_language: config.force_language.clone(),
            min_detect_chars: config.min_detect_chars,
            map: config.map.clone(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Best effort. Short texts, failed detection and unmapped languages
    /// all fall back to the default tag.
    pub fn detect(&self, text: &str) -> String {
        if let Some(forced) = &self.force_language {
            return forced.clone();
        }
        let significant = text.chars().filter(|ch| !ch.is_whitespace()).count();
        if significant < self.min_detect_chars {
            return self.default_language.clone();
        }
        let Some(info) = whatlang::detect(text) else {
            debug!(chars = significant, "language detection gave no result");
            return self.default_language.clone();
        };
        let code = info.lang().code();
        match self.map.get(code) {
            Some(tag) => tag.clone(),
            None => {
                debug!(
                    code,
                    confidence = info.confidence(),
                    "unmapped language, using default"
                );
                self.default_language.clone()
            }
        }
    }
}

impl Default for LanguageDetector {
    fn default() -> Self {
        Self::new(&LanguageConfig::default())
    }
}
