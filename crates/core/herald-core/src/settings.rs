//! Per-guild speech settings

use serde::{Deserialize, Serialize};

/// Read-only view of a guild's speech configuration.
///
/// Owned by whatever stores guild settings; sessions only read through it.
pub trait SpeechSettings: Send + Sync {
    /// Whether the bot may join voice and speak in this guild
    fn bot_speech_enabled(&self) -> bool;

    /// Language code used to pick recordings, e.g. `"en"`
    fn language(&self) -> String;
}

/// Plain settings value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    /// Bot speech toggle
    #[serde(default = "default_bot_speech")]
    pub bot_speech: bool,
    /// Language code
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_bot_speech() -> bool {
    true
}

fn default_language() -> String {
    "en".to_string()
}

impl Default for GuildSettings {
    fn default() -> Self {
        Self {
            bot_speech: default_bot_speech(),
            language: default_language(),
        }
    }
}

impl GuildSettings {
    /// Settings with speech enabled in the given language
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            bot_speech: true,
            language: language.into(),
        }
    }

    /// Builder-style speech toggle
    pub fn with_bot_speech(mut self, enabled: bool) -> Self {
        self.bot_speech = enabled;
        self
    }
}

impl SpeechSettings for GuildSettings {
    fn bot_speech_enabled(&self) -> bool {
        self.bot_speech
    }

    fn language(&self) -> String {
        self.language.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: GuildSettings = serde_json::from_str(r#"{"language":"ru"}"#).unwrap();
        assert!(settings.bot_speech_enabled());
        assert_eq!(settings.language(), "ru");
    }

    #[test]
    fn test_builder() {
        let settings = GuildSettings::new("de").with_bot_speech(false);
        assert!(!settings.bot_speech_enabled());
        assert_eq!(settings.language(), "de");
    }
}
