//! Sound asset resolution

use std::path::{Path, PathBuf};

use crate::config::VoiceConfig;
use crate::phrase::VoicePhrase;

/// Maps `(phrase, language)` to a recording on disk.
///
/// Files are laid out as `<root>/<Phrase>.<lang>.mp3`.
#[derive(Debug, Clone)]
pub struct SoundLibrary {
    root: PathBuf,
    default_language: String,
}

impl SoundLibrary {
    /// Create a library rooted at `root`
    pub fn new(root: impl Into<PathBuf>, default_language: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_language: default_language.into(),
        }
    }

    /// Create a library from the voice configuration
    pub fn from_config(config: &VoiceConfig) -> Self {
        Self::new(config.sounds_dir.clone(), config.default_language.clone())
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fallback language
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    /// Path for a phrase in a language, whether or not it exists
    pub fn path_for(&self, phrase: VoicePhrase, language: &str) -> PathBuf {
        self.root
            .join(format!("{}.{}.mp3", phrase.as_str(), language))
    }

    /// Existing recording for `phrase` in `language`, falling back to the
    /// default language. `None` when neither exists.
    pub fn resolve(&self, phrase: VoicePhrase, language: &str) -> Option<PathBuf> {
        let preferred = self.path_for(phrase, language);
        if preferred.is_file() {
            return Some(preferred);
        }

        let fallback = self.path_for(phrase, &self.default_language);
        if fallback.is_file() {
            tracing::debug!(
                phrase = %phrase,
                language = %language,
                fallback = %self.default_language,
                "No recording for language, using default"
            );
            return Some(fallback);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_prefers_guild_language() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("NewRoomCode.ru.mp3"), b"ru").unwrap();
        fs::write(dir.path().join("NewRoomCode.en.mp3"), b"en").unwrap();

        let library = SoundLibrary::new(dir.path(), "en");
        assert_eq!(
            library.resolve(VoicePhrase::NewRoomCode, "ru"),
            Some(dir.path().join("NewRoomCode.ru.mp3"))
        );
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("SeeYouLater.en.mp3"), b"en").unwrap();

        let library = SoundLibrary::new(dir.path(), "en");
        assert_eq!(
            library.resolve(VoicePhrase::SeeYouLater, "fr"),
            Some(dir.path().join("SeeYouLater.en.mp3"))
        );
    }

    #[test]
    fn test_resolve_missing() {
        let dir = tempfile::tempdir().unwrap();
        let library = SoundLibrary::new(dir.path(), "en");
        assert_eq!(library.resolve(VoicePhrase::WelcomeToLobby, "en"), None);
    }
}
