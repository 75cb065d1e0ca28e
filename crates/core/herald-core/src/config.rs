//! Configuration management and environment variable loading

use crate::{HeraldError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Environment variable naming the sound asset directory
pub const ENV_SOUNDS_DIR: &str = "HERALD_SOUNDS_DIR";
/// Environment variable naming the fallback language
pub const ENV_DEFAULT_LANGUAGE: &str = "HERALD_DEFAULT_LANGUAGE";
/// Environment variable for the encoder bitrate in kbps
pub const ENV_BITRATE_KBPS: &str = "HERALD_BITRATE_KBPS";
/// Environment variable for the encoder volume (0-256 scale)
pub const ENV_VOLUME: &str = "HERALD_VOLUME";
/// Environment variable toggling bot speech for new guild sessions
pub const ENV_BOT_SPEECH: &str = "HERALD_BOT_SPEECH";
/// Environment variable holding the Discord bot token
pub const ENV_DISCORD_TOKEN: &str = "DISCORD_TOKEN";

/// Load environment variables from .env file
///
/// A missing file is not an error; system environment variables are used
/// as-is in that case.
///
/// # Example
///
/// ```no_run
/// use herald_core::load_env;
///
/// load_env().ok();
/// let token = std::env::var("DISCORD_TOKEN").unwrap_or_default();
/// ```
pub fn load_env() -> Result<()> {
    match dotenvy::dotenv() {
        Ok(path) => {
            tracing::info!("Loaded environment from: {}", path.display());
            Ok(())
        }
        Err(dotenvy::Error::LineParse(line, pos)) => Err(HeraldError::config(format!(
            "Failed to parse .env file at line {}, position {}",
            line, pos
        ))),
        Err(dotenvy::Error::Io(_)) => {
            tracing::warn!("No .env file found - using system environment variables only");
            Ok(())
        }
        Err(e) => Err(HeraldError::config(format!(
            "Failed to load .env file: {}",
            e
        ))),
    }
}

/// Get required environment variable
pub fn get_required_env(key: &str) -> Result<String> {
    env::var(key).map_err(|_| {
        HeraldError::config(format!(
            "Required environment variable '{}' is not set. \
             Check your .env file or system environment.",
            key
        ))
    })
}

/// Get optional environment variable with default
pub fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get environment variable as boolean
pub fn get_env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| match v.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

/// Get environment variable as integer
pub fn get_env_int<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

/// Options handed to the audio encoder for every phrase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeOptions {
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
    /// Volume on a 0-256 scale, 256 being unity gain
    pub volume: u32,
    /// Emit raw frames instead of a container
    pub raw_output: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            bitrate_kbps: 128,
            volume: 220,
            raw_output: true,
        }
    }
}

impl EncodeOptions {
    /// Volume as a linear gain multiplier
    pub fn gain(&self) -> f32 {
        self.volume as f32 / 256.0
    }

    /// Bitrate in bits per second
    pub fn bitrate_bps(&self) -> i32 {
        (self.bitrate_kbps as i32).saturating_mul(1000)
    }
}

/// Process-wide voice configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// Directory holding `<Phrase>.<lang>.mp3` files
    pub sounds_dir: PathBuf,
    /// Language used when a guild's language has no recording
    pub default_language: String,
    /// Whether new guild sessions may speak
    #[serde(default = "default_bot_speech")]
    pub bot_speech: bool,
    /// Encoder options
    #[serde(default)]
    pub encoding: EncodeOptions,
}

fn default_bot_speech() -> bool {
    true
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            sounds_dir: PathBuf::from("sounds"),
            default_language: "en".to_string(),
            bot_speech: default_bot_speech(),
            encoding: EncodeOptions::default(),
        }
    }
}

impl VoiceConfig {
    /// Build the configuration from `HERALD_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            sounds_dir: PathBuf::from(get_env_or(
                ENV_SOUNDS_DIR,
                &defaults.sounds_dir.to_string_lossy(),
            )),
            default_language: get_env_or(ENV_DEFAULT_LANGUAGE, &defaults.default_language),
            bot_speech: get_env_bool(ENV_BOT_SPEECH, defaults.bot_speech),
            encoding: EncodeOptions {
                bitrate_kbps: get_env_int(ENV_BITRATE_KBPS, defaults.encoding.bitrate_kbps),
                volume: get_env_int(ENV_VOLUME, defaults.encoding.volume),
                raw_output: defaults.encoding.raw_output,
            },
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.default_language.trim().is_empty() {
            return Err(HeraldError::config("default_language must not be empty"));
        }
        if self.encoding.bitrate_kbps == 0 || self.encoding.bitrate_kbps > 512 {
            return Err(HeraldError::config(format!(
                "bitrate_kbps must be within 1..=512, got {}",
                self.encoding.bitrate_kbps
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoding() {
        let opts = EncodeOptions::default();
        assert_eq!(opts.bitrate_kbps, 128);
        assert_eq!(opts.volume, 220);
        assert!(opts.raw_output);
        assert_eq!(opts.bitrate_bps(), 128_000);
        assert!((opts.gain() - 0.859375).abs() < f32::EPSILON);
    }

    #[test]
    fn test_env_helpers_fall_back() {
        assert_eq!(get_env_or("HERALD_TEST_UNSET_STRING", "x"), "x");
        assert!(get_env_bool("HERALD_TEST_UNSET_BOOL", true));
        assert_eq!(get_env_int("HERALD_TEST_UNSET_INT", 7u32), 7);
        assert!(get_required_env("HERALD_TEST_UNSET_REQUIRED").is_err());
    }

    #[test]
    fn test_env_bool_parsing() {
        env::set_var("HERALD_TEST_BOOL_OFF", "off");
        assert!(!get_env_bool("HERALD_TEST_BOOL_OFF", true));
        env::set_var("HERALD_TEST_BOOL_GARBAGE", "maybe");
        assert!(get_env_bool("HERALD_TEST_BOOL_GARBAGE", true));
    }

    #[test]
    fn test_from_env_reads_bot_speech() {
        env::set_var(ENV_BOT_SPEECH, "off");
        let config = VoiceConfig::from_env();
        env::remove_var(ENV_BOT_SPEECH);
        assert!(!config.bot_speech);
    }

    #[test]
    fn test_validate() {
        assert!(VoiceConfig::default().validate().is_ok());

        let mut config = VoiceConfig::default();
        config.encoding.bitrate_kbps = 0;
        assert!(config.validate().is_err());

        let mut config = VoiceConfig::default();
        config.default_language = " ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_without_encoding() {
        let config: VoiceConfig =
            serde_json::from_str(r#"{"sounds_dir":"/srv/sounds","default_language":"ru"}"#)
                .unwrap();
        assert_eq!(config.default_language, "ru");
        assert!(config.bot_speech);
        assert_eq!(config.encoding, EncodeOptions::default());
    }
}
