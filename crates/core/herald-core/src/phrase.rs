//! Pre-recorded announcement phrases

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::HeraldError;

/// Symbolic identifier of a short pre-recorded announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoicePhrase {
    /// Played when a new lobby is opened
    WelcomeToLobby,
    /// Played when the room code changes
    NewRoomCode,
    /// Played when the capture client connects
    CaptureConnected,
    /// Farewell; leaves the channel once nothing else is queued
    SeeYouLater,
}

impl VoicePhrase {
    /// All phrases in declaration order
    pub const ALL: [VoicePhrase; 4] = [
        VoicePhrase::WelcomeToLobby,
        VoicePhrase::NewRoomCode,
        VoicePhrase::CaptureConnected,
        VoicePhrase::SeeYouLater,
    ];

    /// Name used in sound file names
    pub fn as_str(&self) -> &'static str {
        match self {
            VoicePhrase::WelcomeToLobby => "WelcomeToLobby",
            VoicePhrase::NewRoomCode => "NewRoomCode",
            VoicePhrase::CaptureConnected => "CaptureConnected",
            VoicePhrase::SeeYouLater => "SeeYouLater",
        }
    }

    /// Whether finishing this phrase with an empty queue should leave the channel
    pub fn is_farewell(&self) -> bool {
        matches!(self, VoicePhrase::SeeYouLater)
    }
}

impl fmt::Display for VoicePhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoicePhrase {
    type Err = HeraldError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoicePhrase::ALL
            .iter()
            .copied()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| HeraldError::other(format!("Unknown phrase: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_case_insensitive() {
        assert_eq!(
            "seeyoulater".parse::<VoicePhrase>().unwrap(),
            VoicePhrase::SeeYouLater
        );
        assert_eq!(
            " NewRoomCode ".parse::<VoicePhrase>().unwrap(),
            VoicePhrase::NewRoomCode
        );
        assert!("Goodbye".parse::<VoicePhrase>().is_err());
    }

    #[test]
    fn test_only_see_you_later_is_farewell() {
        let farewells: Vec<_> = VoicePhrase::ALL.iter().filter(|p| p.is_farewell()).collect();
        assert_eq!(farewells, vec![&VoicePhrase::SeeYouLater]);
    }
}
