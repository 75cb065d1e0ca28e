//! Guild directory snapshots and voice channel discovery

use serde::{Deserialize, Serialize};

/// Kind of a guild channel, as far as voice discovery cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Regular voice channel
    Voice,
    /// Anything else (text, stage, category, ...)
    Other,
}

/// A channel listed in a guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildChannel {
    /// Channel id
    pub id: u64,
    /// Display name
    pub name: String,
    /// Channel kind
    pub kind: ChannelKind,
}

/// A member's live voice state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberVoiceState {
    /// Member id
    pub user_id: u64,
    /// Voice channel the member occupies
    pub channel_id: u64,
}

/// Point-in-time view of a guild's channels and voice states
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSnapshot {
    /// Guild id
    pub id: u64,
    /// All channels of the guild
    pub channels: Vec<GuildChannel>,
    /// Voice states of members currently in voice
    pub voice_states: Vec<MemberVoiceState>,
}

impl GuildSnapshot {
    /// Empty snapshot for a guild
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Builder-style voice channel
    pub fn with_voice_channel(mut self, id: u64, name: impl Into<String>) -> Self {
        self.channels.push(GuildChannel {
            id,
            name: name.into(),
            kind: ChannelKind::Voice,
        });
        self
    }

    /// Builder-style voice state
    pub fn with_member_in(mut self, user_id: u64, channel_id: u64) -> Self {
        self.voice_states.push(MemberVoiceState {
            user_id,
            channel_id,
        });
        self
    }
}

/// The voice channel a member was found in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingChannel {
    /// Channel id
    pub channel_id: u64,
    /// Channel name
    pub channel_name: String,
}

/// Find the voice channel `member_id` currently occupies in `guild`.
pub fn find_member_channel(guild: &GuildSnapshot, member_id: u64) -> Option<TrackingChannel> {
    let state = guild
        .voice_states
        .iter()
        .find(|state| state.user_id == member_id)?;

    guild
        .channels
        .iter()
        .filter(|channel| channel.kind == ChannelKind::Voice)
        .find(|channel| channel.id == state.channel_id)
        .map(|channel| TrackingChannel {
            channel_id: channel.id,
            channel_name: channel.name.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild() -> GuildSnapshot {
        let mut guild = GuildSnapshot::new(1)
            .with_voice_channel(10, "Lobby")
            .with_voice_channel(11, "Game")
            .with_member_in(100, 11);
        guild.channels.push(GuildChannel {
            id: 12,
            name: "chat".to_string(),
            kind: ChannelKind::Other,
        });
        guild
    }

    #[test]
    fn test_finds_member_channel() {
        let found = find_member_channel(&guild(), 100).unwrap();
        assert_eq!(found.channel_id, 11);
        assert_eq!(found.channel_name, "Game");
    }

    #[test]
    fn test_member_not_in_voice() {
        assert!(find_member_channel(&guild(), 200).is_none());
    }

    #[test]
    fn test_ignores_non_voice_channels() {
        let guild = guild().with_member_in(300, 12);
        assert!(find_member_channel(&guild, 300).is_none());
    }
}
