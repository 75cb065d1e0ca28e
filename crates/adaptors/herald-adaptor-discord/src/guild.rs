//! Conversion from the serenity guild cache to [`GuildSnapshot`]

use serenity::model::channel::{ChannelType, GuildChannel as SerenityChannel};
use serenity::model::guild::Guild;
use serenity::model::voice::VoiceState;

use herald_core::{ChannelKind, GuildChannel, GuildSnapshot, MemberVoiceState};

/// Map a Discord channel type onto the kinds sessions care about
pub fn channel_kind(kind: ChannelType) -> ChannelKind {
    match kind {
        ChannelType::Voice => ChannelKind::Voice,
        _ => ChannelKind::Other,
    }
}

fn channel(channel: &SerenityChannel) -> GuildChannel {
    GuildChannel {
        id: channel.id.get(),
        name: channel.name.clone(),
        kind: channel_kind(channel.kind),
    }
}

fn voice_state(state: &VoiceState) -> Option<MemberVoiceState> {
    state.channel_id.map(|channel_id| MemberVoiceState {
        user_id: state.user_id.get(),
        channel_id: channel_id.get(),
    })
}

/// Copy the parts of a cached guild that channel lookup needs
///
/// Voice states without a channel are members who just left voice and are
/// skipped.
pub fn guild_snapshot(guild: &Guild) -> GuildSnapshot {
    GuildSnapshot {
        id: guild.id.get(),
        channels: guild.channels.values().map(channel).collect(),
        voice_states: guild.voice_states.values().filter_map(voice_state).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_voice_channels_are_voice() {
        assert_eq!(channel_kind(ChannelType::Voice), ChannelKind::Voice);
        assert_eq!(channel_kind(ChannelType::Text), ChannelKind::Other);
        assert_eq!(channel_kind(ChannelType::Stage), ChannelKind::Other);
        assert_eq!(channel_kind(ChannelType::Category), ChannelKind::Other);
    }
}
