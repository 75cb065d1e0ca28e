//! Discord adaptor for Herald
//!
//! Plays [`herald_core`] sessions through songbird and drives them from
//! guild text commands received by serenity.

#![warn(clippy::all)]

pub mod guild;
pub mod handler;
pub mod voice;

pub use guild::{channel_kind, guild_snapshot};
pub use handler::{join_target, parse_command, Command, Handler};
pub use voice::{
    SongbirdConnection, SongbirdEncoding, SongbirdPipeline, SongbirdStreaming, SongbirdTransport,
};

use serenity::model::gateway::GatewayIntents;

/// Gateway intents the bot needs: guild cache, message commands and
/// member voice states
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_VOICE_STATES
}
