//! Text commands driving guild voice sessions
//!
//! `<prefix> join` follows the author into voice, `<prefix> say <phrase>`
//! announces a phrase, `<prefix> leave` disconnects and `<prefix> end`
//! says goodbye and forgets the session.

use std::sync::Arc;

use serenity::async_trait as serenity_async_trait;
use serenity::model::channel::Message;
use serenity::model::gateway::Ready;
use serenity::prelude::*;
use tracing::{debug, info, warn};

use herald_core::{
    find_member_channel, GuildSettings, GuildSnapshot, HeraldError, Result, SessionRegistry,
    SpeakOutcome, VoicePhrase, VoiceSession,
};

use crate::guild::guild_snapshot;

/// A parsed bot command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Join the author's voice channel
    Join,
    /// Announce a phrase
    Say(VoicePhrase),
    /// Leave voice, keeping the session
    Leave,
    /// Say goodbye and drop the session
    End,
}

/// Parse `content` as a command addressed with `prefix`.
///
/// Returns `None` for messages not meant for the bot.
pub fn parse_command(prefix: &str, content: &str) -> Option<Result<Command>> {
    let rest = content.trim().strip_prefix(prefix)?;
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let mut words = rest.split_whitespace();
    let command = match words.next().map(str::to_ascii_lowercase).as_deref() {
        Some("join") => Ok(Command::Join),
        Some("leave") => Ok(Command::Leave),
        Some("end") => Ok(Command::End),
        Some("say") => match words.next() {
            Some(phrase) => phrase.parse().map(Command::Say),
            None => Err(HeraldError::other("say needs a phrase")),
        },
        Some(other) => Err(HeraldError::other(format!("unknown command '{}'", other))),
        None => Err(HeraldError::other("expected join, say, leave or end")),
    };
    Some(command)
}

/// Voice channel a new session for `member_id` should be bound to
pub fn join_target(guild: &GuildSnapshot, member_id: u64) -> Result<u64> {
    find_member_channel(guild, member_id)
        .map(|channel| channel.channel_id)
        .ok_or_else(|| HeraldError::channel_not_found(guild.id, member_id))
}

fn spawn_speak(session: Arc<VoiceSession>, phrase: VoicePhrase) {
    tokio::spawn(async move {
        match session.speak(phrase).await {
            Ok(SpeakOutcome::Played { phrase, finish, timed_out }) => {
                debug!(
                    guild_id = %session.guild_id(),
                    phrase = %phrase,
                    frames = ?finish.map(|f| f.frames),
                    timed_out,
                    "Announcement chain finished"
                );
            }
            Ok(outcome) => debug!(guild_id = %session.guild_id(), ?outcome, "Speak returned"),
            Err(e) => warn!(guild_id = %session.guild_id(), error = %e, "Speak failed"),
        }
    });
}

/// Serenity event handler owning the session registry
pub struct Handler {
    registry: Arc<SessionRegistry>,
    prefix: String,
    settings: GuildSettings,
}

impl Handler {
    /// Handler answering `prefix` commands; new sessions get a copy of
    /// `settings`
    pub fn new(registry: Arc<SessionRegistry>, prefix: impl Into<String>, settings: GuildSettings) -> Self {
        Self {
            registry,
            prefix: prefix.into(),
            settings,
        }
    }

    async fn session(&self, guild_id: u64) -> Result<Arc<VoiceSession>> {
        self.registry
            .get(guild_id)
            .await
            .ok_or_else(|| HeraldError::other("no voice session, use join first"))
    }

    async fn run(&self, ctx: &Context, msg: &Message, guild_id: u64, command: Command) -> Result<()> {
        match command {
            Command::Join => {
                let snapshot = msg
                    .guild(&ctx.cache)
                    .map(|guild| guild_snapshot(&guild))
                    .ok_or_else(|| HeraldError::other("guild is not cached yet"))?;
                let channel_id = join_target(&snapshot, msg.author.id.get())?;
                let settings = Arc::new(self.settings.clone());
                let session = self
                    .registry
                    .add_session(guild_id, channel_id, settings)
                    .await;
                session.connect(msg.author.id.get(), &snapshot).await?;
                spawn_speak(session, VoicePhrase::WelcomeToLobby);
            }
            Command::Say(phrase) => {
                spawn_speak(self.session(guild_id).await?, phrase);
            }
            Command::Leave => {
                self.session(guild_id).await?.disconnect().await?;
            }
            Command::End => {
                let session = self.session(guild_id).await?;
                self.registry.delete_session(guild_id).await;
                // the farewell disconnects once it has played
                spawn_speak(session, VoicePhrase::SeeYouLater);
            }
        }
        Ok(())
    }
}

#[serenity_async_trait]
impl EventHandler for Handler {
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };
        let Some(parsed) = parse_command(&self.prefix, &msg.content) else {
            return;
        };

        debug!(guild_id = %guild_id, author = %msg.author.id, content = %msg.content, "Command received");

        let result = match parsed {
            Ok(command) => self.run(&ctx, &msg, guild_id.get(), command).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(guild_id = %guild_id, error = %e, "Command failed");
            if let Err(e) = msg.channel_id.say(&ctx.http, e.to_string()).await {
                warn!(error = %e, "Failed to send command error");
            }
        }
    }

    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds_count = %ready.guilds.len(),
            "Connected to Discord"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ignores_other_messages() {
        assert!(parse_command("!herald", "hello there").is_none());
        assert!(parse_command("!herald", "!heraldry join").is_none());
    }

    #[test]
    fn test_parses_commands() {
        assert_eq!(parse_command("!herald", "!herald join").unwrap().unwrap(), Command::Join);
        assert_eq!(parse_command("!herald", "  !herald LEAVE ").unwrap().unwrap(), Command::Leave);
        assert_eq!(parse_command("!herald", "!herald end").unwrap().unwrap(), Command::End);
        assert_eq!(
            parse_command("!herald", "!herald say newRoomCode").unwrap().unwrap(),
            Command::Say(VoicePhrase::NewRoomCode)
        );
    }

    #[test]
    fn test_join_target_is_members_voice_channel() {
        let guild = GuildSnapshot::new(1)
            .with_voice_channel(10, "Lobby")
            .with_member_in(7, 10);

        assert_eq!(join_target(&guild, 7).unwrap(), 10);
        assert!(matches!(
            join_target(&guild, 8),
            Err(HeraldError::ChannelNotFound { guild_id: 1, member_id: 8 })
        ));
    }

    #[test]
    fn test_rejects_bad_commands() {
        assert!(parse_command("!herald", "!herald").unwrap().is_err());
        assert!(parse_command("!herald", "!herald dance").unwrap().is_err());
        assert!(parse_command("!herald", "!herald say").unwrap().is_err());
        assert!(parse_command("!herald", "!herald say Nonsense").unwrap().is_err());
    }
}
