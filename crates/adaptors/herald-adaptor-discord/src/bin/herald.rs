//! Herald Discord bot
//!
//! Run with: cargo run -p herald-adaptor-discord --bin herald

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use serenity::cache::Settings as CacheSettings;
use serenity::Client;
use songbird::serenity::SerenityInit;
use songbird::Songbird;
use tracing::info;

use herald_adaptor_discord::{intents, Handler, SongbirdPipeline, SongbirdTransport};
use herald_core::config::ENV_DISCORD_TOKEN;
use herald_core::{
    get_required_env, init_tracing, load_env, GuildSettings, SessionRegistry, VoiceBackend,
    VoiceConfig,
};

#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(about = "Discord bot announcing pre-recorded voice phrases")]
struct Args {
    /// Discord bot token, read from DISCORD_TOKEN when omitted
    #[arg(long)]
    token: Option<String>,

    /// Prefix that addresses the bot in text channels
    #[arg(long, env = "HERALD_COMMAND_PREFIX", default_value = "!herald")]
    prefix: String,

    /// Override the sound asset directory
    #[arg(long)]
    sounds_dir: Option<PathBuf>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env()?;
    let args = Args::parse();
    init_tracing(&args.log);

    let token = match args.token {
        Some(token) => token,
        None => get_required_env(ENV_DISCORD_TOKEN)?,
    };

    let mut config = VoiceConfig::from_env();
    if let Some(dir) = args.sounds_dir {
        config.sounds_dir = dir;
    }
    config.validate()?;

    info!(
        sounds_dir = %config.sounds_dir.display(),
        language = %config.default_language,
        bot_speech = config.bot_speech,
        "Starting herald"
    );

    let songbird = Songbird::serenity();
    let backend = VoiceBackend::new(
        &config,
        Arc::new(SongbirdTransport::new(Arc::clone(&songbird))),
        Arc::new(SongbirdPipeline::new()),
    );
    let registry = Arc::new(SessionRegistry::new(backend));
    let settings =
        GuildSettings::new(config.default_language.clone()).with_bot_speech(config.bot_speech);
    let handler = Handler::new(registry, args.prefix, settings);

    let mut cache_settings = CacheSettings::default();
    cache_settings.cache_guilds = true;
    cache_settings.cache_channels = true;

    let mut client = Client::builder(&token, intents())
        .event_handler(handler)
        .cache_settings(cache_settings)
        .register_songbird_with(songbird)
        .await
        .context("Failed to create Discord client")?;

    client.start().await.context("Discord client stopped")?;
    Ok(())
}
