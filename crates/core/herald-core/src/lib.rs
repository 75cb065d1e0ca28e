//! Herald Core
//!
//! Per-guild voice announcement sessions for chat bots. This crate owns the
//! session state machine and leaves the voice client itself behind traits:
//!
//! - [`SessionRegistry`] keeps at most one [`VoiceSession`] per guild
//! - [`VoiceSession`] joins/moves/leaves a voice channel and plays short
//!   pre-recorded [`VoicePhrase`]s one at a time, queueing the rest
//! - [`transport`] defines what a voice client and audio pipeline must do
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use herald_core::*;
//! use herald_core::testing::{FakePipeline, FakeTransport, StreamBehavior};
//!
//! # async fn run() -> Result<()> {
//! let backend = VoiceBackend::new(
//!     &VoiceConfig::default(),
//!     Arc::new(FakeTransport::new()),
//!     Arc::new(FakePipeline::new(StreamBehavior::Hang)),
//! );
//! let registry = SessionRegistry::new(backend);
//!
//! let guild = GuildSnapshot::new(1).with_voice_channel(10, "Lobby").with_member_in(7, 10);
//! let session = registry.add_session(1, 10, Arc::new(GuildSettings::new("en"))).await;
//! session.connect(7, &guild).await?;
//! session.speak(VoicePhrase::WelcomeToLobby).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod assets;
pub mod config;
pub mod error;
pub mod guild;
pub mod logging;
pub mod phrase;
pub mod registry;
pub mod session;
pub mod settings;
pub mod testing;
pub mod transport;

pub use assets::SoundLibrary;
pub use config::{
    get_env_bool, get_env_int, get_env_or, get_required_env, load_env, EncodeOptions,
    VoiceConfig,
};
pub use error::{HeraldError, Result};
pub use guild::{find_member_channel, ChannelKind, GuildChannel, GuildSnapshot, MemberVoiceState, TrackingChannel};
pub use logging::init_tracing;
pub use phrase::VoicePhrase;
pub use registry::{ChannelIndex, SessionRegistry};
pub use session::{SpeakOutcome, VoiceBackend, VoiceSession, PHRASE_TIMEOUT};
pub use settings::{GuildSettings, SpeechSettings};
pub use transport::{
    completion_channel, AudioPipeline, CompletionSignal, CompletionWait, EncodingHandle,
    StreamFinish, StreamOutcome, StreamingHandle, VoiceConnection, VoiceTransport,
};
