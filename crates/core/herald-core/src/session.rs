//! Per-guild voice playback session
//!
//! A [`VoiceSession`] owns one voice connection and plays one phrase at a
//! time. Phrases requested while another is streaming wait in a FIFO queue;
//! the call that started playback keeps draining that queue until it is
//! empty. Every state change happens under the session mutex; only the wait
//! for a stream to end runs outside it, bounded by [`PHRASE_TIMEOUT`].
//!
//! States:
//! - idle: no connection
//! - connected: connection, nothing playing
//! - streaming: connection plus an active [`Playback`]
//! - draining: the playback was reclaimed and the queue is being checked

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::assets::SoundLibrary;
use crate::config::{EncodeOptions, VoiceConfig};
use crate::guild::{find_member_channel, GuildSnapshot};
use crate::phrase::VoicePhrase;
use crate::registry::ChannelIndex;
use crate::settings::SpeechSettings;
use crate::transport::{
    completion_channel, AudioPipeline, CompletionSignal, CompletionWait, EncodingHandle,
    StreamFinish, StreamOutcome, StreamingHandle, VoiceConnection, VoiceTransport,
};
use crate::{HeraldError, Result};

/// Longest a single phrase may stream before it is considered finished
pub const PHRASE_TIMEOUT: Duration = Duration::from_secs(8);

const SELF_MUTE: bool = false;
const SELF_DEAF: bool = true;

/// Everything a session needs from the outside world, shared by all
/// sessions of a registry
#[derive(Clone)]
pub struct VoiceBackend {
    /// Voice transport client
    pub transport: Arc<dyn VoiceTransport>,
    /// Encode/stream pipeline
    pub pipeline: Arc<dyn AudioPipeline>,
    /// Sound file lookup
    pub sounds: SoundLibrary,
    /// Encoder options for every phrase
    pub encoding: EncodeOptions,
}

impl VoiceBackend {
    /// Backend using the sound directory and encoder options of `config`
    pub fn new(
        config: &VoiceConfig,
        transport: Arc<dyn VoiceTransport>,
        pipeline: Arc<dyn AudioPipeline>,
    ) -> Self {
        Self {
            transport,
            pipeline,
            sounds: SoundLibrary::from_config(config),
            encoding: config.encoding.clone(),
        }
    }
}

/// Result of [`VoiceSession::speak`], describing the last phrase the call
/// attempted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeakOutcome {
    /// No connection to play into
    NotConnected,
    /// Another phrase is streaming; this one waits at `position` (1-based)
    Queued {
        /// Queue length after insertion
        position: usize,
    },
    /// No recording exists in the guild language or the default language
    Dropped {
        /// Phrase that was skipped
        phrase: VoicePhrase,
    },
    /// The phrase streamed and was cleaned up
    Played {
        /// Phrase that played
        phrase: VoicePhrase,
        /// Stream report; `None` when stop or disconnect reclaimed it first
        finish: Option<StreamFinish>,
        /// The stream did not signal completion within [`PHRASE_TIMEOUT`]
        timed_out: bool,
    },
}

/// The encode and stream pipeline of the phrase currently playing
struct Playback {
    id: u64,
    phrase: VoicePhrase,
    encoding: Box<dyn EncodingHandle>,
    streaming: Box<dyn StreamingHandle>,
    interrupt: CompletionSignal,
}

/// What the caller of `begin` owns after leaving the lock
struct Attempt {
    id: u64,
    phrase: VoicePhrase,
    wait: CompletionWait,
}

enum Begin {
    Playing(Attempt),
    Done(SpeakOutcome),
}

/// Where a phrase handed to `begin` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    /// A direct `speak` call
    Caller,
    /// The head of the queue
    Queue,
}

struct SessionState {
    channel_id: u64,
    connection: Option<Box<dyn VoiceConnection>>,
    playback: Option<Playback>,
    queue: VecDeque<VoicePhrase>,
    attempts: u64,
}

impl SessionState {
    fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn is_streaming(&self) -> bool {
        self.connection.is_some() && self.playback.is_some()
    }
}

/// Voice playback session for one guild
pub struct VoiceSession {
    guild_id: u64,
    settings: Arc<dyn SpeechSettings>,
    backend: VoiceBackend,
    channels: ChannelIndex,
    state: Mutex<SessionState>,
}

impl VoiceSession {
    /// Create an idle session bound to `channel_id`
    pub fn new(
        guild_id: u64,
        channel_id: u64,
        settings: Arc<dyn SpeechSettings>,
        backend: VoiceBackend,
        channels: ChannelIndex,
    ) -> Self {
        Self {
            guild_id,
            settings,
            backend,
            channels,
            state: Mutex::new(SessionState {
                channel_id,
                connection: None,
                playback: None,
                queue: VecDeque::new(),
                attempts: 0,
            }),
        }
    }

    /// Guild this session belongs to
    pub fn guild_id(&self) -> u64 {
        self.guild_id
    }

    /// Channel the session currently targets
    pub async fn channel_id(&self) -> u64 {
        self.state.lock().await.channel_id
    }

    /// Whether a voice connection is open
    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.is_connected()
    }

    /// Whether a phrase is streaming
    pub async fn is_streaming(&self) -> bool {
        self.state.lock().await.is_streaming()
    }

    /// Join (or move to) the voice channel `member_id` is in.
    ///
    /// Does nothing when bot speech is disabled for the guild. After
    /// connecting, a waiting phrase is started in the background if nothing
    /// is streaming.
    pub async fn connect(self: &Arc<Self>, member_id: u64, guild: &GuildSnapshot) -> Result<()> {
        if !self.settings.bot_speech_enabled() {
            debug!(guild_id = %self.guild_id, "Bot speech disabled, not connecting");
            return Ok(());
        }

        let mut state = self.state.lock().await;

        let target = find_member_channel(guild, member_id)
            .ok_or_else(|| HeraldError::channel_not_found(self.guild_id, member_id))?;

        let current = state.connection.as_ref().map(|c| c.channel_id());
        match current {
            None => {
                let connection = self
                    .backend
                    .transport
                    .join_channel(self.guild_id, target.channel_id, SELF_MUTE, SELF_DEAF)
                    .await?;
                state.connection = Some(connection);
                info!(
                    guild_id = %self.guild_id,
                    channel_id = %target.channel_id,
                    channel = %target.channel_name,
                    "Joined voice channel"
                );
            }
            Some(channel_id) if channel_id != target.channel_id => {
                if let Some(connection) = state.connection.as_mut() {
                    connection
                        .change_channel(target.channel_id, SELF_MUTE, SELF_DEAF)
                        .await?;
                }
                info!(
                    guild_id = %self.guild_id,
                    from = %channel_id,
                    channel_id = %target.channel_id,
                    "Moved voice connection"
                );
            }
            Some(_) => {
                debug!(guild_id = %self.guild_id, channel_id = %target.channel_id, "Already in channel");
            }
        }

        let previous = std::mem::replace(&mut state.channel_id, target.channel_id);
        self.channels
            .rebind(self.guild_id, previous, target.channel_id)
            .await;

        if !state.is_streaming() && !state.queue.is_empty() {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = session.drain_queue().await {
                    error!(guild_id = %session.guild_id, error = %e, "Queued phrase failed");
                }
            });
        }

        Ok(())
    }

    /// Leave the voice channel, cutting any phrase short.
    ///
    /// The connection handle is cleared even when stopping playback or
    /// leaving fails; the first error is returned.
    pub async fn disconnect(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if !state.is_connected() {
            return Ok(());
        }

        let stopped = self.stop_locked(&mut state).await;

        let left = match state.connection.take() {
            Some(mut connection) => connection.disconnect().await,
            None => Ok(()),
        };

        info!(guild_id = %self.guild_id, channel_id = %state.channel_id, "Left voice channel");

        stopped.and(left)
    }

    /// Cut the current phrase short without leaving the channel.
    /// Phrases still queued play afterwards.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.stop_locked(&mut state).await
    }

    /// Play `phrase`, or queue it behind the phrase currently streaming.
    ///
    /// When this call starts playback it keeps going until the queue is
    /// empty, then leaves the channel if the last phrase was the farewell.
    pub async fn speak(&self, phrase: VoicePhrase) -> Result<SpeakOutcome> {
        debug!(guild_id = %self.guild_id, phrase = %phrase, "Speak requested");

        let begun = {
            let mut state = self.state.lock().await;
            self.begin(&mut state, phrase, Source::Caller).await?
        };

        self.follow(begun).await
    }

    /// Start the phrase at the head of the queue if nothing is streaming.
    /// The queue is popped under the same lock that starts playback.
    async fn drain_queue(&self) -> Result<Option<SpeakOutcome>> {
        let begun = {
            let mut state = self.state.lock().await;
            if state.is_streaming() {
                return Ok(None);
            }
            match state.queue.pop_front() {
                Some(next) => self.begin(&mut state, next, Source::Queue).await?,
                None => return Ok(None),
            }
        };

        self.follow(begun).await.map(Some)
    }

    /// Wait out the attempt in `begun`, then keep playing the queue until it
    /// is empty.
    async fn follow(&self, mut begun: Begin) -> Result<SpeakOutcome> {
        loop {
            let attempt = match begun {
                Begin::Playing(attempt) => attempt,
                Begin::Done(outcome) => return Ok(outcome),
            };
            let phrase = attempt.phrase;

            let (signal, timed_out) =
                match tokio::time::timeout(PHRASE_TIMEOUT, attempt.wait.wait()).await {
                    Ok(signal) => (signal, false),
                    Err(_) => {
                        warn!(guild_id = %self.guild_id, phrase = %phrase, "Phrase exceeded time budget");
                        (None, true)
                    }
                };
            debug!(guild_id = %self.guild_id, phrase = %phrase, signal = ?signal, "Stream wait over");

            let mut state = self.state.lock().await;
            let finish = self.reclaim(&mut state, attempt.id).await;
            let played = SpeakOutcome::Played {
                phrase,
                finish,
                timed_out,
            };

            if !state.is_connected() {
                return Ok(played);
            }

            // a newer chain owns playback and drains the queue
            if state.playback.is_some() {
                return Ok(played);
            }

            match state.queue.pop_front() {
                Some(next) => {
                    begun = self.begin(&mut state, next, Source::Queue).await?;
                }
                None => {
                    drop(state);
                    if phrase.is_farewell() {
                        self.disconnect().await?;
                    }
                    return Ok(played);
                }
            }
        }
    }

    /// Append a phrase to the queue
    pub async fn queue_add(&self, phrase: VoicePhrase) {
        self.state.lock().await.queue.push_back(phrase);
    }

    /// Pop the oldest queued phrase
    pub async fn queue_get_next(&self) -> Option<VoicePhrase> {
        self.state.lock().await.queue.pop_front()
    }

    /// Remove the queued phrase at `index`
    pub async fn queue_remove(&self, index: usize) -> Option<VoicePhrase> {
        self.state.lock().await.queue.remove(index)
    }

    /// Number of queued phrases
    pub async fn queue_len(&self) -> usize {
        self.state.lock().await.queue.len()
    }

    /// Start streaming `phrase` or queue it. Runs under the session lock.
    ///
    /// A phrase taken from the queue goes back to the head if it can't play
    /// yet, and a missing recording moves on to the next queued phrase. A
    /// caller's phrase joins the tail, and a missing recording drops only
    /// that phrase.
    async fn begin(
        &self,
        state: &mut SessionState,
        phrase: VoicePhrase,
        source: Source,
    ) -> Result<Begin> {
        if !state.is_connected() {
            debug!(guild_id = %self.guild_id, phrase = %phrase, "Not connected, nothing to play into");
            return Ok(Begin::Done(SpeakOutcome::NotConnected));
        }

        if state.playback.is_some() {
            let position = match source {
                Source::Caller => {
                    state.queue.push_back(phrase);
                    state.queue.len()
                }
                Source::Queue => {
                    state.queue.push_front(phrase);
                    1
                }
            };
            debug!(
                guild_id = %self.guild_id,
                phrase = %phrase,
                position,
                "Streaming in progress, phrase queued"
            );
            return Ok(Begin::Done(SpeakOutcome::Queued { position }));
        }

        let language = self.settings.language();
        let mut phrase = phrase;
        let path = loop {
            match self.backend.sounds.resolve(phrase, &language) {
                Some(path) => break path,
                None => {
                    warn!(
                        guild_id = %self.guild_id,
                        phrase = %phrase,
                        language = %language,
                        "No recording for phrase, skipping"
                    );
                    if source == Source::Caller {
                        return Ok(Begin::Done(SpeakOutcome::Dropped { phrase }));
                    }
                    match state.queue.pop_front() {
                        Some(next) => phrase = next,
                        None => return Ok(Begin::Done(SpeakOutcome::Dropped { phrase })),
                    }
                }
            }
        };

        let mut encoding = self
            .backend
            .pipeline
            .encode_file(&path, &self.backend.encoding)
            .await?;

        let connection = match state.connection.as_mut() {
            Some(connection) => connection,
            None => return Ok(Begin::Done(SpeakOutcome::NotConnected)),
        };
        connection.set_speaking(true).await;

        let (signal, wait) = completion_channel();
        let streaming = match self
            .backend
            .pipeline
            .new_stream(&mut *encoding, &**connection, signal.clone())
            .await
        {
            Ok(streaming) => streaming,
            Err(e) => {
                connection.set_speaking(false).await;
                if let Err(stop_err) = encoding.stop().await {
                    debug!(error = %stop_err, "Encoder stop after failed stream");
                }
                encoding.cleanup();
                return Err(e);
            }
        };

        state.attempts += 1;
        let id = state.attempts;
        state.playback = Some(Playback {
            id,
            phrase,
            encoding,
            streaming,
            interrupt: signal,
        });

        info!(
            guild_id = %self.guild_id,
            phrase = %phrase,
            file = %path.display(),
            "Started phrase"
        );

        Ok(Begin::Playing(Attempt { id, phrase, wait }))
    }

    /// Take back the playback started by attempt `id` and release it.
    /// `None` if stop or disconnect got there first.
    async fn reclaim(&self, state: &mut SessionState, id: u64) -> Option<StreamFinish> {
        if state.playback.as_ref().map(|p| p.id) != Some(id) {
            return None;
        }
        let mut playback = state.playback.take()?;

        let finish = playback.streaming.finished().await;
        match &finish.error {
            Some(error) => warn!(
                guild_id = %self.guild_id,
                phrase = %playback.phrase,
                frames = finish.frames,
                error = %error,
                "Stream ended with error"
            ),
            None => info!(
                guild_id = %self.guild_id,
                phrase = %playback.phrase,
                frames = finish.frames,
                "Finished phrase"
            ),
        }

        if let Err(e) = playback.encoding.stop().await {
            debug!(error = %e, "Encoder stop after stream end");
        }
        playback.encoding.cleanup();

        if let Some(connection) = state.connection.as_mut() {
            connection.set_speaking(false).await;
        }

        Some(finish)
    }

    /// Interrupt the active playback. Runs under the session lock.
    async fn stop_locked(&self, state: &mut SessionState) -> Result<()> {
        if !state.is_streaming() {
            return Ok(());
        }
        let Some(mut playback) = state.playback.take() else {
            return Ok(());
        };

        playback.interrupt.fire(StreamOutcome::Interrupted);
        info!(guild_id = %self.guild_id, phrase = %playback.phrase, "Stopping phrase");

        if let Some(connection) = state.connection.as_mut() {
            connection.set_speaking(false).await;
        }

        let stopped = playback.encoding.stop().await;
        playback.encoding.cleanup();
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::GuildSettings;
    use crate::testing::{FakePipeline, FakeTransport, StreamBehavior};

    fn session(dir: &std::path::Path, behavior: StreamBehavior) -> Arc<VoiceSession> {
        let backend = VoiceBackend {
            transport: Arc::new(FakeTransport::new()),
            pipeline: Arc::new(FakePipeline::new(behavior)),
            sounds: SoundLibrary::new(dir, "en"),
            encoding: EncodeOptions::default(),
        };
        Arc::new(VoiceSession::new(
            1,
            50,
            Arc::new(GuildSettings::new("en")),
            backend,
            ChannelIndex::default(),
        ))
    }

    #[tokio::test]
    async fn test_speak_without_connection_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), StreamBehavior::Hang);

        let outcome = session.speak(VoicePhrase::NewRoomCode).await.unwrap();
        assert_eq!(outcome, SpeakOutcome::NotConnected);
        assert_eq!(session.queue_len().await, 0);
    }

    #[tokio::test]
    async fn test_queue_operations_are_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), StreamBehavior::Hang);

        session.queue_add(VoicePhrase::WelcomeToLobby).await;
        session.queue_add(VoicePhrase::NewRoomCode).await;
        session.queue_add(VoicePhrase::SeeYouLater).await;

        assert_eq!(session.queue_remove(1).await, Some(VoicePhrase::NewRoomCode));
        assert_eq!(session.queue_get_next().await, Some(VoicePhrase::WelcomeToLobby));
        assert_eq!(session.queue_get_next().await, Some(VoicePhrase::SeeYouLater));
        assert_eq!(session.queue_get_next().await, None);
        assert_eq!(session.queue_remove(0).await, None);
    }

    #[tokio::test]
    async fn test_new_session_is_idle() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path(), StreamBehavior::Hang);

        assert_eq!(session.guild_id(), 1);
        assert_eq!(session.channel_id().await, 50);
        assert!(!session.is_connected().await);
        assert!(!session.is_streaming().await);
        assert!(session.disconnect().await.is_ok());
        assert!(session.stop().await.is_ok());
    }
}
