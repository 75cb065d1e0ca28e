//! Songbird-backed voice transport and audio pipeline
//!
//! [`SongbirdTransport`] opens calls through a shared [`Songbird`] manager;
//! [`SongbirdPipeline`] decodes sound files with symphonia and plays them
//! as tracks on those calls. Track end and error events fire the session's
//! completion signal.

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::driver::Bitrate;
use songbird::error::ControlError;
use songbird::input::codecs::{CODEC_REGISTRY, PROBE};
use songbird::input::{File as SongbirdFile, Input};
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Call, Event, EventContext, EventHandler as SongbirdEventHandler, Songbird, TrackEvent};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

use herald_core::{
    AudioPipeline, CompletionSignal, EncodeOptions, EncodingHandle, HeraldError, Result,
    StreamFinish, StreamOutcome, StreamingHandle, VoiceConnection, VoiceTransport,
};

/// Length of one Opus frame as sent by the driver
const FRAME: Duration = Duration::from_millis(20);

fn guild_id(id: u64) -> Result<GuildId> {
    if id == 0 {
        return Err(HeraldError::transport("guild id must be non-zero"));
    }
    Ok(GuildId::new(id))
}

fn channel_id(id: u64) -> Result<ChannelId> {
    if id == 0 {
        return Err(HeraldError::transport("channel id must be non-zero"));
    }
    Ok(ChannelId::new(id))
}

fn frames_in(duration: Duration) -> u64 {
    (duration.as_millis() / FRAME.as_millis()) as u64
}

fn play_error(mode: &PlayMode) -> Option<String> {
    match mode {
        PlayMode::Errored(e) => Some(format!("{:?}", e)),
        _ => None,
    }
}

async fn apply_self_state(call: &Arc<Mutex<Call>>, self_mute: bool, self_deaf: bool) -> Result<()> {
    let mut call = call.lock().await;
    call.mute(self_mute)
        .await
        .map_err(|e| HeraldError::transport(format!("Failed to set mute: {}", e)))?;
    call.deafen(self_deaf)
        .await
        .map_err(|e| HeraldError::transport(format!("Failed to set deafen: {}", e)))?;
    Ok(())
}

/// Opens voice connections through songbird
pub struct SongbirdTransport {
    songbird: Arc<Songbird>,
}

impl SongbirdTransport {
    /// Wrap a songbird manager registered with the serenity client
    pub fn new(songbird: Arc<Songbird>) -> Self {
        Self { songbird }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn join_channel(
        &self,
        guild: u64,
        channel: u64,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<Box<dyn VoiceConnection>> {
        let call = self
            .songbird
            .join(guild_id(guild)?, channel_id(channel)?)
            .await
            .map_err(|e| HeraldError::transport(format!("Failed to join voice channel: {}", e)))?;

        apply_self_state(&call, self_mute, self_deaf).await?;

        Ok(Box::new(SongbirdConnection {
            songbird: Arc::clone(&self.songbird),
            guild_id: guild,
            channel_id: channel,
            call,
            speaking: false,
        }))
    }
}

/// A songbird call owned by one session
pub struct SongbirdConnection {
    songbird: Arc<Songbird>,
    guild_id: u64,
    channel_id: u64,
    call: Arc<Mutex<Call>>,
    speaking: bool,
}

impl SongbirdConnection {
    /// The underlying call
    pub fn call(&self) -> Arc<Mutex<Call>> {
        Arc::clone(&self.call)
    }

    /// Last speaking flag set by the session
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    fn channel_id(&self) -> u64 {
        self.channel_id
    }

    async fn change_channel(&mut self, channel: u64, self_mute: bool, self_deaf: bool) -> Result<()> {
        // joining a guild that already has a call moves that call
        let call = self
            .songbird
            .join(guild_id(self.guild_id)?, channel_id(channel)?)
            .await
            .map_err(|e| HeraldError::transport(format!("Failed to move voice channel: {}", e)))?;

        apply_self_state(&call, self_mute, self_deaf).await?;

        self.call = call;
        self.channel_id = channel;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.songbird
            .remove(guild_id(self.guild_id)?)
            .await
            .map_err(|e| HeraldError::transport(format!("Failed to leave voice channel: {}", e)))
    }

    async fn set_speaking(&mut self, speaking: bool) {
        // the driver sets the speaking flag from outgoing audio; only track it
        self.speaking = speaking;
        trace!(guild_id = %self.guild_id, speaking, "Speaking state");
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Decodes sound files and plays them on songbird calls
#[derive(Debug, Default, Clone, Copy)]
pub struct SongbirdPipeline;

impl SongbirdPipeline {
    /// Create the pipeline
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AudioPipeline for SongbirdPipeline {
    async fn encode_file(
        &self,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<Box<dyn EncodingHandle>> {
        let input: Input = SongbirdFile::new(path.to_path_buf()).into();
        let input = input
            .make_playable_async(&CODEC_REGISTRY, &PROBE)
            .await
            .map_err(|e| HeraldError::encode(format!("Failed to decode {}: {}", path.display(), e)))?;

        debug!(file = %path.display(), bitrate_kbps = options.bitrate_kbps, "Decoder ready");

        Ok(Box::new(SongbirdEncoding {
            path: path.to_path_buf(),
            options: options.clone(),
            input: std::sync::Mutex::new(Some(input)),
            track: None,
        }))
    }

    async fn new_stream(
        &self,
        encoding: &mut dyn EncodingHandle,
        connection: &dyn VoiceConnection,
        done: CompletionSignal,
    ) -> Result<Box<dyn StreamingHandle>> {
        let connection = connection
            .as_any()
            .downcast_ref::<SongbirdConnection>()
            .ok_or_else(|| HeraldError::stream("connection is not a songbird call"))?;
        let encoding = encoding
            .as_any_mut()
            .downcast_mut::<SongbirdEncoding>()
            .ok_or_else(|| HeraldError::stream("encoding was not produced by songbird"))?;
        let input = encoding
            .input
            .get_mut()
            .ok()
            .and_then(Option::take)
            .ok_or_else(|| HeraldError::stream("encoding already streamed"))?;

        let track = {
            let mut call = connection.call.lock().await;
            call.set_bitrate(Bitrate::BitsPerSecond(encoding.options.bitrate_bps()));
            call.play_input(input)
        };

        track
            .set_volume(encoding.options.gain())
            .map_err(|e| HeraldError::stream(format!("Failed to set volume: {}", e)))?;

        let report = Arc::new(TrackReport::default());
        let notifier = TrackEndNotifier {
            done,
            report: Arc::clone(&report),
        };
        track
            .add_event(Event::Track(TrackEvent::End), notifier.clone())
            .map_err(|e| HeraldError::stream(format!("Failed to watch track end: {}", e)))?;
        track
            .add_event(Event::Track(TrackEvent::Error), notifier)
            .map_err(|e| HeraldError::stream(format!("Failed to watch track errors: {}", e)))?;

        info!(file = %encoding.path.display(), "Streaming track");

        encoding.track = Some(track.clone());
        Ok(Box::new(SongbirdStreaming { track, report }))
    }
}

/// A decoded file waiting to be played, then the track playing it
pub struct SongbirdEncoding {
    path: PathBuf,
    options: EncodeOptions,
    // lazy inputs are Send but not Sync
    input: std::sync::Mutex<Option<Input>>,
    track: Option<TrackHandle>,
}

#[async_trait]
impl EncodingHandle for SongbirdEncoding {
    async fn stop(&mut self) -> Result<()> {
        let Some(track) = &self.track else {
            return Ok(());
        };
        match track.stop() {
            Ok(()) | Err(ControlError::Finished) => Ok(()),
            Err(e) => Err(HeraldError::stream(format!("Failed to stop track: {}", e))),
        }
    }

    fn cleanup(&mut self) {
        if let Ok(input) = self.input.get_mut() {
            *input = None;
        }
        self.track = None;
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// What the track reported before its handle went stale
#[derive(Default)]
struct TrackReport {
    frames: AtomicU64,
    error: std::sync::Mutex<Option<String>>,
}

/// Fires the completion signal on track end or error
#[derive(Clone)]
struct TrackEndNotifier {
    done: CompletionSignal,
    report: Arc<TrackReport>,
}

#[async_trait]
impl SongbirdEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _handle) in tracks.iter() {
                self.report
                    .frames
                    .store(frames_in(state.play_time), Ordering::SeqCst);

                let outcome = match play_error(&state.playing) {
                    Some(error) => {
                        if let Ok(mut slot) = self.report.error.lock() {
                            *slot = Some(error.clone());
                        }
                        StreamOutcome::Failed(error)
                    }
                    None => StreamOutcome::Finished,
                };
                self.done.fire(outcome);
            }
        }
        None
    }
}

/// Handle on a playing track
pub struct SongbirdStreaming {
    track: TrackHandle,
    report: Arc<TrackReport>,
}

#[async_trait]
impl StreamingHandle for SongbirdStreaming {
    async fn finished(&self) -> StreamFinish {
        match self.track.get_info().await {
            Ok(state) => StreamFinish {
                frames: frames_in(state.play_time),
                error: play_error(&state.playing),
            },
            // the driver drops finished tracks; use what the events saw
            Err(_) => StreamFinish {
                frames: self.report.frames.load(Ordering::SeqCst),
                error: self.report.error.lock().ok().and_then(|e| e.clone()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_in() {
        assert_eq!(frames_in(Duration::from_secs(1)), 50);
        assert_eq!(frames_in(Duration::from_millis(19)), 0);
    }

    #[test]
    fn test_zero_ids_are_rejected() {
        assert!(guild_id(0).is_err());
        assert!(channel_id(0).is_err());
        assert_eq!(guild_id(5).unwrap().get(), 5);
    }

    #[test]
    fn test_play_error_only_for_errored_tracks() {
        assert_eq!(play_error(&PlayMode::Play), None);
        assert_eq!(play_error(&PlayMode::End), None);
    }
}
