//! In-memory collaborators for exercising sessions without a voice client

use async_trait::async_trait;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::EncodeOptions;
use crate::phrase::VoicePhrase;
use crate::transport::{
    AudioPipeline, CompletionSignal, EncodingHandle, StreamFinish, StreamOutcome,
    StreamingHandle, VoiceConnection, VoiceTransport,
};
use crate::{HeraldError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything the fake transport observed
#[derive(Debug, Default)]
pub struct TransportLog {
    /// `(guild_id, channel_id, self_mute, self_deaf)` per join
    pub joins: Vec<(u64, u64, bool, bool)>,
    /// Target channel per move
    pub moves: Vec<u64>,
    /// Number of disconnects
    pub disconnects: usize,
    /// Speaking flag changes in order
    pub speaking: Vec<bool>,
}

/// Transport that hands out [`FakeConnection`]s and records their use
#[derive(Default)]
pub struct FakeTransport {
    log: Arc<Mutex<TransportLog>>,
    fail_join: AtomicBool,
    fail_disconnect: Arc<AtomicBool>,
}

impl FakeTransport {
    /// Transport whose joins succeed
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent joins fail
    pub fn fail_joins(&self, fail: bool) {
        self.fail_join.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent disconnects fail
    pub fn fail_disconnects(&self, fail: bool) {
        self.fail_disconnect.store(fail, Ordering::SeqCst);
    }

    /// Snapshot accessor for the log
    pub fn log(&self) -> MutexGuard<'_, TransportLog> {
        lock(&self.log)
    }
}

#[async_trait]
impl VoiceTransport for FakeTransport {
    async fn join_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<Box<dyn VoiceConnection>> {
        if self.fail_join.load(Ordering::SeqCst) {
            return Err(HeraldError::transport("join refused"));
        }
        lock(&self.log)
            .joins
            .push((guild_id, channel_id, self_mute, self_deaf));
        Ok(Box::new(FakeConnection {
            channel_id,
            log: Arc::clone(&self.log),
            fail_disconnect: Arc::clone(&self.fail_disconnect),
        }))
    }
}

/// Connection produced by [`FakeTransport`]
pub struct FakeConnection {
    channel_id: u64,
    log: Arc<Mutex<TransportLog>>,
    fail_disconnect: Arc<AtomicBool>,
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn channel_id(&self) -> u64 {
        self.channel_id
    }

    async fn change_channel(&mut self, channel_id: u64, _self_mute: bool, _self_deaf: bool) -> Result<()> {
        lock(&self.log).moves.push(channel_id);
        self.channel_id = channel_id;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        lock(&self.log).disconnects += 1;
        if self.fail_disconnect.load(Ordering::SeqCst) {
            return Err(HeraldError::transport("leave refused"));
        }
        Ok(())
    }

    async fn set_speaking(&mut self, speaking: bool) {
        lock(&self.log).speaking.push(speaking);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// How streams created by [`FakePipeline`] end
#[derive(Debug, Clone, Copy)]
pub enum StreamBehavior {
    /// Fire the completion signal after the given delay
    CompleteAfter(Duration),
    /// Never fire; only the session timeout or an interrupt ends the wait
    Hang,
}

#[derive(Default)]
struct PipelineCounters {
    active: AtomicUsize,
    max_active: AtomicUsize,
    streams: AtomicUsize,
}

/// Pipeline that plays nothing but tracks what would have played
pub struct FakePipeline {
    behavior: StreamBehavior,
    encoded: Mutex<Vec<PathBuf>>,
    counters: Arc<PipelineCounters>,
    fail_encode: AtomicBool,
    stream_error: Mutex<Option<String>>,
}

impl FakePipeline {
    /// Pipeline whose streams end according to `behavior`
    pub fn new(behavior: StreamBehavior) -> Self {
        Self {
            behavior,
            encoded: Mutex::new(Vec::new()),
            counters: Arc::new(PipelineCounters::default()),
            fail_encode: AtomicBool::new(false),
            stream_error: Mutex::new(None),
        }
    }

    /// Make subsequent encodes fail
    pub fn fail_encodes(&self, fail: bool) {
        self.fail_encode.store(fail, Ordering::SeqCst);
    }

    /// Report `error` as the finish reason of subsequent streams
    pub fn finish_with_error(&self, error: impl Into<String>) {
        *lock(&self.stream_error) = Some(error.into());
    }

    /// Files encoded, in order
    pub fn encoded(&self) -> Vec<PathBuf> {
        lock(&self.encoded).clone()
    }

    /// Phrases encoded, in order, recovered from the file names
    pub fn played(&self) -> Vec<VoicePhrase> {
        self.encoded()
            .iter()
            .filter_map(|path| {
                let name = path.file_name()?.to_str()?;
                name.split('.').next()?.parse().ok()
            })
            .collect()
    }

    /// Streams currently between start and cleanup
    pub fn active_streams(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously active streams seen
    pub fn max_active_streams(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }

    /// Streams started so far
    pub fn streams_started(&self) -> usize {
        self.counters.streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AudioPipeline for FakePipeline {
    async fn encode_file(
        &self,
        path: &Path,
        _options: &EncodeOptions,
    ) -> Result<Box<dyn EncodingHandle>> {
        if self.fail_encode.load(Ordering::SeqCst) {
            return Err(HeraldError::encode(format!("cannot encode {}", path.display())));
        }
        lock(&self.encoded).push(path.to_path_buf());
        Ok(Box::new(FakeEncoding {
            counters: Arc::clone(&self.counters),
            streaming: false,
        }))
    }

    async fn new_stream(
        &self,
        encoding: &mut dyn EncodingHandle,
        _connection: &dyn VoiceConnection,
        done: CompletionSignal,
    ) -> Result<Box<dyn StreamingHandle>> {
        let encoding = encoding
            .as_any_mut()
            .downcast_mut::<FakeEncoding>()
            .ok_or_else(|| HeraldError::stream("foreign encoding handle"))?;
        encoding.streaming = true;

        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(active, Ordering::SeqCst);
        self.counters.streams.fetch_add(1, Ordering::SeqCst);

        if let StreamBehavior::CompleteAfter(delay) = self.behavior {
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                done.fire(StreamOutcome::Finished);
            });
        }

        Ok(Box::new(FakeStreaming {
            frames: 50,
            error: lock(&self.stream_error).clone(),
        }))
    }
}

struct FakeEncoding {
    counters: Arc<PipelineCounters>,
    streaming: bool,
}

#[async_trait]
impl EncodingHandle for FakeEncoding {
    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn cleanup(&mut self) {
        if self.streaming {
            self.streaming = false;
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct FakeStreaming {
    frames: u64,
    error: Option<String>,
}

#[async_trait]
impl StreamingHandle for FakeStreaming {
    async fn finished(&self) -> StreamFinish {
        StreamFinish {
            frames: self.frames,
            error: self.error.clone(),
        }
    }
}

/// Create `<Phrase>.<lang>.mp3` for each phrase under `dir`
pub fn write_sounds(dir: &Path, language: &str, phrases: &[VoicePhrase]) -> std::io::Result<()> {
    for phrase in phrases {
        std::fs::write(dir.join(format!("{}.{}.mp3", phrase, language)), b"ID3")?;
    }
    Ok(())
}
