//! Collaborator contracts for the voice transport and the audio pipeline
//!
//! Sessions drive these traits and never see the concrete client. The
//! Discord adaptor implements them on top of songbird; tests use the fakes
//! in [`crate::testing`].

use async_trait::async_trait;
use std::any::Any;
use std::path::Path;
use tokio::sync::mpsc;

use crate::config::EncodeOptions;
use crate::Result;

/// How a streaming attempt ended, as reported through its completion signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The stream reached the end of the audio
    Finished,
    /// The session cut the stream short (stop or disconnect)
    Interrupted,
    /// The stream failed
    Failed(String),
}

/// Final report of a stream, read after the wait is over
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamFinish {
    /// Frames sent to the connection
    pub frames: u64,
    /// Why the stream stopped, if it was an error
    pub error: Option<String>,
}

/// Sender half of a per-attempt completion channel.
///
/// Cloneable so the stream and the session can both hold it; only the first
/// fire is delivered.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    tx: mpsc::Sender<StreamOutcome>,
}

impl CompletionSignal {
    /// Deliver `outcome` unless the attempt already ended
    pub fn fire(&self, outcome: StreamOutcome) -> bool {
        self.tx.try_send(outcome).is_ok()
    }

    /// Whether the waiting side is gone
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Receiver half of a per-attempt completion channel
#[derive(Debug)]
pub struct CompletionWait {
    rx: mpsc::Receiver<StreamOutcome>,
}

impl CompletionWait {
    /// Wait for the first outcome. `None` means every sender was dropped
    /// without firing.
    pub async fn wait(mut self) -> Option<StreamOutcome> {
        let outcome = self.rx.recv().await;
        self.rx.close();
        outcome
    }
}

/// Create a fresh completion channel for one streaming attempt
pub fn completion_channel() -> (CompletionSignal, CompletionWait) {
    let (tx, rx) = mpsc::channel(1);
    (CompletionSignal { tx }, CompletionWait { rx })
}

/// A live voice connection owned by exactly one session
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Channel the connection is currently in
    fn channel_id(&self) -> u64;

    /// Move the connection to another channel of the same guild
    async fn change_channel(&mut self, channel_id: u64, self_mute: bool, self_deaf: bool)
        -> Result<()>;

    /// Leave the channel
    async fn disconnect(&mut self) -> Result<()>;

    /// Flag whether audio is being sent
    async fn set_speaking(&mut self, speaking: bool);

    /// Downcast support for pipelines paired with a specific transport
    fn as_any(&self) -> &dyn Any;
}

/// Opens voice connections
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Join `channel_id` in `guild_id`
    async fn join_channel(
        &self,
        guild_id: u64,
        channel_id: u64,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<Box<dyn VoiceConnection>>;
}

/// An in-flight encode of one sound file
#[async_trait]
pub trait EncodingHandle: Send + Sync {
    /// Stop producing audio
    async fn stop(&mut self) -> Result<()>;

    /// Release encoder resources
    fn cleanup(&mut self);

    /// Downcast support for pipelines that hand state to their streams
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// An in-flight stream of encoded audio into a connection
#[async_trait]
pub trait StreamingHandle: Send + Sync {
    /// Report how the stream ended so far
    async fn finished(&self) -> StreamFinish;
}

/// File-to-packet audio pipeline
#[async_trait]
pub trait AudioPipeline: Send + Sync {
    /// Start encoding `path`
    async fn encode_file(
        &self,
        path: &Path,
        options: &EncodeOptions,
    ) -> Result<Box<dyn EncodingHandle>>;

    /// Stream `encoding` into `connection`, firing `done` when it ends
    async fn new_stream(
        &self,
        encoding: &mut dyn EncodingHandle,
        connection: &dyn VoiceConnection,
        done: CompletionSignal,
    ) -> Result<Box<dyn StreamingHandle>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_first_fire_is_delivered() {
        let (signal, wait) = completion_channel();
        let other = signal.clone();

        assert!(signal.fire(StreamOutcome::Finished));
        assert!(!other.fire(StreamOutcome::Interrupted));
        assert_eq!(wait.wait().await, Some(StreamOutcome::Finished));
    }

    #[tokio::test]
    async fn test_dropped_senders_end_wait() {
        let (signal, wait) = completion_channel();
        drop(signal);
        assert_eq!(wait.wait().await, None);
    }

    #[tokio::test]
    async fn test_fire_after_wait_is_ignored() {
        let (signal, wait) = completion_channel();
        signal.fire(StreamOutcome::Interrupted);
        wait.wait().await;
        assert!(signal.is_closed());
        assert!(!signal.fire(StreamOutcome::Finished));
    }
}
