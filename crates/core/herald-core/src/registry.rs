//! Guild -> session registry

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::{VoiceBackend, VoiceSession};
use crate::settings::SpeechSettings;

/// Channel id -> guild id, kept current by sessions as they connect and move
#[derive(Clone, Default)]
pub struct ChannelIndex {
    inner: Arc<RwLock<HashMap<u64, u64>>>,
}

impl ChannelIndex {
    /// Point `channel_id` at `guild_id`, dropping `previous` if it still
    /// belongs to the same guild
    pub async fn rebind(&self, guild_id: u64, previous: u64, channel_id: u64) {
        let mut index = self.inner.write().await;
        if previous != channel_id && index.get(&previous) == Some(&guild_id) {
            index.remove(&previous);
        }
        index.insert(channel_id, guild_id);
    }

    /// Record `channel_id` for a newly created session
    pub async fn bind(&self, guild_id: u64, channel_id: u64) {
        self.inner.write().await.insert(channel_id, guild_id);
    }

    /// Guild whose session targets `channel_id`
    pub async fn lookup(&self, channel_id: u64) -> Option<u64> {
        self.inner.read().await.get(&channel_id).copied()
    }

    /// Forget every channel pointing at `guild_id`
    pub async fn remove_guild(&self, guild_id: u64) {
        self.inner.write().await.retain(|_, guild| *guild != guild_id);
    }
}

/// Owns at most one [`VoiceSession`] per guild
pub struct SessionRegistry {
    backend: VoiceBackend,
    sessions: RwLock<HashMap<u64, Arc<VoiceSession>>>,
    channels: ChannelIndex,
}

impl SessionRegistry {
    /// Empty registry whose sessions share `backend`
    pub fn new(backend: VoiceBackend) -> Self {
        Self {
            backend,
            sessions: RwLock::new(HashMap::new()),
            channels: ChannelIndex::default(),
        }
    }

    /// Session for `guild_id`, created idle and bound to `channel_id` if
    /// absent. An existing session is returned untouched.
    pub async fn add_session(
        &self,
        guild_id: u64,
        channel_id: u64,
        settings: Arc<dyn SpeechSettings>,
    ) -> Arc<VoiceSession> {
        let mut sessions = self.sessions.write().await;
        if let Some(existing) = sessions.get(&guild_id) {
            debug!(guild_id = %guild_id, "Session already exists");
            return Arc::clone(existing);
        }

        let session = Arc::new(VoiceSession::new(
            guild_id,
            channel_id,
            settings,
            self.backend.clone(),
            self.channels.clone(),
        ));
        self.channels.bind(guild_id, channel_id).await;
        sessions.insert(guild_id, Arc::clone(&session));

        info!(guild_id = %guild_id, channel_id = %channel_id, "Created voice session");
        session
    }

    /// Forget the session of `guild_id`. Its connection, if any, is left
    /// alone; disconnect first for a clean teardown.
    pub async fn delete_session(&self, guild_id: u64) {
        let removed = self.sessions.write().await.remove(&guild_id);
        if removed.is_some() {
            self.channels.remove_guild(guild_id).await;
            info!(guild_id = %guild_id, "Removed voice session");
        }
    }

    /// Session currently targeting `channel_id`
    pub async fn get_by_channel_id(&self, channel_id: u64) -> Option<Arc<VoiceSession>> {
        let guild_id = self.channels.lookup(channel_id).await?;
        self.get(guild_id).await
    }

    /// Session of `guild_id`
    pub async fn get(&self, guild_id: u64) -> Option<Arc<VoiceSession>> {
        self.sessions.read().await.get(&guild_id).cloned()
    }

    /// Number of sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no session exists
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
