//! Session registry tests

use herald_core::testing::{FakePipeline, FakeTransport, StreamBehavior};
use herald_core::*;
use std::sync::Arc;

fn registry() -> (SessionRegistry, Arc<FakeTransport>) {
    let transport = Arc::new(FakeTransport::new());
    let backend = VoiceBackend::new(
        &VoiceConfig::default(),
        transport.clone(),
        Arc::new(FakePipeline::new(StreamBehavior::Hang)),
    );
    (SessionRegistry::new(backend), transport)
}

fn settings() -> Arc<dyn SpeechSettings> {
    Arc::new(GuildSettings::new("en"))
}

#[tokio::test]
async fn test_add_session_is_idempotent() {
    let (registry, _) = registry();

    let first = registry.add_session(1, 10, settings()).await;
    let second = registry.add_session(1, 20, settings()).await;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(registry.len().await, 1);
    // the second channel argument is ignored
    assert_eq!(second.channel_id().await, 10);
    assert!(registry.get_by_channel_id(10).await.is_some());
    assert!(registry.get_by_channel_id(20).await.is_none());
}

#[tokio::test]
async fn test_sessions_are_per_guild() {
    let (registry, _) = registry();

    let a = registry.add_session(1, 10, settings()).await;
    let b = registry.add_session(2, 20, settings()).await;

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.get_by_channel_id(10).await.unwrap().guild_id(), 1);
    assert_eq!(registry.get_by_channel_id(20).await.unwrap().guild_id(), 2);
    assert!(registry.get_by_channel_id(30).await.is_none());
}

#[tokio::test]
async fn test_delete_session() {
    let (registry, _) = registry();
    registry.add_session(1, 10, settings()).await;

    registry.delete_session(1).await;

    assert!(registry.is_empty().await);
    assert!(registry.get(1).await.is_none());
    assert!(registry.get_by_channel_id(10).await.is_none());

    // deleting again is a no-op
    registry.delete_session(1).await;
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_delete_leaves_connection_alone() {
    let (registry, transport) = registry();
    let session = registry.add_session(1, 10, settings()).await;
    let guild = GuildSnapshot::new(1)
        .with_voice_channel(10, "Lobby")
        .with_member_in(5, 10);
    session.connect(5, &guild).await.unwrap();

    registry.delete_session(1).await;

    assert!(session.is_connected().await);
    assert_eq!(transport.log().disconnects, 0);

    session.disconnect().await.unwrap();
    assert_eq!(transport.log().disconnects, 1);
}

#[tokio::test]
async fn test_recreated_session_is_fresh() {
    let (registry, _) = registry();
    let first = registry.add_session(1, 10, settings()).await;
    registry.delete_session(1).await;

    let second = registry.add_session(1, 20, settings()).await;

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.channel_id().await, 20);
    assert!(registry.get_by_channel_id(10).await.is_none());
}
