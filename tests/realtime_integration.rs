//! Chat fanout across processes and room lifecycle, using in-memory brokers.

use std::sync::Arc;
use std::time::Duration;

use huddle::adapters::memory::InMemoryMessageStore;
use huddle::adapters::pubsub::InMemoryBroker;
use huddle::adapters::websocket::{connection, FanoutBridge, OutboundQueue, RoomDirectory, TopicRegistry};
use huddle::application::{ChatIngestService, MessageWriter, WriterSettings};
use huddle::domain::foundation::{ConversationId, RoomId, UserId};
use serde_json::Value;

fn user(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

async fn recv(queue: &mut OutboundQueue) -> Option<String> {
    tokio::time::timeout(Duration::from_millis(300), queue.next())
        .await
        .ok()
        .flatten()
}

#[tokio::test]
async fn chat_message_crosses_processes_and_is_persisted_once() {
    let broker = Arc::new(InMemoryBroker::new());
    let store = Arc::new(InMemoryMessageStore::new());
    let writer = Arc::new(MessageWriter::start(store.clone(), WriterSettings::default()));
    let chat = ChatIngestService::new(writer.clone());

    // Two front-end processes sharing one broker.
    let (registry_a, registry_b) = (TopicRegistry::spawn(64), TopicRegistry::spawn(64));
    let bridge_a = FanoutBridge::new(broker.clone(), registry_a.clone());
    let bridge_b = FanoutBridge::new(broker.clone(), registry_b.clone());

    let conversation = ConversationId::new("42").unwrap();
    let topic = conversation.topic();

    let (alice, mut alice_q) = connection(user("alice"), 16);
    registry_a.register(alice.clone()).await;
    registry_a.subscribe(alice.id(), topic.clone()).await;
    bridge_a.subscribe_topic(&topic).await.unwrap();

    let (bob, mut bob_q) = connection(user("bob"), 16);
    registry_b.register(bob.clone()).await;
    registry_b.subscribe(bob.id(), topic.clone()).await;
    bridge_b.subscribe_topic(&topic).await.unwrap();

    let message = chat
        .ingest(&conversation, &user("alice"), r#"{"content":"hello","message_type":"text"}"#)
        .await
        .unwrap();
    bridge_a
        .publish(&topic, serde_json::to_string(&message).unwrap())
        .await
        .unwrap();

    let received: Value = serde_json::from_str(&recv(&mut bob_q).await.unwrap()).unwrap();
    assert_eq!(received["content"], "hello");
    assert_eq!(received["sender_id"], "alice");
    assert_eq!(received["conversation_id"], "42");
    assert_eq!(recv(&mut alice_q).await, None);

    writer.shutdown().await;
    assert_eq!(store.count(), 1);
    assert!(store.contains(message.id));
}

#[tokio::test]
async fn invalid_chat_frame_is_neither_published_nor_persisted() {
    let store = Arc::new(InMemoryMessageStore::new());
    let writer = Arc::new(MessageWriter::start(store.clone(), WriterSettings::default()));
    let chat = ChatIngestService::new(writer.clone());
    let conversation = ConversationId::new("42").unwrap();

    assert!(chat.ingest(&conversation, &user("alice"), "not json").await.is_err());

    writer.shutdown().await;
    assert_eq!(store.count(), 0);
}

#[tokio::test]
async fn room_is_destroyed_when_empty_and_recreated_on_next_join() {
    let rooms = RoomDirectory::new(16);
    let room = RoomId::new("standup").unwrap();

    let (alice, mut alice_q) = connection(user("alice"), 16);
    let (bob, mut bob_q) = connection(user("bob"), 16);
    let alice_session = rooms.join(room.clone(), alice).await;
    let bob_session = rooms.join(room.clone(), bob).await;
    assert!(rooms.contains(&room).await);

    // Drain control events until the raw frame shows up.
    bob_session.broadcast("offer".to_string()).await;
    let mut got_offer = false;
    while let Some(frame) = recv(&mut alice_q).await {
        if frame == "offer" {
            got_offer = true;
            break;
        }
    }
    assert!(got_offer);
    while recv(&mut bob_q).await.is_some() {}

    alice_session.leave().await;
    bob_session.leave().await;

    for _ in 0..50 {
        if !rooms.contains(&room).await {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(!rooms.contains(&room).await);

    let (carol, mut carol_q) = connection(user("carol"), 16);
    let _carol_session = rooms.join(room.clone(), carol).await;
    assert!(rooms.contains(&room).await);

    let welcome: Value = serde_json::from_str(&recv(&mut carol_q).await.unwrap()).unwrap();
    assert_eq!(welcome["type"], "welcome");
    assert_eq!(welcome["participants"], serde_json::json!([]));
}
