use std::sync::atomic::Ordering;

use super::*;
use crate::test_support::{
    agent, confirmed, finalized, segment, shopper, spawn_mock_backend, MockBackendConfig,
    StaticBackend, TestConnector, TestRoom,
};
use livekit_integration::{MissingLiveKitConnector, ScriptedRoomConnector};
use shared::domain::{ProductId, TranscriptRole};

async fn wait_for(
    events: &mut broadcast::Receiver<ClientEvent>,
    matches: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) => continue,
                Err(err) => panic!("client event stream ended: {err}"),
            }
        }
    })
    .await
    .expect("timed out waiting for client event")
}

/// Bootstrapped, started client with the catalog already loaded.
async fn connected_client() -> (
    Arc<ShopClient>,
    Arc<TestRoom>,
    broadcast::Receiver<ClientEvent>,
) {
    let room = TestRoom::new();
    let client = ShopClient::new(StaticBackend::new(), TestConnector::new(Arc::clone(&room)));
    let mut events = client.subscribe_events();
    client.bootstrap().await.expect("bootstrap");
    client.start().await.expect("start");
    wait_for(&mut events, |e| matches!(e, ClientEvent::CatalogLoaded(_))).await;
    (client, room, events)
}

#[tokio::test]
async fn bootstrap_fetches_credentials_once() {
    let mock = spawn_mock_backend(MockBackendConfig::default()).await;
    let settings = ClientSettings {
        backend_url: mock.base_url.clone(),
        ..ClientSettings::default()
    };
    let client =
        ShopClient::from_settings(&settings, Arc::new(MissingLiveKitConnector)).expect("client");
    let mut events = client.subscribe_events();
    assert_eq!(client.phase().await, SessionPhase::Loading);

    let first = client.bootstrap().await.expect("bootstrap");
    let second = client.bootstrap().await.expect("cached");
    assert_eq!(first, second);
    assert_eq!(mock.token_hits.load(Ordering::SeqCst), 1);
    assert_eq!(client.phase().await, SessionPhase::AwaitingStart);
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::PhaseChanged(_))).await,
        ClientEvent::PhaseChanged(SessionPhase::AwaitingStart)
    );
}

#[tokio::test]
async fn failed_bootstrap_stays_loading() {
    let mock = spawn_mock_backend(MockBackendConfig {
        token_available: false,
        ..MockBackendConfig::default()
    })
    .await;
    let settings = ClientSettings::default().with_backend_url(Some(mock.base_url.clone()));
    let client =
        ShopClient::from_settings(&settings, Arc::new(MissingLiveKitConnector)).expect("client");
    let mut events = client.subscribe_events();

    let err = client.bootstrap().await.expect_err("token endpoint is down");
    assert!(err.to_string().contains("LIVEKIT_API_KEY"));
    assert_eq!(client.phase().await, SessionPhase::Loading);
    assert!(matches!(
        wait_for(&mut events, |_| true).await,
        ClientEvent::Error(_)
    ));
    assert!(matches!(
        client.start().await,
        Err(SessionError::NotReady)
    ));
}

#[tokio::test]
async fn start_requires_credentials() {
    let connector = TestConnector::new(TestRoom::new());
    let client = ShopClient::new(StaticBackend::new(), connector.clone());

    assert!(matches!(client.start().await, Err(SessionError::NotReady)));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    assert_eq!(client.phase().await, SessionPhase::Loading);
}

#[tokio::test]
async fn start_joins_room_with_microphone_and_loads_catalog() {
    let room = TestRoom::new();
    let connector = TestConnector::new(Arc::clone(&room));
    let client = ShopClient::new(StaticBackend::new(), connector.clone());
    let mut events = client.subscribe_events();
    client.bootstrap().await.expect("bootstrap");

    client.start().await.expect("start");

    let options = connector
        .last_options
        .lock()
        .expect("options lock")
        .clone()
        .expect("connect options");
    assert!(options.publish_microphone);
    assert!(options.auto_subscribe_audio);
    assert_eq!(options.server_url, "ws://127.0.0.1:7880");
    assert_eq!(options.token, "header.payload.signature");

    match wait_for(&mut events, |e| matches!(e, ClientEvent::CatalogLoaded(_))).await {
        ClientEvent::CatalogLoaded(products) => assert_eq!(products.len(), 3),
        other => panic!("unexpected event {other:?}"),
    }

    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.phase, SessionPhase::Connected);
    assert_eq!(snapshot.state.catalog().len(), 3);
    assert_eq!(snapshot.state.agent_state(), AgentState::Connecting);
    assert!(snapshot.microphone_enabled);
    assert_eq!(snapshot.room_name.as_deref(), Some("salesvoice-room"));

    assert!(matches!(
        client.start().await,
        Err(SessionError::InvalidPhase(SessionPhase::Connected))
    ));
}

#[tokio::test]
async fn connect_failure_returns_to_start_screen() {
    let connector = TestConnector::failing();
    let client = ShopClient::new(StaticBackend::new(), connector.clone());
    let mut events = client.subscribe_events();
    client.bootstrap().await.expect("bootstrap");

    let err = client.start().await.expect_err("connect must fail");
    assert!(matches!(err, SessionError::Connect(_)));
    assert_eq!(client.phase().await, SessionPhase::AwaitingStart);
    match wait_for(&mut events, |e| matches!(e, ClientEvent::Error(_))).await {
        ClientEvent::Error(message) => assert!(message.contains("signal connection refused")),
        other => panic!("unexpected event {other:?}"),
    }

    client.start().await.expect_err("still failing");
    assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn rejects_unusable_livekit_url_before_connecting() {
    let connector = TestConnector::new(TestRoom::new());
    let client = ShopClient::new(
        StaticBackend::with_livekit_url("ftp://media.test"),
        connector.clone(),
    );
    client.bootstrap().await.expect("bootstrap");

    assert!(matches!(
        client.start().await,
        Err(SessionError::ServerUrl(_))
    ));
    assert_eq!(connector.connects.load(Ordering::SeqCst), 0);
    assert_eq!(client.phase().await, SessionPhase::AwaitingStart);
}

#[tokio::test]
async fn order_events_update_cart() {
    let (client, room, mut events) = connected_client().await;

    room.emit_data(confirmed("p1", 2));
    room.emit_data(confirmed("p1", 1));
    room.emit_data(confirmed("p404", 5));
    room.emit_data(b"garbage".to_vec());
    room.emit_data(confirmed("p2", 1));

    let mut last = None;
    for _ in 0..3 {
        last = Some(wait_for(&mut events, |e| matches!(e, ClientEvent::CartUpdated { .. })).await);
    }
    match last.expect("cart update") {
        ClientEvent::CartUpdated { items, total } => {
            assert_eq!(items.len(), 2);
            assert_eq!(items[0].id(), &ProductId::from("p1"));
            assert_eq!(items[0].quantity, 3);
            assert_eq!(total, 140.0);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn finalize_clears_cart_and_overlay_lasts_three_seconds() {
    let (client, room, mut events) = connected_client().await;

    room.emit_data(confirmed("p1", 2));
    room.emit_data(confirmed("p1", 1));
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::CartUpdated { items, .. } if items.first().map(|i| i.quantity) == Some(3))
    })
    .await;

    room.emit_data(finalized());
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::SuccessOverlayChanged(true))
    })
    .await;
    let snapshot = client.snapshot().await;
    assert!(snapshot.state.cart().is_empty());
    assert!(snapshot.state.success_overlay());

    tokio::time::sleep(Duration::from_millis(2900)).await;
    assert!(client.snapshot().await.state.success_overlay());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!client.snapshot().await.state.success_overlay());
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::SuccessOverlayChanged(_))).await,
        ClientEvent::SuccessOverlayChanged(false)
    );
}

#[tokio::test(start_paused = true)]
async fn second_finalize_restarts_overlay_timer() {
    let (client, room, mut events) = connected_client().await;

    room.emit_data(finalized());
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::SuccessOverlayChanged(true))
    })
    .await;
    tokio::time::sleep(Duration::from_millis(2000)).await;

    room.emit_data(finalized());
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::SuccessOverlayChanged(true))
    })
    .await;
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(client.snapshot().await.state.success_overlay());

    tokio::time::sleep(Duration::from_millis(1600)).await;
    assert!(!client.snapshot().await.state.success_overlay());
}

#[tokio::test]
async fn transcript_collects_final_segments_and_chat() {
    let (client, room, mut events) = connected_client().await;

    room.emit(LiveKitRoomEvent::TranscriptionReceived {
        segments: vec![
            segment("u1", "two co", false),
            segment("u1", "two colas please", true),
        ],
        participant: Some(shopper()),
    });
    room.emit(LiveKitRoomEvent::ChatMessage {
        message: "Added 2 Cola to your cart.".into(),
        participant: Some(agent()),
    });

    let first = wait_for(&mut events, |e| matches!(e, ClientEvent::TranscriptAppended(_))).await;
    let second = wait_for(&mut events, |e| matches!(e, ClientEvent::TranscriptAppended(_))).await;
    assert_eq!(
        first,
        ClientEvent::TranscriptAppended(shared::domain::TranscriptMessage::new(
            TranscriptRole::User,
            "two colas please"
        ))
    );
    assert!(matches!(
        second,
        ClientEvent::TranscriptAppended(ref message) if message.role == TranscriptRole::Assistant
    ));
    assert_eq!(client.snapshot().await.state.transcript().len(), 2);
}

#[tokio::test]
async fn agent_state_and_audio_levels_follow_agent() {
    let (client, room, mut events) = connected_client().await;

    room.emit(LiveKitRoomEvent::ParticipantJoined(agent()));
    room.emit(LiveKitRoomEvent::ParticipantJoined(shopper()));
    room.emit_attributes("speaking");
    assert_eq!(
        wait_for(&mut events, |e| {
            matches!(e, ClientEvent::AgentStateChanged(AgentState::Speaking))
        })
        .await,
        ClientEvent::AgentStateChanged(AgentState::Speaking)
    );

    room.emit(LiveKitRoomEvent::AudioLevelChanged {
        identity: shopper().identity,
        level: 0.9,
    });
    room.emit(LiveKitRoomEvent::AudioLevelChanged {
        identity: agent().identity,
        level: 1.0,
    });
    match wait_for(&mut events, |e| matches!(e, ClientEvent::AudioLevelsUpdated(_))).await {
        ClientEvent::AudioLevelsUpdated(bars) => {
            assert_eq!(bars.len(), crate::visualizer::BAR_COUNT);
            assert_eq!(bars[3], crate::visualizer::BAR_MAX_HEIGHT);
        }
        other => panic!("unexpected event {other:?}"),
    }

    room.emit(LiveKitRoomEvent::ParticipantLeft {
        identity: agent().identity,
    });
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::AgentStateChanged(AgentState::Disconnected))
    })
    .await;
    assert_eq!(client.phase().await, SessionPhase::Connected);
}

#[tokio::test]
async fn room_disconnect_moves_to_disconnected() {
    let (client, room, mut events) = connected_client().await;

    room.emit(LiveKitRoomEvent::Disconnected {
        reason: "server shutdown".into(),
    });
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::PhaseChanged(_))).await,
        ClientEvent::PhaseChanged(SessionPhase::Disconnected)
    );
    let snapshot = client.snapshot().await;
    assert_eq!(snapshot.state.agent_state(), AgentState::Disconnected);
    assert!(snapshot.room_name.is_none());
    assert!(matches!(
        client.set_microphone_enabled(true).await,
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn immediate_room_disconnect_leaves_no_active_room() {
    let script = r#"{"after_ms":0,"event":{"kind":"disconnected","reason":"room closed"}}"#;
    for _ in 0..50 {
        let connector = ScriptedRoomConnector::from_jsonl(script).expect("script");
        let client = ShopClient::new(StaticBackend::new(), Arc::new(connector));
        let mut events = client.subscribe_events();
        client.bootstrap().await.expect("bootstrap");
        client.start().await.expect("start");

        wait_for(&mut events, |e| {
            matches!(e, ClientEvent::PhaseChanged(SessionPhase::Disconnected))
        })
        .await;
        let snapshot = client.snapshot().await;
        assert_eq!(snapshot.phase, SessionPhase::Disconnected);
        assert!(snapshot.room_name.is_none());
        assert!(matches!(
            client.set_microphone_enabled(true).await,
            Err(SessionError::NotConnected)
        ));
    }
}

#[tokio::test]
async fn disconnect_from_replaced_room_is_ignored() {
    let (client, room, _) = connected_client().await;
    client.stop().await.expect("stop");
    client.start().await.expect("restart");
    let mut events = client.subscribe_events();
    assert_eq!(client.phase().await, SessionPhase::Connected);

    let stale: Arc<dyn LiveKitRoomSession> = TestRoom::new();
    client.handle_disconnect(&stale, "old room").await;
    assert_eq!(client.phase().await, SessionPhase::Connected);
    assert!(client.snapshot().await.room_name.is_some());

    room.emit(LiveKitRoomEvent::Disconnected {
        reason: "server shutdown".into(),
    });
    wait_for(&mut events, |e| {
        matches!(e, ClientEvent::PhaseChanged(SessionPhase::Disconnected))
    })
    .await;
    assert!(client.snapshot().await.room_name.is_none());
}

#[tokio::test]
async fn microphone_toggle_and_stop() {
    let client = ShopClient::new(
        StaticBackend::new(),
        TestConnector::new(TestRoom::new()),
    );
    assert!(matches!(
        client.set_microphone_enabled(false).await,
        Err(SessionError::NotConnected)
    ));
    client.stop().await.expect("stop without room is a no-op");
    assert_eq!(client.phase().await, SessionPhase::Loading);

    let (client, room, mut events) = connected_client().await;
    client.set_microphone_enabled(false).await.expect("mute");
    assert_eq!(
        wait_for(&mut events, |e| matches!(e, ClientEvent::MicrophoneChanged(false))).await,
        ClientEvent::MicrophoneChanged(false)
    );
    assert!(!client.snapshot().await.microphone_enabled);

    client.stop().await.expect("stop");
    assert!(room.left.load(Ordering::SeqCst));
    assert_eq!(client.phase().await, SessionPhase::Disconnected);

    client.start().await.expect("restart from disconnected");
    assert_eq!(client.phase().await, SessionPhase::Connected);
}

#[tokio::test]
async fn transcription_and_chat_pass_through_to_backend() {
    let mock = spawn_mock_backend(MockBackendConfig::default()).await;
    let settings = ClientSettings::default().with_backend_url(Some(mock.base_url.clone()));
    let client =
        ShopClient::from_settings(&settings, Arc::new(MissingLiveKitConnector)).expect("client");

    let transcript = client
        .transcribe_recording(vec![1; 12], None, None)
        .await
        .expect("transcribe");
    assert_eq!(transcript, "recording.webm audio/webm 12 bytes");

    let reply = client
        .chat(vec![ChatTurn::user("two colas")])
        .await
        .expect("chat");
    assert_eq!(reply, "echo user: two colas");

    let products = client.load_catalog().await.expect("catalog");
    assert_eq!(products.len(), 3);
    assert_eq!(mock.product_hits.load(Ordering::SeqCst), 1);
}
