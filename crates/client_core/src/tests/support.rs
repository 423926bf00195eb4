//! In-process stand-ins for the shopping backend and the room transport.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use livekit_integration::{
    LiveKitRoomConnector, LiveKitRoomEvent, LiveKitRoomOptions, LiveKitRoomSession,
    RoomParticipant, TranscriptionSegment,
};
use shared::{
    domain::{Product, ProductId},
    protocol::{ChatRequest, ChatTurn, JoinCredentials},
};
use tokio::{net::TcpListener, sync::broadcast, task::JoinHandle};

use crate::backend::BackendApi;

pub(crate) fn product(id: &str, name: &str, category: &str, price: f64) -> Product {
    Product {
        id: ProductId::from(id),
        name: name.to_string(),
        category: category.to_string(),
        price,
        stock: 25,
    }
}

pub(crate) fn sample_catalog() -> Vec<Product> {
    vec![
        product("p1", "Cola", "Drinks", 40.0),
        product("p2", "Lays Classic", "Snacks", 20.0),
        product("p3", "Dairy Milk Silk", "Chocolates", 85.0),
    ]
}

pub(crate) fn agent() -> RoomParticipant {
    RoomParticipant {
        identity: "agent-maya".to_string(),
        name: Some("Maya".to_string()),
        is_agent: true,
    }
}

pub(crate) fn shopper() -> RoomParticipant {
    RoomParticipant {
        identity: "user-1a2b3c4d".to_string(),
        name: Some("User".to_string()),
        is_agent: false,
    }
}

pub(crate) fn segment(id: &str, text: &str, is_final: bool) -> TranscriptionSegment {
    TranscriptionSegment {
        id: id.to_string(),
        text: text.to_string(),
        is_final,
    }
}

pub(crate) fn confirmed(product_id: &str, quantity: u32) -> Vec<u8> {
    serde_json::json!({
        "type": "ORDER_CONFIRMED",
        "data": { "product_id": product_id, "quantity": quantity }
    })
    .to_string()
    .into_bytes()
}

pub(crate) fn finalized() -> Vec<u8> {
    br#"{"type":"ORDER_FINALIZED"}"#.to_vec()
}

#[derive(Clone)]
pub(crate) struct MockBackendConfig {
    pub products: Vec<Product>,
    pub token_available: bool,
    pub livekit_url: String,
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            products: sample_catalog(),
            token_available: true,
            livekit_url: "ws://127.0.0.1:7880".to_string(),
        }
    }
}

#[derive(Clone)]
struct MockState {
    config: MockBackendConfig,
    token_hits: Arc<AtomicUsize>,
    product_hits: Arc<AtomicUsize>,
}

pub(crate) struct MockBackend {
    pub base_url: String,
    pub token_hits: Arc<AtomicUsize>,
    pub product_hits: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn mock_token(
    State(state): State<MockState>,
) -> Result<Json<JoinCredentials>, (StatusCode, Json<serde_json::Value>)> {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    if !state.config.token_available {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "detail": "LIVEKIT_API_KEY or LIVEKIT_API_SECRET not set"
            })),
        ));
    }
    Ok(Json(JoinCredentials {
        token: "header.payload.signature".to_string(),
        livekit_url: state.config.livekit_url.clone(),
    }))
}

async fn mock_products(State(state): State<MockState>) -> Json<Vec<Product>> {
    state.product_hits.fetch_add(1, Ordering::SeqCst);
    Json(state.config.products.clone())
}

async fn mock_transcribe(mut multipart: Multipart) -> Json<serde_json::Value> {
    let mut summary = String::from("no file");
    while let Some(field) = multipart.next_field().await.expect("multipart field") {
        if field.name() == Some("file") {
            let filename = field.file_name().unwrap_or_default().to_string();
            let content_type = field.content_type().unwrap_or_default().to_string();
            let bytes = field.bytes().await.expect("file bytes");
            summary = format!("{filename} {content_type} {} bytes", bytes.len());
        }
    }
    Json(serde_json::json!({ "transcript": summary }))
}

async fn mock_chat(Json(request): Json<ChatRequest>) -> Json<serde_json::Value> {
    let last = request
        .messages
        .last()
        .map(|turn| format!("{}: {}", turn.role, turn.content))
        .unwrap_or_default();
    Json(serde_json::json!({ "response": format!("echo {last}") }))
}

pub(crate) async fn spawn_mock_backend(config: MockBackendConfig) -> MockBackend {
    let token_hits = Arc::new(AtomicUsize::new(0));
    let product_hits = Arc::new(AtomicUsize::new(0));
    let state = MockState {
        config,
        token_hits: Arc::clone(&token_hits),
        product_hits: Arc::clone(&product_hits),
    };
    let app = Router::new()
        .route("/token", get(mock_token))
        .route("/products", get(mock_products))
        .route("/transcribe", post(mock_transcribe))
        .route("/chat", post(mock_chat))
        .with_state(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let task = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });

    MockBackend {
        base_url: format!("http://{addr}"),
        token_hits,
        product_hits,
        task,
    }
}

/// Backend answered in-process, for tests that run on a paused clock.
pub(crate) struct StaticBackend {
    pub products: Vec<Product>,
    pub livekit_url: String,
    pub token_hits: AtomicUsize,
}

impl StaticBackend {
    pub(crate) fn new() -> Arc<Self> {
        Self::with_livekit_url("ws://127.0.0.1:7880")
    }

    pub(crate) fn with_livekit_url(livekit_url: &str) -> Arc<Self> {
        Arc::new(Self {
            products: sample_catalog(),
            livekit_url: livekit_url.to_string(),
            token_hits: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BackendApi for StaticBackend {
    async fn fetch_join_credentials(&self) -> Result<JoinCredentials> {
        self.token_hits.fetch_add(1, Ordering::SeqCst);
        Ok(JoinCredentials {
            token: "header.payload.signature".to_string(),
            livekit_url: self.livekit_url.clone(),
        })
    }

    async fn fetch_products(&self) -> Result<Vec<Product>> {
        Ok(self.products.clone())
    }

    async fn transcribe_audio(
        &self,
        audio: Vec<u8>,
        filename: &str,
        _mime_type: Option<&str>,
    ) -> Result<String> {
        Ok(format!("{filename}: {} bytes", audio.len()))
    }

    async fn send_chat(&self, messages: Vec<ChatTurn>) -> Result<String> {
        Ok(format!("{} turns", messages.len()))
    }
}

/// Room whose events are pushed by the test through `sender`.
pub(crate) struct TestRoom {
    pub sender: broadcast::Sender<LiveKitRoomEvent>,
    pub left: AtomicBool,
    microphone: AtomicBool,
}

impl TestRoom {
    pub(crate) fn new() -> Arc<Self> {
        let (sender, _) = broadcast::channel(64);
        Arc::new(Self {
            sender,
            left: AtomicBool::new(false),
            microphone: AtomicBool::new(true),
        })
    }

    pub(crate) fn emit(&self, event: LiveKitRoomEvent) {
        self.sender.send(event).expect("room has a subscriber");
    }

    pub(crate) fn emit_data(&self, payload: Vec<u8>) {
        self.emit(LiveKitRoomEvent::DataReceived {
            payload,
            topic: None,
            participant: Some(agent()),
        });
    }

    pub(crate) fn emit_attributes(&self, state: &str) {
        let mut attributes = BTreeMap::new();
        attributes.insert("lk.agent.state".to_string(), state.to_string());
        self.emit(LiveKitRoomEvent::ParticipantAttributesChanged {
            participant: agent(),
            attributes,
        });
    }
}

#[async_trait]
impl LiveKitRoomSession for TestRoom {
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<()> {
        self.microphone.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn is_microphone_enabled(&self) -> bool {
        self.microphone.load(Ordering::SeqCst)
    }

    async fn leave(&self) -> Result<()> {
        self.left.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn room_name(&self) -> String {
        "salesvoice-room".to_string()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LiveKitRoomEvent> {
        self.sender.subscribe()
    }
}

pub(crate) struct TestConnector {
    pub room: Arc<TestRoom>,
    pub fail: bool,
    pub connects: AtomicUsize,
    pub last_options: std::sync::Mutex<Option<LiveKitRoomOptions>>,
}

impl TestConnector {
    pub(crate) fn new(room: Arc<TestRoom>) -> Arc<Self> {
        Arc::new(Self {
            room,
            fail: false,
            connects: AtomicUsize::new(0),
            last_options: std::sync::Mutex::new(None),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            room: TestRoom::new(),
            fail: true,
            connects: AtomicUsize::new(0),
            last_options: std::sync::Mutex::new(None),
        })
    }
}

#[async_trait]
impl LiveKitRoomConnector for TestConnector {
    async fn connect(&self, options: LiveKitRoomOptions) -> Result<Arc<dyn LiveKitRoomSession>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock().expect("options lock") = Some(options);
        if self.fail {
            return Err(anyhow!("signal connection refused"));
        }
        Ok(Arc::clone(&self.room) as Arc<dyn LiveKitRoomSession>)
    }
}
