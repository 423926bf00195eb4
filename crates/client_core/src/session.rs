use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use chrono::Utc;
use livekit_integration::{
    inspect_join_token, validate_server_url, LiveKitRoomConnector, LiveKitRoomEvent,
    LiveKitRoomOptions, LiveKitRoomSession, ServerUrlError,
};
use shared::{
    domain::{AgentState, Product, SessionPhase},
    protocol::{ChatTurn, JoinCredentials},
};
use thiserror::Error;
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        Mutex, RwLock,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    backend::{BackendApi, BackendError, HttpBackend, DEFAULT_RECORDING_FILENAME},
    config::ClientSettings,
    reducer::{RoomSignal, ShopState, StateChange},
    visualizer::AudioVisualizer,
    ClientEvent,
};

pub const SUCCESS_OVERLAY_DURATION: Duration = Duration::from_millis(3000);
const CLIENT_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("join credentials have not been fetched yet")]
    NotReady,
    #[error("cannot start a session while {0:?}")]
    InvalidPhase(SessionPhase),
    #[error(transparent)]
    ServerUrl(#[from] ServerUrlError),
    #[error("failed to connect livekit room: {0}")]
    Connect(String),
    #[error("no room is connected")]
    NotConnected,
    #[error("failed to toggle microphone: {0}")]
    Microphone(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShopSnapshot {
    pub phase: SessionPhase,
    pub state: ShopState,
    pub microphone_enabled: bool,
    pub room_name: Option<String>,
}

struct ActiveRoom {
    room: Arc<dyn LiveKitRoomSession>,
    event_task: JoinHandle<()>,
}

/// Drives one shopper's voice session: credentials, room lifecycle and the
/// cart/transcript state folded from room events.
pub struct ShopClient {
    backend: Arc<dyn BackendApi>,
    connector: Arc<dyn LiveKitRoomConnector>,
    credentials: Mutex<Option<JoinCredentials>>,
    phase: RwLock<SessionPhase>,
    state: Mutex<ShopState>,
    visualizer: Mutex<AudioVisualizer>,
    active: Mutex<Option<ActiveRoom>>,
    overlay_timer: Mutex<Option<JoinHandle<()>>>,
    catalog_requested: AtomicBool,
    events: broadcast::Sender<ClientEvent>,
}

impl ShopClient {
    pub fn new(
        backend: Arc<dyn BackendApi>,
        connector: Arc<dyn LiveKitRoomConnector>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        Arc::new(Self {
            backend,
            connector,
            credentials: Mutex::new(None),
            phase: RwLock::new(SessionPhase::Loading),
            state: Mutex::new(ShopState::default()),
            visualizer: Mutex::new(AudioVisualizer::new()),
            active: Mutex::new(None),
            overlay_timer: Mutex::new(None),
            catalog_requested: AtomicBool::new(false),
            events,
        })
    }

    pub fn from_settings(
        settings: &ClientSettings,
        connector: Arc<dyn LiveKitRoomConnector>,
    ) -> Result<Arc<Self>, BackendError> {
        let backend = HttpBackend::new(settings.backend_url.clone(), settings.request_timeout())?;
        Ok(Self::new(Arc::new(backend), connector))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    pub async fn phase(&self) -> SessionPhase {
        *self.phase.read().await
    }

    async fn set_phase(&self, phase: SessionPhase) {
        {
            let mut guard = self.phase.write().await;
            if *guard == phase {
                return;
            }
            *guard = phase;
        }
        debug!(?phase, "session: phase changed");
        self.emit(ClientEvent::PhaseChanged(phase));
    }

    /// Fetches join credentials once. On failure the phase stays `Loading`.
    pub async fn bootstrap(&self) -> Result<JoinCredentials> {
        let mut credentials = self.credentials.lock().await;
        if let Some(existing) = credentials.as_ref() {
            return Ok(existing.clone());
        }

        let fetched = match self.backend.fetch_join_credentials().await {
            Ok(fetched) => fetched,
            Err(err) => {
                error!("session: failed to fetch join credentials: {err:#}");
                self.emit(ClientEvent::Error(format!(
                    "failed to fetch join credentials: {err}"
                )));
                return Err(err);
            }
        };

        match inspect_join_token(&fetched.token) {
            Ok(claims) => {
                info!(
                    identity = claims.identity().unwrap_or("-"),
                    room = claims.room().unwrap_or("-"),
                    expires_at = ?claims.expires_at(),
                    livekit_url = %fetched.livekit_url,
                    "session: join credentials ready"
                );
                if claims.is_expired_at(Utc::now()) {
                    warn!("session: join token is already expired");
                }
            }
            Err(err) => debug!("session: join token is opaque: {err}"),
        }

        *credentials = Some(fetched.clone());
        drop(credentials);
        self.set_phase(SessionPhase::AwaitingStart).await;
        Ok(fetched)
    }

    /// Joins the voice room. Requires credentials from [`ShopClient::bootstrap`].
    pub async fn start(self: &Arc<Self>) -> Result<(), SessionError> {
        let credentials = self
            .credentials
            .lock()
            .await
            .clone()
            .ok_or(SessionError::NotReady)?;

        {
            let mut phase = self.phase.write().await;
            if !matches!(
                *phase,
                SessionPhase::AwaitingStart | SessionPhase::Disconnected
            ) {
                return Err(SessionError::InvalidPhase(*phase));
            }
            *phase = SessionPhase::Connecting;
        }
        self.emit(ClientEvent::PhaseChanged(SessionPhase::Connecting));

        if let Err(err) = self.connect_room(credentials).await {
            warn!("session: connect failed: {err}");
            self.set_phase(SessionPhase::AwaitingStart).await;
            self.emit(ClientEvent::Error(err.to_string()));
            return Err(err);
        }
        Ok(())
    }

    async fn connect_room(
        self: &Arc<Self>,
        credentials: JoinCredentials,
    ) -> Result<(), SessionError> {
        validate_server_url(&credentials.livekit_url)?;

        let room = self
            .connector
            .connect(LiveKitRoomOptions {
                server_url: credentials.livekit_url.clone(),
                token: credentials.token.clone(),
                publish_microphone: true,
                auto_subscribe_audio: true,
            })
            .await
            .map_err(|err| SessionError::Connect(format!("{err:#}")))?;

        self.visualizer.lock().await.reset();
        let change = self
            .state
            .lock()
            .await
            .set_agent_state(AgentState::Connecting);
        self.publish(change.into_iter().collect()).await;
        self.spawn_catalog_fetch();

        self.set_phase(SessionPhase::Connected).await;
        let microphone = room.is_microphone_enabled();
        info!(room = %room.room_name(), microphone, "session: connected");
        self.emit(ClientEvent::MicrophoneChanged(microphone));

        // `active` stays locked until the room is stored, so a disconnect
        // delivered right after subscribing always finds its own room.
        let previous = {
            let mut active = self.active.lock().await;
            let event_task = self.spawn_room_event_task(Arc::clone(&room));
            active.replace(ActiveRoom { room, event_task })
        };
        if let Some(previous) = previous {
            previous.event_task.abort();
            let _ = previous.room.leave().await;
        }
        Ok(())
    }

    fn spawn_catalog_fetch(self: &Arc<Self>) {
        if self.catalog_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        let client = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(err) = client.load_catalog().await {
                warn!("session: catalog unavailable: {err:#}");
            }
        });
    }

    pub async fn load_catalog(&self) -> Result<Vec<Product>> {
        let products = self.backend.fetch_products().await?;
        info!(count = products.len(), "session: catalog loaded");
        self.state.lock().await.set_catalog(products.clone());
        self.emit(ClientEvent::CatalogLoaded(products.clone()));
        Ok(products)
    }

    fn spawn_room_event_task(
        self: &Arc<Self>,
        room: Arc<dyn LiveKitRoomSession>,
    ) -> JoinHandle<()> {
        let mut events = room.subscribe_events();
        let client = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(LiveKitRoomEvent::Disconnected { reason }) => {
                        client.handle_disconnect(&room, &reason).await;
                        break;
                    }
                    Ok(event) => client.handle_room_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "session: room events lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle_room_event(self: &Arc<Self>, event: LiveKitRoomEvent) {
        match &event {
            LiveKitRoomEvent::ParticipantJoined(participant) => {
                debug!(
                    identity = %participant.identity,
                    agent = participant.is_agent,
                    "session: participant joined"
                );
                self.visualizer.lock().await.observe_participant(participant);
                if participant.is_agent {
                    let change = self
                        .state
                        .lock()
                        .await
                        .set_agent_state(AgentState::Initializing);
                    self.publish(change.into_iter().collect()).await;
                }
                return;
            }
            LiveKitRoomEvent::ParticipantLeft { identity } => {
                let bars = {
                    let mut visualizer = self.visualizer.lock().await;
                    visualizer.forget(identity).then(|| visualizer.bar_heights())
                };
                if let Some(bars) = bars {
                    info!(%identity, "session: agent left the room");
                    self.emit(ClientEvent::AudioLevelsUpdated(bars));
                    self.apply_signal(RoomSignal::AgentLeft).await;
                }
                return;
            }
            LiveKitRoomEvent::AudioLevelChanged { identity, level } => {
                let bars = self.visualizer.lock().await.record_level(identity, *level);
                if let Some(bars) = bars {
                    self.emit(ClientEvent::AudioLevelsUpdated(bars));
                }
                return;
            }
            LiveKitRoomEvent::ParticipantAttributesChanged { participant, .. } => {
                self.visualizer.lock().await.observe_participant(participant);
            }
            _ => {}
        }

        if let Some(signal) = RoomSignal::from_room_event(&event) {
            self.apply_signal(signal).await;
        }
    }

    async fn apply_signal(self: &Arc<Self>, signal: RoomSignal) {
        let changes = self.state.lock().await.apply(signal);
        self.publish(changes).await;
    }

    async fn publish(self: &Arc<Self>, changes: Vec<StateChange>) {
        for change in changes {
            match change {
                StateChange::TranscriptAppended(message) => {
                    self.emit(ClientEvent::TranscriptAppended(message));
                }
                StateChange::CartChanged => {
                    let (items, total) = {
                        let state = self.state.lock().await;
                        (state.cart().to_vec(), state.cart_total())
                    };
                    self.emit(ClientEvent::CartUpdated { items, total });
                }
                StateChange::SuccessOverlayRaised { generation } => {
                    self.emit(ClientEvent::SuccessOverlayChanged(true));
                    self.schedule_overlay_dismiss(generation).await;
                }
                StateChange::AgentStateChanged(state) => {
                    self.emit(ClientEvent::AgentStateChanged(state));
                }
            }
        }
    }

    async fn schedule_overlay_dismiss(self: &Arc<Self>, generation: u64) {
        let client = Arc::clone(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(SUCCESS_OVERLAY_DURATION).await;
            let dismissed = client.state.lock().await.dismiss_success_overlay(generation);
            if dismissed {
                debug!(generation, "session: success overlay dismissed");
                client.emit(ClientEvent::SuccessOverlayChanged(false));
            }
        });
        if let Some(previous) = self.overlay_timer.lock().await.replace(timer) {
            previous.abort();
        }
    }

    async fn handle_disconnect(&self, room: &Arc<dyn LiveKitRoomSession>, reason: &str) {
        {
            let mut active = self.active.lock().await;
            let current = active.as_ref().is_some_and(|active| {
                std::ptr::addr_eq(Arc::as_ptr(&active.room), Arc::as_ptr(room))
            });
            if !current {
                debug!(%reason, "session: ignoring disconnect from a replaced room");
                return;
            }
            // The task running this is the one stored in `active`; dropping the handle detaches it.
            drop(active.take());
        }
        info!(%reason, "session: room disconnected");
        self.wind_down().await;
    }

    async fn wind_down(&self) {
        if let Some(timer) = self.overlay_timer.lock().await.take() {
            timer.abort();
        }
        let (overlay_cleared, agent_change) = {
            let mut state = self.state.lock().await;
            let generation = state.overlay_generation();
            (
                state.dismiss_success_overlay(generation),
                state.set_agent_state(AgentState::Disconnected),
            )
        };
        if overlay_cleared {
            self.emit(ClientEvent::SuccessOverlayChanged(false));
        }
        if let Some(StateChange::AgentStateChanged(state)) = agent_change {
            self.emit(ClientEvent::AgentStateChanged(state));
        }

        let bars = {
            let mut visualizer = self.visualizer.lock().await;
            visualizer.reset();
            visualizer.bar_heights()
        };
        self.emit(ClientEvent::AudioLevelsUpdated(bars));
        self.emit(ClientEvent::MicrophoneChanged(false));
        self.set_phase(SessionPhase::Disconnected).await;
    }

    pub async fn set_microphone_enabled(&self, enabled: bool) -> Result<(), SessionError> {
        let room = self
            .active
            .lock()
            .await
            .as_ref()
            .map(|active| Arc::clone(&active.room))
            .ok_or(SessionError::NotConnected)?;
        room.set_microphone_enabled(enabled)
            .await
            .map_err(|err| SessionError::Microphone(format!("{err:#}")))?;
        info!(enabled, "session: microphone toggled");
        self.emit(ClientEvent::MicrophoneChanged(room.is_microphone_enabled()));
        Ok(())
    }

    /// Leaves the room and releases the event subscription. A no-op when nothing is connected.
    pub async fn stop(&self) -> Result<(), SessionError> {
        let Some(active) = self.active.lock().await.take() else {
            return Ok(());
        };
        active.event_task.abort();
        if let Err(err) = active.room.leave().await {
            warn!("session: leave failed: {err:#}");
        }
        info!(room = %active.room.room_name(), "session: stopped");
        self.wind_down().await;
        Ok(())
    }

    pub async fn snapshot(&self) -> ShopSnapshot {
        let (microphone_enabled, room_name) = match self.active.lock().await.as_ref() {
            Some(active) => (
                active.room.is_microphone_enabled(),
                Some(active.room.room_name()),
            ),
            None => (false, None),
        };
        ShopSnapshot {
            phase: self.phase().await,
            state: self.state.lock().await.clone(),
            microphone_enabled,
            room_name,
        }
    }

    pub async fn transcribe_recording(
        &self,
        audio: Vec<u8>,
        filename: Option<&str>,
        mime_type: Option<&str>,
    ) -> Result<String> {
        let filename = filename.unwrap_or(DEFAULT_RECORDING_FILENAME);
        debug!(bytes = audio.len(), filename, "session: transcribing recording");
        self.backend.transcribe_audio(audio, filename, mime_type).await
    }

    pub async fn chat(&self, turns: Vec<ChatTurn>) -> Result<String> {
        self.backend.send_chat(turns).await
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
