//! View state mirrored from backend events; the UI renders only from this.

use client_core::{
    presentation,
    visualizer::{BAR_COUNT, BAR_MIN_HEIGHT},
};
use shared::domain::{AgentState, CartItem, Product, SessionPhase, TranscriptMessage};

use crate::controller::events::{UiError, UiEvent};

/// Which top-level screen the window shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Spinner only. Credential failures keep the window here.
    Loading,
    Start,
    Shop,
}

#[derive(Debug, Clone)]
pub struct ShopViewModel {
    pub phase: SessionPhase,
    pub catalog: Vec<Product>,
    pub cart: Vec<CartItem>,
    pub cart_total: f64,
    pub transcript: Vec<TranscriptMessage>,
    pub success_overlay: bool,
    pub agent_state: AgentState,
    pub bar_heights: Vec<f32>,
    pub microphone_enabled: bool,
    pub status: String,
    pub last_error: Option<UiError>,
}

impl Default for ShopViewModel {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Loading,
            catalog: Vec::new(),
            cart: Vec::new(),
            cart_total: 0.0,
            transcript: Vec::new(),
            success_overlay: false,
            agent_state: AgentState::Disconnected,
            bar_heights: vec![BAR_MIN_HEIGHT; BAR_COUNT],
            microphone_enabled: false,
            status: String::new(),
            last_error: None,
        }
    }
}

impl ShopViewModel {
    pub fn apply(&mut self, event: UiEvent) {
        match event {
            UiEvent::Info(message) => self.status = message,
            UiEvent::PhaseChanged(phase) => {
                self.phase = phase;
                if phase == SessionPhase::Connected {
                    self.last_error = None;
                }
            }
            UiEvent::CatalogLoaded(products) => self.catalog = products,
            UiEvent::TranscriptAppended(message) => self.transcript.push(message),
            UiEvent::CartUpdated { items, total } => {
                self.cart = items;
                self.cart_total = total;
            }
            UiEvent::SuccessOverlay(visible) => self.success_overlay = visible,
            UiEvent::AgentState(state) => self.agent_state = state,
            UiEvent::AudioLevels(bars) => self.bar_heights = bars,
            UiEvent::Microphone(enabled) => self.microphone_enabled = enabled,
            UiEvent::Error(err) => {
                tracing::warn!(
                    context = ?err.context(),
                    category = ?err.category(),
                    "ui: {}",
                    err.message()
                );
                self.status = err.banner_text();
                self.last_error = Some(err);
            }
        }
    }

    pub fn screen(&self) -> Screen {
        match self.phase {
            SessionPhase::Loading => Screen::Loading,
            SessionPhase::AwaitingStart | SessionPhase::Connecting => Screen::Start,
            SessionPhase::Connected | SessionPhase::Disconnected => Screen::Shop,
        }
    }

    pub fn can_start(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::AwaitingStart | SessionPhase::Disconnected
        )
    }

    /// Prompt shown in the conversation panel before anyone has spoken.
    pub fn transcript_placeholder(&self) -> Option<&'static str> {
        self.transcript
            .is_empty()
            .then_some(presentation::EMPTY_TRANSCRIPT_TEXT)
    }

        pub fn agent_is_listening(&self) -> bool {
        self.agent_state == AgentState::Listening
    }
}
