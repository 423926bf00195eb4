use shared::domain::{AgentState, CartItem, Product, SessionPhase, TranscriptMessage};

pub mod backend;
pub mod config;
pub mod presentation;
pub mod reducer;
pub mod session;
pub mod visualizer;

pub use backend::{BackendApi, BackendError, HttpBackend, DEFAULT_RECORDING_FILENAME};
pub use config::{load_settings, ClientSettings};
pub use reducer::{RoomSignal, ShopState, StateChange};
pub use session::{SessionError, ShopClient, ShopSnapshot, SUCCESS_OVERLAY_DURATION};
pub use visualizer::AudioVisualizer;

/// Everything a front end needs to mirror the session, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    PhaseChanged(SessionPhase),
    CatalogLoaded(Vec<Product>),
    TranscriptAppended(TranscriptMessage),
    CartUpdated { items: Vec<CartItem>, total: f64 },
    SuccessOverlayChanged(bool),
    AgentStateChanged(AgentState),
    AudioLevelsUpdated(Vec<f32>),
    MicrophoneChanged(bool),
    Error(String),
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
