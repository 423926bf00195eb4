//! UI/backend events and error modeling for the desktop GUI controller.

use client_core::ClientEvent;
use shared::domain::{AgentState, CartItem, Product, SessionPhase, TranscriptMessage};

#[derive(Debug, Clone)]
pub enum UiEvent {
    Info(String),
    PhaseChanged(SessionPhase),
    CatalogLoaded(Vec<Product>),
    TranscriptAppended(TranscriptMessage),
    CartUpdated { items: Vec<CartItem>, total: f64 },
    SuccessOverlay(bool),
    AgentState(AgentState),
    AudioLevels(Vec<f32>),
    Microphone(bool),
    Error(UiError),
}

impl From<ClientEvent> for UiEvent {
    fn from(event: ClientEvent) -> Self {
        match event {
            ClientEvent::PhaseChanged(phase) => Self::PhaseChanged(phase),
            ClientEvent::CatalogLoaded(products) => Self::CatalogLoaded(products),
            ClientEvent::TranscriptAppended(message) => Self::TranscriptAppended(message),
            ClientEvent::CartUpdated { items, total } => Self::CartUpdated { items, total },
            ClientEvent::SuccessOverlayChanged(visible) => Self::SuccessOverlay(visible),
            ClientEvent::AgentStateChanged(state) => Self::AgentState(state),
            ClientEvent::AudioLevelsUpdated(bars) => Self::AudioLevels(bars),
            ClientEvent::MicrophoneChanged(enabled) => Self::Microphone(enabled),
            ClientEvent::Error(message) => {
                Self::Error(UiError::from_message(UiErrorContext::Session, message))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorCategory {
    Configuration,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiErrorContext {
    BackendStartup,
    Session,
    Microphone,
}

pub fn classify_bootstrap_failure(message: &str) -> String {
    let lower = message.to_ascii_lowercase();
    if lower.contains("backend worker startup failure") {
        "Backend worker startup failure; restart the app.".to_string()
    } else if lower.contains("livekit_api_key") || lower.contains("livekit_api_secret") {
        "The shop backend has no media credentials configured.".to_string()
    } else if lower.contains("error sending request")
        || lower.contains("connection refused")
        || lower.contains("dns")
        || lower.contains("timed out")
    {
        "Shop backend unreachable; check backend_url and restart.".to_string()
    } else {
        format!("Could not prepare the session: {message}")
    }
}

#[derive(Debug, Clone)]
pub struct UiError {
    category: UiErrorCategory,
    context: UiErrorContext,
    message: String,
}

impl UiError {
    pub fn from_message(context: UiErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let message_lower = message.to_ascii_lowercase();
        let category = if message_lower.contains("not set")
            || message_lower.contains("unavailable")
            || message_lower.contains("scheme")
            || message_lower.contains("replay")
        {
            UiErrorCategory::Configuration
        } else if message_lower.contains("timeout")
            || message_lower.contains("timed out")
            || message_lower.contains("connect")
            || message_lower.contains("network")
            || message_lower.contains("request")
        {
            UiErrorCategory::Transport
        } else if message_lower.contains("invalid")
            || message_lower.contains("missing")
            || message_lower.contains("malformed")
        {
            UiErrorCategory::Validation
        } else {
            UiErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    pub fn category(&self) -> UiErrorCategory {
        self.category
    }

    pub fn context(&self) -> UiErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text for the status banner.
    pub fn banner_text(&self) -> String {
        format!("{}: {}", category_label(self.category), self.message)
    }
}

pub fn category_label(category: UiErrorCategory) -> &'static str {
    match category {
        UiErrorCategory::Configuration => "Configuration",
        UiErrorCategory::Transport => "Connection",
        UiErrorCategory::Validation => "Validation",
        UiErrorCategory::Unknown => "Unexpected",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_missing_media_keys_as_configuration() {
        let message = "/token returned 500: LIVEKIT_API_KEY or LIVEKIT_API_SECRET not set";
        let err = UiError::from_message(UiErrorContext::Session, message);
        assert_eq!(err.category(), UiErrorCategory::Configuration);
        assert_eq!(
            classify_bootstrap_failure(message),
            "The shop backend has no media credentials configured."
        );
    }

    #[test]
    fn classifies_refused_connection_as_transport() {
        let err = UiError::from_message(
            UiErrorContext::Session,
            "failed to connect livekit room: signal connection refused",
        );
        assert_eq!(err.category(), UiErrorCategory::Transport);
        assert!(err.banner_text().starts_with("Connection: "));
    }

    #[test]
    fn unreachable_backend_gets_actionable_bootstrap_text() {
        assert_eq!(
            classify_bootstrap_failure(
                "request to /token failed: error sending request for url (http://localhost:8000/token)"
            ),
            "Shop backend unreachable; check backend_url and restart."
        );
    }

    #[test]
    fn client_errors_become_session_errors() {
        match UiEvent::from(ClientEvent::Error("boom".into())) {
            UiEvent::Error(err) => {
                assert_eq!(err.context(), UiErrorContext::Session);
                assert_eq!(err.category(), UiErrorCategory::Unknown);
                assert_eq!(err.message(), "boom");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
