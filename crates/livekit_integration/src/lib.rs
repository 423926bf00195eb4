use std::{collections::BTreeMap, sync::Arc};

use anyhow::anyhow;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use url::Url;

pub mod scripted;
pub mod token;

pub use scripted::{ScriptError, ScriptedEvent, ScriptedRoomConnector, ScriptedStep};
pub use token::{inspect_join_token, JoinTokenClaims, TokenInspectError, VideoGrant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveKitRoomOptions {
    pub server_url: String,
    pub token: String,
    pub publish_microphone: bool,
    pub auto_subscribe_audio: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomParticipant {
    pub identity: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub is_agent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionSegment {
    pub id: String,
    pub text: String,
    #[serde(rename = "final", default)]
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveKitRoomEvent {
    ParticipantJoined(RoomParticipant),
    ParticipantLeft {
        identity: String,
    },
    ChatMessage {
        message: String,
        participant: Option<RoomParticipant>,
    },
    TranscriptionReceived {
        segments: Vec<TranscriptionSegment>,
        participant: Option<RoomParticipant>,
    },
    DataReceived {
        payload: Vec<u8>,
        topic: Option<String>,
        participant: Option<RoomParticipant>,
    },
    ParticipantAttributesChanged {
        participant: RoomParticipant,
        attributes: BTreeMap<String, String>,
    },
    AudioLevelChanged {
        identity: String,
        level: f32,
    },
    Disconnected {
        reason: String,
    },
}

#[async_trait]
pub trait LiveKitRoomSession: Send + Sync {
    async fn set_microphone_enabled(&self, enabled: bool) -> anyhow::Result<()>;
    fn is_microphone_enabled(&self) -> bool;
    async fn leave(&self) -> anyhow::Result<()>;
    fn room_name(&self) -> String;
    fn subscribe_events(&self) -> broadcast::Receiver<LiveKitRoomEvent>;
}

#[async_trait]
pub trait LiveKitRoomConnector: Send + Sync {
    async fn connect(
        &self,
        options: LiveKitRoomOptions,
    ) -> anyhow::Result<Arc<dyn LiveKitRoomSession>>;
}

pub struct MissingLiveKitConnector;

#[async_trait]
impl LiveKitRoomConnector for MissingLiveKitConnector {
    async fn connect(
        &self,
        options: LiveKitRoomOptions,
    ) -> anyhow::Result<Arc<dyn LiveKitRoomSession>> {
        Err(anyhow!(
            "livekit connector is unavailable for {}",
            options.server_url
        ))
    }
}

#[derive(Debug, Error)]
pub enum ServerUrlError {
    #[error("livekit url is empty")]
    Empty,
    #[error("livekit url '{url}' is invalid: {source}")]
    Invalid {
        url: String,
        source: url::ParseError,
    },
    #[error("livekit url scheme '{0}' is not supported")]
    UnsupportedScheme(String),
}

/// Checks the `livekit_url` handed out by the token endpoint before connecting.
pub fn validate_server_url(raw: &str) -> Result<Url, ServerUrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ServerUrlError::Empty);
    }
    let url = Url::parse(trimmed).map_err(|source| ServerUrlError::Invalid {
        url: trimmed.to_string(),
        source,
    })?;
    match url.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(url),
        other => Err(ServerUrlError::UnsupportedScheme(other.to_string())),
    }
}
