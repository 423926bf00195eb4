//! Replays a recorded room session from a JSON Lines script.
//!
//! Each line is a [`ScriptedStep`]: a delay relative to the previous step and
//! the room event to emit. Replay starts once the first subscriber attaches,
//! so early events are never dropped by the broadcast channel.

use std::{
    collections::BTreeMap,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    token::inspect_join_token, LiveKitRoomConnector, LiveKitRoomEvent, LiveKitRoomOptions,
    LiveKitRoomSession, RoomParticipant, TranscriptionSegment,
};

const SCRIPTED_EVENT_CAPACITY: usize = 256;
const SCRIPTED_ROOM_FALLBACK_NAME: &str = "scripted-room";

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to read replay script '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("replay script line {line}: {source}")]
    Parse {
        line: usize,
        source: serde_json::Error,
    },
    #[error("data step needs exactly one of `json` or `text`")]
    AmbiguousData,
    #[error("data step json could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScriptedEvent {
    ParticipantJoined {
        participant: RoomParticipant,
    },
    ParticipantLeft {
        identity: String,
    },
    Chat {
        message: String,
        #[serde(default)]
        participant: Option<RoomParticipant>,
    },
    Transcription {
        segments: Vec<TranscriptionSegment>,
        #[serde(default)]
        participant: Option<RoomParticipant>,
    },
    Data {
        #[serde(default)]
        json: Option<serde_json::Value>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        topic: Option<String>,
        #[serde(default)]
        participant: Option<RoomParticipant>,
    },
    Attributes {
        participant: RoomParticipant,
        attributes: BTreeMap<String, String>,
    },
    AudioLevel {
        identity: String,
        level: f32,
    },
    Disconnected {
        reason: String,
    },
}

impl ScriptedEvent {
    pub fn to_room_event(&self) -> Result<LiveKitRoomEvent, ScriptError> {
        let event = match self.clone() {
            Self::ParticipantJoined { participant } => {
                LiveKitRoomEvent::ParticipantJoined(participant)
            }
            Self::ParticipantLeft { identity } => LiveKitRoomEvent::ParticipantLeft { identity },
            Self::Chat {
                message,
                participant,
            } => LiveKitRoomEvent::ChatMessage {
                message,
                participant,
            },
            Self::Transcription {
                segments,
                participant,
            } => LiveKitRoomEvent::TranscriptionReceived {
                segments,
                participant,
            },
            Self::Data {
                json,
                text,
                topic,
                participant,
            } => {
                let payload = match (json, text) {
                    (Some(value), None) => serde_json::to_vec(&value)?,
                    (None, Some(text)) => text.into_bytes(),
                    _ => return Err(ScriptError::AmbiguousData),
                };
                LiveKitRoomEvent::DataReceived {
                    payload,
                    topic,
                    participant,
                }
            }
            Self::Attributes {
                participant,
                attributes,
            } => LiveKitRoomEvent::ParticipantAttributesChanged {
                participant,
                attributes,
            },
            Self::AudioLevel { identity, level } => {
                LiveKitRoomEvent::AudioLevelChanged { identity, level }
            }
            Self::Disconnected { reason } => LiveKitRoomEvent::Disconnected { reason },
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedStep {
    #[serde(default)]
    pub after_ms: u64,
    pub event: ScriptedEvent,
}

pub fn parse_script(text: &str) -> Result<Vec<ScriptedStep>, ScriptError> {
    let mut steps = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        let step: ScriptedStep = serde_json::from_str(line).map_err(|source| ScriptError::Parse {
            line: index + 1,
            source,
        })?;
        step.event.to_room_event()?;
        steps.push(step);
    }
    Ok(steps)
}

#[derive(Debug, Clone)]
pub struct ScriptedRoomConnector {
    steps: Arc<Vec<ScriptedStep>>,
}

impl ScriptedRoomConnector {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Arc::new(steps),
        }
    }

    pub fn from_jsonl(text: &str) -> Result<Self, ScriptError> {
        parse_script(text).map(Self::new)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ScriptError::Read {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_jsonl(&text)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}

#[async_trait]
impl LiveKitRoomConnector for ScriptedRoomConnector {
    async fn connect(
        &self,
        options: LiveKitRoomOptions,
    ) -> anyhow::Result<Arc<dyn LiveKitRoomSession>> {
        let room_name = inspect_join_token(&options.token)
            .ok()
            .and_then(|claims| claims.video.room)
            .unwrap_or_else(|| SCRIPTED_ROOM_FALLBACK_NAME.to_string());
        let (events, _) = broadcast::channel(SCRIPTED_EVENT_CAPACITY);
        info!(
            room = %room_name,
            steps = self.steps.len(),
            server_url = %options.server_url,
            "scripted room: connected"
        );
        Ok(Arc::new(ScriptedRoomSession {
            room_name,
            steps: Arc::clone(&self.steps),
            events,
            microphone_enabled: AtomicBool::new(options.publish_microphone),
            replay_started: AtomicBool::new(false),
            replay_task: Mutex::new(None),
        }))
    }
}

struct ScriptedRoomSession {
    room_name: String,
    steps: Arc<Vec<ScriptedStep>>,
    events: broadcast::Sender<LiveKitRoomEvent>,
    microphone_enabled: AtomicBool,
    replay_started: AtomicBool,
    replay_task: Mutex<Option<JoinHandle<()>>>,
}

impl ScriptedRoomSession {
    fn start_replay_once(&self) {
        if self.replay_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(room = %self.room_name, "scripted room: no runtime available, replay skipped");
            return;
        };

        let steps = Arc::clone(&self.steps);
        let events = self.events.clone();
        let task = runtime.spawn(async move {
            for step in steps.iter() {
                if step.after_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(step.after_ms)).await;
                }
                match step.event.to_room_event() {
                    Ok(event) => {
                        if events.send(event).is_err() {
                            debug!("scripted room: no subscribers left, stopping replay");
                            break;
                        }
                    }
                    Err(err) => warn!("scripted room: skipping step: {err}"),
                }
            }
        });

        if let Ok(mut guard) = self.replay_task.lock() {
            *guard = Some(task);
        }
    }
}

#[async_trait]
impl LiveKitRoomSession for ScriptedRoomSession {
    async fn set_microphone_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.microphone_enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    fn is_microphone_enabled(&self) -> bool {
        self.microphone_enabled.load(Ordering::SeqCst)
    }

    async fn leave(&self) -> anyhow::Result<()> {
        let task = self
            .replay_task
            .lock()
            .map(|mut guard| guard.take())
            .unwrap_or(None);
        if let Some(task) = task {
            task.abort();
        }
        let _ = self.events.send(LiveKitRoomEvent::Disconnected {
            reason: "client left".to_string(),
        });
        Ok(())
    }

    fn room_name(&self) -> String {
        self.room_name.clone()
    }

    fn subscribe_events(&self) -> broadcast::Receiver<LiveKitRoomEvent> {
        let receiver = self.events.subscribe();
        self.start_replay_once();
        receiver
    }
}

#[cfg(test)]
#[path = "tests/scripted_tests.rs"]
mod tests;
