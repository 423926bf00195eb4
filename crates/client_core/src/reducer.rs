//! Folds room signals into transcript and cart state.

use std::collections::BTreeMap;

use livekit_integration::{LiveKitRoomEvent, RoomParticipant, TranscriptionSegment};
use shared::{
    domain::{AgentState, CartItem, Product, ProductId, TranscriptMessage, TranscriptRole},
    protocol::{decode_agent_event, AgentDataEvent, OrderConfirmation},
};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum RoomSignal {
    Chat {
        participant: Option<RoomParticipant>,
        message: String,
    },
    Transcription {
        participant: Option<RoomParticipant>,
        segments: Vec<TranscriptionSegment>,
    },
    Data {
        payload: Vec<u8>,
    },
    AgentAttributes {
        attributes: BTreeMap<String, String>,
    },
    AgentLeft,
}

impl RoomSignal {
    /// Maps the room events the reducer cares about; everything else is `None`.
    pub fn from_room_event(event: &LiveKitRoomEvent) -> Option<Self> {
        match event {
            LiveKitRoomEvent::ChatMessage {
                message,
                participant,
            } => Some(Self::Chat {
                participant: participant.clone(),
                message: message.clone(),
            }),
            LiveKitRoomEvent::TranscriptionReceived {
                segments,
                participant,
            } => Some(Self::Transcription {
                participant: participant.clone(),
                segments: segments.clone(),
            }),
            LiveKitRoomEvent::DataReceived { payload, .. } => Some(Self::Data {
                payload: payload.clone(),
            }),
            LiveKitRoomEvent::ParticipantAttributesChanged {
                participant,
                attributes,
            } if participant.is_agent => Some(Self::AgentAttributes {
                attributes: attributes.clone(),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StateChange {
    TranscriptAppended(TranscriptMessage),
    CartChanged,
    SuccessOverlayRaised { generation: u64 },
    AgentStateChanged(AgentState),
}

fn role_for(participant: Option<&RoomParticipant>) -> TranscriptRole {
    if participant.is_some_and(|p| p.is_agent) {
        TranscriptRole::Assistant
    } else {
        TranscriptRole::User
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShopState {
    transcript: Vec<TranscriptMessage>,
    cart: Vec<CartItem>,
    catalog: Vec<Product>,
    success_overlay: bool,
    overlay_generation: u64,
    agent_state: AgentState,
}

impl ShopState {
    pub fn transcript(&self) -> &[TranscriptMessage] {
        &self.transcript
    }

    pub fn cart(&self) -> &[CartItem] {
        &self.cart
    }

    pub fn catalog(&self) -> &[Product] {
        &self.catalog
    }

    pub fn success_overlay(&self) -> bool {
        self.success_overlay
    }

    pub fn overlay_generation(&self) -> u64 {
        self.overlay_generation
    }

    pub fn agent_state(&self) -> AgentState {
        self.agent_state
    }

    pub fn cart_total(&self) -> f64 {
        self.cart.iter().map(CartItem::line_total).sum()
    }

    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.cart
            .iter()
            .find(|item| item.id() == product_id)
            .map(|item| item.quantity)
            .unwrap_or(0)
    }

    pub fn set_catalog(&mut self, products: Vec<Product>) {
        self.catalog = products;
    }

    pub fn set_agent_state(&mut self, state: AgentState) -> Option<StateChange> {
        if self.agent_state == state {
            return None;
        }
        self.agent_state = state;
        Some(StateChange::AgentStateChanged(state))
    }

    /// Clears the success overlay if `generation` is still the latest one raised.
    pub fn dismiss_success_overlay(&mut self, generation: u64) -> bool {
        if !self.success_overlay || generation != self.overlay_generation {
            return false;
        }
        self.success_overlay = false;
        true
    }

    pub fn apply(&mut self, signal: RoomSignal) -> Vec<StateChange> {
        match signal {
            RoomSignal::Chat {
                participant,
                message,
            } => {
                let entry = TranscriptMessage::new(role_for(participant.as_ref()), message);
                self.transcript.push(entry.clone());
                vec![StateChange::TranscriptAppended(entry)]
            }
            RoomSignal::Transcription {
                participant,
                segments,
            } => {
                let role = role_for(participant.as_ref());
                // Every final segment in the batch is appended, not only the first.
                segments
                    .into_iter()
                    .filter(|segment| segment.is_final)
                    .map(|segment| {
                        let entry = TranscriptMessage::new(role, segment.text);
                        self.transcript.push(entry.clone());
                        StateChange::TranscriptAppended(entry)
                    })
                    .collect()
            }
            RoomSignal::Data { payload } => match decode_agent_event(&payload) {
                Ok(event) => self.apply_agent_event(event),
                Err(err) => {
                    warn!(bytes = payload.len(), "reducer: dropping data payload: {err}");
                    Vec::new()
                }
            },
            RoomSignal::AgentAttributes { attributes } => attributes
                .get(AgentState::ATTRIBUTE_KEY)
                .and_then(|value| self.set_agent_state(AgentState::from_attribute(value)))
                .into_iter()
                .collect(),
            RoomSignal::AgentLeft => self
                .set_agent_state(AgentState::Disconnected)
                .into_iter()
                .collect(),
        }
    }

    fn apply_agent_event(&mut self, event: AgentDataEvent) -> Vec<StateChange> {
        match event {
            AgentDataEvent::OrderConfirmed { data } => self.confirm_order(data),
            AgentDataEvent::OrderFinalized => {
                self.cart.clear();
                self.success_overlay = true;
                self.overlay_generation += 1;
                info!(generation = self.overlay_generation, "reducer: order finalized");
                vec![
                    StateChange::CartChanged,
                    StateChange::SuccessOverlayRaised {
                        generation: self.overlay_generation,
                    },
                ]
            }
            AgentDataEvent::Unrecognized => {
                debug!("reducer: ignoring unrecognized agent event");
                Vec::new()
            }
        }
    }

    fn confirm_order(&mut self, order: OrderConfirmation) -> Vec<StateChange> {
        // A zero quantity never creates or changes a cart line.
        if order.quantity == 0 {
            debug!(product_id = %order.product_id, "reducer: ignoring zero-quantity order");
            return Vec::new();
        }
        let Some(product) = self.catalog.iter().find(|p| p.id == order.product_id) else {
            debug!(product_id = %order.product_id, "reducer: order references unknown product");
            return Vec::new();
        };

        match self
            .cart
            .iter_mut()
            .find(|item| item.id() == &order.product_id)
        {
            Some(item) => item.quantity = item.quantity.saturating_add(order.quantity),
            None => self.cart.push(CartItem::new(product.clone(), order.quantity)),
        }
        info!(
            product_id = %order.product_id,
            quantity = order.quantity,
            cart_lines = self.cart.len(),
            "reducer: order confirmed"
        );
        vec![StateChange::CartChanged]
    }
}

#[cfg(test)]
#[path = "tests/reducer_tests.rs"]
mod tests;
