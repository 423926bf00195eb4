use serde::{Deserialize, Serialize};

use crate::{
    domain::{ProductId, TranscriptMessage, TranscriptRole},
    error::DataEventError,
};

/// Body of `GET /token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinCredentials {
    pub token: String,
    pub livekit_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

impl From<&TranscriptMessage> for ChatTurn {
    fn from(message: &TranscriptMessage) -> Self {
        Self {
            role: message.role.label().to_string(),
            content: message.content.clone(),
        }
    }
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TranscriptRole::User.label().to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscribeResponse {
    pub transcript: String,
}

/// Order line published by the agent after a successful `create_order` tool call.
///
/// Only `product_id` and `quantity` drive the cart; the remaining fields echo
/// what the agent stored and are kept for logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_unit: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Structured payloads sent by the voice agent over the room data channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentDataEvent {
    #[serde(rename = "ORDER_CONFIRMED")]
    OrderConfirmed { data: OrderConfirmation },
    #[serde(rename = "ORDER_FINALIZED")]
    OrderFinalized,
    #[serde(other)]
    Unrecognized,
}

impl AgentDataEvent {
    pub fn to_payload(&self) -> Result<Vec<u8>, DataEventError> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub fn decode_agent_event(payload: &[u8]) -> Result<AgentDataEvent, DataEventError> {
    let text = std::str::from_utf8(payload)?;
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_order_confirmed_with_extra_agent_fields() {
        let payload = br#"{"type":"ORDER_CONFIRMED","data":{"id":"order-1a2b","product_id":"p1","name":"Cola","quantity":2,"price_per_unit":40,"total_price":80,"status":"confirmed"}}"#;
        let event = decode_agent_event(payload).expect("decode");
        match event {
            AgentDataEvent::OrderConfirmed { data } => {
                assert_eq!(data.product_id, ProductId::from("p1"));
                assert_eq!(data.quantity, 2);
                assert_eq!(data.status.as_deref(), Some("confirmed"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn decodes_order_finalized_and_unknown_tags() {
        assert_eq!(
            decode_agent_event(br#"{"type":"ORDER_FINALIZED"}"#).expect("decode"),
            AgentDataEvent::OrderFinalized
        );
        assert_eq!(
            decode_agent_event(br#"{"type":"CART_PEEK","data":{"x":1}}"#).expect("decode"),
            AgentDataEvent::Unrecognized
        );
    }

    #[test]
    fn rejects_invalid_utf8_and_malformed_json() {
        assert!(matches!(
            decode_agent_event(&[0xff, 0xfe, 0x7b]),
            Err(DataEventError::InvalidUtf8(_))
        ));
        assert!(matches!(
            decode_agent_event(b"{\"type\":"),
            Err(DataEventError::InvalidJson(_))
        ));
        assert!(matches!(
            decode_agent_event(br#"{"type":"ORDER_CONFIRMED","data":{"product_id":"p1","quantity":-2}}"#),
            Err(DataEventError::InvalidJson(_))
        ));
    }

    #[test]
    fn payload_roundtrip_keeps_wire_tag() {
        let payload = AgentDataEvent::OrderFinalized.to_payload().expect("encode");
        assert_eq!(payload, br#"{"type":"ORDER_FINALIZED"}"#.to_vec());
    }
}
