use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoGrant {
    #[serde(default, rename = "roomJoin", alias = "room_join")]
    pub room_join: bool,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default, rename = "canPublish", alias = "can_publish")]
    pub can_publish: Option<bool>,
    #[serde(default, rename = "canSubscribe", alias = "can_subscribe")]
    pub can_subscribe: Option<bool>,
    #[serde(default, rename = "canPublishData", alias = "can_publish_data")]
    pub can_publish_data: Option<bool>,
}

/// Claims carried by a room join credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinTokenClaims {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub video: VideoGrant,
}

impl JoinTokenClaims {
    pub fn identity(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    pub fn room(&self) -> Option<&str> {
        self.video.room.as_deref()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Error)]
pub enum TokenInspectError {
    #[error("join token is malformed: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),
}

/// Reads the claims of a join credential.
///
/// The client never holds the signing secret, so the signature is not
/// verified and expiry is reported rather than enforced.
pub fn inspect_join_token(token: &str) -> Result<JoinTokenClaims, TokenInspectError> {
    let mut validation = Validation::default();
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<JoinTokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims)
}

#[cfg(test)]
#[path = "tests/token_tests.rs"]
mod tests;
