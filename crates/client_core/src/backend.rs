use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use shared::{
    domain::Product,
    error::ErrorDetail,
    protocol::{ChatRequest, ChatResponse, ChatTurn, JoinCredentials, TranscribeResponse},
};
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_RECORDING_FILENAME: &str = "recording.webm";
const DEFAULT_RECORDING_MIME: &str = "audio/webm";

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {detail}")]
    Status {
        endpoint: &'static str,
        status: u16,
        detail: String,
    },
    #[error("unexpected response body from {endpoint}: {source}")]
    Decode {
        endpoint: &'static str,
        source: reqwest::Error,
    },
    #[error("invalid audio mime type '{0}'")]
    InvalidMimeType(String),
}

/// The HTTP surface of the shopping backend.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn fetch_join_credentials(&self) -> Result<JoinCredentials>;
    async fn fetch_products(&self) -> Result<Vec<Product>>;
    async fn transcribe_audio(
        &self,
        audio: Vec<u8>,
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<String>;
    async fn send_chat(&self, messages: Vec<ChatTurn>) -> Result<String>;
}

pub struct HttpBackend {
    http: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BackendError::Client)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &'static str,
    ) -> Result<T, BackendError> {
        debug!(endpoint, "backend: GET");
        let response = self
            .http
            .get(self.url(endpoint))
            .send()
            .await
            .map_err(|source| BackendError::Request { endpoint, source })?;
        decode_json(endpoint, response).await
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    endpoint: &'static str,
    response: Response,
) -> Result<T, BackendError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorDetail>(&body)
            .map(|detail| detail.message())
            .unwrap_or_else(|_| body.trim().to_string());
        return Err(BackendError::Status {
            endpoint,
            status: status.as_u16(),
            detail,
        });
    }
    response
        .json::<T>()
        .await
        .map_err(|source| BackendError::Decode { endpoint, source })
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch_join_credentials(&self) -> Result<JoinCredentials> {
        Ok(self.get_json("/token").await?)
    }

    async fn fetch_products(&self) -> Result<Vec<Product>> {
        Ok(self.get_json("/products").await?)
    }

    async fn transcribe_audio(
        &self,
        audio: Vec<u8>,
        filename: &str,
        mime_type: Option<&str>,
    ) -> Result<String> {
        const ENDPOINT: &str = "/transcribe";
        let mime_type = mime_type.unwrap_or(DEFAULT_RECORDING_MIME);
        let part = multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(mime_type)
            .map_err(|_| BackendError::InvalidMimeType(mime_type.to_string()))?;
        let form = multipart::Form::new().part("file", part);

        debug!(endpoint = ENDPOINT, filename, mime_type, "backend: POST multipart");
        let response = self
            .http
            .post(self.url(ENDPOINT))
            .multipart(form)
            .send()
            .await
            .map_err(|source| BackendError::Request {
                endpoint: ENDPOINT,
                source,
            })?;
        let body: TranscribeResponse = decode_json(ENDPOINT, response).await?;
        Ok(body.transcript)
    }

    async fn send_chat(&self, messages: Vec<ChatTurn>) -> Result<String> {
        const ENDPOINT: &str = "/chat";
        debug!(endpoint = ENDPOINT, turns = messages.len(), "backend: POST");
        let response = self
            .http
            .post(self.url(ENDPOINT))
            .json(&ChatRequest { messages })
            .send()
            .await
            .map_err(|source| BackendError::Request {
                endpoint: ENDPOINT,
                source,
            })?;
        let body: ChatResponse = decode_json(ENDPOINT, response).await?;
        Ok(body.response)
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
