//! Transport seam between the envelope codec and the network

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One request/response exchange handed to a transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    /// Full SOAP action URI (`{namespace}/{operation}`)
    pub action: String,
    /// Operation local name, used by capture and replay
    pub operation: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status} with empty body")]
    Status { status: u16 },

    #[error("no recorded exchange for {0}")]
    NoRecording(String),

    #[error("{0}")]
    Other(String),
}

/// Moves a serialized envelope to a peer and returns the raw reply.
///
/// Implementations must hand back non-2xx replies that carry a body, since
/// SOAP faults arrive as HTTP 400/500.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    async fn exchange(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// HTTP POST transport built on reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn exchange(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let content_type = format!(
            "application/soap+xml; charset=utf-8; action=\"{}\"",
            request.action
        );
        let response = self
            .client
            .post(&request.url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(request.body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Connect(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;

        if !(200..300).contains(&status) && body.trim().is_empty() {
            return Err(TransportError::Status { status });
        }
        Ok(TransportResponse { status, body })
    }
}
