//! SOAP 1.2 client plumbing for ONVIF devices
//!
//! This crate builds and parses SOAP envelopes, signs requests with a
//! WS-Security UsernameToken and moves them over a pluggable [`Transport`].
//! It knows nothing about individual ONVIF operations; the typed layer lives
//! in `onvif-api`.

pub mod auth;
pub mod capture;
pub mod envelope;
mod error;
pub mod fault;
pub mod time;
pub mod transport;
pub mod xml;

pub use auth::{Credentials, UsernameToken};
pub use capture::{CaptureTransport, CapturedExchange, ReplayTransport};
pub use error::{Result, SoapError};
pub use fault::Fault;
pub use transport::{HttpTransport, Transport, TransportError, TransportRequest, TransportResponse};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use xmltree::Element;

/// Per-call bounds. The call fails with [`SoapError::DeadlineExceeded`] once
/// `timeout` elapses and with [`SoapError::Canceled`] when `cancel` fires.
///
/// Canceling after the request left this process does not retract it: a
/// state-changing operation may still be applied by the device.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            cancel: None,
        }
    }

    pub fn cancel_on(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Run `fut` under these bounds. Cancellation wins over the deadline,
    /// which wins over completion, when several are ready at once.
    pub async fn bound<F, T>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let canceled = async {
            match &self.cancel {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = canceled => Err(SoapError::Canceled { operation: operation.to_string() }),
            _ = deadline => Err(SoapError::DeadlineExceeded { operation: operation.to_string() }),
            result = fut => result,
        }
    }
}

/// Everything needed to issue one SOAP operation
#[derive(Debug, Clone, Copy)]
pub struct SoapRequest<'a> {
    pub endpoint: &'a str,
    /// Service namespace URI, used to build the action URI
    pub namespace: &'a str,
    /// Prefix of the operation element, must be one declared on the envelope
    pub prefix: &'a str,
    pub action: &'a str,
    /// Inner XML of the operation element
    pub payload: &'a str,
    pub security: Option<&'a UsernameToken>,
}

/// Thin SOAP client: one request, one reply, no retries.
#[derive(Debug, Clone)]
pub struct SoapClient {
    transport: Arc<dyn Transport>,
}

impl SoapClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client over a default [`HttpTransport`]
    pub fn http() -> Result<Self> {
        let transport = HttpTransport::new().map_err(|e| SoapError::Transport {
            operation: "init".to_string(),
            message: e.to_string(),
        })?;
        Ok(Self::new(Arc::new(transport)))
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Send a request and return the `{action}Response` element.
    pub async fn call(&self, request: SoapRequest<'_>, options: &CallOptions) -> Result<Element> {
        let body = envelope::operation_element(request.prefix, request.action, request.payload);
        let raw = envelope::build_request(&body, request.security);
        let transport_request = TransportRequest {
            url: request.endpoint.to_string(),
            action: format!("{}/{}", request.namespace, request.action),
            operation: request.action.to_string(),
            body: raw,
        };

        tracing::debug!("sending {} to {}", request.action, request.endpoint);
        let exchange = async {
            self.transport
                .exchange(transport_request)
                .await
                .map_err(|e| match e {
                    TransportError::Timeout => SoapError::DeadlineExceeded {
                        operation: request.action.to_string(),
                    },
                    other => SoapError::Transport {
                        operation: request.action.to_string(),
                        message: other.to_string(),
                    },
                })
        };

        let result = options
            .bound(request.action, exchange)
            .await
            .and_then(|response| envelope::extract_response(&response.body, request.action));
        if let Err(e) = &result {
            tracing::debug!("{} failed: {}", request.action, e);
        }
        result
    }
}
