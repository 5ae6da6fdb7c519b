//! Recording and replaying exchanges
//!
//! [`CaptureTransport`] wraps a live transport and keeps every exchange it
//! sees, optionally mirroring them to a directory as
//! `NNNN_<Operation>_request.xml` / `NNNN_<Operation>_response.xml` plus one
//! JSON line per exchange in `exchanges.jsonl`. [`ReplayTransport`] serves
//! such recordings back by operation name in capture order.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::envelope;
use crate::transport::{Transport, TransportError, TransportRequest, TransportResponse};

const METADATA_FILE: &str = "exchanges.jsonl";

/// One recorded request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedExchange {
    /// Starts at 1 for each capture instance
    pub sequence: u64,
    pub operation: String,
    pub request: String,
    /// `None` when the exchange failed at the transport level
    pub response: Option<String>,
    pub status: Option<u16>,
}

impl CapturedExchange {
    fn file_stem(&self) -> String {
        format!("{:04}_{}", self.sequence, self.operation)
    }
}

#[derive(Debug)]
pub struct CaptureTransport<T> {
    inner: T,
    counter: AtomicU64,
    exchanges: Mutex<Vec<CapturedExchange>>,
    directory: Option<PathBuf>,
}

impl<T: Transport> CaptureTransport<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            counter: AtomicU64::new(0),
            exchanges: Mutex::new(Vec::new()),
            directory: None,
        }
    }

    /// Also persist every exchange under `dir` (created if missing).
    pub fn with_directory(inner: T, dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            directory: Some(dir),
            ..Self::new(inner)
        })
    }

    /// Snapshot of everything captured so far, in sequence order.
    pub fn exchanges(&self) -> Vec<CapturedExchange> {
        let mut out = self.exchanges.lock().clone();
        out.sort_by_key(|e| e.sequence);
        out
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    fn persist(&self, dir: &Path, exchange: &CapturedExchange) -> std::io::Result<()> {
        let stem = exchange.file_stem();
        fs::write(dir.join(format!("{}_request.xml", stem)), &exchange.request)?;
        if let Some(response) = &exchange.response {
            fs::write(dir.join(format!("{}_response.xml", stem)), response)?;
        }
        let line = serde_json::to_string(&ExchangeMetadata::from(exchange))
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(METADATA_FILE))?;
        writeln!(file, "{}", line)
    }
}

/// Per-exchange line in `exchanges.jsonl`
#[derive(Debug, Serialize, Deserialize)]
struct ExchangeMetadata {
    sequence: u64,
    operation: String,
    status: Option<u16>,
    request_file: String,
    response_file: Option<String>,
}

impl From<&CapturedExchange> for ExchangeMetadata {
    fn from(exchange: &CapturedExchange) -> Self {
        let stem = exchange.file_stem();
        Self {
            sequence: exchange.sequence,
            operation: exchange.operation.clone(),
            status: exchange.status,
            request_file: format!("{}_request.xml", stem),
            response_file: exchange
                .response
                .as_ref()
                .map(|_| format!("{}_response.xml", stem)),
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for CaptureTransport<T> {
    async fn exchange(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let sequence = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let operation = envelope::detect_operation(&request.body)
            .unwrap_or_else(|| request.operation.clone());
        let request_body = request.body.clone();

        let result = self.inner.exchange(request).await;

        let exchange = CapturedExchange {
            sequence,
            operation,
            request: request_body,
            response: result.as_ref().ok().map(|r| r.body.clone()),
            status: result.as_ref().ok().map(|r| r.status),
        };
        if let Some(dir) = &self.directory {
            if let Err(e) = self.persist(dir, &exchange) {
                tracing::warn!("failed to persist exchange {}: {}", exchange.file_stem(), e);
            }
        }
        self.exchanges.lock().push(exchange);
        result
    }
}

/// Serves recorded responses by operation name, oldest first.
#[derive(Debug, Default)]
pub struct ReplayTransport {
    queues: Mutex<HashMap<String, VecDeque<CapturedExchange>>>,
    served: Mutex<Vec<String>>,
}

impl ReplayTransport {
    pub fn new(exchanges: impl IntoIterator<Item = CapturedExchange>) -> Self {
        let mut sorted: Vec<_> = exchanges.into_iter().collect();
        sorted.sort_by_key(|e| e.sequence);
        let mut queues: HashMap<String, VecDeque<CapturedExchange>> = HashMap::new();
        for exchange in sorted {
            queues
                .entry(exchange.operation.clone())
                .or_default()
                .push_back(exchange);
        }
        Self {
            queues: Mutex::new(queues),
            served: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for tests: one canned response body per operation.
    pub fn from_responses<'a>(responses: impl IntoIterator<Item = (&'a str, String)>) -> Self {
        Self::new(responses.into_iter().enumerate().map(|(i, (op, body))| {
            CapturedExchange {
                sequence: i as u64 + 1,
                operation: op.to_string(),
                request: String::new(),
                response: Some(body),
                status: Some(200),
            }
        }))
    }

    /// Load a directory written by [`CaptureTransport::with_directory`].
    pub fn from_directory(dir: impl AsRef<Path>) -> std::io::Result<Self> {
        let dir = dir.as_ref();
        let metadata = fs::read_to_string(dir.join(METADATA_FILE))?;
        let mut exchanges = Vec::new();
        for line in metadata.lines().filter(|l| !l.trim().is_empty()) {
            let meta: ExchangeMetadata = serde_json::from_str(line)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let request = fs::read_to_string(dir.join(&meta.request_file))?;
            let response = match &meta.response_file {
                Some(file) => Some(fs::read_to_string(dir.join(file))?),
                None => None,
            };
            exchanges.push(CapturedExchange {
                sequence: meta.sequence,
                operation: meta.operation,
                request,
                response,
                status: meta.status,
            });
        }
        Ok(Self::new(exchanges))
    }

    /// Operations requested so far, in request order.
    pub fn served(&self) -> Vec<String> {
        self.served.lock().clone()
    }

    /// Recorded exchanges not yet consumed.
    pub fn remaining(&self) -> usize {
        self.queues.lock().values().map(VecDeque::len).sum()
    }
}

#[async_trait]
impl Transport for ReplayTransport {
    async fn exchange(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let operation = envelope::detect_operation(&request.body).unwrap_or(request.operation);
        self.served.lock().push(operation.clone());

        let next = self
            .queues
            .lock()
            .get_mut(&operation)
            .and_then(VecDeque::pop_front);
        match next {
            Some(CapturedExchange {
                response: Some(body),
                status,
                ..
            }) => Ok(TransportResponse {
                status: status.unwrap_or(200),
                body,
            }),
            Some(_) => Err(TransportError::Connect(format!(
                "recorded {} exchange failed",
                operation
            ))),
            None => Err(TransportError::NoRecording(operation)),
        }
    }
}
