//! The transport seam and a blocking ureq-backed implementation.
//!
//! # Design
//! The pipeline never performs I/O itself. It hands a finished
//! `HttpRequest` to a `Transport` together with a completion closure and gets
//! a task handle back. The transport owns its list of running tasks and the
//! thread-safety of enumerating and cancelling them.
//!
//! `UreqTransport` runs each request on its own thread with a shared
//! `ureq::Agent`. A blocking ureq call cannot be interrupted, so cancelling
//! a task marks it as canceling and the eventual result is replaced with
//! `TransportError::Cancelled`.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use thiserror::Error;
use uuid::Uuid;

use crate::config::TransportConfig;
use crate::error::BoxError;
use crate::http::{HttpRequest, HttpResponse};

pub type TransportResult = Result<HttpResponse, TransportError>;

/// Invoked exactly once by the transport, on any thread.
pub type TransportCompletion = Box<dyn FnOnce(TransportResult) + Send + 'static>;

/// Lifecycle of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Canceling,
    Completed,
}

/// Failures reported by a transport instead of a response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} was cancelled")]
    Cancelled { url: String },

    #[error("no network connection for request to {url}")]
    NotConnected { url: String },

    #[error("request to {url} timed out")]
    TimedOut { url: String },

    #[error("request to {url} failed: {source}")]
    Failed {
        url: String,
        #[source]
        source: BoxError,
    },
}

impl TransportError {
    pub fn code(&self) -> i64 {
        match self {
            TransportError::Cancelled { .. } => -999,
            TransportError::TimedOut { .. } => -1001,
            TransportError::NotConnected { .. } => -1009,
            TransportError::Failed { .. } => -1,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            TransportError::Cancelled { url }
            | TransportError::NotConnected { url }
            | TransportError::TimedOut { url }
            | TransportError::Failed { url, .. } => url,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransportError::Cancelled { .. })
    }

    /// Offline or timed out, as opposed to a protocol-level failure.
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            TransportError::NotConnected { .. } | TransportError::TimedOut { .. }
        )
    }
}

/// Handle on an in-flight request.
pub trait TransportTask: Send + Sync {
    fn id(&self) -> Uuid;
    fn original_request(&self) -> &HttpRequest;
    fn state(&self) -> TaskState;
    fn cancel(&self);
}

/// Executes requests asynchronously.
pub trait Transport: Send + Sync {
    fn dispatch(&self, request: HttpRequest, completion: TransportCompletion) -> Arc<dyn TransportTask>;

    /// Tasks that have not completed yet, including those being cancelled.
    fn running_tasks(&self) -> Vec<Arc<dyn TransportTask>>;
}

const RUNNING: u8 = 0;
const CANCELING: u8 = 1;
const COMPLETED: u8 = 2;

struct UreqTask {
    id: Uuid,
    request: HttpRequest,
    state: AtomicU8,
}

impl UreqTask {
    /// Returns the state the task was in before completing.
    fn complete(&self) -> TaskState {
        decode_state(self.state.swap(COMPLETED, Ordering::SeqCst))
    }
}

impl TransportTask for UreqTask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn original_request(&self) -> &HttpRequest {
        &self.request
    }

    fn state(&self) -> TaskState {
        decode_state(self.state.load(Ordering::SeqCst))
    }

    fn cancel(&self) {
        let _ = self
            .state
            .compare_exchange(RUNNING, CANCELING, Ordering::SeqCst, Ordering::SeqCst);
    }
}

fn decode_state(raw: u8) -> TaskState {
    match raw {
        RUNNING => TaskState::Running,
        CANCELING => TaskState::Canceling,
        _ => TaskState::Completed,
    }
}

/// Thread-per-request transport over a shared `ureq::Agent`.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    tasks: Arc<Mutex<Vec<Arc<UreqTask>>>>,
}

impl UreqTransport {
    pub fn new(config: &TransportConfig) -> Self {
        // Status handling belongs to the pipeline, so 4xx/5xx come back as
        // responses rather than errors.
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout())
            .build()
            .new_agent();
        Self {
            agent,
            tasks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(&TransportConfig::default())
    }
}

impl Transport for UreqTransport {
    fn dispatch(&self, request: HttpRequest, completion: TransportCompletion) -> Arc<dyn TransportTask> {
        let task = Arc::new(UreqTask {
            id: Uuid::new_v4(),
            request,
            state: AtomicU8::new(RUNNING),
        });
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(task.clone());

        let agent = self.agent.clone();
        let tasks = self.tasks.clone();
        let running = task.clone();
        thread::spawn(move || {
            let result = execute(&agent, &running.request);
            let result = match running.complete() {
                TaskState::Canceling => Err(TransportError::Cancelled {
                    url: running.request.url.to_string(),
                }),
                _ => result,
            };
            tasks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|t| t.id != running.id);
            tracing::trace!(task = %running.id, "transport task finished");
            completion(result);
        });

        task
    }

    fn running_tasks(&self) -> Vec<Arc<dyn TransportTask>> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|t| t.clone() as Arc<dyn TransportTask>)
            .collect()
    }
}

fn execute(agent: &ureq::Agent, request: &HttpRequest) -> TransportResult {
    let mut builder = ureq::http::Request::builder()
        .method(request.method.as_str())
        .uri(request.url.as_str());
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let sent = match &request.body {
        Some(body) => {
            let http_request = builder.body(body.clone()).map_err(|e| failed(request, e))?;
            agent.run(http_request)
        }
        None => {
            let http_request = builder.body(()).map_err(|e| failed(request, e))?;
            agent.run(http_request)
        }
    };
    let mut response = sent.map_err(|e| map_error(request, e))?;

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
    let body = response
        .body_mut()
        .read_to_vec()
        .map_err(|e| map_error(request, e))?;

    Ok(HttpResponse {
        status,
        headers,
        body: Some(body),
    })
}

fn failed(request: &HttpRequest, error: impl Into<BoxError>) -> TransportError {
    TransportError::Failed {
        url: request.url.to_string(),
        source: error.into(),
    }
}

fn map_error(request: &HttpRequest, error: ureq::Error) -> TransportError {
    let url = request.url.to_string();
    match error {
        ureq::Error::Timeout(_) => TransportError::TimedOut { url },
        ureq::Error::HostNotFound | ureq::Error::ConnectionFailed => {
            TransportError::NotConnected { url }
        }
        ureq::Error::Io(e) if e.kind() == io::ErrorKind::TimedOut => TransportError::TimedOut { url },
        ureq::Error::Io(e)
            if matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::AddrNotAvailable
            ) =>
        {
            TransportError::NotConnected { url }
        }
        other => TransportError::Failed {
            url,
            source: Box::new(other),
        },
    }
}
