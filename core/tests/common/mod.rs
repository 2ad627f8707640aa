//! Shared fixtures for the dispatch tests: a transport completed by hand and
//! a behavior that records its hooks.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use base_network::{
    ApiError, Completion, HttpRequest, HttpResponse, RequestBehavior, RetryToken, TaskState,
    Transport, TransportError, TransportTask,
};
use base_network::transport::TransportCompletion;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Thing {
    pub name: String,
    pub number: i64,
}

pub const THING_JSON: &[u8] = br#"{"name":"test","number":1}"#;

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

// ---------------------------------------------------------------------------
// Stub transport
// ---------------------------------------------------------------------------

pub struct StubTask {
    id: Uuid,
    request: HttpRequest,
    state: Mutex<TaskState>,
    completion: Mutex<Option<TransportCompletion>>,
}

impl StubTask {
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn respond(&self, status: u16, body: &[u8]) {
        self.finish(Ok(HttpResponse::new(status, body.to_vec())));
    }

    pub fn fail(&self, error: TransportError) {
        self.finish(Err(error));
    }

    fn finish(&self, result: Result<HttpResponse, TransportError>) {
        *self.state.lock().unwrap() = TaskState::Completed;
        let completion = self.completion.lock().unwrap().take();
        if let Some(completion) = completion {
            completion(result);
        }
    }
}

impl TransportTask for StubTask {
    fn id(&self) -> Uuid {
        self.id
    }

    fn original_request(&self) -> &HttpRequest {
        &self.request
    }

    fn state(&self) -> TaskState {
        *self.state.lock().unwrap()
    }

    /// Completes immediately with `Cancelled`, like a platform session does.
    fn cancel(&self) {
        {
            let mut state = self.state.lock().unwrap();
            if *state != TaskState::Running {
                return;
            }
            *state = TaskState::Canceling;
        }
        self.fail(TransportError::Cancelled {
            url: self.request.url.to_string(),
        });
    }
}

/// Records every dispatched request and leaves completion to the test.
#[derive(Default)]
pub struct StubTransport {
    tasks: Mutex<Vec<Arc<StubTask>>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn task(&self, index: usize) -> Arc<StubTask> {
        self.tasks.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> Arc<StubTask> {
        self.tasks.lock().unwrap().last().cloned().expect("no request dispatched")
    }

    pub fn dispatched(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.request.clone())
            .collect()
    }
}

impl Transport for StubTransport {
    fn dispatch(&self, request: HttpRequest, completion: TransportCompletion) -> Arc<dyn TransportTask> {
        let task = Arc::new(StubTask {
            id: Uuid::new_v4(),
            request,
            state: Mutex::new(TaskState::Running),
            completion: Mutex::new(Some(completion)),
        });
        self.tasks.lock().unwrap().push(task.clone());
        task
    }

    fn running_tasks(&self) -> Vec<Arc<dyn TransportTask>> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.state() != TaskState::Completed)
            .map(|t| t.clone() as Arc<dyn TransportTask>)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Recording behavior and completion
// ---------------------------------------------------------------------------

/// Logs each hook as `name:hook`, and tags requests with `X-Behavior: name`.
pub struct Recorder {
    name: &'static str,
    log: Log,
    tokens: Mutex<Vec<RetryToken>>,
}

impl Recorder {
    pub fn new(name: &'static str, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name,
            log: log.clone(),
            tokens: Mutex::new(Vec::new()),
        })
    }

    /// Retry tokens seen by `after_failure`, oldest first.
    pub fn tokens(&self) -> Vec<RetryToken> {
        self.tokens.lock().unwrap().clone()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl RequestBehavior for Recorder {
    fn additional_headers(&self) -> Vec<(String, String)> {
        vec![("X-Behavior".to_string(), self.name.to_string())]
    }

    fn before_send(&self, _request: &HttpRequest) {
        self.push(format!("{}:before_send", self.name));
    }

    fn after_complete(&self, response: Option<&HttpResponse>) {
        match response {
            Some(response) => self.push(format!("{}:after_complete {}", self.name, response.status)),
            None => self.push(format!("{}:after_complete cancelled", self.name)),
        }
    }

    fn after_failure(&self, error: &ApiError, retry: &RetryToken) {
        self.push(format!("{}:after_failure {:?}", self.name, error.code()));
        self.tokens.lock().unwrap().push(retry.clone());
    }
}

pub type Results<A> = Arc<Mutex<Vec<Result<A, ApiError>>>>;

/// A completion that stores every result and logs `completion` to `log`.
pub fn recording<A: Send + 'static>(log: &Log) -> (Completion<A>, Results<A>) {
    let results: Results<A> = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    let log = log.clone();
    let completion = Completion::new(move |result| {
        log.lock().unwrap().push("completion".to_string());
        sink.lock().unwrap().push(result);
    });
    (completion, results)
}
