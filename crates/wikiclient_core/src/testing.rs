use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::clock::Clock;
use crate::config::{SessionConfig, SessionOptions, SiteLocator};
use crate::error::{Result, WikiError};
use crate::namespace::NamespaceTable;
use crate::params::Params;
use crate::session::Session;
use crate::transport::{FilePart, Transport};

pub enum Reply {
    Json(Value),
    Fail(WikiError),
}

#[derive(Default)]
struct MockState {
    replies: VecDeque<Reply>,
    requests: Vec<Params>,
    uploads: Vec<String>,
    cookies_cleared: usize,
}

/// Scripted transport: replays canned replies in order and records every
/// request it receives. Clones share state so a test can keep a handle after
/// the session takes ownership.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(&self, value: Value) -> &Self {
        self.lock().replies.push_back(Reply::Json(value));
        self
    }

    pub fn fail(&self, error: WikiError) -> &Self {
        self.lock().replies.push_back(Reply::Fail(error));
        self
    }

    pub fn requests(&self) -> Vec<Params> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().requests.len()
    }

    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }

    pub fn cookies_cleared(&self) -> usize {
        self.lock().cookies_cleared
    }

    pub fn remaining(&self) -> usize {
        self.lock().replies.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock transport lock")
    }

    fn next(&self, params: &Params) -> Result<Value> {
        let mut state = self.lock();
        state.requests.push(params.clone());
        match state.replies.pop_front() {
            Some(Reply::Json(value)) => Ok(value),
            Some(Reply::Fail(error)) => Err(error),
            None => panic!("unexpected request: {params:?}"),
        }
    }
}

impl Transport for MockTransport {
    fn call(&mut self, params: &Params) -> Result<Value> {
        self.next(params)
    }

    fn call_multipart(&mut self, params: &Params, file: FilePart) -> Result<Value> {
        self.lock().uploads.push(file.file_name);
        self.next(params)
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>> {
        let mut params = Params::new();
        params.set("url", url);
        let value = self.next(&params)?;
        Ok(value.as_str().unwrap_or_default().as_bytes().to_vec())
    }

    fn clear_cookies(&mut self) {
        self.lock().cookies_cleared += 1;
    }
}

pub fn namespaces() -> NamespaceTable {
    let mut table = NamespaceTable::new();
    for (id, name) in [
        (-2, "Media"),
        (-1, "Special"),
        (0, ""),
        (1, "Talk"),
        (2, "User"),
        (3, "User talk"),
        (6, "File"),
        (7, "File talk"),
        (10, "Template"),
        (14, "Category"),
        (15, "Category talk"),
    ] {
        table.insert(id, name);
    }
    table.insert(6, "Image");
    table
}

pub fn options(config: SessionConfig) -> SessionOptions {
    SessionOptions {
        site: SiteLocator::Project {
            project: "wikipedia".to_string(),
            lang: "en".to_string(),
        },
        name: Some("enwiki".to_string()),
        article_path: Some("/wiki/$1".to_string()),
        namespaces: Some(namespaces()),
        config,
        ..SessionOptions::default()
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        throttle: Duration::ZERO,
        maxlag: 10,
        max_retries: 2,
        initial_idle: Duration::from_secs(5),
    }
}

/// Session with a pre-supplied endpoint, so no request is made at startup.
pub fn session(config: SessionConfig) -> (Session, MockTransport, Arc<ManualClock>) {
    let transport = MockTransport::new();
    let clock = Arc::new(ManualClock::new());
    let session = Session::with_transport(
        options(config),
        Box::new(transport.clone()),
        clock.clone(),
    )
    .expect("session");
    (session, transport, clock)
}

pub fn token_reply(tokens: &[(&str, &str)]) -> Value {
    let mut page = serde_json::Map::new();
    page.insert("title".to_string(), json!("Main Page"));
    for (action, token) in tokens {
        page.insert(format!("{action}token"), json!(token));
    }
    json!({"query": {"pages": [Value::Object(page)]}})
}

/// Fake clock that advances instantly on `sleep` and remembers every sleep.
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualClockState>,
}

#[derive(Debug)]
struct ManualClockState {
    now: Instant,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualClockState {
                now: Instant::now(),
                sleeps: Vec::new(),
            }),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().expect("clock lock");
        state.now += duration;
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        let state = self.state.lock().expect("clock lock");
        state.sleeps.clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let state = self.state.lock().expect("clock lock");
        state.now
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.state.lock().expect("clock lock");
        state.now += duration;
        state.sleeps.push(duration);
    }
}
