use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{SessionConfig, SessionOptions};
use crate::continuation::{Continuation, ContinuationEngine, ResultAccumulator};
use crate::error::{Result, WikiError};
use crate::namespace::NamespaceTable;
use crate::params::Params;
use crate::response::{ApiOutcome, RetryReason, classify, warnings};
use crate::retry::RetryPolicy;
use crate::site::Endpoint;
use crate::throttle::RateLimiter;
use crate::tokens::{TokenCache, TokenState, validate_actions};
use crate::transport::{FilePart, HttpTransport, HttpTransportConfig, Transport};

/// Per-query knobs: how far to follow continuation markers and which
/// enumerable sub-queries should ask for the server's maximum page size.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    pub continuation: Continuation,
    pub limit_prefixes: Vec<String>,
}

impl QueryOptions {
    pub fn single() -> Self {
        Self::default()
    }

    pub fn continued() -> Self {
        Self {
            continuation: Continuation::bounded(),
            limit_prefixes: Vec::new(),
        }
    }

    pub fn exhaustive() -> Self {
        Self {
            continuation: Continuation::Exhaustive,
            limit_prefixes: Vec::new(),
        }
    }

    pub fn with_continuation(mut self, continuation: Continuation) -> Self {
        self.continuation = continuation;
        self
    }

    pub fn with_limit(mut self, prefix: &str) -> Self {
        self.limit_prefixes.push(prefix.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticated { username: String },
}

/// A connection to one wiki.
///
/// All physical requests go through a single lock that also encloses the
/// throttle wait and maxlag backoff, so at most one request per session is
/// ever in flight. Share it across threads by reference or `Arc`.
pub struct Session {
    core: RequestCore,
    state: Mutex<SessionState>,
    endpoint: Endpoint,
    namespaces: NamespaceTable,
}

struct RequestCore {
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    retry: RetryPolicy,
}

struct SessionState {
    transport: Box<dyn Transport>,
    limiter: RateLimiter,
    tokens: TokenCache,
    auth: AuthState,
}

impl Session {
    /// Open a session over HTTP, load the site description and log in when
    /// credentials are supplied.
    pub fn open(options: SessionOptions) -> Result<Self> {
        let transport = HttpTransport::new(HttpTransportConfig {
            api_url: options.api_url(),
            user_agent: options.user_agent.clone(),
            timeout: options.timeout,
        })?;
        Self::with_transport(options, Box::new(transport), Arc::new(SystemClock))
    }

    pub fn with_transport(
        options: SessionOptions,
        transport: Box<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let core = RequestCore {
            clock,
            config: options.config,
            retry: RetryPolicy::new(options.config.max_retries, options.config.initial_idle),
        };
        let mut state = SessionState {
            transport,
            limiter: RateLimiter::new(options.config.throttle),
            tokens: TokenCache::new(),
            auth: AuthState::Anonymous,
        };
        let (endpoint, namespaces) = load_site(&core, &mut state, &options)?;
        let session = Self {
            core,
            state: Mutex::new(state),
            endpoint,
            namespaces,
        };
        if let Some((username, password)) = &options.credentials {
            session.login(username, password)?;
        }
        Ok(session)
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn namespaces(&self) -> &NamespaceTable {
        &self.namespaces
    }

    pub fn config(&self) -> &SessionConfig {
        &self.core.config
    }

    pub fn domain(&self) -> Option<String> {
        self.endpoint.domain()
    }

    /// Run one logical query. Depending on `options.continuation` this may
    /// issue several physical requests whose results are merged.
    pub fn query(&self, params: &[(&str, String)], options: &QueryOptions) -> Result<Value> {
        self.query_params(&Params::from_pairs(params), options)
    }

    pub fn query_params(&self, params: &Params, options: &QueryOptions) -> Result<Value> {
        let mut state = self.lock();
        self.core.run(&mut state, params, options)
    }

    /// Lazy, finite sequence of result pages for `params`. Each page is one
    /// physical request; the sequence stops when the server stops sending
    /// continuation markers or the budget is spent.
    pub fn pages(&self, params: &[(&str, String)], options: &QueryOptions) -> Pages<'_> {
        let prepared = self.core.prepare(&Params::from_pairs(params), &options.limit_prefixes);
        Pages {
            session: self,
            engine: ContinuationEngine::new(prepared, options.continuation),
        }
    }

    /// Bulk iteration: returns the items under `query.<list_key>` across all
    /// fetched pages. Any warning in the result is treated as fatal.
    pub fn iterate(
        &self,
        params: &[(&str, String)],
        list_key: &str,
        options: &QueryOptions,
    ) -> Result<Vec<Value>> {
        let result = self.query(params, options)?;
        let found = warnings(&result);
        if !found.is_empty() {
            let joined = found
                .into_iter()
                .map(|(module, message)| format!("{module}: {message}"))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(WikiError::ApiWarnings(joined));
        }
        Ok(result
            .get("query")
            .and_then(|query| query.get(list_key))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    /// POST a multipart request (file upload) through the same throttle and
    /// maxlag handling as ordinary queries.
    pub fn upload(&self, params: &[(&str, String)], file: FilePart) -> Result<Value> {
        let prepared = self.core.prepare(&Params::from_pairs(params), &[]);
        let mut state = self.lock();
        self.core
            .send_with(&mut state, |transport| {
                transport.call_multipart(&prepared, file.clone())
            })
    }

    pub fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.limiter.wait(self.core.clock.as_ref());
        state.transport.fetch_bytes(url)
    }

    /// Tokens for `actions`, fetching every uncached one in a single request.
    pub fn tokens(&self, actions: &[&str]) -> Result<BTreeMap<String, TokenState>> {
        let requested = validate_actions(actions)?;
        let mut state = self.lock();
        let missing = state.tokens.uncached(&requested);
        if !missing.is_empty() {
            debug!(actions = %missing.join("|"), "fetching action tokens");
            let response = self.core.run(
                &mut state,
                &TokenCache::fetch_params(&missing),
                &QueryOptions::single(),
            )?;
            state.tokens.absorb(&missing, &response);
        }
        Ok(state.tokens.collect(&requested))
    }

    /// Token for `action`, or `Permission` when the current user lacks it.
    pub fn assert_ability(&self, action: &str) -> Result<String> {
        let tokens = self.tokens(&[action])?;
        tokens
            .values()
            .next()
            .and_then(TokenState::token)
            .map(ToString::to_string)
            .ok_or_else(|| {
                WikiError::Permission(format!("you do not have permission to perform `{action}`"))
            })
    }

    /// Forget all cached tokens, including ones marked absent.
    pub fn refresh_tokens(&self) {
        self.lock().tokens.clear();
    }

    pub fn token_fetch_count(&self) -> usize {
        self.lock().tokens.fetch_count()
    }

    pub fn auth_state(&self) -> AuthState {
        self.lock().auth.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().limiter.request_count()
    }

    pub fn login(&self, username: &str, password: &str) -> Result<()> {
        let mut state = self.lock();
        let mut params = Params::new();
        params.set("action", "login");
        params.set("lgname", username);
        params.set("lgpassword", password);

        let mut sent_token = false;
        loop {
            let response = self.core.run(&mut state, &params, &QueryOptions::single())?;
            let payload: LoginResponse = serde_json::from_value(response)?;
            let result = payload.login.result.unwrap_or_default();
            match result.as_str() {
                "Success" => {
                    state.tokens.clear();
                    let username = payload
                        .login
                        .lgusername
                        .unwrap_or_else(|| username.to_string());
                    info!(user = %username, "logged in");
                    state.auth = AuthState::Authenticated { username };
                    return Ok(());
                }
                "NeedToken" if !sent_token => {
                    let token = payload.login.token.ok_or_else(|| WikiError::Login {
                        result: result.clone(),
                        reason: "server asked for a token without supplying one".to_string(),
                    })?;
                    params.set("lgtoken", token);
                    sent_token = true;
                }
                "NeedToken" => {
                    return Err(WikiError::Login {
                        result,
                        reason: "server rejected the login token it issued".to_string(),
                    });
                }
                _ => {
                    let reason = login_failure_reason(&result, payload.login.reason.as_deref());
                    return Err(WikiError::Login { result, reason });
                }
            }
        }
    }

    /// Log out, dropping cookies and cached tokens even if the server call
    /// fails.
    pub fn logout(&self) -> Result<()> {
        let mut state = self.lock();
        let mut params = Params::new();
        params.set("action", "logout");
        let outcome = self.core.run(&mut state, &params, &QueryOptions::single());
        state.transport.clear_cookies();
        state.tokens.clear();
        state.auth = AuthState::Anonymous;
        info!("logged out");
        outcome.map(|_| ())
    }

    /// Name the server associates with this session (an IP when anonymous).
    pub fn username(&self) -> Result<String> {
        let response = self.query(
            &[
                ("action", "query".to_string()),
                ("meta", "userinfo".to_string()),
            ],
            &QueryOptions::single(),
        )?;
        response
            .pointer("/query/userinfo/name")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| WikiError::Decode("userinfo response lacks a name".to_string()))
    }

    pub fn export_cookies(&self) -> Option<String> {
        self.lock().transport.export_cookies()
    }

    pub fn import_cookies(&self, cookies: &str) {
        self.lock().transport.import_cookies(cookies);
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("config", &self.core.config)
            .finish_non_exhaustive()
    }
}

impl RequestCore {
    fn prepare(&self, params: &Params, limit_prefixes: &[String]) -> Params {
        let mut prepared = Params::new();
        prepared.set("format", "json");
        prepared.set("formatversion", "2");
        for (key, value) in params.iter() {
            prepared.set(key, value);
        }
        prepared.set_default("maxlag", self.config.maxlag.to_string());
        for prefix in limit_prefixes {
            prepared.set_default(format!("{prefix}limit"), "max");
        }
        prepared
    }

    fn run(&self, state: &mut SessionState, params: &Params, options: &QueryOptions) -> Result<Value> {
        let prepared = self.prepare(params, &options.limit_prefixes);
        let mut engine = ContinuationEngine::new(prepared, options.continuation);
        let mut accumulator = ResultAccumulator::new();
        while let Some(request) = engine.next_request() {
            let response = self.send(state, &request)?;
            engine.absorb(&response);
            accumulator.push(response);
        }
        Ok(accumulator.finish(engine.pending_marker()))
    }

    fn send(&self, state: &mut SessionState, params: &Params) -> Result<Value> {
        self.send_with(state, |transport| transport.call(params))
    }

    /// One logical request: throttle, call, classify, and back off on
    /// maxlag until the retry budget is spent.
    fn send_with<F>(&self, state: &mut SessionState, mut call: F) -> Result<Value>
    where
        F: FnMut(&mut dyn Transport) -> Result<Value>,
    {
        let mut backoff = self.retry.start();
        loop {
            state.limiter.wait(self.clock.as_ref());
            let payload = call(state.transport.as_mut())?;
            match classify(payload) {
                ApiOutcome::Ok(value) => return Ok(value),
                ApiOutcome::Retryable(RetryReason::MaxLag { info }) => {
                    let delay = backoff.next_delay()?;
                    warn!(
                        attempt = backoff.attempts(),
                        wait_ms = delay.as_millis() as u64,
                        info = %info,
                        "server lagged; backing off"
                    );
                    self.clock.sleep(delay);
                }
                ApiOutcome::Fatal { code, info } => return Err(WikiError::Api { code, info }),
            }
        }
    }
}

/// Result pages of one query, fetched on demand. Call `restart` to replay the
/// sequence from the first page with a fresh budget.
pub struct Pages<'s> {
    session: &'s Session,
    engine: ContinuationEngine,
}

impl Pages<'_> {
    pub fn restart(&mut self) {
        self.engine.restart();
    }

    pub fn requests_issued(&self) -> usize {
        self.engine.issued()
    }
}

impl Iterator for Pages<'_> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        let request = self.engine.next_request()?;
        let mut state = self.session.lock();
        match self.session.core.send(&mut state, &request) {
            Ok(response) => {
                self.engine.absorb(&response);
                Some(Ok(response))
            }
            Err(error) => {
                self.engine.abort();
                Some(Err(error))
            }
        }
    }
}

fn load_site(
    core: &RequestCore,
    state: &mut SessionState,
    options: &SessionOptions,
) -> Result<(Endpoint, NamespaceTable)> {
    if let (Some(namespaces), Some(endpoint)) = (&options.namespaces, Endpoint::from_options(options)) {
        return Ok((endpoint, namespaces.clone()));
    }

    let mut siprop = "general".to_string();
    if options.namespaces.is_none() {
        siprop.push_str("|namespaces|namespacealiases");
    }
    let mut params = Params::new();
    params.set("action", "query");
    params.set("meta", "siteinfo");
    params.set("siprop", siprop);
    let response = core.run(state, &params, &QueryOptions::single())?;
    let query = response
        .get("query")
        .ok_or_else(|| WikiError::Decode("siteinfo response has no query block".to_string()))?;

    let endpoint = Endpoint::from_siteinfo(query, options.secure)?;
    let namespaces = match &options.namespaces {
        Some(table) => table.clone(),
        None => NamespaceTable::from_siteinfo(query)?,
    };
    debug!(site = %endpoint.name, namespaces = namespaces.len(), "loaded site info");
    Ok((endpoint, namespaces))
}

fn login_failure_reason(result: &str, server_reason: Option<&str>) -> String {
    if let Some(reason) = server_reason {
        return reason.to_string();
    }
    match result {
        "Illegal" => "the provided username is illegal".to_string(),
        "NotExists" => "the provided username does not exist".to_string(),
        "EmptyPass" => "no password was given".to_string(),
        "WrongPass" | "WrongPluginPass" => "the given password is incorrect".to_string(),
        "Throttled" => "too many recent login attempts".to_string(),
        other => format!("API responded with {other}"),
    }
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
    token: Option<String>,
    lgusername: Option<String>,
}
