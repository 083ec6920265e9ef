use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::cookie::{CookieStore, Jar};
use serde_json::Value;
use tracing::trace;

use crate::error::{Result, WikiError};
use crate::params::Params;

/// Bytes of a file sent along with an `action=upload` request.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// One physical request/response cycle against `api.php`.
///
/// Implementations own the cookie state of the session. They never retry;
/// retry and throttling policy belong to the session.
pub trait Transport: Send {
    fn call(&mut self, params: &Params) -> Result<Value>;

    fn call_multipart(&mut self, _params: &Params, _file: FilePart) -> Result<Value> {
        Err(WikiError::InvalidOption(
            "this transport does not support uploads".to_string(),
        ))
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>>;

    fn clear_cookies(&mut self);

    /// `Cookie` header value currently held for the API host.
    fn export_cookies(&self) -> Option<String> {
        None
    }

    fn import_cookies(&mut self, _cookies: &str) {}
}

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

/// `reqwest` blocking transport. Responses are gzip-inflated by the client
/// and bodies are decoded as JSON.
pub struct HttpTransport {
    client: Client,
    jar: Arc<Jar>,
    api_url: Url,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let api_url = Url::parse(&config.api_url)
            .map_err(|error| WikiError::InvalidIdentity(format!("{}: {error}", config.api_url)))?;
        let jar = Arc::new(Jar::default());
        let client = build_client(&config, Arc::clone(&jar))?;
        Ok(Self {
            client,
            jar,
            api_url,
            config,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }
}

impl Transport for HttpTransport {
    fn call(&mut self, params: &Params) -> Result<Value> {
        trace!(
            action = params.get("action").unwrap_or(""),
            "sending API request"
        );
        let response = self
            .client
            .post(self.api_url.clone())
            .form(params.pairs())
            .send()
            .map_err(transport_error)?;
        decode_response(response)
    }

    fn call_multipart(&mut self, params: &Params, file: FilePart) -> Result<Value> {
        let mut form = Form::new();
        for (key, value) in params.iter() {
            form = form.text(key.to_string(), value.to_string());
        }
        form = form.part(file.field, Part::bytes(file.bytes).file_name(file.file_name));
        let response = self
            .client
            .post(self.api_url.clone())
            .multipart(form)
            .send()
            .map_err(transport_error)?;
        decode_response(response)
    }

    fn fetch_bytes(&mut self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().map_err(transport_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(WikiError::Transport {
                reason: format!("HTTP {status} while fetching {url}"),
                status: Some(status.as_u16()),
            });
        }
        let bytes = response.bytes().map_err(transport_error)?;
        Ok(bytes.to_vec())
    }

    fn clear_cookies(&mut self) {
        let jar = Arc::new(Jar::default());
        match build_client(&self.config, Arc::clone(&jar)) {
            Ok(client) => {
                self.client = client;
                self.jar = jar;
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to rebuild HTTP client; cookies kept");
            }
        }
    }

    fn export_cookies(&self) -> Option<String> {
        self.jar
            .cookies(&self.api_url)
            .and_then(|value| value.to_str().ok().map(ToString::to_string))
    }

    fn import_cookies(&mut self, cookies: &str) {
        for pair in cookies.split(';') {
            let pair = pair.trim();
            if pair.contains('=') {
                self.jar.add_cookie_str(&format!("{pair}; Path=/"), &self.api_url);
            }
        }
    }
}

fn build_client(config: &HttpTransportConfig, jar: Arc<Jar>) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .user_agent(config.user_agent.clone())
        .gzip(true)
        .cookie_provider(jar)
        .build()
        .map_err(|error| WikiError::Transport {
            reason: format!("failed to build HTTP client: {error}"),
            status: None,
        })
}

fn decode_response(response: reqwest::blocking::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        return Err(WikiError::Transport {
            reason: format!("HTTP {status}"),
            status: Some(status.as_u16()),
        });
    }
    let body = response.text().map_err(transport_error)?;
    decode_body(&body)
}

pub fn decode_body(body: &str) -> Result<Value> {
    serde_json::from_str(body)
        .map_err(|error| WikiError::Decode(format!("JSON could not be loaded: {error}")))
}

fn transport_error(error: reqwest::Error) -> WikiError {
    let status = error.status().map(|status| status.as_u16());
    let reason = if error.is_timeout() {
        format!("timed out: {error}")
    } else if error.is_connect() {
        format!("connection failed: {error}")
    } else {
        error.to_string()
    };
    WikiError::Transport { reason, status }
}
