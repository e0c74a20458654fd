//! Authenticated HTTP calls with typed success and error decoding.

use bytes::Bytes;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use dropmirror_common::{Error, Result, Secret};

/// How a request proves who is calling.
#[derive(Debug, Clone)]
pub enum Authorization {
    /// App key and secret, used by the token endpoint.
    Basic { user: String, password: Secret },
    /// Short-lived access token.
    Bearer(Secret),
}

/// Request body. Form fields and a raw body are mutually exclusive.
#[derive(Debug, Clone, Default)]
pub enum Payload {
    #[default]
    Empty,
    Form(Vec<(String, String)>),
    Json(serde_json::Value),
    Binary(Bytes),
}

/// One call to the remote service.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub auth: Option<Authorization>,
    pub payload: Payload,
}

impl ApiRequest {
    /// Start a POST request, the verb every API route uses.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    /// Start a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            auth: None,
            payload: Payload::Empty,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn bearer(mut self, token: Secret) -> Self {
        self.auth = Some(Authorization::Bearer(token));
        self
    }

    pub fn basic(mut self, user: impl Into<String>, password: Secret) -> Self {
        self.auth = Some(Authorization::Basic {
            user: user.into(),
            password,
        });
        self
    }

    pub fn form<K: Into<String>, V: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, V)>,
    ) -> Self {
        self.payload = Payload::Form(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    pub fn binary(mut self, body: Bytes) -> Self {
        self.payload = Payload::Binary(body);
        self
    }
}

/// Error envelope of the remote service.
///
/// API routes fill `error_summary`; the OAuth routes fill `error` and
/// `error_description` instead.
#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error_summary: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    error_description: String,
    #[serde(default)]
    user_message: Option<UserMessage>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMessage {
    #[serde(default)]
    text: String,
}

/// Build the message of a failed call from its body.
///
/// Precedence: `error_summary`, then `error` followed by
/// `error_description`, then the body verbatim.
pub(crate) fn error_message(body: &str) -> String {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();

    if let Some(user_message) = envelope.user_message.as_ref().filter(|m| !m.text.is_empty()) {
        debug!(message = %user_message.text, "Service supplied a user message");
    }

    if !envelope.error_summary.is_empty() {
        return envelope.error_summary;
    }
    if !envelope.error_description.is_empty() {
        let error = match &envelope.error {
            Some(serde_json::Value::String(tag)) => tag.as_str(),
            _ => "",
        };
        return format!("{} {}", error, envelope.error_description)
            .trim_start()
            .to_string();
    }
    body.to_string()
}

/// Generic HTTP gateway to the remote service.
pub struct RestGateway {
    http: Client,
}

impl RestGateway {
    /// Create a gateway whose requests give up after `timeout`.
    ///
    /// # Errors
    /// - `Network` if the HTTP client cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("dropmirror/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http })
    }

    /// Execute a request and decode a JSON success body into `T`.
    ///
    /// # Errors
    /// - `Network` on transport failure
    /// - `Api` on a non-success status
    /// - `Serialization` if the success body has an unexpected shape
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let url = request.url.clone();
        let body = self.execute(request).await?;
        serde_json::from_slice(&body).map_err(|e| {
            Error::Serialization(format!("Unexpected response from {}: {}", url, e))
        })
    }

    /// Execute a request and return the raw success body.
    pub async fn execute(&self, request: ApiRequest) -> Result<Bytes> {
        debug!(method = %request.method, url = %request.url, "Sending request");

        let mut builder = self.http.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match &request.auth {
            Some(Authorization::Basic { user, password }) => {
                builder.basic_auth(user, Some(password.expose()))
            }
            Some(Authorization::Bearer(token)) => builder.bearer_auth(token.expose()),
            None => builder,
        };
        builder = match request.payload {
            Payload::Empty => builder,
            Payload::Form(fields) => builder.form(&fields),
            Payload::Json(value) => builder.json(&value),
            Payload::Binary(data) => builder
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(data),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::Network(format!("Request to {} failed: {}", request.url, e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("Failed to read response: {}", e)))?;

        if status.is_success() {
            return Ok(body);
        }

        let message = error_message(&String::from_utf8_lossy(&body));
        warn!(status = status.as_u16(), url = %request.url, error = %message, "Request failed");
        Err(Error::Api {
            status: status.as_u16(),
            message,
        })
    }
}
