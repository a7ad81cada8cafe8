//! HTTP API backend: a configured reqwest client bound to one base URL.
//!
//! `connect` only builds the client; no request is sent until a probe or a
//! call is made.

use super::client::{reject_named_target, BackendClient, BackendSession, HealthReport, HttpSession, QueryResult};
use crate::config::BackendSettings;
use crate::errors::{BackplaneError, Result};
use crate::secrets::HttpApiCredentials;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::{Map, Value};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn, Instrument};

const PROVIDER: &str = "http-api";
const HEALTH_PATH: &str = "/health";

#[derive(Debug)]
pub struct HttpApiClient {
    name: String,
    credentials: HttpApiCredentials,
    base_url: url::Url,
    timeout: Duration,
    session: RwLock<Option<HttpSession>>,
}

impl HttpApiClient {
    pub fn new(name: impl Into<String>, credentials: HttpApiCredentials, settings: &BackendSettings) -> Result<Self> {
        let base_url = url::Url::parse(&credentials.base_url)
            .map_err(|e| BackplaneError::malformed_for(PROVIDER, format!("invalid base_url: {}", e)))?;
        let timeout = credentials.timeout.map(Duration::from_secs).unwrap_or_else(|| settings.http_timeout());
        Ok(Self { name: name.into(), credentials, base_url, timeout, session: RwLock::new(None) })
    }

    pub fn from_credentials(name: &str, payload: &Value, settings: &BackendSettings) -> Result<Self> {
        Self::new(name, HttpApiCredentials::from_payload(payload)?, settings)
    }

    pub fn base_url(&self) -> &url::Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Configured headers with the bearer token applied last
    fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.credentials.headers {
            let name = HeaderName::from_str(name)
                .map_err(|e| BackplaneError::malformed_for(PROVIDER, format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                BackplaneError::malformed_for(PROVIDER, format!("invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(name, value);
        }
        if let Some(api_key) = self.credentials.api_key.as_deref().filter(|k| !k.is_empty()) {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|_| BackplaneError::malformed_for(PROVIDER, "api_key is not a valid header value"))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn build_session(&self) -> Result<HttpSession> {
        let client = reqwest::Client::builder()
            .default_headers(self.default_headers()?)
            .build()
            .map_err(|e| BackplaneError::connectivity(PROVIDER, e.to_string()))?;
        Ok(HttpSession::new(client, self.base_url.clone(), self.timeout))
    }

    async fn active_session(&self, target: Option<&str>) -> Result<HttpSession> {
        reject_named_target(PROVIDER, target)?;
        if !self.connect().await {
            return Err(BackplaneError::connectivity(PROVIDER, format!("'{}' could not build a client", self.name)));
        }
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| BackplaneError::connectivity(PROVIDER, format!("'{}' was released", self.name)))
    }

    async fn probe(&self) -> std::result::Result<StatusCode, String> {
        let session = self.active_session(None).await.map_err(|e| e.to_string())?;
        let request = session.get(HEALTH_PATH).map_err(|e| e.to_string())?;
        let response = request.send().await.map_err(|e| e.to_string())?;
        Ok(response.status())
    }
}

/// Split `"<METHOD> <path>"`; a bare path means GET
fn parse_request_line(query: &str) -> Result<(Method, &str)> {
    let query = query.trim();
    match query.split_once(char::is_whitespace) {
        Some((method, path)) => {
            let method = Method::from_str(&method.to_ascii_uppercase())
                .map_err(|_| BackplaneError::validation_field(format!("Invalid HTTP method '{}'", method), "query"))?;
            Ok((method, path.trim()))
        }
        None if query.starts_with('/') => Ok((Method::GET, query)),
        None => Err(BackplaneError::validation_field(
            format!("Expected '<METHOD> <path>', got '{}'", query),
            "query",
        )),
    }
}

fn query_pairs(param: &Value) -> Vec<(String, String)> {
    match param {
        Value::Object(object) => object
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn body_to_result(status: StatusCode, body: &str) -> QueryResult {
    let rows: Vec<Map<String, Value>> = match serde_json::from_str::<Value>(body) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(object) => object,
                other => Map::from_iter([("value".to_string(), other)]),
            })
            .collect(),
        Ok(Value::Object(object)) => vec![object],
        Ok(Value::Null) => Vec::new(),
        Ok(other) => vec![Map::from_iter([("value".to_string(), other)])],
        Err(_) if body.is_empty() => Vec::new(),
        Err(_) => vec![Map::from_iter([("body".to_string(), Value::String(body.to_string()))])],
    };

    let columns = rows.first().map(|row| row.keys().cloned().collect()).unwrap_or_default();
    let rows_affected = if status == StatusCode::OK || rows.is_empty() { 0 } else { rows.len() as u64 };
    QueryResult { columns, rows, rows_affected }
}

#[async_trait]
impl BackendClient for HttpApiClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> bool {
        if self.session.read().await.is_some() {
            return true;
        }

        let mut guard = self.session.write().await;
        if guard.is_some() {
            return true;
        }

        match self.build_session() {
            Ok(session) => {
                info!(provider = PROVIDER, connection = %self.name, base_url = %self.base_url, "Client ready");
                *guard = Some(session);
                true
            }
            Err(e) => {
                warn!(provider = PROVIDER, connection = %self.name, error = %e, "Failed to build HTTP client");
                false
            }
        }
    }

    async fn disconnect(&self) -> bool {
        if self.session.write().await.take().is_some() {
            info!(provider = PROVIDER, connection = %self.name, "Disconnected");
        }
        true
    }

    async fn is_connected(&self) -> bool {
        self.session.read().await.is_some()
    }

    async fn test_connection(&self) -> bool {
        match self.probe().await {
            Ok(status) if status == StatusCode::OK => true,
            Ok(status) => {
                warn!(provider = PROVIDER, connection = %self.name, status = %status, "Health endpoint not OK");
                false
            }
            Err(e) => {
                warn!(provider = PROVIDER, connection = %self.name, error = %e, "Health probe failed");
                false
            }
        }
    }

    async fn get_session(&self, target: Option<&str>) -> Result<BackendSession> {
        Ok(BackendSession::HttpApi(self.active_session(target).await?))
    }

    async fn execute_query(&self, target: Option<&str>, query: &str, params: &[Value]) -> Result<QueryResult> {
        let session = self.active_session(target).await?;
        let (method, path) = parse_request_line(query)?;
        let span = crate::backend_span!("execute_query", PROVIDER, path);

        let mut request = session.request(method.clone(), path)?;
        if let Some(param) = params.first() {
            request = if method == Method::GET || method == Method::DELETE {
                request.query(&query_pairs(param))
            } else {
                request.json(param)
            };
        }

        async move {
            let response = request.send().await.map_err(|e| {
                if e.is_timeout() {
                    BackplaneError::timeout(format!("{} {}", method, path), session.timeout().as_millis() as u64)
                } else {
                    BackplaneError::connectivity(PROVIDER, e.to_string())
                }
            })?;
            let status = response.status();
            let body = response.text().await.map_err(|e| BackplaneError::query(PROVIDER, e.to_string()))?;
            debug!(status = %status, bytes = body.len(), "Response received");

            if !status.is_success() {
                return Err(BackplaneError::query(PROVIDER, format!("{} {} returned {}: {}", method, path, status, body)));
            }
            Ok(body_to_result(status, &body))
        }
        .instrument(span)
        .await
    }

    async fn health_check(&self) -> HealthReport {
        let probe = self.probe().await;
        // A transport failure means the API is unreachable, even with a built client.
        let connected = self.is_connected().await && probe.is_ok();
        let healthy = matches!(probe, Ok(StatusCode::OK));

        let mut report =
            HealthReport::new(PROVIDER, connected, healthy).with_detail("base_url", self.base_url.as_str());
        report = match probe {
            Ok(status) => report.with_detail("status_code", status.as_u16()),
            Err(e) => report.with_detail("error", e),
        };
        report
    }
}
