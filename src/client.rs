use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::transport::{Transport, TransportError, TransportRequest};

/// One outbound resource request, before header and URL assembly
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// HTTP method
    pub method: String,
    /// Absolute URL, or a path resolved against the configured API host
    pub url: String,
    /// Query string pairs appended to the URL
    pub query: Vec<(String, String)>,
    /// JSON body; `Content-Type: application/json` is set when present
    pub body: Option<Value>,
    /// Pre-built headers (security headers from the façade)
    pub headers: Vec<(String, String)>,
    /// Per-attempt timeout override
    pub timeout: Option<Duration>,
    /// Retry budget override for client-side timeouts
    pub max_retries_on_timeout: Option<u32>,
}

impl SendRequest {
    /// Build a request with the given method and URL and no body
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        SendRequest {
            method: method.into(),
            url: url.into(),
            query: Vec::new(),
            body: None,
            headers: Vec::new(),
            timeout: None,
            max_retries_on_timeout: None,
        }
    }

    /// Attach a JSON body
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Attach pre-built headers
    pub fn with_headers(mut self, headers: Vec<(String, String)>) -> Self {
        self.headers = headers;
        self
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Single entry point for all outbound resource requests: resolves URLs,
/// attaches headers, enforces the timeout/retry policy, and normalizes
/// responses and errors.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    config: Config,
}

impl HttpClient {
    pub fn new(transport: Arc<dyn Transport>, config: Config) -> Self {
        HttpClient { transport, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Execute a request and return the parsed response body.
    ///
    /// Only client-side timeouts are retried, up to the configured budget of
    /// additional attempts; any other transport failure or non-2xx status is
    /// raised immediately. A timeout that persists through every attempt
    /// raises the distinguished [`ApiError::Timeout`] kind.
    pub fn send(&self, request: &SendRequest) -> Result<Value> {
        let url = self.resolve_url(&request.url, &request.query)?;
        let timeout = request.timeout.unwrap_or(self.config.timeout);
        let max_retries = request
            .max_retries_on_timeout
            .unwrap_or(self.config.max_retries_on_timeout);

        let mut headers = request.headers.clone();
        let body = match &request.body {
            Some(body) => {
                let has_content_type = headers
                    .iter()
                    .any(|(k, _)| k.eq_ignore_ascii_case("content-type"));
                if !has_content_type {
                    headers.push(("Content-Type".to_string(), "application/json".to_string()));
                }
                Some(serde_json::to_vec(body)?)
            }
            None => None,
        };

        let transport_request = TransportRequest {
            method: request.method.clone(),
            url: url.to_string(),
            headers,
            body,
            timeout,
        };

        let attempts = max_retries + 1;
        for attempt in 1..=attempts {
            debug!(attempt, method = %request.method, url = %url, "sending request");
            match self.transport.execute(&transport_request) {
                Ok(response) => {
                    debug!(attempt, status = response.status, "received response");
                    return self.interpret(response.status, &response.body);
                }
                Err(TransportError::Timeout) if attempt < attempts => {
                    debug!(attempt, "request timed out, retrying");
                }
                Err(TransportError::Timeout) => {
                    return Err(ApiError::Timeout { attempts });
                }
                Err(TransportError::Network(message)) => {
                    return Err(ApiError::Network(message));
                }
            }
        }

        // attempts >= 1, so the loop always returns
        unreachable!("retry loop exited without a result")
    }

    fn resolve_url(&self, url: &str, query: &[(String, String)]) -> Result<Url> {
        let mut resolved = if url.starts_with("http://") || url.starts_with("https://") {
            Url::parse(url)?
        } else {
            Url::parse(&self.config.base_url())?.join(url)?
        };
        for (key, value) in query {
            resolved.query_pairs_mut().append_pair(key, value);
        }
        Ok(resolved)
    }

    /// Parse the body as text, attempt JSON, fall back to the raw text; on a
    /// non-2xx status, extract a best-effort message for the raised error.
    fn interpret(&self, status: u16, body: &[u8]) -> Result<Value> {
        let parsed = parse_body(body);
        if (200..300).contains(&status) {
            return Ok(parsed);
        }
        let message = extract_message(&parsed)
            .unwrap_or_else(|| format!("request failed with status {}", status));
        Err(ApiError::http(status, message, parsed))
    }
}

fn parse_body(body: &[u8]) -> Value {
    if body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).to_string()))
}

fn extract_message(body: &Value) -> Option<String> {
    match body {
        Value::Object(map) => map
            .get("message")
            .or_else(|| map.get("error"))
            .and_then(|v| v.as_str())
            .map(|s| s.to_string()),
        Value::String(text) if !text.is_empty() => Some(text.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::transport::testing::{FakeTransport, Script};

    fn client(transport: Arc<FakeTransport>) -> HttpClient {
        HttpClient::new(transport, Config::default())
    }

    #[test]
    fn test_relative_url_resolved_against_host() {
        let transport = Arc::new(FakeTransport::new(vec![Script::Respond(
            FakeTransport::ok_json("{}"),
        )]));
        let c = client(Arc::clone(&transport));
        c.send(&SendRequest::new("GET", "/api/public/companies"))
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].url, "http://localhost:3000/api/public/companies");
    }

    #[test]
    fn test_content_type_added_only_with_body() {
        let transport = Arc::new(FakeTransport::new(vec![
            Script::Respond(FakeTransport::ok_json("{}")),
            Script::Respond(FakeTransport::ok_json("{}")),
        ]));
        let c = client(Arc::clone(&transport));

        c.send(&SendRequest::new("GET", "/x")).unwrap();
        c.send(&SendRequest::new("POST", "/x").with_body(json!({"a": 1})))
            .unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].header("content-type"), None);
        assert_eq!(requests[1].header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_existing_content_type_not_overwritten() {
        let transport = Arc::new(FakeTransport::new(vec![Script::Respond(
            FakeTransport::ok_json("{}"),
        )]));
        let c = client(Arc::clone(&transport));

        let request = SendRequest::new("POST", "/x")
            .with_body(json!({}))
            .with_headers(vec![(
                "Content-Type".to_string(),
                "application/json; charset=utf-8".to_string(),
            )]);
        c.send(&request).unwrap();

        let requests = transport.requests.lock().unwrap();
        let content_types: Vec<_> = requests[0]
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
            .collect();
        assert_eq!(content_types.len(), 1);
    }

    #[test]
    fn test_timeout_retried_exactly_n_plus_one_attempts() {
        let transport = Arc::new(FakeTransport::new(vec![
            Script::Fail(crate::transport::TransportError::Timeout),
            Script::Fail(crate::transport::TransportError::Timeout),
            Script::Fail(crate::transport::TransportError::Timeout),
        ]));
        let c = client(Arc::clone(&transport));

        let mut request = SendRequest::new("POST", "/x");
        request.max_retries_on_timeout = Some(2);
        let err = c.send(&request).unwrap_err();

        assert!(matches!(err, ApiError::Timeout { attempts: 3 }));
        assert_eq!(transport.request_count(), 3);
    }

    #[test]
    fn test_timeout_then_success_recovers() {
        let transport = Arc::new(FakeTransport::new(vec![
            Script::Fail(crate::transport::TransportError::Timeout),
            Script::Respond(FakeTransport::ok_json("{\"ok\":true}")),
        ]));
        let c = client(Arc::clone(&transport));

        let body = c.send(&SendRequest::new("GET", "/x")).unwrap();
        assert_eq!(body, json!({"ok": true}));
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn test_network_error_not_retried() {
        let transport = Arc::new(FakeTransport::new(vec![Script::Fail(
            crate::transport::TransportError::Network("connection refused".to_string()),
        )]));
        let c = client(Arc::clone(&transport));

        let err = c.send(&SendRequest::new("GET", "/x")).unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_http_error_not_retried_and_carries_message() {
        let transport = Arc::new(FakeTransport::new(vec![Script::Respond(
            FakeTransport::status(404, "{\"message\":\"no such record\"}"),
        )]));
        let c = client(Arc::clone(&transport));

        let err = c.send(&SendRequest::new("GET", "/x")).unwrap_err();
        match err {
            ApiError::Http { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "no such record");
            }
            other => panic!("expected Http error, got {:?}", other),
        }
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_non_json_body_falls_back_to_text() {
        let transport = Arc::new(FakeTransport::new(vec![Script::Respond(
            FakeTransport::status(200, "plain text response"),
        )]));
        let c = client(Arc::clone(&transport));

        let body = c.send(&SendRequest::new("GET", "/x")).unwrap();
        assert_eq!(body, Value::String("plain text response".to_string()));
    }

    #[test]
    fn test_query_pairs_appended() {
        let transport = Arc::new(FakeTransport::new(vec![Script::Respond(
            FakeTransport::ok_json("{}"),
        )]));
        let c = client(Arc::clone(&transport));

        let mut request = SendRequest::new("GET", "/x");
        request.query.push(("page".to_string(), "2".to_string()));
        c.send(&request).unwrap();

        let requests = transport.requests.lock().unwrap();
        assert!(requests[0].url.ends_with("/x?page=2"));
    }
}
