use std::time::Duration;

use thiserror::Error;

/// A fully assembled outbound HTTP request, ready for a transport
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// HTTP method (GET, POST, PUT, DELETE)
    pub method: String,
    /// Absolute URL including any query string
    pub url: String,
    /// Header name/value pairs in attachment order
    pub headers: Vec<(String, String)>,
    /// Request body bytes, if any
    pub body: Option<Vec<u8>>,
    /// Per-attempt timeout; the transport aborts the request when it elapses
    pub timeout: Duration,
}

impl TransportRequest {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw response from a transport, before any protocol-level interpretation
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Look up a response header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Transport-level failure, classified so the client can retry timeouts only
#[derive(Debug, Error)]
pub enum TransportError {
    /// Client-side abort: the request exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Any other transport failure (DNS, connect, TLS, ...)
    #[error("transport error: {0}")]
    Network(String),
}

/// The fetch-equivalent seam between the client and the platform.
///
/// The production implementation wraps a blocking reqwest client; tests inject
/// scripted doubles to exercise retry and auth flows without a network.
pub trait Transport: Send + Sync {
    fn execute(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError>;
}

/// Production transport over a blocking reqwest client with cookie support
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Create the default transport with connection pooling and a cookie store
    /// so requests carry credentials like the web client does
    pub fn new() -> Self {
        let client = reqwest::blocking::ClientBuilder::new()
            .pool_max_idle_per_host(50)
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to create HTTP client");
        HttpTransport { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn execute(
        &self,
        request: &TransportRequest,
    ) -> std::result::Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| TransportError::Network(format!("invalid method: {}", request.method)))?;

        let mut builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Network(e.to_string())
                }
            })?
            .to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
