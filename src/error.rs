use serde_json::Value;
use thiserror::Error;

/// Main error type for base_resource API operations
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource name absent from the current manifest
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// Requested field is not in the resource's allowed field set
    #[error("field not allowed on {resource}: {field}")]
    FieldNotAllowed { resource: String, field: String },

    /// Filter key has no `.`-separated operator segment
    #[error("invalid filter key (expected <field>.<op>): {0}")]
    InvalidFilterKey(String),

    /// Filter operator is not configured for the field
    #[error("filter op not allowed on {resource}: {key}")]
    FilterOpNotAllowed { resource: String, key: String },

    /// Request timed out through every retry attempt
    #[error("request timed out after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Non-2xx HTTP response, with a best-effort message from the body
    #[error("HTTP error {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Value,
    },

    /// Transport-level failure other than a timeout
    #[error("network error: {0}")]
    Network(String),

    /// No session and no stored token to fall back on
    #[error("login required")]
    LoginRequired,

    #[error("no refresh token available")]
    NoRefreshToken,

    /// Tenant discovery returned no usable company
    #[error("no company available for login")]
    NoTenant,

    /// Storage backend failure (keychain, file, ...)
    #[error("storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// Base64 decoding error
    #[error("Base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Create a new HTTP error from a status code and parsed body
    pub fn http(status: u16, message: impl Into<String>, body: Value) -> Self {
        ApiError::Http {
            status,
            message: message.into(),
            body,
        }
    }

    /// Check if this error is the distinguished timeout kind
    pub fn is_timeout(&self) -> bool {
        matches!(self, ApiError::Timeout { .. })
    }

    /// Check if this error is a validation failure (raised before any network call)
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ApiError::ResourceNotFound(_)
                | ApiError::FieldNotAllowed { .. }
                | ApiError::InvalidFilterKey(_)
                | ApiError::FilterOpNotAllowed { .. }
        )
    }

    /// Get the HTTP status code if this error carries one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type for base_resource operations
pub type Result<T> = std::result::Result<T, ApiError>;
