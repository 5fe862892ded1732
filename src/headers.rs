use uuid::Uuid;

/// Header carrying the manifest schema version for backend compatibility checks
pub const RESOURCE_VERSION_HEADER: &str = "X-Resource-Version";
/// Correlation id header, one UUID per request
pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Deduplication key header for mutating requests
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Inputs for [`build_security_headers`]
#[derive(Debug, Default)]
pub struct SecurityHeaderParams<'a> {
    /// Bearer token; `Authorization` is attached only when this resolves
    pub token: Option<&'a str>,
    /// Deduplication key; attached only for mutating operations, where the
    /// façade generates one if the caller did not supply it
    pub idempotency_key: Option<&'a str>,
    /// Correlation id; generated when not supplied
    pub request_id: Option<&'a str>,
    /// Current manifest schema version, always attached
    pub schema_version: &'a str,
}

/// Assemble the per-request security headers.
///
/// Always includes the schema-version and request-id headers. Request ids are
/// UUID v4 from the platform's cryptographic RNG; they exist for correlation,
/// never for security.
pub fn build_security_headers(params: SecurityHeaderParams<'_>) -> Vec<(String, String)> {
    let mut headers = Vec::with_capacity(4);

    headers.push((
        RESOURCE_VERSION_HEADER.to_string(),
        params.schema_version.to_string(),
    ));

    let request_id = params
        .request_id
        .map(|id| id.to_string())
        .unwrap_or_else(new_request_id);
    headers.push((REQUEST_ID_HEADER.to_string(), request_id));

    if let Some(token) = params.token {
        headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
    }

    if let Some(key) = params.idempotency_key {
        headers.push((IDEMPOTENCY_KEY_HEADER.to_string(), key.to_string()));
    }

    headers
}

/// Generate a fresh request correlation id
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a fresh idempotency key for a mutating request
pub fn new_idempotency_key() -> String {
    Uuid::new_v4().to_string()
}
