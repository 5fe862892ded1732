use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::client::{HttpClient, SendRequest};
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::headers::{build_security_headers, new_idempotency_key, SecurityHeaderParams};
use crate::manifest::Manifest;
use crate::registry::{RefreshOptions, Registry};
use crate::session::SessionManager;
use crate::storage::{KeychainStorage, Storage};
use crate::transport::{HttpTransport, Transport};
use crate::validate::{validate_fields, validate_filters};

/// A selected field: either a plain path or a path with a response alias.
/// Wire form is `"path"` or `"path:alias"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Path(String),
    Aliased { path: String, alias: String },
}

impl Field {
    /// Create an aliased field selection
    pub fn aliased(path: impl Into<String>, alias: impl Into<String>) -> Self {
        Field::Aliased {
            path: path.into(),
            alias: alias.into(),
        }
    }

    /// The underlying field path (what gets validated)
    pub fn path(&self) -> &str {
        match self {
            Field::Path(path) => path,
            Field::Aliased { path, .. } => path,
        }
    }

    /// Serialize to the wire form
    pub fn wire(&self) -> String {
        match self {
            Field::Path(path) => path.clone(),
            Field::Aliased { path, alias } => format!("{}:{}", path, alias),
        }
    }
}

impl From<&str> for Field {
    fn from(path: &str) -> Self {
        Field::Path(path.to_string())
    }
}

impl From<String> for Field {
    fn from(path: String) -> Self {
        Field::Path(path)
    }
}

/// Filter map keyed by `"<field>.<op>"` strings
pub type Filters = Map<String, Value>;

/// Parameters for [`Context::query`]
#[derive(Debug, Clone)]
pub struct QueryParams {
    pub resource: String,
    pub fields: Vec<Field>,
    pub filters: Option<Filters>,
    /// Passed through verbatim as the envelope's `orderBy` value
    pub sort: Option<Value>,
    pub limit: Option<u64>,
    pub cursor: Option<String>,
    pub timeout: Option<Duration>,
}

impl QueryParams {
    pub fn new<I, F>(resource: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        QueryParams {
            resource: resource.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            filters: None,
            sort: None,
            limit: None,
            cursor: None,
            timeout: None,
        }
    }

    pub fn with_filters(mut self, filters: Filters) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }
}

/// HTTP verb a mutation was issued with; mapped onto the envelope operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MutateVerb {
    /// `operation: "insert"`
    #[default]
    Post,
    /// `operation: "update"`
    Put,
    /// `operation: "delete"`
    Delete,
}

impl MutateVerb {
    fn operation(self) -> &'static str {
        match self {
            MutateVerb::Post => "insert",
            MutateVerb::Put => "update",
            MutateVerb::Delete => "delete",
        }
    }
}

/// Parameters for [`Context::mutate`]
#[derive(Debug, Clone)]
pub struct MutateParams {
    pub resource: String,
    pub fields: Vec<Field>,
    pub data: Value,
    pub verb: MutateVerb,
    /// Deduplication key; generated when absent so timeout retries cannot
    /// double-apply server-side
    pub idempotency_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl MutateParams {
    pub fn new<I, F>(resource: impl Into<String>, fields: I, data: Value) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        MutateParams {
            resource: resource.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            data,
            verb: MutateVerb::default(),
            idempotency_key: None,
            timeout: None,
        }
    }

    pub fn with_verb(mut self, verb: MutateVerb) -> Self {
        self.verb = verb;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Tagged response envelope for query results.
///
/// The backend answers with `{success, data: [...]}`, a bare array, or a bare
/// object depending on the call site; this variant lets consumers pattern
/// match instead of probing shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
    Rows(Vec<Value>),
    Scalar(Value),
}

impl ResourceData {
    /// Classify a parsed response body
    pub fn from_value(value: Value) -> Self {
        if let Value::Object(ref map) = value {
            if let Some(Value::Array(rows)) = map.get("data") {
                return ResourceData::Rows(rows.clone());
            }
        }
        match value {
            Value::Array(rows) => ResourceData::Rows(rows),
            other => ResourceData::Scalar(other),
        }
    }

    pub fn rows(&self) -> Option<&[Value]> {
        match self {
            ResourceData::Rows(rows) => Some(rows),
            ResourceData::Scalar(_) => None,
        }
    }

    /// Rows, or an empty list for scalar responses
    pub fn into_rows(self) -> Vec<Value> {
        match self {
            ResourceData::Rows(rows) => rows,
            ResourceData::Scalar(_) => Vec::new(),
        }
    }
}

/// Result of a query: the raw body plus its classified form
#[derive(Debug, Clone)]
pub struct QueryResponse {
    pub raw: Value,
    pub data: ResourceData,
}

impl QueryResponse {
    fn new(raw: Value) -> Self {
        QueryResponse {
            data: ResourceData::from_value(raw.clone()),
            raw,
        }
    }
}

/// The sanctioned entry point for resource operations.
///
/// Composes the registry, validator, header builder, HTTP client, and session
/// manager; platform pieces (transport, storage) are injected once here.
pub struct Context {
    client: HttpClient,
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    session: Arc<SessionManager>,
    config: Config,
}

impl Context {
    /// Production composition: blocking HTTP transport + platform keychain
    pub fn new(config: Config, baked: Manifest) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new());
        let storage: Arc<dyn Storage> = Arc::new(KeychainStorage::new("api-builder"));
        Self::with_parts(config, baked, transport, storage)
    }

    /// Composition-root constructor with injected transport and storage
    pub fn with_parts(
        config: Config,
        baked: Manifest,
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        let registry = Arc::new(Registry::new(baked, Arc::clone(&storage))?);
        let client = HttpClient::new(Arc::clone(&transport), config.clone());
        let session = Arc::new(SessionManager::new(client.clone(), Arc::clone(&storage)));
        Ok(Context {
            client,
            transport,
            registry,
            session,
            config,
        })
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fetch a newer manifest if the backend has one. Failures fall back to
    /// the last-known-good manifest and are never surfaced; run this on a
    /// background thread for fire-and-forget semantics.
    pub fn refresh_registry(&self, url: Option<&str>, on_updated: Option<&dyn Fn(&Manifest)>) {
        let default_url = format!(
            "{}{}",
            self.config.base_url(),
            self.config.public_path("query/v1/manifest")
        );
        self.registry.refresh(
            self.transport.as_ref(),
            RefreshOptions {
                url: url.unwrap_or(&default_url),
                timeout: self.config.timeout,
                on_updated,
            },
        );
    }

    /// Run a query against a resource.
    ///
    /// Fields and filters are validated against the manifest before any
    /// network call; the request POSTs the standard envelope to the
    /// resource's endpoint.
    pub fn query(&self, params: &QueryParams) -> Result<QueryResponse> {
        let resource = self.registry.get_resource(&params.resource)?;
        validate_fields(&resource, &params.fields)?;
        validate_filters(&resource, params.filters.as_ref())?;

        let mut envelope = Map::new();
        envelope.insert("operation".to_string(), json!("query"));
        envelope.insert("resource".to_string(), json!(params.resource));
        envelope.insert(
            "fields".to_string(),
            Value::Array(
                params
                    .fields
                    .iter()
                    .map(|f| Value::String(f.wire()))
                    .collect(),
            ),
        );
        if let Some(ref filters) = params.filters {
            envelope.insert("filters".to_string(), Value::Object(filters.clone()));
        }
        if let Some(ref sort) = params.sort {
            envelope.insert("orderBy".to_string(), sort.clone());
        }
        if params.limit.is_some() || params.cursor.is_some() {
            let mut pagination = Map::new();
            if let Some(limit) = params.limit {
                pagination.insert("limit".to_string(), json!(limit));
            }
            if let Some(ref cursor) = params.cursor {
                pagination.insert("cursor".to_string(), json!(cursor));
            }
            envelope.insert("pagination".to_string(), Value::Object(pagination));
        }

        let mut request =
            SendRequest::new("POST", resource.endpoint.clone()).with_body(Value::Object(envelope));
        request.timeout = params.timeout;

        let raw = self.send_with_auth(request, None)?;
        Ok(QueryResponse::new(raw))
    }

    /// Apply a mutation to a resource.
    ///
    /// Only the field list is validated; data payload keys are mapped
    /// server-side. Every mutation carries an idempotency key so the
    /// timeout-retry path cannot double-apply.
    pub fn mutate(&self, params: &MutateParams) -> Result<Value> {
        let resource = self.registry.get_resource(&params.resource)?;
        validate_fields(&resource, &params.fields)?;

        let envelope = json!({
            "operation": params.verb.operation(),
            "resource": params.resource,
            "data": params.data,
        });

        let key = params
            .idempotency_key
            .clone()
            .unwrap_or_else(new_idempotency_key);

        let mut request = SendRequest::new("POST", resource.endpoint.clone()).with_body(envelope);
        request.timeout = params.timeout;

        self.send_with_auth(request, Some(&key))
    }

    fn security_headers(&self, idempotency_key: Option<&str>) -> Vec<(String, String)> {
        let token = self.session.access_token();
        build_security_headers(SecurityHeaderParams {
            token: token.as_deref(),
            idempotency_key,
            request_id: None,
            schema_version: &self.registry.schema_version(),
        })
    }

    /// Send with bearer auth and the single 401 refresh-and-retry cycle:
    /// on a 401 the session refreshes once and the request is replayed with
    /// the new token; if the refresh fails, the original 401 propagates.
    fn send_with_auth(&self, request: SendRequest, idempotency_key: Option<&str>) -> Result<Value> {
        let attempt = request
            .clone()
            .with_headers(self.security_headers(idempotency_key));

        match self.client.send(&attempt) {
            Err(ApiError::Http {
                status: 401,
                message,
                body,
            }) => match self.session.refresh_tokens() {
                Ok(_) => {
                    let retry = request.with_headers(self.security_headers(idempotency_key));
                    self.client.send(&retry)
                }
                Err(_) => Err(ApiError::Http {
                    status: 401,
                    message,
                    body,
                }),
            },
            other => other,
        }
    }
}
