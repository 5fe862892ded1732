//! # api-builder - base_resource protocol client
//!
//! Client library for backends exposing the generic `base_resource` endpoint:
//! every resource operation (query, insert, update, delete) multiplexes onto a
//! single POST endpoint with a JSON envelope. This crate is the shared,
//! platform-neutral request-shaping layer: a versioned resource registry,
//! field/filter validation, security headers, a retry-aware HTTP client, and
//! session management over a pluggable storage and transport seam.
//!
//! ## Features
//!
//! - Resource registry loaded from a baked manifest, with cached-copy reuse
//!   and ETag-conditional background refresh
//! - Fail-fast validation of fields and filter operators before any network
//!   call
//! - Bounded retry on client-side timeouts, with a distinguished timeout
//!   error kind
//! - One implicit refresh-and-retry cycle on 401 responses
//! - Login/refresh/logout with tenant auto-discovery and platform-keychain
//!   token storage
//!
//! ## Basic Usage
//!
//! ```no_run
//! use api_builder::{Config, Context, Manifest, QueryParams, ResourceDefinition};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let baked = Manifest::new("v1").with_resource(
//!         ResourceDefinition::new(
//!             "audio_recordings",
//!             "/api/acme/detailing/query/v1/base_resource",
//!         )
//!         .with_filterable_field("id", ["eq", "in"])
//!         .with_field("title"),
//!     );
//!
//!     let ctx = Context::new(Config::from_env(), baked)?;
//!     let response = ctx.query(&QueryParams::new("audio_recordings", ["id", "title"]))?;
//!     for row in response.data.into_rows() {
//!         println!("{}", row);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Sessions
//!
//! ```no_run
//! use api_builder::{Config, Context, LoginCredentials, Manifest};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = Context::new(Config::from_env(), Manifest::new("v1"))?;
//! let session = ctx.session().login(&LoginCredentials {
//!     username: "rep@example.com".to_string(),
//!     password: "secret".to_string(),
//!     company: None, // auto-discovered from the public endpoint
//! })?;
//! println!("logged in as {}", session.claims["name"]);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod manifest;
pub mod registry;
pub mod resource;
pub mod session;
pub mod storage;
pub mod transport;
pub mod validate;

// Re-export main types for convenience
pub use client::{HttpClient, SendRequest};
pub use config::Config;
pub use error::{ApiError, Result};
pub use headers::{build_security_headers, SecurityHeaderParams};
pub use manifest::{Manifest, ResourceDefinition};
pub use registry::{RefreshOptions, Registry};
pub use resource::{
    Context, Field, Filters, MutateParams, MutateVerb, QueryParams, QueryResponse, ResourceData,
};
pub use session::{
    untrusted_claims_preview, LoginCredentials, Session, SessionManager, TokenPair,
};
pub use storage::{FileStorage, KeychainStorage, MemoryStorage, Storage};
pub use transport::{
    HttpTransport, Transport, TransportError, TransportRequest, TransportResponse,
};
pub use validate::{validate_fields, validate_filters};

// Re-export serde_json for convenience
pub use serde_json::json;
