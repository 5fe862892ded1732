use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::client::{HttpClient, SendRequest};
use crate::error::{ApiError, Result};
use crate::headers::new_request_id;
use crate::headers::REQUEST_ID_HEADER;
use crate::resource::ResourceData;
use crate::storage::{Storage, ACCESS_TOKEN_KEY, COMPANY_KEY, REFRESH_TOKEN_KEY};

/// Access/refresh token pair returned by the auth endpoints
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// An established session: the bearer token plus display claims
#[derive(Debug, Clone)]
pub struct Session {
    pub access_token: String,
    /// Unverified display claims; never an authorization input
    pub claims: Value,
}

/// Credentials for [`SessionManager::login`]
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
    /// Company slug; auto-discovered from the public endpoint when `None`
    pub company: Option<String>,
}

/// Login/refresh/logout orchestration over the HTTP client and token store.
///
/// The access token lives both in memory (fast path) and in secure storage;
/// the refresh token only in secure storage. This manager is the single owner
/// of that state: the façade reads tokens through it rather than through any
/// module-level global.
pub struct SessionManager {
    client: HttpClient,
    storage: Arc<dyn Storage>,
    access: Mutex<Option<String>>,
}

impl SessionManager {
    pub fn new(client: HttpClient, storage: Arc<dyn Storage>) -> Self {
        SessionManager {
            client,
            storage,
            access: Mutex::new(None),
        }
    }

    /// Current access token: in-memory fast path, falling back to storage
    /// (and repopulating memory) after a process restart
    pub fn access_token(&self) -> Option<String> {
        if let Ok(guard) = self.access.lock() {
            if let Some(token) = guard.as_ref() {
                return Some(token.clone());
            }
        }
        match self.storage.get_item(ACCESS_TOKEN_KEY) {
            Ok(Some(token)) => {
                if let Ok(mut guard) = self.access.lock() {
                    *guard = Some(token.clone());
                }
                Some(token)
            }
            _ => None,
        }
    }

    /// Stored company slug for tenant-scoped paths
    pub fn company(&self) -> Option<String> {
        self.storage.get_item(COMPANY_KEY).ok().flatten()
    }

    /// Log in, auto-selecting a company from the public discovery endpoint
    /// when the caller did not supply one
    pub fn login(&self, credentials: &LoginCredentials) -> Result<Session> {
        let company = match &credentials.company {
            Some(company) => company.clone(),
            None => self.discover_company()?,
        };

        let path = self.client.config().tenant_path(&company, "auth/login");
        let body = self.client.send(
            &SendRequest::new("POST", path)
                .with_body(json!({
                    "username": credentials.username,
                    "password": credentials.password,
                }))
                .with_headers(vec![(REQUEST_ID_HEADER.to_string(), new_request_id())]),
        )?;

        let (pair, claims) = extract_tokens(&body)
            .ok_or_else(|| ApiError::Other("login response carried no tokens".to_string()))?;

        self.store_tokens(&pair)?;
        self.storage.set_item(COMPANY_KEY, &company)?;
        debug!(company = %company, "logged in");

        let claims = match claims {
            Some(claims) => claims,
            None => untrusted_claims_preview(&pair.access_token).unwrap_or(Value::Null),
        };
        Ok(Session {
            access_token: pair.access_token,
            claims,
        })
    }

    /// Exchange the stored refresh token for a fresh pair.
    ///
    /// A refresh failure logs the session out: tokens are cleared before the
    /// error propagates.
    pub fn refresh_tokens(&self) -> Result<TokenPair> {
        let refresh_token = self
            .storage
            .get_item(REFRESH_TOKEN_KEY)?
            .ok_or(ApiError::NoRefreshToken)?;

        let path = match self.company() {
            Some(company) => self.client.config().tenant_path(&company, "auth/refresh"),
            None => self.client.config().public_path("auth/refresh"),
        };

        let result = self.client.send(
            &SendRequest::new("POST", path)
                .with_body(json!({ "refreshToken": refresh_token }))
                .with_headers(vec![(REQUEST_ID_HEADER.to_string(), new_request_id())]),
        );

        let body = match result {
            Ok(body) => body,
            Err(e) => {
                debug!(error = %e, "token refresh failed, clearing session");
                self.clear_tokens();
                return Err(e);
            }
        };

        let Some((pair, _)) = extract_tokens(&body) else {
            self.clear_tokens();
            return Err(ApiError::Other(
                "refresh response carried no tokens".to_string(),
            ));
        };
        self.store_tokens(&pair)?;
        Ok(pair)
    }

    /// Current session, refreshing first to maximize the chance of a valid
    /// token and falling back to a token already in storage
    pub fn get_session(&self) -> Result<Session> {
        if self.storage.get_item(REFRESH_TOKEN_KEY)?.is_some() {
            let pair = self.refresh_tokens()?;
            return Ok(Session {
                claims: untrusted_claims_preview(&pair.access_token).unwrap_or(Value::Null),
                access_token: pair.access_token,
            });
        }

        match self.access_token() {
            Some(token) => Ok(Session {
                claims: untrusted_claims_preview(&token).unwrap_or(Value::Null),
                access_token: token,
            }),
            None => Err(ApiError::LoginRequired),
        }
    }

    /// Log out: best-effort server notification, unconditional local clear
    pub fn logout(&self) -> Result<()> {
        if let Some(token) = self.access_token() {
            let path = match self.company() {
                Some(company) => self.client.config().tenant_path(&company, "auth/logout"),
                None => self.client.config().public_path("auth/logout"),
            };
            let result = self.client.send(&SendRequest::new("POST", path).with_headers(vec![
                ("Authorization".to_string(), format!("Bearer {}", token)),
                (REQUEST_ID_HEADER.to_string(), new_request_id()),
            ]));
            if let Err(e) = result {
                warn!(error = %e, "logout notification failed, clearing local session anyway");
            }
        }
        self.clear_tokens();
        Ok(())
    }

    fn discover_company(&self) -> Result<String> {
        let path = self.client.config().public_path("companies");
        let body = self.client.send(
            &SendRequest::new("GET", path)
                .with_headers(vec![(REQUEST_ID_HEADER.to_string(), new_request_id())]),
        )?;

        ResourceData::from_value(body)
            .into_rows()
            .iter()
            .find_map(|row| row.get("company").and_then(|v| v.as_str()))
            .map(|s| s.to_string())
            .ok_or(ApiError::NoTenant)
    }

    fn store_tokens(&self, pair: &TokenPair) -> Result<()> {
        self.storage.set_item(ACCESS_TOKEN_KEY, &pair.access_token)?;
        self.storage
            .set_item(REFRESH_TOKEN_KEY, &pair.refresh_token)?;
        if let Ok(mut guard) = self.access.lock() {
            *guard = Some(pair.access_token.clone());
        }
        Ok(())
    }

    fn clear_tokens(&self) {
        if let Ok(mut guard) = self.access.lock() {
            *guard = None;
        }
        // best-effort: a failing keychain must not keep a ghost session alive
        let _ = self.storage.delete_item(ACCESS_TOKEN_KEY);
        let _ = self.storage.delete_item(REFRESH_TOKEN_KEY);
    }
}

/// Decode the payload of a JWT without verifying its signature.
///
/// The result is suitable only for display (user name, avatar, roles shown in
/// the UI). Trust is established by the backend validating the bearer token
/// on every request, never by this function.
pub fn untrusted_claims_preview(token: &str) -> Result<Value> {
    let mut segments = token.split('.');
    let payload = segments
        .nth(1)
        .ok_or_else(|| ApiError::Other("token has no payload segment".to_string()))?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&decoded)?)
}

/// Pull a token pair (and any user claims object) out of an auth response,
/// tolerating both the `{success, data: {...}}` envelope and a bare object
fn extract_tokens(body: &Value) -> Option<(TokenPair, Option<Value>)> {
    let obj = match body.get("data") {
        Some(data) if data.get("accessToken").is_some() => data,
        _ => body,
    };
    let access_token = obj.get("accessToken")?.as_str()?.to_string();
    let refresh_token = obj.get("refreshToken")?.as_str()?.to_string();
    let claims = obj.get("user").cloned();
    Some((
        TokenPair {
            access_token,
            refresh_token,
        },
        claims,
    ))
}
