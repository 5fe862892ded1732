use std::time::Duration;

/// Environment variable overriding the backend base URL
pub const BASE_URL_ENV: &str = "API_BUILDER_BASE_URL";

/// Development fallback when no base URL is configured
const LOCALHOST_FALLBACK: &str = "http://localhost:3000";

/// Configuration for the base_resource API client
#[derive(Debug, Clone)]
pub struct Config {
    /// URL scheme (http or https)
    pub scheme: String,
    /// API host (may include a port)
    pub host: String,
    /// Application slug used in tenant-scoped paths
    pub app: String,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Additional attempts after a client-side timeout (total = 1 + this)
    pub max_retries_on_timeout: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scheme: "http".to_string(),
            host: "localhost:3000".to_string(),
            app: "detailing".to_string(),
            timeout: Duration::from_millis(5000),
            max_retries_on_timeout: 1,
        }
    }
}

impl Config {
    /// Create a new configuration with the given scheme and host
    pub fn new(scheme: String, host: String) -> Self {
        Config {
            scheme,
            host,
            ..Config::default()
        }
    }

    /// Resolve configuration from the environment, falling back to localhost
    /// for on-device development when no base URL is set
    pub fn from_env() -> Self {
        let raw = std::env::var(BASE_URL_ENV).unwrap_or_else(|_| LOCALHOST_FALLBACK.to_string());
        match url::Url::parse(&raw) {
            Ok(parsed) => {
                let host = match parsed.port() {
                    Some(port) => format!("{}:{}", parsed.host_str().unwrap_or("localhost"), port),
                    None => parsed.host_str().unwrap_or("localhost").to_string(),
                };
                Config::new(parsed.scheme().to_string(), host)
            }
            Err(_) => Config::new("http".to_string(), "localhost:3000".to_string()),
        }
    }

    /// Set the application slug
    pub fn with_app(mut self, app: impl Into<String>) -> Self {
        self.app = app.into();
        self
    }

    /// Set the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget for client-side timeouts
    pub fn with_max_retries_on_timeout(mut self, retries: u32) -> Self {
        self.max_retries_on_timeout = retries;
        self
    }

    /// Get the base URL for API requests
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// Build a tenant-scoped API path, e.g. `/api/acme/detailing/auth/login`
    pub fn tenant_path(&self, company: &str, rest: &str) -> String {
        format!("/api/{}/{}/{}", company, self.app, rest.trim_start_matches('/'))
    }

    /// Build a public (unauthenticated) API path, e.g. `/api/public/companies`
    pub fn public_path(&self, rest: &str) -> String {
        format!("/api/public/{}", rest.trim_start_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scheme, "http");
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.max_retries_on_timeout, 1);
    }

    #[test]
    fn test_base_url() {
        let config = Config::new("http".to_string(), "localhost:8080".to_string());
        assert_eq!(config.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_tenant_path() {
        let config = Config::default().with_app("detailing");
        assert_eq!(
            config.tenant_path("acme", "auth/login"),
            "/api/acme/detailing/auth/login"
        );
        assert_eq!(
            config.tenant_path("acme", "/query/v1/base_resource"),
            "/api/acme/detailing/query/v1/base_resource"
        );
    }

    #[test]
    fn test_public_path() {
        let config = Config::default();
        assert_eq!(config.public_path("companies"), "/api/public/companies");
    }
}
