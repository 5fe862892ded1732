use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ApiError, Result};
use crate::manifest::{Manifest, ResourceDefinition};
use crate::storage::{Storage, MANIFEST_ETAG_KEY, MANIFEST_KEY};
use crate::transport::{Transport, TransportRequest};

/// Registry of queryable resources backed by a versioned manifest.
///
/// Holds the current manifest behind a single reference swap: readers always
/// see a whole manifest, old or new, even while a background refresh runs.
pub struct Registry {
    current: Mutex<Arc<Manifest>>,
    storage: Arc<dyn Storage>,
}

/// Options for [`Registry::refresh`]
pub struct RefreshOptions<'a> {
    /// Absolute or pre-resolved URL of the remote manifest endpoint
    pub url: &'a str,
    /// Per-attempt timeout for the conditional fetch
    pub timeout: Duration,
    /// Invoked with the new manifest after a successful replacement
    pub on_updated: Option<&'a dyn Fn(&Manifest)>,
}

impl Registry {
    /// Build the registry from the baked manifest, preferring a persisted
    /// cache only when its schema version matches the baked one. A stale or
    /// unreadable cache is overwritten with the baked manifest.
    pub fn new(baked: Manifest, storage: Arc<dyn Storage>) -> Result<Self> {
        let cached = storage
            .get_item(MANIFEST_KEY)?
            .and_then(|json| Manifest::from_json(&json).ok());

        let current = match cached {
            Some(cached) if cached.schema_version == baked.schema_version => {
                debug!(version = %cached.schema_version, "using cached resource manifest");
                cached
            }
            _ => {
                storage.set_item(MANIFEST_KEY, &baked.to_json()?)?;
                storage.delete_item(MANIFEST_ETAG_KEY)?;
                debug!(version = %baked.schema_version, "adopted baked resource manifest");
                baked
            }
        };

        Ok(Registry {
            current: Mutex::new(Arc::new(current)),
            storage,
        })
    }

    /// Snapshot of the current manifest
    pub fn manifest(&self) -> Arc<Manifest> {
        self.current
            .lock()
            .map(|guard| Arc::clone(&guard))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }

    /// Look up a resource definition by name. Pure lookup, no network call.
    pub fn get_resource(&self, name: &str) -> Result<ResourceDefinition> {
        self.manifest()
            .resource(name)
            .cloned()
            .ok_or_else(|| ApiError::ResourceNotFound(name.to_string()))
    }

    /// The current manifest's version tag
    pub fn schema_version(&self) -> String {
        self.manifest().schema_version.clone()
    }

    /// Conditionally fetch a newer manifest from the remote endpoint.
    ///
    /// On 304 or any failure this is a no-op: the last-known-good manifest
    /// stays in place and nothing is surfaced to callers (availability over
    /// freshness). On 200 the in-memory manifest and the persisted cache +
    /// ETag are replaced, then `on_updated` is invoked. Safe to run
    /// concurrently with `query`/`mutate` calls, which read the manifest at
    /// call time.
    pub fn refresh(&self, transport: &dyn Transport, options: RefreshOptions<'_>) {
        let mut headers = Vec::new();
        if let Ok(Some(etag)) = self.storage.get_item(MANIFEST_ETAG_KEY) {
            headers.push(("If-None-Match".to_string(), etag));
        }

        let request = TransportRequest {
            method: "GET".to_string(),
            url: options.url.to_string(),
            headers,
            body: None,
            timeout: options.timeout,
        };

        let response = match transport.execute(&request) {
            Ok(response) => response,
            Err(e) => {
                debug!(error = %e, "manifest refresh failed, keeping current manifest");
                return;
            }
        };

        if response.status == 304 {
            debug!("manifest unchanged (304)");
            return;
        }
        if !(200..300).contains(&response.status) {
            debug!(status = response.status, "manifest refresh rejected, keeping current manifest");
            return;
        }

        let body = String::from_utf8_lossy(&response.body);
        let manifest = match Manifest::from_json(&body) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(error = %e, "remote manifest did not parse, keeping current manifest");
                return;
            }
        };

        if let Err(e) = self.persist(&manifest, response.header("etag")) {
            warn!(error = %e, "failed to persist refreshed manifest");
        }

        let manifest = Arc::new(manifest);
        match self.current.lock() {
            Ok(mut guard) => *guard = Arc::clone(&manifest),
            Err(poisoned) => *poisoned.into_inner() = Arc::clone(&manifest),
        }
        debug!(version = %manifest.schema_version, "resource manifest refreshed");

        if let Some(on_updated) = options.on_updated {
            on_updated(&manifest);
        }
    }

    fn persist(&self, manifest: &Manifest, etag: Option<&str>) -> Result<()> {
        self.storage.set_item(MANIFEST_KEY, &manifest.to_json()?)?;
        match etag {
            Some(etag) => self.storage.set_item(MANIFEST_ETAG_KEY, etag)?,
            None => self.storage.delete_item(MANIFEST_ETAG_KEY)?,
        }
        Ok(())
    }
}
