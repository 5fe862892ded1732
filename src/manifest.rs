use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A named, schema-constrained entity exposed through the generic
/// base_resource endpoint, with its allowed fields and filter operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Unique resource name (e.g. "audio_recordings")
    pub name: String,

    /// URL path the resource's operations are POSTed to
    pub endpoint: String,

    /// Allowed selectable/filterable field names
    pub fields: BTreeSet<String>,

    /// Permitted filter operators per field; fields absent here accept no filters
    #[serde(rename = "allowedOps", default)]
    pub allowed_ops: BTreeMap<String, BTreeSet<String>>,
}

impl ResourceDefinition {
    /// Create a definition with the given name and endpoint and no fields yet
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>) -> Self {
        ResourceDefinition {
            name: name.into(),
            endpoint: endpoint.into(),
            fields: BTreeSet::new(),
            allowed_ops: BTreeMap::new(),
        }
    }

    /// Add an allowed field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.insert(field.into());
        self
    }

    /// Add an allowed field together with its permitted filter operators
    pub fn with_filterable_field<I, S>(mut self, field: impl Into<String>, ops: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let field = field.into();
        self.fields.insert(field.clone());
        self.allowed_ops
            .insert(field, ops.into_iter().map(Into::into).collect());
        self
    }
}

/// The versioned catalog of all resources and their allowed fields/operators.
///
/// Built once at startup from a baked manifest and only ever replaced whole:
/// readers see either the old or the new catalog, never a partial one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Version tag, stamped on every outgoing request for backend compatibility
    #[serde(rename = "schemaVersion")]
    pub schema_version: String,

    /// When the manifest was generated
    #[serde(rename = "generatedAt")]
    pub generated_at: DateTime<Utc>,

    /// Ordered resource definitions
    pub resources: Vec<ResourceDefinition>,
}

impl Manifest {
    /// Create a manifest with the given version and no resources yet
    pub fn new(schema_version: impl Into<String>) -> Self {
        Manifest {
            schema_version: schema_version.into(),
            generated_at: Utc::now(),
            resources: Vec::new(),
        }
    }

    /// Add a resource definition
    pub fn with_resource(mut self, resource: ResourceDefinition) -> Self {
        self.resources.push(resource);
        self
    }

    /// Parse a manifest from its JSON wire/cache form
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the manifest to its JSON cache form
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Find a resource by name
    pub fn resource(&self, name: &str) -> Option<&ResourceDefinition> {
        self.resources.iter().find(|r| r.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> Manifest {
        Manifest::new("v1").with_resource(
            ResourceDefinition::new("audio_recordings", "/api/acme/detailing/query/v1/base_resource")
                .with_filterable_field("id", ["eq", "in"])
                .with_field("title")
                .with_filterable_field("created_at", ["gte", "lte"]),
        )
    }

    #[test]
    fn test_manifest_json_roundtrip_is_stable() {
        let manifest = sample_manifest();
        let json = manifest.to_json().unwrap();
        let reloaded = Manifest::from_json(&json).unwrap();
        assert_eq!(reloaded, manifest);
        // byte-for-byte: sorted collections make re-serialization deterministic
        assert_eq!(reloaded.to_json().unwrap(), json);
    }

    #[test]
    fn test_wire_field_names() {
        let json = sample_manifest().to_json().unwrap();
        assert!(json.contains("\"schemaVersion\""));
        assert!(json.contains("\"generatedAt\""));
        assert!(json.contains("\"allowedOps\""));
    }

    #[test]
    fn test_resource_lookup() {
        let manifest = sample_manifest();
        assert!(manifest.resource("audio_recordings").is_some());
        assert!(manifest.resource("users").is_none());
    }

    #[test]
    fn test_allowed_ops_default_to_empty() {
        let json = r#"{
            "schemaVersion": "v1",
            "generatedAt": "2026-01-01T00:00:00Z",
            "resources": [{"name": "users", "endpoint": "/q", "fields": ["id"]}]
        }"#;
        let manifest = Manifest::from_json(json).unwrap();
        let users = manifest.resource("users").unwrap();
        assert!(users.allowed_ops.is_empty());
    }
}
