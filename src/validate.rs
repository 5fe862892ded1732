use serde_json::{Map, Value};

use crate::error::{ApiError, Result};
use crate::manifest::ResourceDefinition;
use crate::resource::Field;

/// Check every requested field against the resource's allowed field set.
///
/// All-or-nothing: fails on the first offending field (aliases unwrap to
/// their underlying path) and never returns a partial field list.
pub fn validate_fields(resource: &ResourceDefinition, fields: &[Field]) -> Result<()> {
    for field in fields {
        let path = field.path();
        if !resource.fields.contains(path) {
            return Err(ApiError::FieldNotAllowed {
                resource: resource.name.clone(),
                field: path.to_string(),
            });
        }
    }
    Ok(())
}

/// Check every filter key against the resource's allowed (field, operator)
/// pairs. `None` is a no-op: "no filter" is distinct from an invalid one.
///
/// A key must split on `.` into at least two segments; the last segment is
/// the operator and the dot-rejoined remainder the field.
pub fn validate_filters(
    resource: &ResourceDefinition,
    filters: Option<&Map<String, Value>>,
) -> Result<()> {
    let Some(filters) = filters else {
        return Ok(());
    };

    for key in filters.keys() {
        let segments: Vec<&str> = key.split('.').collect();
        if segments.len() < 2 {
            return Err(ApiError::InvalidFilterKey(key.clone()));
        }

        let op = segments[segments.len() - 1];
        let field = segments[..segments.len() - 1].join(".");

        if !resource.fields.contains(&field) {
            return Err(ApiError::FilterOpNotAllowed {
                resource: resource.name.clone(),
                key: key.clone(),
            });
        }

        let allowed = resource
            .allowed_ops
            .get(&field)
            .filter(|ops| ops.contains(op));
        if allowed.is_none() {
            return Err(ApiError::FilterOpNotAllowed {
                resource: resource.name.clone(),
                key: key.clone(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::manifest::ResourceDefinition;

    fn recordings() -> ResourceDefinition {
        ResourceDefinition::new("audio_recordings", "/q")
            .with_filterable_field("id", ["eq", "in"])
            .with_field("title")
            .with_filterable_field("meta.duration", ["gte"])
    }

    fn filters(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fields_all_allowed() {
        let fields = vec![Field::from("id"), Field::aliased("title", "name")];
        assert!(validate_fields(&recordings(), &fields).is_ok());
    }

    #[test]
    fn test_fields_fail_names_first_offender() {
        let fields = vec![
            Field::from("id"),
            Field::from("secret"),
            Field::from("also_bad"),
        ];
        match validate_fields(&recordings(), &fields) {
            Err(ApiError::FieldNotAllowed { resource, field }) => {
                assert_eq!(resource, "audio_recordings");
                assert_eq!(field, "secret");
            }
            other => panic!("expected FieldNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn test_alias_validates_underlying_path() {
        let fields = vec![Field::aliased("secret", "s")];
        match validate_fields(&recordings(), &fields) {
            Err(ApiError::FieldNotAllowed { field, .. }) => assert_eq!(field, "secret"),
            other => panic!("expected FieldNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn test_no_filters_is_noop() {
        assert!(validate_filters(&recordings(), None).is_ok());
    }

    #[test]
    fn test_filter_allowed_pair_passes() {
        let f = filters(&[("id.eq", json!(5)), ("id.in", json!([1, 2]))]);
        assert!(validate_filters(&recordings(), Some(&f)).is_ok());
    }

    #[test]
    fn test_filter_key_without_operator_fails() {
        let f = filters(&[("id", json!(5))]);
        match validate_filters(&recordings(), Some(&f)) {
            Err(ApiError::InvalidFilterKey(key)) => assert_eq!(key, "id"),
            other => panic!("expected InvalidFilterKey, got {:?}", other),
        }
    }

    #[test]
    fn test_filter_op_not_in_allowed_list_fails() {
        let f = filters(&[("id.gte", json!(5))]);
        match validate_filters(&recordings(), Some(&f)) {
            Err(ApiError::FilterOpNotAllowed { key, .. }) => assert_eq!(key, "id.gte"),
            other => panic!("expected FilterOpNotAllowed, got {:?}", other),
        }
    }

    #[test]
    fn test_field_with_no_configured_ops_fails() {
        // "title" is selectable but has no allowed operators at all
        let f = filters(&[("title.eq", json!("x"))]);
        assert!(matches!(
            validate_filters(&recordings(), Some(&f)),
            Err(ApiError::FilterOpNotAllowed { .. })
        ));
    }

    #[test]
    fn test_dotted_field_name_decomposes_from_the_right() {
        // "meta.duration.gte" -> field "meta.duration", op "gte"
        let f = filters(&[("meta.duration.gte", json!(30))]);
        assert!(validate_filters(&recordings(), Some(&f)).is_ok());

        let f = filters(&[("meta.duration.eq", json!(30))]);
        assert!(matches!(
            validate_filters(&recordings(), Some(&f)),
            Err(ApiError::FilterOpNotAllowed { .. })
        ));
    }
}
