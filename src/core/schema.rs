//! TQ-002: Reader schema documents — parsing and validation.
//!
//! Each reader contributes an item schema (types and their attributes) and a link
//! schema (declared joins between types). Validation rejects:
//! - Type strings that are not `namespace.type` with both sides non-empty
//! - Duplicate `(namespace, type)` entries within one document
//! - Empty attribute fields and empty link mapping fields

use crate::core::types::NamespacedType;
use crate::error::SchemaError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Where a schema document comes from.
#[derive(Debug, Clone)]
pub enum SchemaSource {
    File(PathBuf),
    Inline(String),
}

impl SchemaSource {
    /// Human-readable origin used in error messages.
    pub fn origin(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Inline(_) => "<inline>".to_string(),
        }
    }

    fn read(&self) -> Result<String, SchemaError> {
        match self {
            Self::File(path) => std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
                path: path.clone(),
                source,
            }),
            Self::Inline(json) => Ok(json.clone()),
        }
    }
}

/// `{"items": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ItemSchema {
    #[serde(default)]
    pub items: Vec<ItemDecl>,
}

/// One resource type and the attributes it exposes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ItemDecl {
    /// `"namespace.type"`
    #[serde(rename = "type")]
    pub item_type: String,

    #[serde(default)]
    pub attrs: Vec<AttrDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AttrDecl {
    pub field: String,

    /// Attribute needs an extra per-item call on the reader side.
    #[serde(default, rename = "isExtra")]
    pub is_extra: bool,
}

/// `{"links": [...]}`
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct LinkSchema {
    #[serde(default)]
    pub links: Vec<LinkDecl>,
}

/// A declared join from one type to another.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LinkDecl {
    pub from: String,
    pub to: String,
    pub mapping: MappingDecl,
}

/// `from` attribute value on the source record must equal `to` on the target record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MappingDecl {
    pub from: String,
    pub to: String,
}

/// Load and validate an item schema document.
pub fn load_item_schema(source: &SchemaSource) -> Result<ItemSchema, SchemaError> {
    let origin = source.origin();
    let schema: ItemSchema = serde_json::from_str(&source.read()?)
        .map_err(|e| SchemaError::Parse {
            origin: origin.clone(),
            source: e,
        })?;
    check(origin, validate_item_schema(&schema))?;
    Ok(schema)
}

/// Load and validate a link schema document.
pub fn load_link_schema(source: &SchemaSource) -> Result<LinkSchema, SchemaError> {
    let origin = source.origin();
    let schema: LinkSchema = serde_json::from_str(&source.read()?)
        .map_err(|e| SchemaError::Parse {
            origin: origin.clone(),
            source: e,
        })?;
    check(origin, validate_link_schema(&schema))?;
    Ok(schema)
}

fn check(origin: String, errors: Vec<String>) -> Result<(), SchemaError> {
    if errors.is_empty() {
        return Ok(());
    }
    Err(SchemaError::Validation {
        origin,
        message: errors.join("; "),
    })
}

/// Validate an item schema. Returns a list of errors (empty = valid).
pub fn validate_item_schema(schema: &ItemSchema) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen: HashSet<NamespacedType> = HashSet::new();

    for item in &schema.items {
        match NamespacedType::parse(&item.item_type) {
            Ok(nt) => {
                if !seen.insert(nt.clone()) {
                    errors.push(format!("type {} is declared more than once", nt));
                }
            }
            Err(_) => errors.push(format!(
                "item type \"{}\" must be namespace.type",
                item.item_type
            )),
        }
        for attr in &item.attrs {
            if attr.field.is_empty() {
                errors.push(format!("type {} has an attribute with empty field", item.item_type));
            }
        }
    }

    errors
}

/// Validate a link schema. Returns a list of errors (empty = valid).
pub fn validate_link_schema(schema: &LinkSchema) -> Vec<String> {
    let mut errors = Vec::new();

    for link in &schema.links {
        for end in [&link.from, &link.to] {
            if NamespacedType::parse(end).is_err() {
                errors.push(format!("link endpoint \"{}\" must be namespace.type", end));
            }
        }
        if link.mapping.from.is_empty() || link.mapping.to.is_empty() {
            errors.push(format!(
                "link {} -> {} has an empty mapping field",
                link.from, link.to
            ));
        }
    }

    errors
}

/// JSON Schemas of both documents, keyed by document name.
pub fn json_schemas() -> Vec<(&'static str, schemars::schema::RootSchema)> {
    vec![
        ("item_schema", schemars::schema_for!(ItemSchema)),
        ("link_schema", schemars::schema_for!(LinkSchema)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tq002_load_items_inline() {
        let src = SchemaSource::Inline(
            r#"{"items":[{"type":"aws.vpc","attrs":[{"field":"id"},{"field":"cidr","isExtra":true}]}]}"#
                .to_string(),
        );
        let schema = load_item_schema(&src).unwrap();
        assert_eq!(schema.items.len(), 1);
        assert_eq!(schema.items[0].item_type, "aws.vpc");
        assert!(schema.items[0].attrs[1].is_extra);
        assert!(!schema.items[0].attrs[0].is_extra);
    }

    #[test]
    fn test_tq002_empty_documents_are_valid() {
        let items = load_item_schema(&SchemaSource::Inline("{}".to_string())).unwrap();
        assert!(items.items.is_empty());
        let links = load_link_schema(&SchemaSource::Inline("{}".to_string())).unwrap();
        assert!(links.links.is_empty());
    }

    #[test]
    fn test_tq002_duplicate_type_rejected() {
        let src = SchemaSource::Inline(
            r#"{"items":[{"type":"r1.t1"},{"type":"r1.t1"}]}"#.to_string(),
        );
        let err = load_item_schema(&src).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_tq002_empty_namespace_rejected() {
        let src = SchemaSource::Inline(r#"{"items":[{"type":".t1"}]}"#.to_string());
        assert!(load_item_schema(&src).is_err());
    }

    #[test]
    fn test_tq002_empty_attr_field_rejected() {
        let schema = ItemSchema {
            items: vec![ItemDecl {
                item_type: "a.b".to_string(),
                attrs: vec![AttrDecl {
                    field: String::new(),
                    is_extra: false,
                }],
            }],
        };
        let errors = validate_item_schema(&schema);
        assert!(errors.iter().any(|e| e.contains("empty field")));
    }

    #[test]
    fn test_tq002_link_empty_endpoint_rejected() {
        let src = SchemaSource::Inline(
            r#"{"links":[{"from":"r1.t1","to":"t1","mapping":{"from":"a","to":"b"}}]}"#
                .to_string(),
        );
        let err = load_link_schema(&src).unwrap_err();
        assert!(err.to_string().contains("namespace.type"));
    }

    #[test]
    fn test_tq002_link_empty_mapping_rejected() {
        let schema = LinkSchema {
            links: vec![LinkDecl {
                from: "a.x".to_string(),
                to: "a.y".to_string(),
                mapping: MappingDecl {
                    from: "id".to_string(),
                    to: String::new(),
                },
            }],
        };
        let errors = validate_link_schema(&schema);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("empty mapping"));
    }

    #[test]
    fn test_tq002_missing_mapping_is_parse_error() {
        let src = SchemaSource::Inline(r#"{"links":[{"from":"a.x","to":"a.y"}]}"#.to_string());
        let err = load_link_schema(&src).unwrap_err();
        assert!(matches!(err, SchemaError::Parse { .. }));
    }

    #[test]
    fn test_tq002_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("item_schema.json");
        std::fs::write(&path, r#"{"items":[{"type":"demo.host"}]}"#).unwrap();
        let schema = load_item_schema(&SchemaSource::File(path)).unwrap();
        assert_eq!(schema.items[0].item_type, "demo.host");
    }

    #[test]
    fn test_tq002_missing_file() {
        let src = SchemaSource::File(PathBuf::from("/nonexistent/item_schema.json"));
        assert!(matches!(load_item_schema(&src), Err(SchemaError::Io { .. })));
    }

    #[test]
    fn test_tq002_json_schemas() {
        let schemas = json_schemas();
        assert_eq!(schemas.len(), 2);
        let json = serde_json::to_string(&schemas[1].1).unwrap();
        assert!(json.contains("mapping"));
    }
}
