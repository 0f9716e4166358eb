//! Error types for every layer of the engine.
//!
//! Schema, topology, planning, query, config and render errors are fatal: they abort a
//! run before any task is scheduled or any output is produced. [`ReaderError`] is the
//! only execution-time error; the runner attributes it to the failing task instead of
//! propagating it.

use crate::core::types::NamespacedType;
use crate::reader::Item;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error returned by the engine and the CLI.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure while loading a reader's item or link schema document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("cannot read schema {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid schema document {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid schema document {origin}: {message}")]
    Validation { origin: String, message: String },
}

/// Failure while building or querying the resource-type topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("type {0} is declared more than once")]
    DuplicateType(NamespacedType),
    #[error("type identity has an empty namespace or type: \"{0}\"")]
    EmptyIdentity(String),
    #[error("malformed link {from} -> {to}: {reason}")]
    MalformedLink {
        from: String,
        to: String,
        reason: String,
    },
    #[error("link {0} -> {1} is declared more than once")]
    DuplicateLink(NamespacedType, NamespacedType),
    #[error("type {0} not found")]
    UnknownType(NamespacedType),
    #[error("type \"{0}\" not found")]
    UnknownTypeName(String),
    #[error("no link from {0} to {1}")]
    NoEdge(NamespacedType, NamespacedType),
    #[error("no path from {0} to {1}")]
    NoPath(NamespacedType, NamespacedType),
}

/// Failure while compiling a query into an execution plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("duplicate profiles found across readers: {}", .0.join(", "))]
    ProfileCollision(Vec<String>),
    #[error("profile \"{0}\" is not supported by any reader")]
    UnknownProfile(String),
    #[error("type \"{name}\" is ambiguous: defined in {}", .namespaces.join(", "))]
    AmbiguousType {
        name: String,
        namespaces: Vec<String>,
    },
    #[error("invalid type reference \"{0}\"")]
    InvalidTypeRef(String),
    #[error("type {node_type} does not support attribute \"{attr}\"")]
    UnsupportedAttr {
        node_type: NamespacedType,
        attr: String,
    },
    #[error("type {node_type} does not support search condition on \"{attr}\"")]
    UnsupportedCondition {
        node_type: NamespacedType,
        attr: String,
    },
    #[error("no reader for namespace \"{0}\"")]
    NoReader(String),
    #[error("root node is already set")]
    RootAlreadySet,
    #[error("root node is not set")]
    RootNotSet,
    #[error("node \"{0}\" is not part of the plan")]
    UnknownNode(String),
    #[error("edge {0} -> {1} would create a cycle")]
    Cycle(String, String),
    #[error("cannot start worker pool: {0}")]
    WorkerPool(String),
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Failure while tokenizing or parsing a query string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("empty query")]
    Empty,
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("expected {expected} at position {pos}, found {found}")]
    Unexpected {
        expected: String,
        found: String,
        pos: usize,
    },
    #[error("unknown operator \"{op}\" at position {pos} (expected eq or ne)")]
    UnknownOperator { op: String, pos: usize },
}

/// Failure while loading or validating the topoquery config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml_ng::Error),
    #[error("{} validation error(s): {}", .0.len(), .0.join("; "))]
    Invalid(Vec<String>),
    #[error("invalid reader pattern \"{pattern}\": {message}")]
    Pattern { pattern: String, message: String },
}

/// Failure while rendering an execution result.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("YAML serialize error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
    #[error("JSON serialize error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("write error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a reader, or while opening a reader.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("fetch failed for {item_type}: {message}")]
    Fetch { item_type: String, message: String },
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid reader data {path}: {message}")]
    Data { path: PathBuf, message: String },
    /// Some profiles were read before `source` stopped the fetch.
    #[error("{source} ({} item(s) read before the failure)", .items.len())]
    Partial {
        items: Vec<Item>,
        #[source]
        source: Box<ReaderError>,
    },
}

impl ReaderError {
    /// Items read before the failure and the rendered failure.
    pub fn into_parts(self) -> (Vec<Item>, String) {
        match self {
            Self::Partial { items, source } => (items, source.to_string()),
            other => (Vec::new(), other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tq000_plan_error_messages() {
        let e = PlanError::AmbiguousType {
            name: "vpc".to_string(),
            namespaces: vec!["aws".to_string(), "gcp".to_string()],
        };
        assert_eq!(e.to_string(), "type \"vpc\" is ambiguous: defined in aws, gcp");

        let e = PlanError::ProfileCollision(vec!["dev".to_string()]);
        assert!(e.to_string().contains("dev"));
    }

    #[test]
    fn test_tq000_topology_error_wraps_into_plan_error() {
        let from = NamespacedType::new("a", "x");
        let to = NamespacedType::new("a", "y");
        let e: PlanError = TopologyError::NoPath(from, to).into();
        assert_eq!(e.to_string(), "no path from a.x to a.y");
    }

    #[test]
    fn test_tq000_reader_error_parts() {
        let inner = ReaderError::Fetch {
            item_type: "host".to_string(),
            message: "denied".to_string(),
        };
        let item = Item {
            profile: "dev".to_string(),
            identifier: "h1".to_string(),
            properties: Default::default(),
        };
        let partial = ReaderError::Partial {
            items: vec![item],
            source: Box::new(inner),
        };
        assert!(partial.to_string().contains("1 item(s)"));
        let (items, message) = partial.into_parts();
        assert_eq!(items.len(), 1);
        assert_eq!(message, "fetch failed for host: denied");
    }

    #[test]
    fn test_tq000_config_invalid_lists_all() {
        let e = ConfigError::Invalid(vec!["one".to_string(), "two".to_string()]);
        assert_eq!(e.to_string(), "2 validation error(s): one; two");
    }
}
