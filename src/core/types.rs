//! TQ-001: Shared types — type identity, search conditions, verbosity.
//!
//! `NamespacedType` is the identity key of every topology node and plan node. It orders
//! by its `"namespace.type"` string form so sorted listings read naturally.

use crate::error::TopologyError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

// ============================================================================
// Type identity
// ============================================================================

/// Identity of a resource kind: `(namespace, type)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NamespacedType {
    pub namespace: String,
    pub type_name: String,
}

impl NamespacedType {
    pub fn new(namespace: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            type_name: type_name.into(),
        }
    }

    /// Parse `"namespace.type"`. The split happens at the first `.`; both sides must be
    /// non-empty.
    pub fn parse(s: &str) -> Result<Self, TopologyError> {
        match s.split_once('.') {
            Some((ns, ty)) if !ns.is_empty() && !ty.is_empty() => Ok(Self::new(ns, ty)),
            _ => Err(TopologyError::EmptyIdentity(s.to_string())),
        }
    }

    fn key_bytes(&self) -> impl Iterator<Item = u8> + '_ {
        self.namespace
            .bytes()
            .chain(std::iter::once(b'.'))
            .chain(self.type_name.bytes())
    }
}

impl fmt::Display for NamespacedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.type_name)
    }
}

impl Ord for NamespacedType {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key_bytes().cmp(other.key_bytes())
    }
}

impl PartialOrd for NamespacedType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// Comparison operator of a search or join condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "eq")]
    Equals,
    #[serde(rename = "ne")]
    NotEquals,
}

impl Operator {
    /// Parse the query-language keyword (`eq` / `ne`).
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Equals),
            "ne" => Some(Self::NotEquals),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals => write!(f, "eq"),
            Self::NotEquals => write!(f, "ne"),
        }
    }
}

/// Filter applied by a reader: `attr op value`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Condition {
    pub attr: String,
    pub op: Operator,
    pub value: String,
}

impl Condition {
    pub fn equals(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            op: Operator::Equals,
            value: value.into(),
        }
    }

    pub fn not_equals(attr: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attr: attr.into(),
            op: Operator::NotEquals,
            value: value.into(),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.attr, self.op, self.value)
    }
}

// ============================================================================
// Output controls
// ============================================================================

/// How much internal detail the renderer includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    #[default]
    Normal,
    /// Adds item/group ids and per-item link errors.
    Debug,
}

/// Document format of the rendered result.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tq001_parse_namespaced_type() {
        let nt = NamespacedType::parse("aws.vpc").unwrap();
        assert_eq!(nt.namespace, "aws");
        assert_eq!(nt.type_name, "vpc");
        assert_eq!(nt.to_string(), "aws.vpc");
    }

    #[test]
    fn test_tq001_parse_splits_at_first_dot() {
        let nt = NamespacedType::parse("k8s.apps.deployment").unwrap();
        assert_eq!(nt.namespace, "k8s");
        assert_eq!(nt.type_name, "apps.deployment");
    }

    #[test]
    fn test_tq001_parse_rejects_empty_sides() {
        assert!(NamespacedType::parse("vpc").is_err());
        assert!(NamespacedType::parse(".vpc").is_err());
        assert!(NamespacedType::parse("aws.").is_err());
        assert!(NamespacedType::parse("").is_err());
    }

    #[test]
    fn test_tq001_ordering_follows_string_form() {
        let a = NamespacedType::new("a-b", "x");
        let b = NamespacedType::new("a", "x");
        // "a-b.x" < "a.x" because '-' sorts before '.'
        assert!(a < b);
        assert_eq!(a.to_string().cmp(&b.to_string()), a.cmp(&b));

        let c = NamespacedType::new("aws", "subnet");
        let d = NamespacedType::new("aws", "vpc");
        assert!(c < d);
    }

    #[test]
    fn test_tq001_equality_needs_both_fields() {
        assert_eq!(NamespacedType::new("a", "x"), NamespacedType::new("a", "x"));
        assert_ne!(NamespacedType::new("a", "x"), NamespacedType::new("b", "x"));
        assert_ne!(NamespacedType::new("a", "x"), NamespacedType::new("a", "y"));
    }

    #[test]
    fn test_tq001_condition_display() {
        assert_eq!(Condition::equals("vpc_id", "vpc-1").to_string(), "vpc_id eq vpc-1");
        assert_eq!(Condition::not_equals("state", "dead").to_string(), "state ne dead");
    }

    #[test]
    fn test_tq001_operator_keywords() {
        assert_eq!(Operator::from_keyword("eq"), Some(Operator::Equals));
        assert_eq!(Operator::from_keyword("ne"), Some(Operator::NotEquals));
        assert_eq!(Operator::from_keyword("gt"), None);
    }

    #[test]
    fn test_tq001_verbosity_serde() {
        let v: Verbosity = serde_yaml_ng::from_str("debug").unwrap();
        assert_eq!(v, Verbosity::Debug);
        assert_eq!(Verbosity::default(), Verbosity::Normal);
    }
}
