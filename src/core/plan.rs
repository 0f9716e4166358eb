//! TQ-005: Execution plan — acyclic graph of fetch nodes compiled from a query.

use super::hasher::ROOT_ID;
use super::topology::JoinMapping;
use super::types::{Condition, NamespacedType};
use crate::error::PlanError;
use crate::reader::Reader;
use indexmap::IndexMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;

/// What a plan node fetches and from where.
#[derive(Clone)]
pub struct NodeSpec {
    pub node_type: NamespacedType,
    pub profiles: Vec<String>,
    /// Selected attributes. Empty means the full record.
    pub attrs: Vec<String>,
    pub conditions: Vec<Condition>,
    pub reader: Arc<dyn Reader>,
}

/// A node of the plan, bound to the reader of its namespace.
#[derive(Clone)]
pub struct ExecutionNode {
    pub id: String,
    pub node_type: NamespacedType,
    pub profiles: Vec<String>,
    pub attrs: Vec<String>,
    pub conditions: Vec<Condition>,
    pub reader: Arc<dyn Reader>,
}

impl fmt::Debug for ExecutionNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionNode")
            .field("id", &self.id)
            .field("node_type", &self.node_type)
            .field("profiles", &self.profiles)
            .field("attrs", &self.attrs)
            .field("conditions", &self.conditions)
            .field("reader", &self.reader.namespace())
            .finish()
    }
}

/// Outgoing edge of a node: `source.source_attr == target.target_attr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub source_attr: String,
    pub target_attr: String,
}

/// Acyclic graph of execution nodes with a single root.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    nodes: IndexMap<String, ExecutionNode>,
    edges: IndexMap<String, Vec<Link>>,
    root: Option<String>,
    seq: usize,
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the root node. Allowed exactly once, before any other node.
    pub fn set_root(&mut self, spec: NodeSpec) -> Result<String, PlanError> {
        if self.root.is_some() {
            return Err(PlanError::RootAlreadySet);
        }
        self.insert(ROOT_ID.to_string(), spec);
        self.root = Some(ROOT_ID.to_string());
        Ok(ROOT_ID.to_string())
    }

    /// Add a non-root node and return its generated id.
    pub fn add_node(&mut self, spec: NodeSpec) -> Result<String, PlanError> {
        if self.root.is_none() {
            return Err(PlanError::RootNotSet);
        }
        self.seq += 1;
        let id = format!("n-{}", self.seq);
        self.insert(id.clone(), spec);
        Ok(id)
    }

    fn insert(&mut self, id: String, spec: NodeSpec) {
        let node = ExecutionNode {
            id: id.clone(),
            node_type: spec.node_type,
            profiles: spec.profiles,
            attrs: spec.attrs,
            conditions: spec.conditions,
            reader: spec.reader,
        };
        self.nodes.insert(id, node);
    }

    /// Connect two nodes. Rejects unknown endpoints and edges that would close a cycle.
    pub fn add_edge(&mut self, from: &str, to: &str, mapping: &JoinMapping) -> Result<(), PlanError> {
        for end in [from, to] {
            if !self.nodes.contains_key(end) {
                return Err(PlanError::UnknownNode(end.to_string()));
            }
        }
        if from == to || self.reaches(to, from) {
            return Err(PlanError::Cycle(from.to_string(), to.to_string()));
        }
        self.edges.entry(from.to_string()).or_default().push(Link {
            source: from.to_string(),
            target: to.to_string(),
            source_attr: mapping.from_attr.clone(),
            target_attr: mapping.to_attr.clone(),
        });
        Ok(())
    }

    fn reaches(&self, start: &str, goal: &str) -> bool {
        let mut stack = vec![start];
        let mut seen = std::collections::HashSet::new();
        while let Some(id) = stack.pop() {
            if id == goal {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(out) = self.edges.get(id) {
                stack.extend(out.iter().map(|l| l.target.as_str()));
            }
        }
        false
    }

    pub fn root(&self) -> Result<&ExecutionNode, PlanError> {
        self.root
            .as_deref()
            .and_then(|id| self.nodes.get(id))
            .ok_or(PlanError::RootNotSet)
    }

    pub fn node(&self, id: &str) -> Option<&ExecutionNode> {
        self.nodes.get(id)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &ExecutionNode> {
        self.nodes.values()
    }

    /// Outgoing links of a node, in the order they were added.
    pub fn links(&self, id: &str) -> Result<Vec<Link>, PlanError> {
        if !self.nodes.contains_key(id) {
            return Err(PlanError::UnknownNode(id.to_string()));
        }
        Ok(self.edges.get(id).cloned().unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(Vec::len).sum()
    }

    /// Attributes to request from the reader for a node. A restricted selection is
    /// extended with the source attributes of outgoing links so joins can proceed.
    pub fn fetch_attrs(&self, id: &str) -> Vec<String> {
        let Some(node) = self.nodes.get(id) else {
            return Vec::new();
        };
        let mut attrs = node.attrs.clone();
        if attrs.is_empty() {
            return attrs;
        }
        for link in self.edges.get(id).into_iter().flatten() {
            if !attrs.contains(&link.source_attr) {
                attrs.push(link.source_attr.clone());
            }
        }
        attrs
    }

    /// Human-readable listing of nodes and edges.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "nodes ({}):", self.nodes.len());
        for node in self.nodes.values() {
            let attrs = if node.attrs.is_empty() {
                "*".to_string()
            } else {
                node.attrs.join(",")
            };
            let _ = writeln!(out, "  {:<8} {}  attrs={}", node.id, node.node_type, attrs);
            if !node.conditions.is_empty() {
                let conds: Vec<String> = node.conditions.iter().map(ToString::to_string).collect();
                let _ = writeln!(out, "           where {}", conds.join(" and "));
            }
            let _ = writeln!(out, "           profiles={}", node.profiles.join(","));
        }
        let _ = writeln!(out, "edges ({}):", self.edge_count());
        for link in self.edges.values().flatten() {
            let _ = writeln!(
                out,
                "  {} -> {}  on {} = {}",
                link.source, link.target, link.source_attr, link.target_attr
            );
        }
        out
    }
}
