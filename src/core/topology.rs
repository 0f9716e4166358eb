//! TQ-003: Resource-type topology.
//!
//! A directed graph of `NamespacedType` nodes and declared join links, stored as an
//! adjacency map. Answers attribute lookups and computes unweighted shortest paths with
//! breadth-first search. Neighbors are visited in link declaration order, so ties
//! between equal-length paths resolve to the path using earlier-declared links.

use super::schema::{self, ItemSchema, LinkSchema, SchemaSource};
use super::types::NamespacedType;
use crate::error::{Error, TopologyError};
use crate::reader::Reader;
use indexmap::{IndexMap, IndexSet};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tracing::{debug, info};

/// A resource type and its ordered attribute set.
#[derive(Debug, Clone)]
pub struct TopologyNode {
    pub node_type: NamespacedType,
    pub attrs: IndexSet<String>,
}

/// Join mapping carried by a link: `source.from == target.to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinMapping {
    pub from_attr: String,
    pub to_attr: String,
}

/// Read-only graph of resource types.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: BTreeMap<NamespacedType, TopologyNode>,
    edges: FxHashMap<NamespacedType, IndexMap<NamespacedType, JoinMapping>>,
    type_to_namespaces: FxHashMap<String, BTreeSet<String>>,
}

impl Topology {
    /// Build from all reader-contributed schema documents. Items are registered before
    /// any link so links may cross documents.
    pub fn build(items: &[ItemSchema], links: &[LinkSchema]) -> Result<Self, TopologyError> {
        let mut t = Self::default();
        for schema in items {
            for item in &schema.items {
                let node_type = NamespacedType::parse(&item.item_type)?;
                let attrs = item.attrs.iter().map(|a| a.field.clone()).collect();
                t.add_node(TopologyNode { node_type, attrs })?;
            }
        }
        for schema in links {
            for link in &schema.links {
                let malformed = |reason: &str| TopologyError::MalformedLink {
                    from: link.from.clone(),
                    to: link.to.clone(),
                    reason: reason.to_string(),
                };
                let from = NamespacedType::parse(&link.from)
                    .map_err(|_| malformed("source must be namespace.type"))?;
                let to = NamespacedType::parse(&link.to)
                    .map_err(|_| malformed("target must be namespace.type"))?;
                if link.mapping.from.is_empty() || link.mapping.to.is_empty() {
                    return Err(malformed("mapping fields must not be empty"));
                }
                t.add_edge(
                    from,
                    to,
                    JoinMapping {
                        from_attr: link.mapping.from.clone(),
                        to_attr: link.mapping.to.clone(),
                    },
                )?;
            }
        }
        info!(
            types = t.nodes.len(),
            links = t.edge_count(),
            "topology built"
        );
        Ok(t)
    }

    /// Register a type. Duplicate identities are rejected.
    pub fn add_node(&mut self, node: TopologyNode) -> Result<(), TopologyError> {
        let nt = &node.node_type;
        if nt.namespace.is_empty() || nt.type_name.is_empty() {
            return Err(TopologyError::EmptyIdentity(nt.to_string()));
        }
        if self.nodes.contains_key(nt) {
            return Err(TopologyError::DuplicateType(nt.clone()));
        }
        self.type_to_namespaces
            .entry(nt.type_name.clone())
            .or_default()
            .insert(nt.namespace.clone());
        self.nodes.insert(nt.clone(), node);
        Ok(())
    }

    /// Declare a link between two registered types.
    pub fn add_edge(
        &mut self,
        from: NamespacedType,
        to: NamespacedType,
        mapping: JoinMapping,
    ) -> Result<(), TopologyError> {
        for end in [&from, &to] {
            if !self.nodes.contains_key(end) {
                return Err(TopologyError::UnknownType(end.clone()));
            }
        }
        let out = self.edges.entry(from.clone()).or_default();
        if out.contains_key(&to) {
            return Err(TopologyError::DuplicateLink(from, to));
        }
        out.insert(to, mapping);
        Ok(())
    }

    /// Namespaces that declare a bare type name.
    pub fn namespaces_for_type(&self, name: &str) -> Result<Vec<String>, TopologyError> {
        self.type_to_namespaces
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .ok_or_else(|| TopologyError::UnknownTypeName(name.to_string()))
    }

    /// False for unknown types and unknown attributes.
    pub fn supports_attr(&self, node_type: &NamespacedType, attr: &str) -> bool {
        self.nodes
            .get(node_type)
            .is_some_and(|n| n.attrs.contains(attr))
    }

    /// Declared attributes, or `None` for an unknown type.
    pub fn attrs(&self, node_type: &NamespacedType) -> Option<&IndexSet<String>> {
        self.nodes.get(node_type).map(|n| &n.attrs)
    }

    pub fn contains(&self, node_type: &NamespacedType) -> bool {
        self.nodes.contains_key(node_type)
    }

    /// All registered types in string order.
    pub fn types(&self) -> impl Iterator<Item = &TopologyNode> {
        self.nodes.values()
    }

    /// Direct link between two types.
    pub fn edge(
        &self,
        from: &NamespacedType,
        to: &NamespacedType,
    ) -> Result<&JoinMapping, TopologyError> {
        self.edges
            .get(from)
            .and_then(|out| out.get(to))
            .ok_or_else(|| TopologyError::NoEdge(from.clone(), to.clone()))
    }

    /// Outgoing links of a type, in declaration order.
    pub fn links_from(
        &self,
        from: &NamespacedType,
    ) -> impl Iterator<Item = (&NamespacedType, &JoinMapping)> {
        self.edges.get(from).into_iter().flat_map(|out| out.iter())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(IndexMap::len).sum()
    }

    /// Unweighted shortest path, endpoints included. `from == to` yields `[from]`.
    pub fn shortest_path(
        &self,
        from: &NamespacedType,
        to: &NamespacedType,
    ) -> Result<Vec<NamespacedType>, TopologyError> {
        for end in [from, to] {
            if !self.nodes.contains_key(end) {
                return Err(TopologyError::UnknownType(end.clone()));
            }
        }
        if from == to {
            return Ok(vec![from.clone()]);
        }

        let mut parent: FxHashMap<&NamespacedType, &NamespacedType> = FxHashMap::default();
        let mut queue: VecDeque<&NamespacedType> = VecDeque::new();
        parent.insert(from, from);
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            for (next, _) in self.links_from(current) {
                if parent.contains_key(next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    let mut path = vec![to.clone()];
                    let mut step = to;
                    while step != from {
                        step = parent[step];
                        path.push(step.clone());
                    }
                    path.reverse();
                    debug!(from = %from, to = %to, hops = path.len() - 1, "shortest path");
                    return Ok(path);
                }
                queue.push_back(next);
            }
        }

        Err(TopologyError::NoPath(from.clone(), to.clone()))
    }
}

/// Strategy that produces the topology for a run.
pub trait TopologyLoader {
    fn load(&self) -> Result<Topology, Error>;
}

/// Loads and merges the schema documents of every reader.
pub struct ReaderTopologyLoader {
    readers: Vec<Arc<dyn Reader>>,
}

impl ReaderTopologyLoader {
    pub fn new(readers: Vec<Arc<dyn Reader>>) -> Self {
        Self { readers }
    }
}

impl TopologyLoader for ReaderTopologyLoader {
    fn load(&self) -> Result<Topology, Error> {
        let mut items = Vec::with_capacity(self.readers.len());
        let mut links = Vec::with_capacity(self.readers.len());
        for reader in &self.readers {
            items.push(schema::load_item_schema(&reader.item_schema())?);
            links.push(schema::load_link_schema(&reader.link_schema())?);
        }
        Ok(Topology::build(&items, &links)?)
    }
}

/// Convenience for tests and tools: build from inline JSON documents.
pub fn from_json(items_json: &str, links_json: &str) -> Result<Topology, Error> {
    let items = schema::load_item_schema(&SchemaSource::Inline(items_json.to_string()))?;
    let links = schema::load_link_schema(&SchemaSource::Inline(links_json.to_string()))?;
    Ok(Topology::build(&[items], &[links])?)
}
