//! TQ-004: Planner — compile a query AST into an execution plan.
//!
//! Every query item becomes a node. Consecutive items are connected along the
//! topology's shortest path; types on that path that the query did not name are
//! inserted as unrestricted intermediate nodes.

use super::plan::{ExecutionPlan, NodeSpec};
use super::topology::Topology;
use super::types::{Condition, NamespacedType};
use crate::error::{PlanError, TopologyError};
use crate::query::ast::{AttrSelection, Ast, Modifier, ProfileSelector, QueryItem, TypeRef};
use crate::reader::{registry, Reader, ReaderRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Strategy that turns a parsed query into a plan.
pub trait Planner {
    fn plan(
        &self,
        ast: &Ast,
        topology: &Topology,
        readers: &[Arc<dyn Reader>],
    ) -> Result<ExecutionPlan, PlanError>;
}

/// Shortest-path planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlanner;

impl Planner for DefaultPlanner {
    fn plan(
        &self,
        ast: &Ast,
        topology: &Topology,
        readers: &[Arc<dyn Reader>],
    ) -> Result<ExecutionPlan, PlanError> {
        let available = profile_owners(readers)?;
        let profiles = select_profiles(&ast.profiles, &available)?;
        info!(profiles = ?profiles, "selected profiles");

        let registry = registry(readers);
        let specs = ast
            .items()
            .map(|item| item_spec(item, topology, &registry, &profiles))
            .collect::<Result<Vec<_>, _>>()?;

        let mut plan = ExecutionPlan::new();
        let mut placed: Vec<(String, NamespacedType)> = Vec::with_capacity(specs.len());
        for (i, spec) in specs.into_iter().enumerate() {
            let node_type = spec.node_type.clone();
            let id = if i == 0 {
                plan.set_root(spec)?
            } else {
                plan.add_node(spec)?
            };
            placed.push((id, node_type));
        }

        for pair in placed.windows(2) {
            let (prev_id, prev_type) = &pair[0];
            let (next_id, next_type) = &pair[1];
            connect(
                &mut plan,
                topology,
                &registry,
                &profiles,
                (prev_id.as_str(), prev_type),
                (next_id.as_str(), next_type),
            )?;
        }

        info!(nodes = plan.len(), edges = plan.edge_count(), "plan built");
        Ok(plan)
    }
}

/// Map every profile to the namespace that owns it. Profiles may not be shared.
fn profile_owners(readers: &[Arc<dyn Reader>]) -> Result<BTreeMap<String, String>, PlanError> {
    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for reader in readers {
        for profile in reader.supported_profiles() {
            if owners.contains_key(&profile) {
                if !duplicates.contains(&profile) {
                    duplicates.push(profile);
                }
                continue;
            }
            owners.insert(profile, reader.namespace().to_string());
        }
    }
    if !duplicates.is_empty() {
        duplicates.sort();
        return Err(PlanError::ProfileCollision(duplicates));
    }
    Ok(owners)
}

fn select_profiles(
    selector: &ProfileSelector,
    available: &BTreeMap<String, String>,
) -> Result<Vec<String>, PlanError> {
    match selector {
        ProfileSelector::All => Ok(available.keys().cloned().collect()),
        ProfileSelector::Explicit(names) if names.is_empty() => {
            Ok(available.keys().cloned().collect())
        }
        ProfileSelector::Explicit(names) => {
            let mut selected: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                if !available.contains_key(name) {
                    return Err(PlanError::UnknownProfile(name.clone()));
                }
                if !selected.contains(name) {
                    selected.push(name.clone());
                }
            }
            Ok(selected)
        }
    }
}

/// Resolve a type reference against the topology.
pub fn resolve_type(type_ref: &TypeRef, topology: &Topology) -> Result<NamespacedType, PlanError> {
    let resolved = match type_ref {
        TypeRef::Qualified {
            namespace,
            type_name,
        } => {
            if namespace.is_empty() || type_name.is_empty() {
                return Err(PlanError::InvalidTypeRef(type_ref.to_string()));
            }
            NamespacedType::new(namespace.as_str(), type_name.as_str())
        }
        TypeRef::Unqualified(name) => {
            if name.is_empty() {
                return Err(PlanError::InvalidTypeRef(type_ref.to_string()));
            }
            let namespaces = topology.namespaces_for_type(name)?;
            if namespaces.len() != 1 {
                return Err(PlanError::AmbiguousType {
                    name: name.clone(),
                    namespaces,
                });
            }
            NamespacedType::new(namespaces[0].as_str(), name.as_str())
        }
    };
    if !topology.contains(&resolved) {
        return Err(TopologyError::UnknownType(resolved).into());
    }
    Ok(resolved)
}

fn item_spec(
    item: &QueryItem,
    topology: &Topology,
    registry: &ReaderRegistry,
    profiles: &[String],
) -> Result<NodeSpec, PlanError> {
    let node_type = resolve_type(&item.type_ref, topology)?;
    let mut attrs: Vec<String> = Vec::new();
    let mut conditions: Vec<Condition> = Vec::new();

    for modifier in &item.modifiers {
        match modifier {
            Modifier::Attrs(AttrSelection::All) => {
                for attr in topology.attrs(&node_type).into_iter().flatten() {
                    if !attrs.contains(attr) {
                        attrs.push(attr.clone());
                    }
                }
            }
            Modifier::Attrs(AttrSelection::Named(names)) => {
                for name in names {
                    if !topology.supports_attr(&node_type, name) {
                        return Err(PlanError::UnsupportedAttr {
                            node_type: node_type.clone(),
                            attr: name.clone(),
                        });
                    }
                    if !attrs.contains(name) {
                        attrs.push(name.clone());
                    }
                }
            }
            Modifier::Search(search) => {
                if !topology.supports_attr(&node_type, &search.attr) {
                    return Err(PlanError::UnsupportedCondition {
                        node_type: node_type.clone(),
                        attr: search.attr.clone(),
                    });
                }
                conditions.push(Condition {
                    attr: search.attr.clone(),
                    op: search.op,
                    value: search.value.clone(),
                });
            }
        }
    }

    Ok(NodeSpec {
        reader: reader_for(&node_type, registry)?,
        node_type,
        profiles: profiles.to_vec(),
        attrs,
        conditions,
    })
}

fn reader_for(
    node_type: &NamespacedType,
    registry: &ReaderRegistry,
) -> Result<Arc<dyn Reader>, PlanError> {
    registry
        .get(&node_type.namespace)
        .cloned()
        .ok_or_else(|| PlanError::NoReader(node_type.namespace.clone()))
}

/// Join two placed nodes along the shortest topology path, inserting intermediates.
fn connect(
    plan: &mut ExecutionPlan,
    topology: &Topology,
    registry: &ReaderRegistry,
    profiles: &[String],
    (prev_id, prev_type): (&str, &NamespacedType),
    (next_id, next_type): (&str, &NamespacedType),
) -> Result<(), PlanError> {
    if prev_type == next_type {
        let mapping = topology
            .edge(prev_type, next_type)
            .map_err(|_| TopologyError::NoPath(prev_type.clone(), next_type.clone()))?;
        return plan.add_edge(prev_id, next_id, mapping);
    }

    let path = topology.shortest_path(prev_type, next_type)?;
    let mut current_id = prev_id.to_string();
    let last = path.len().saturating_sub(1);
    for (i, hop) in path.iter().enumerate().skip(1) {
        let hop_id = if i == last {
            next_id.to_string()
        } else {
            let id = plan.add_node(NodeSpec {
                node_type: hop.clone(),
                profiles: profiles.to_vec(),
                attrs: Vec::new(),
                conditions: Vec::new(),
                reader: reader_for(hop, registry)?,
            })?;
            debug!(node = %id, node_type = %hop, "inserted implicit hop");
            id
        };
        let mapping = topology.edge(&path[i - 1], hop)?;
        plan.add_edge(&current_id, &hop_id, mapping)?;
        current_id = hop_id;
    }
    Ok(())
}
