//! TQ-007: Result aggregation model.
//!
//! One group per completed task, one item per fetched record. Items link to the groups
//! their joins produced, which gives the hierarchy the renderers walk.

use super::types::{Condition, NamespacedType};
use crate::reader::Item;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// A fetched record inside its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItem {
    pub id: String,
    pub group_id: String,
    pub record: Item,
    /// Set when the owning fetch failed after returning this record.
    pub query_error: Option<String>,
    /// One entry per outgoing link whose source attribute the record lacks.
    pub link_errors: Vec<String>,
}

/// Output of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultGroup {
    pub id: String,
    pub node_id: String,
    pub node_type: NamespacedType,
    pub items: Vec<ResultItem>,
    /// Join conditions that scoped the fetch. Empty for the root group.
    pub link_conditions: Vec<Condition>,
    /// Failure reading the node's outgoing links.
    pub link_error: Option<String>,
    /// Failure of the fetch itself.
    pub fetch_error: Option<String>,
    /// Item that spawned this group. `None` for the root group.
    pub parent_item: Option<String>,
}

impl ResultGroup {
    pub fn is_root(&self) -> bool {
        self.parent_item.is_none()
    }
}

/// Everything a run produced. Written by a single aggregator, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    groups: BTreeMap<String, ResultGroup>,
    root_group_ids: BTreeSet<String>,
    children: FxHashMap<String, BTreeSet<String>>,
    item_groups: FxHashMap<String, String>,
}

impl ExecutionResult {
    /// Store a group, registering it as a root or under its parent item.
    pub fn record(&mut self, group: ResultGroup) {
        match &group.parent_item {
            None => {
                self.root_group_ids.insert(group.id.clone());
            }
            Some(parent) => {
                self.children
                    .entry(parent.clone())
                    .or_default()
                    .insert(group.id.clone());
            }
        }
        for item in &group.items {
            self.item_groups.insert(item.id.clone(), group.id.clone());
        }
        self.groups.insert(group.id.clone(), group);
    }

    pub fn group(&self, id: &str) -> Option<&ResultGroup> {
        self.groups.get(id)
    }

    pub fn item(&self, id: &str) -> Option<&ResultItem> {
        let group = self.groups.get(self.item_groups.get(id)?)?;
        group.items.iter().find(|i| i.id == id)
    }

    pub fn root_groups(&self) -> impl Iterator<Item = &ResultGroup> {
        self.root_group_ids
            .iter()
            .filter_map(|id| self.groups.get(id))
    }

    /// Groups spawned by an item, ordered by group id.
    pub fn child_groups(&self, item_id: &str) -> impl Iterator<Item = &ResultGroup> {
        self.children
            .get(item_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.groups.get(id))
    }

    pub fn groups(&self) -> impl Iterator<Item = &ResultGroup> {
        self.groups.values()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn item_count(&self) -> usize {
        self.item_groups.len()
    }
}
