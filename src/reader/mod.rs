//! TQ-009: Reader abstraction — the capability that fetches items for a namespace.
//!
//! Readers own their schema documents, their profile list, and the actual fetch. The
//! helpers here implement the filtering and attribute projection every reader applies
//! to its raw records.

pub mod file;
pub mod memory;

use crate::core::schema::SchemaSource;
use crate::core::types::{Condition, Operator};
use crate::error::ReaderError;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Record attributes, in reader order.
pub type Properties = IndexMap<String, String>;

/// One fetched record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Profile the record was read under.
    pub profile: String,
    /// Reader-side identifier, unique per type and profile.
    pub identifier: String,
    pub properties: Properties,
}

/// Data source for one namespace of resource types.
pub trait Reader: Send + Sync {
    fn namespace(&self) -> &str;

    fn item_schema(&self) -> SchemaSource;

    fn link_schema(&self) -> SchemaSource;

    /// Profiles this reader can read under. Must not overlap other readers' profiles.
    fn supported_profiles(&self) -> Vec<String>;

    /// Fetch items of `item_type` across `profiles`, keeping only `attrs` (all when
    /// empty) and only records matching every condition.
    fn get_items(
        &self,
        item_type: &str,
        profiles: &[String],
        attrs: &[String],
        conditions: &[Condition],
    ) -> Result<Vec<Item>, ReaderError>;
}

/// Readers keyed by namespace.
pub type ReaderRegistry = BTreeMap<String, Arc<dyn Reader>>;

/// Build a registry from a reader list, keyed by each reader's namespace.
pub fn registry(readers: &[Arc<dyn Reader>]) -> ReaderRegistry {
    readers
        .iter()
        .map(|r| (r.namespace().to_string(), Arc::clone(r)))
        .collect()
}

/// Keep only the selected attributes, in selection order. An empty selection passes
/// the record through unchanged.
pub fn project_attrs(properties: &Properties, attrs: &[String]) -> Properties {
    if attrs.is_empty() {
        return properties.clone();
    }
    attrs
        .iter()
        .filter_map(|a| properties.get(a).map(|v| (a.clone(), v.clone())))
        .collect()
}

/// Check an item against a condition list.
///
/// Equality conditions on the same attribute are alternatives: the value must be one of
/// them. Every not-equals value is excluded. `id` falls back to the identifier. A missing
/// attribute fails an equality test and passes an inequality test.
pub fn matches_conditions(item: &Item, conditions: &[Condition]) -> bool {
    let mut eq: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut ne: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for c in conditions {
        let bucket = match c.op {
            Operator::Equals => &mut eq,
            Operator::NotEquals => &mut ne,
        };
        bucket.entry(c.attr.as_str()).or_default().push(c.value.as_str());
    }

    let eq_ok = eq
        .iter()
        .all(|(attr, values)| attr_value(item, attr).is_some_and(|v| values.contains(&v)));
    let ne_ok = ne
        .iter()
        .all(|(attr, values)| attr_value(item, attr).is_none_or(|v| !values.contains(&v)));
    eq_ok && ne_ok
}

/// Value of `attr` on an item. `id` falls back to the identifier when the record does
/// not carry it.
pub fn attr_value<'a>(item: &'a Item, attr: &str) -> Option<&'a str> {
    if let Some(v) = item.properties.get(attr) {
        return Some(v.as_str());
    }
    (attr == "id").then_some(item.identifier.as_str())
}

/// Apply conditions then projection, the order every reader uses.
pub fn select(items: Vec<Item>, attrs: &[String], conditions: &[Condition]) -> Vec<Item> {
    items
        .into_iter()
        .filter(|it| matches_conditions(it, conditions))
        .map(|mut it| {
            it.properties = project_attrs(&it.properties, attrs);
            it
        })
        .collect()
}
