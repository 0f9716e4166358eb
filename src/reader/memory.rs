//! TQ-011: In-memory reader.
//!
//! Holds records per (profile, type) with inline schema documents. Used for fixtures,
//! benchmarks, and embedding callers that already have their data loaded.

use super::{select, Item, Properties, Reader};
use crate::core::schema::SchemaSource;
use crate::core::types::Condition;
use crate::error::ReaderError;
use std::collections::{BTreeMap, HashMap};

/// Reader backed by in-memory records.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    namespace: String,
    profiles: Vec<String>,
    item_schema: String,
    link_schema: String,
    records: BTreeMap<(String, String), Vec<Item>>,
    failures: HashMap<String, String>,
}

impl MemoryReader {
    pub fn new(namespace: &str, profiles: &[&str]) -> Self {
        Self {
            namespace: namespace.to_string(),
            profiles: profiles.iter().map(|p| p.to_string()).collect(),
            item_schema: "{}".to_string(),
            link_schema: "{}".to_string(),
            ..Self::default()
        }
    }

    /// Set the inline item and link schema documents.
    pub fn with_schemas(mut self, item_schema: &str, link_schema: &str) -> Self {
        self.item_schema = item_schema.to_string();
        self.link_schema = link_schema.to_string();
        self
    }

    /// Add a record of `item_type` under `profile`. The `id` property, when present, is
    /// the identifier; otherwise the record's position is used.
    pub fn with_record(mut self, profile: &str, item_type: &str, props: &[(&str, &str)]) -> Self {
        let properties: Properties = props
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let bucket = self
            .records
            .entry((profile.to_string(), item_type.to_string()))
            .or_default();
        let identifier = properties
            .get("id")
            .cloned()
            .unwrap_or_else(|| bucket.len().to_string());
        bucket.push(Item {
            profile: profile.to_string(),
            identifier,
            properties,
        });
        self
    }

    /// Make every fetch of `item_type` fail with `message`.
    pub fn failing(mut self, item_type: &str, message: &str) -> Self {
        self.failures
            .insert(item_type.to_string(), message.to_string());
        self
    }
}

impl Reader for MemoryReader {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn item_schema(&self) -> SchemaSource {
        SchemaSource::Inline(self.item_schema.clone())
    }

    fn link_schema(&self) -> SchemaSource {
        SchemaSource::Inline(self.link_schema.clone())
    }

    fn supported_profiles(&self) -> Vec<String> {
        self.profiles.clone()
    }

    fn get_items(
        &self,
        item_type: &str,
        profiles: &[String],
        attrs: &[String],
        conditions: &[Condition],
    ) -> Result<Vec<Item>, ReaderError> {
        if let Some(message) = self.failures.get(item_type) {
            return Err(ReaderError::Fetch {
                item_type: item_type.to_string(),
                message: message.clone(),
            });
        }
        let raw: Vec<Item> = profiles
            .iter()
            .filter_map(|p| self.records.get(&(p.clone(), item_type.to_string())))
            .flatten()
            .cloned()
            .collect();
        Ok(select(raw, attrs, conditions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> MemoryReader {
        MemoryReader::new("mem", &["dev", "prod"])
            .with_record("dev", "host", &[("id", "h1"), ("zone", "a")])
            .with_record("prod", "host", &[("id", "h2"), ("zone", "b")])
            .with_record("dev", "disk", &[("size", "10")])
    }

    #[test]
    fn test_tq011_reads_selected_profiles() {
        let r = reader();
        let items = r.get_items("host", &["dev".to_string()], &[], &[]).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identifier, "h1");
        assert_eq!(items[0].profile, "dev");

        let all = r
            .get_items("host", &["dev".to_string(), "prod".to_string()], &[], &[])
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_tq011_positional_identifier() {
        let r = reader();
        let items = r.get_items("disk", &["dev".to_string()], &[], &[]).unwrap();
        assert_eq!(items[0].identifier, "0");
    }

    #[test]
    fn test_tq011_conditions_and_attrs() {
        let r = reader();
        let items = r
            .get_items(
                "host",
                &["dev".to_string(), "prod".to_string()],
                &["zone".to_string()],
                &[Condition::equals("zone", "b")],
            )
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].identifier, "h2");
        assert_eq!(items[0].properties.len(), 1);
    }

    #[test]
    fn test_tq011_failing_type() {
        let r = reader().failing("host", "throttled");
        let err = r.get_items("host", &["dev".to_string()], &[], &[]).unwrap_err();
        assert!(err.to_string().contains("throttled"));
    }

    #[test]
    fn test_tq011_unknown_type_is_empty() {
        let r = reader();
        assert!(r.get_items("nope", &["dev".to_string()], &[], &[]).unwrap().is_empty());
    }
}
