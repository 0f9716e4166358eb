//! TQ-012: Rendering — turn an execution result into a YAML or JSON document.
//!
//! ```yaml
//! results:
//!   - type: r1.t1
//!     link: []
//!     items:
//!       - profile: dev
//!         properties: {id: "1", a: x}
//!         children:
//!           - type: r1.t2
//!             link: [b eq x]
//!             items: [...]
//! ```

use crate::core::result::{ExecutionResult, ResultGroup, ResultItem};
use crate::core::types::{OutputFormat, Verbosity};
use crate::error::RenderError;
use indexmap::IndexMap;
use serde::Serialize;
use std::io::Write;

/// Strategy that presents a finished result.
pub trait Plotter {
    fn render_to(
        &self,
        result: &ExecutionResult,
        verbosity: Verbosity,
        out: &mut dyn Write,
    ) -> Result<(), RenderError>;

    /// Render to stdout.
    fn render(&self, result: &ExecutionResult, verbosity: Verbosity) -> Result<(), RenderError> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        self.render_to(result, verbosity, &mut lock)?;
        lock.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultDocument {
    pub results: Vec<GroupDocument>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub group_type: String,
    pub link: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetch_error: Option<String>,
    pub items: Vec<ItemDocument>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDocument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    pub profile: String,
    pub properties: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub link_errors: Vec<String>,
    pub children: Vec<GroupDocument>,
}

/// Build the serializable tree, starting from the root groups.
pub fn document(result: &ExecutionResult, verbosity: Verbosity) -> ResultDocument {
    ResultDocument {
        results: result
            .root_groups()
            .map(|g| group_document(result, g, verbosity))
            .collect(),
    }
}

fn group_document(
    result: &ExecutionResult,
    group: &ResultGroup,
    verbosity: Verbosity,
) -> GroupDocument {
    let debug = verbosity == Verbosity::Debug;
    GroupDocument {
        id: debug.then(|| group.id.clone()),
        group_type: group.node_type.to_string(),
        link: group.link_conditions.iter().map(ToString::to_string).collect(),
        link_error: group.link_error.clone(),
        fetch_error: group.fetch_error.clone(),
        items: group
            .items
            .iter()
            .map(|i| item_document(result, i, verbosity))
            .collect(),
    }
}

fn item_document(result: &ExecutionResult, item: &ResultItem, verbosity: Verbosity) -> ItemDocument {
    let debug = verbosity == Verbosity::Debug;
    ItemDocument {
        id: debug.then(|| item.id.clone()),
        group_id: debug.then(|| item.group_id.clone()),
        profile: item.record.profile.clone(),
        properties: item.record.properties.clone(),
        query_error: item.query_error.clone(),
        link_errors: if debug {
            item.link_errors.clone()
        } else {
            Vec::new()
        },
        children: result
            .child_groups(&item.id)
            .map(|g| group_document(result, g, verbosity))
            .collect(),
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlPlotter;

impl Plotter for YamlPlotter {
    fn render_to(
        &self,
        result: &ExecutionResult,
        verbosity: Verbosity,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        let yaml = serde_yaml_ng::to_string(&document(result, verbosity))?;
        out.write_all(yaml.as_bytes())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPlotter;

impl Plotter for JsonPlotter {
    fn render_to(
        &self,
        result: &ExecutionResult,
        verbosity: Verbosity,
        out: &mut dyn Write,
    ) -> Result<(), RenderError> {
        serde_json::to_writer_pretty(&mut *out, &document(result, verbosity))?;
        writeln!(out)?;
        Ok(())
    }
}

/// Plotter for an output format.
pub fn plotter_for(format: OutputFormat) -> Box<dyn Plotter> {
    match format {
        OutputFormat::Yaml => Box::new(YamlPlotter),
        OutputFormat::Json => Box::new(JsonPlotter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::core::planner::{DefaultPlanner, Planner};
    use crate::core::runner::{ExecutionRunner, ParallelRunner};
    use crate::query::parse;

    fn joined_result() -> ExecutionResult {
        let readers = fixtures::populated();
        let topology = fixtures::topology(&readers);
        let plan = DefaultPlanner
            .plan(&parse("r1.t1 - t2").unwrap(), &topology, &readers)
            .unwrap();
        ParallelRunner::new(2).run(&plan).unwrap()
    }

    fn render_json(plotter: &dyn Plotter, verbosity: Verbosity) -> serde_json::Value {
        let mut buf = Vec::new();
        plotter.render_to(&joined_result(), verbosity, &mut buf).unwrap();
        serde_json::from_slice(&buf).unwrap()
    }

    #[test]
    fn test_tq012_json_tree() {
        let doc = render_json(&JsonPlotter, Verbosity::Normal);
        let results = doc["results"].as_array().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["type"], "r1.t1");
        assert_eq!(results[0]["link"], serde_json::json!([]));
        let items = results[0]["items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        let first = items.iter().find(|i| i["properties"]["id"] == "1").unwrap();
        let children = first["children"].as_array().unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0]["type"], "r1.t2");
        assert_eq!(children[0]["link"], serde_json::json!(["b eq x"]));
        assert_eq!(children[0]["items"][0]["properties"]["id"], "20");
        assert!(first.get("id").is_none());
        assert!(first.get("groupId").is_none());
    }

    #[test]
    fn test_tq012_debug_adds_ids() {
        let doc = render_json(&JsonPlotter, Verbosity::Debug);
        let group = &doc["results"][0];
        assert_eq!(group["id"], "ROOT");
        let item = &group["items"][0];
        assert!(item["id"].is_string());
        assert_eq!(item["groupId"], "ROOT");
    }

    #[test]
    fn test_tq012_yaml_output() {
        let mut buf = Vec::new();
        YamlPlotter
            .render_to(&joined_result(), Verbosity::Normal, &mut buf)
            .unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("results:"));
        assert!(text.contains("type: r1.t1"));
        assert!(text.contains("b eq x"));
    }

    #[test]
    fn test_tq012_errors_rendered_inline() {
        let r1 = fixtures::r1()
            .with_record("dev", "t1", &[("id", "1"), ("a", "x")])
            .with_record("dev", "t1", &[("id", "2")])
            .failing("t2", "throttled");
        let readers: Vec<std::sync::Arc<dyn crate::reader::Reader>> =
            vec![std::sync::Arc::new(r1), std::sync::Arc::new(fixtures::r2())];
        let topology = fixtures::topology(&readers);
        let plan = DefaultPlanner
            .plan(&parse("r1.t1 - t2").unwrap(), &topology, &readers)
            .unwrap();
        let result = ParallelRunner::new(1).run(&plan).unwrap();

        let doc = document(&result, Verbosity::Debug);
        let items = &doc.results[0].items;
        let joined = items.iter().find(|i| i.properties["id"] == "1").unwrap();
        assert!(joined.children[0].fetch_error.as_deref().unwrap().contains("throttled"));
        let lacking = items.iter().find(|i| i.properties["id"] == "2").unwrap();
        assert_eq!(lacking.link_errors.len(), 1);

        let quiet = document(&result, Verbosity::Normal);
        assert!(quiet.results[0].items.iter().all(|i| i.link_errors.is_empty()));
    }

    #[test]
    fn test_tq012_empty_result() {
        let doc = document(&ExecutionResult::default(), Verbosity::Normal);
        assert!(doc.results.is_empty());
        assert_eq!(serde_yaml_ng::to_string(&doc).unwrap().trim(), "results: []");
    }
}
