//! TQ-006: Runner — execute a plan as a dynamically growing task graph.
//!
//! Every task's fetch is spawned onto a fixed-size rayon pool. The calling thread is the
//! only aggregator: it turns every completed task into a result group and schedules one
//! follow-up task per (item, outgoing link) pair whose join value is present. The run
//! ends when no scheduled task is left unaggregated.

use super::hasher::{self, ROOT_ID};
use super::plan::ExecutionPlan;
use super::result::{ExecutionResult, ResultGroup, ResultItem};
use super::types::{Condition, NamespacedType};
use crate::error::PlanError;
use crate::reader::{attr_value, Item};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use tracing::{debug, info, warn};

pub const DEFAULT_POOL_SIZE: usize = 10;

/// One scheduled fetch against one plan node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTask {
    pub id: String,
    pub node_id: String,
    pub node_type: NamespacedType,
    /// Conditions declared on the node.
    pub base_conditions: Vec<Condition>,
    /// Join conditions derived from the parent item.
    pub link_conditions: Vec<Condition>,
    /// Result item that spawned the task. `None` for the root task.
    pub parent_item: Option<String>,
}

impl ExecutionTask {
    /// Base and link conditions, in that order.
    pub fn conditions(&self) -> Vec<Condition> {
        self.base_conditions
            .iter()
            .chain(&self.link_conditions)
            .cloned()
            .collect()
    }
}

/// A task after its fetch.
#[derive(Debug)]
struct TaskOutcome {
    task: ExecutionTask,
    items: Vec<Item>,
    error: Option<String>,
}

/// Strategy that executes a plan.
pub trait ExecutionRunner {
    fn run(&self, plan: &ExecutionPlan) -> Result<ExecutionResult, PlanError>;
}

/// Thread-pool runner.
#[derive(Debug, Clone, Copy)]
pub struct ParallelRunner {
    pool_size: usize,
}

impl ParallelRunner {
    /// A pool size of zero is clamped to one.
    pub fn new(pool_size: usize) -> Self {
        Self {
            pool_size: pool_size.max(1),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl Default for ParallelRunner {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

impl ExecutionRunner for ParallelRunner {
    fn run(&self, plan: &ExecutionPlan) -> Result<ExecutionResult, PlanError> {
        let root = plan.root()?;
        let root_task = ExecutionTask {
            id: ROOT_ID.to_string(),
            node_id: root.id.clone(),
            node_type: root.node_type.clone(),
            base_conditions: root.conditions.clone(),
            link_conditions: Vec::new(),
            parent_item: None,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size)
            .thread_name(|i| format!("topoquery-worker-{i}"))
            .build()
            .map_err(|e| PlanError::WorkerPool(e.to_string()))?;
        let (done_tx, done_rx) = mpsc::channel::<TaskOutcome>();
        let mut result = ExecutionResult::default();
        info!(pool_size = self.pool_size, nodes = plan.len(), "run started");

        // The aggregator stays on the calling thread so a pool of one still makes progress.
        pool.in_place_scope(|scope| {
            let dispatch = |task: ExecutionTask| {
                let done = done_tx.clone();
                scope.spawn(move |_| fetch_into(plan, task, &done));
            };

            dispatch(root_task);
            let mut outstanding = 1usize;
            while outstanding > 0 {
                let Ok(outcome) = done_rx.recv() else {
                    warn!(outstanding, "result channel closed before the run finished");
                    break;
                };
                outstanding -= 1;
                for task in aggregate(plan, outcome, &mut result) {
                    dispatch(task);
                    outstanding += 1;
                }
            }
        });

        info!(
            groups = result.len(),
            items = result.item_count(),
            "run finished"
        );
        Ok(result)
    }
}

fn fetch_into(plan: &ExecutionPlan, task: ExecutionTask, done: &Sender<TaskOutcome>) {
    debug!(
        worker = rayon::current_thread_index(),
        task = %task.id,
        node = %task.node_id,
        "task dispatched"
    );
    // The receiver only goes away once the run has finished.
    let _ = done.send(fetch(plan, task));
}

/// Run the reader for a task. Reader errors and panics become the task's error.
fn fetch(plan: &ExecutionPlan, task: ExecutionTask) -> TaskOutcome {
    let Some(node) = plan.node(&task.node_id) else {
        let error = Some(PlanError::UnknownNode(task.node_id.clone()).to_string());
        return TaskOutcome {
            task,
            items: Vec::new(),
            error,
        };
    };
    let attrs = plan.fetch_attrs(&node.id);
    let conditions = task.conditions();
    let call = catch_unwind(AssertUnwindSafe(|| {
        node.reader
            .get_items(&node.node_type.type_name, &node.profiles, &attrs, &conditions)
    }));
    let (items, error) = match call {
        Ok(Ok(items)) => (items, None),
        Ok(Err(e)) => {
            let (items, message) = e.into_parts();
            (items, Some(message))
        }
        Err(panic) => (
            Vec::new(),
            Some(format!("reader panicked: {}", panic_message(&*panic))),
        ),
    };
    if let Some(ref message) = error {
        warn!(task = %task.id, node_type = %node.node_type, error = %message, "fetch failed");
    }
    TaskOutcome { task, items, error }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

/// Fold one completed task into the result and return the tasks it spawns.
fn aggregate(
    plan: &ExecutionPlan,
    outcome: TaskOutcome,
    result: &mut ExecutionResult,
) -> Vec<ExecutionTask> {
    let TaskOutcome { task, items, error } = outcome;
    let (links, link_error) = match plan.links(&task.node_id) {
        Ok(links) => (links, None),
        Err(e) => (Vec::new(), Some(e.to_string())),
    };

    let mut spawned = Vec::new();
    let mut result_items = Vec::with_capacity(items.len());
    for record in items {
        let item_id = hasher::item_id(&task.id, &record.profile, &record.identifier);
        let mut link_errors = Vec::new();
        for link in &links {
            let Some(target) = plan.node(&link.target) else {
                link_errors.push(format!("link target {} is not part of the plan", link.target));
                continue;
            };
            match attr_value(&record, &link.source_attr) {
                Some(value) => spawned.push(ExecutionTask {
                    id: hasher::task_id(&item_id, &target.id),
                    node_id: target.id.clone(),
                    node_type: target.node_type.clone(),
                    base_conditions: target.conditions.clone(),
                    link_conditions: vec![Condition::equals(link.target_attr.as_str(), value)],
                    parent_item: Some(item_id.clone()),
                }),
                None => {
                    debug!(item = %item_id, attr = %link.source_attr, "join attribute missing");
                    link_errors.push(format!(
                        "attribute \"{}\" is missing, cannot link to {}",
                        link.source_attr, target.node_type
                    ));
                }
            }
        }
        result_items.push(ResultItem {
            id: item_id,
            group_id: task.id.clone(),
            record,
            query_error: error.clone(),
            link_errors,
        });
    }

    debug!(
        task = %task.id,
        items = result_items.len(),
        spawned = spawned.len(),
        "task aggregated"
    );
    result.record(ResultGroup {
        id: task.id,
        node_id: task.node_id,
        node_type: task.node_type,
        items: result_items,
        link_conditions: task.link_conditions,
        link_error,
        fetch_error: error,
        parent_item: task.parent_item,
    });
    spawned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fixtures;
    use crate::core::planner::{DefaultPlanner, Planner};
    use crate::query::parse;
    use crate::reader::memory::MemoryReader;
    use crate::reader::Reader;
    use std::sync::Arc;

    fn plan_for(query: &str, readers: &[Arc<dyn Reader>]) -> ExecutionPlan {
        let topology = fixtures::topology(readers);
        DefaultPlanner
            .plan(&parse(query).unwrap(), &topology, readers)
            .unwrap()
    }

    fn run(query: &str, readers: &[Arc<dyn Reader>], pool_size: usize) -> ExecutionResult {
        ParallelRunner::new(pool_size)
            .run(&plan_for(query, readers))
            .unwrap()
    }

    #[test]
    fn test_tq006_single_node_run() {
        let readers = fixtures::populated();
        let result = run("r1.t1", &readers, 4);
        assert_eq!(result.len(), 1);
        let roots: Vec<_> = result.root_groups().collect();
        assert_eq!(roots.len(), 1);
        let root = roots[0];
        assert_eq!(root.id, ROOT_ID);
        assert_eq!(root.node_type.to_string(), "r1.t1");
        assert_eq!(root.items.len(), 2);
        assert!(root.link_conditions.is_empty());
        for item in &root.items {
            assert_eq!(result.child_groups(&item.id).count(), 0);
        }
    }

    #[test]
    fn test_tq006_join_yields_one_child_group_per_item() {
        let readers = fixtures::populated();
        let result = run("r1.t1 - t2", &readers, 4);
        let root = result.group(ROOT_ID).unwrap();

        let x = root.items.iter().find(|i| i.record.identifier == "1").unwrap();
        let y = root.items.iter().find(|i| i.record.identifier == "2").unwrap();
        assert!(x.link_errors.is_empty());
        assert!(y.link_errors.is_empty());

        let x_children: Vec<_> = result.child_groups(&x.id).collect();
        assert_eq!(x_children.len(), 1);
        assert_eq!(x_children[0].items.len(), 1);
        assert_eq!(x_children[0].items[0].record.identifier, "20");
        assert_eq!(x_children[0].link_conditions, vec![Condition::equals("b", "x")]);

        let y_children: Vec<_> = result.child_groups(&y.id).collect();
        assert_eq!(y_children.len(), 1);
        assert!(y_children[0].items.is_empty());
        assert_eq!(
            result.groups().map(|g| g.items.len()).sum::<usize>(),
            3,
            "two roots plus the single matching child"
        );
    }

    #[test]
    fn test_tq006_implicit_hop_reaches_leaf() {
        let readers = fixtures::populated();
        let result = run("r1.t1 - t3", &readers, 3);
        let leaves: Vec<_> = result
            .groups()
            .filter(|g| g.node_type.to_string() == "r2.t3")
            .flat_map(|g| g.items.iter())
            .collect();
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].record.identifier, "300");

        let leaf_group = result.group(&leaves[0].group_id).unwrap();
        let hop_item = result.item(leaf_group.parent_item.as_deref().unwrap()).unwrap();
        assert_eq!(hop_item.record.identifier, "20");
        let hop_group = result.group(&hop_item.group_id).unwrap();
        assert_eq!(hop_group.node_type.to_string(), "r1.t2");
        assert!(result.item(hop_group.parent_item.as_deref().unwrap()).is_some());
    }

    #[test]
    fn test_tq006_missing_source_attr_is_link_error() {
        let r1 = fixtures::r1()
            .with_record("dev", "t1", &[("id", "1"), ("a", "x")])
            .with_record("dev", "t1", &[("id", "2")]);
        let readers: Vec<Arc<dyn Reader>> = vec![Arc::new(r1), Arc::new(fixtures::r2())];
        let result = run("r1.t1 - t2", &readers, 2);
        let root = result.group(ROOT_ID).unwrap();
        let lacking = root.items.iter().find(|i| i.record.identifier == "2").unwrap();
        assert_eq!(lacking.link_errors.len(), 1);
        assert!(lacking.link_errors[0].contains("\"a\""));
        assert_eq!(result.child_groups(&lacking.id).count(), 0);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_tq006_fetch_error_produces_placeholder_group() {
        let r1 = fixtures::r1()
            .with_record("dev", "t1", &[("id", "1"), ("a", "x")])
            .failing("t2", "throttled");
        let readers: Vec<Arc<dyn Reader>> = vec![Arc::new(r1), Arc::new(fixtures::r2())];
        let result = run("r1.t1 - t2", &readers, 2);
        let failed: Vec<_> = result.groups().filter(|g| g.fetch_error.is_some()).collect();
        assert_eq!(failed.len(), 1);
        assert!(failed[0].items.is_empty());
        assert!(failed[0].fetch_error.as_deref().unwrap().contains("throttled"));
        assert!(result.group(ROOT_ID).unwrap().fetch_error.is_none());
    }

    struct PanickingReader;

    impl Reader for PanickingReader {
        fn namespace(&self) -> &str {
            "boom"
        }
        fn item_schema(&self) -> crate::core::schema::SchemaSource {
            crate::core::schema::SchemaSource::Inline(
                r#"{"items":[{"type":"boom.t","attrs":[{"field":"id"}]}]}"#.to_string(),
            )
        }
        fn link_schema(&self) -> crate::core::schema::SchemaSource {
            crate::core::schema::SchemaSource::Inline(r#"{"links":[]}"#.to_string())
        }
        fn supported_profiles(&self) -> Vec<String> {
            vec!["p".to_string()]
        }
        fn get_items(
            &self,
            _: &str,
            _: &[String],
            _: &[String],
            _: &[Condition],
        ) -> Result<Vec<Item>, crate::error::ReaderError> {
            panic!("connection reset");
        }
    }

    #[test]
    fn test_tq006_reader_panic_is_fetch_error() {
        let readers: Vec<Arc<dyn Reader>> = vec![Arc::new(PanickingReader)];
        let result = run("boom.t", &readers, 1);
        let root = result.group(ROOT_ID).unwrap();
        assert_eq!(
            root.fetch_error.as_deref(),
            Some("reader panicked: connection reset")
        );
    }

    #[test]
    fn test_tq006_pool_size_does_not_change_result() {
        let mut r1 = fixtures::r1();
        for i in 0..20 {
            let id = i.to_string();
            let a = format!("v{}", i % 5);
            r1 = r1.with_record("dev", "t1", &[("id", id.as_str()), ("a", a.as_str())]);
            let t2_id = format!("t2-{}", i);
            r1 = r1.with_record("prod", "t2", &[("id", t2_id.as_str()), ("b", a.as_str())]);
        }
        let mut r2 = fixtures::r2();
        for i in 0..20 {
            let id = format!("t3-{}", i);
            let parent = format!("t2-{}", i % 7);
            r2 = r2.with_record("ops", "t3", &[("id", id.as_str()), ("t2_id", parent.as_str())]);
        }
        let readers: Vec<Arc<dyn Reader>> = vec![Arc::new(r1), Arc::new(r2)];
        let single = run("r1.t1 - t3", &readers, 1);
        let pooled = run("r1.t1 - t3", &readers, 10);
        assert_eq!(single, pooled);
        assert!(single.len() > 20);
    }

    #[test]
    fn test_tq006_same_identifier_across_profiles() {
        let r1 = fixtures::r1()
            .with_record("dev", "t1", &[("id", "1"), ("a", "x")])
            .with_record("prod", "t1", &[("id", "1"), ("a", "y")])
            .with_record("dev", "t2", &[("id", "20"), ("b", "x")])
            .with_record("prod", "t2", &[("id", "21"), ("b", "y")]);
        let readers: Vec<Arc<dyn Reader>> = vec![Arc::new(r1), Arc::new(fixtures::r2())];
        let result = run("r1.t1 - t2", &readers, 2);

        let root = result.group(ROOT_ID).unwrap();
        assert_eq!(root.items.len(), 2);
        assert_ne!(root.items[0].id, root.items[1].id);
        assert_eq!(result.len(), 3);
        for item in &root.items {
            let children: Vec<_> = result.child_groups(&item.id).collect();
            assert_eq!(children.len(), 1);
            let value = item.record.properties["a"].as_str();
            assert_eq!(children[0].link_conditions, vec![Condition::equals("b", value)]);
            assert_eq!(children[0].parent_item.as_deref(), Some(item.id.as_str()));
        }
    }

    #[test]
    fn test_tq006_zero_pool_size_clamped() {
        assert_eq!(ParallelRunner::new(0).pool_size(), 1);
        assert_eq!(ParallelRunner::default().pool_size(), DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_tq006_search_conditions_reach_reader() {
        let readers = fixtures::populated();
        let result = run("r1.t1 ?a eq 'y'", &readers, 2);
        let root = result.group(ROOT_ID).unwrap();
        assert_eq!(root.items.len(), 1);
        assert_eq!(root.items[0].record.identifier, "2");
    }

    #[test]
    fn test_tq006_partial_fetch_tags_items() {
        let readers: Vec<Arc<dyn Reader>> = vec![Arc::new(PartialReader)];
        let result = run("part.t", &readers, 1);
        let root = result.group(ROOT_ID).unwrap();
        assert_eq!(root.items.len(), 1);
        assert_eq!(root.items[0].query_error.as_deref(), root.fetch_error.as_deref());
        assert!(root.fetch_error.is_some());
    }

    struct PartialReader;

    impl Reader for PartialReader {
        fn namespace(&self) -> &str {
            "part"
        }
        fn item_schema(&self) -> crate::core::schema::SchemaSource {
            crate::core::schema::SchemaSource::Inline(
                r#"{"items":[{"type":"part.t","attrs":[{"field":"id"}]}]}"#.to_string(),
            )
        }
        fn link_schema(&self) -> crate::core::schema::SchemaSource {
            crate::core::schema::SchemaSource::Inline(r#"{"links":[]}"#.to_string())
        }
        fn supported_profiles(&self) -> Vec<String> {
            vec!["a".to_string(), "b".to_string()]
        }
        fn get_items(
            &self,
            item_type: &str,
            _: &[String],
            _: &[String],
            _: &[Condition],
        ) -> Result<Vec<Item>, crate::error::ReaderError> {
            let items = MemoryReader::new("part", &["a"])
                .with_record("a", item_type, &[("id", "1")])
                .get_items(item_type, &["a".to_string()], &[], &[])?;
            Err(crate::error::ReaderError::Partial {
                items,
                source: Box::new(crate::error::ReaderError::Fetch {
                    item_type: item_type.to_string(),
                    message: "profile b denied".to_string(),
                }),
            })
        }
    }
}
