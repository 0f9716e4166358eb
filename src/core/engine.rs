//! TQ-008: Engine — topology load → plan → run → render.
//!
//! Each phase is a replaceable strategy. Load and plan failures abort the run before any
//! task is scheduled; fetch failures end up inside the rendered result.

use super::plan::ExecutionPlan;
use super::planner::{DefaultPlanner, Planner};
use super::result::ExecutionResult;
use super::runner::{ExecutionRunner, ParallelRunner};
use super::topology::{ReaderTopologyLoader, TopologyLoader};
use super::types::{OutputFormat, Verbosity};
use crate::error::Result;
use crate::query::Ast;
use crate::reader::Reader;
use crate::render::{plotter_for, Plotter};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub struct Engine {
    loader: Box<dyn TopologyLoader>,
    planner: Box<dyn Planner>,
    runner: Box<dyn ExecutionRunner>,
    plotter: Box<dyn Plotter>,
}

impl Engine {
    pub fn new(
        loader: Box<dyn TopologyLoader>,
        planner: Box<dyn Planner>,
        runner: Box<dyn ExecutionRunner>,
        plotter: Box<dyn Plotter>,
    ) -> Self {
        Self {
            loader,
            planner,
            runner,
            plotter,
        }
    }

    /// Reader-schema topology, shortest-path planner, thread-pool runner.
    pub fn with_defaults(readers: &[Arc<dyn Reader>], pool_size: usize, output: OutputFormat) -> Self {
        Self::new(
            Box::new(ReaderTopologyLoader::new(readers.to_vec())),
            Box::new(DefaultPlanner),
            Box::new(ParallelRunner::new(pool_size)),
            plotter_for(output),
        )
    }

    /// Load the topology and compile the query without executing it.
    pub fn plan_only(&self, ast: &Ast, readers: &[Arc<dyn Reader>]) -> Result<ExecutionPlan> {
        let topology = self.loader.load()?;
        Ok(self.planner.plan(ast, &topology, readers)?)
    }

    /// Plan and run, returning the result without rendering it.
    pub fn execute(&self, ast: &Ast, readers: &[Arc<dyn Reader>]) -> Result<ExecutionResult> {
        let start = Instant::now();
        let plan = self.plan_only(ast, readers)?;
        let result = self.runner.run(&plan)?;
        info!(
            groups = result.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "query executed"
        );
        Ok(result)
    }

    /// Full pipeline: load, plan, run, render.
    pub fn run(
        &self,
        ast: &Ast,
        readers: &[Arc<dyn Reader>],
        verbosity: Verbosity,
    ) -> Result<ExecutionResult> {
        let result = self.execute(ast, readers)?;
        self.plotter.render(&result, verbosity)?;
        Ok(result)
    }
}
