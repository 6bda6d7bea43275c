//! Dependency-ordered registry of component tasks.

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

use super::components::standard_tasks;
use super::ComponentTask;

/// Internal errors in the task set. These are programming errors, not
/// user configuration errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Duplicate task name: {0}")]
    DuplicateTask(String),

    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("Dependency cycle involving task '{0}'")]
    Cycle(String),
}

/// Result type for registry construction.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Tasks in a fixed topological order, computed once at construction.
pub struct TaskRegistry {
    ordered: Vec<Box<dyn ComponentTask>>,
}

impl TaskRegistry {
    /// Builds the registry, rejecting duplicate names, unknown dependencies
    /// and cycles.
    pub fn new(tasks: Vec<Box<dyn ComponentTask>>) -> Result<Self> {
        let mut graph: DiGraph<usize, ()> = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();

        for (position, task) in tasks.iter().enumerate() {
            let node = graph.add_node(position);
            if index.insert(task.name().to_string(), node).is_some() {
                return Err(RegistryError::DuplicateTask(task.name().to_string()));
            }
        }

        for task in &tasks {
            let node = index[task.name()];
            for dependency in task.dependencies() {
                let dep_node =
                    index
                        .get(*dependency)
                        .ok_or_else(|| RegistryError::UnknownDependency {
                            task: task.name().to_string(),
                            dependency: dependency.to_string(),
                        })?;
                graph.add_edge(*dep_node, node, ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let position = graph[cycle.node_id()];
            RegistryError::Cycle(tasks[position].name().to_string())
        })?;

        let positions: Vec<usize> = order.into_iter().map(|node| graph[node]).collect();
        let mut slots: Vec<Option<Box<dyn ComponentTask>>> = tasks.into_iter().map(Some).collect();
        let ordered = positions
            .into_iter()
            .filter_map(|position| slots[position].take())
            .collect();

        Ok(Self { ordered })
    }

    /// The registry of the standard monitoring stack.
    pub fn standard() -> Result<Self> {
        Self::new(standard_tasks())
    }

    /// Tasks in dependency order.
    pub fn tasks(&self) -> impl Iterator<Item = &dyn ComponentTask> {
        self.ordered.iter().map(|t| t.as_ref())
    }

    /// Task names in dependency order.
    pub fn order(&self) -> Vec<&str> {
        self.ordered.iter().map(|t| t.name()).collect()
    }
}
