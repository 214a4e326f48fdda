//! The slice of the optimizer's state an executor needs.
//!
//! The host optimizer owns cardinality and load estimation. Executors only
//! look up the [`OperatorContext`] of each task and hand it to the operator.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::Configuration;
use crate::cost::LoadProfile;
use crate::plan::{ExecutionTask, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CardinalityEstimate {
    pub lower: u64,
    pub upper: u64,
    pub correctness: f64,
}

impl CardinalityEstimate {
    pub fn exact(value: u64) -> Self {
        Self {
            lower: value,
            upper: value,
            correctness: 1.0,
        }
    }
}

/// Estimates and settings for a single operator.
#[derive(Debug, Clone)]
pub struct OperatorContext {
    operator: String,
    configuration: Arc<Configuration>,
    pub input_cardinalities: Vec<Option<CardinalityEstimate>>,
    pub output_cardinalities: Vec<Option<CardinalityEstimate>>,
    pub load: Option<LoadProfile>,
    pub num_executions: u64,
}

impl OperatorContext {
    pub fn new(operator: impl Into<String>, configuration: Arc<Configuration>) -> Self {
        Self {
            operator: operator.into(),
            configuration,
            input_cardinalities: Vec::new(),
            output_cardinalities: Vec::new(),
            load: None,
            num_executions: 1,
        }
    }

    /// A context with the platform defaults, for running an operator outside
    /// of an optimized plan.
    pub fn detached(operator: impl Into<String>) -> Self {
        Self::new(operator, Arc::new(Configuration::with_defaults()))
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }
}

pub struct OptimizationContext {
    configuration: Arc<Configuration>,
    contexts: HashMap<TaskId, OperatorContext>,
}

impl OptimizationContext {
    pub fn new(configuration: Arc<Configuration>) -> Self {
        Self {
            configuration,
            contexts: HashMap::new(),
        }
    }

    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    pub fn set_operator_context(&mut self, task: TaskId, context: OperatorContext) {
        self.contexts.insert(task, context);
    }

    /// The context the optimizer prepared for `task`, or a fresh one without
    /// estimates.
    pub fn operator_context(&self, task: &ExecutionTask) -> OperatorContext {
        self.contexts.get(&task.id()).cloned().unwrap_or_else(|| {
            OperatorContext::new(task.operator().name(), self.configuration.clone())
        })
    }
}
