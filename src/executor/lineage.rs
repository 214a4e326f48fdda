use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cost::LoadProfile;
use crate::optimizer::OperatorContext;
use crate::plan::TaskId;

/// Ties a measured execution back to the operator estimates the cost model
/// started from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLineageNode {
    pub operator: String,
    pub estimated_load: Option<LoadProfile>,
    pub num_executions: u64,
}

impl ExecutionLineageNode {
    pub fn new(context: &OperatorContext) -> Self {
        Self {
            operator: context.operator().to_string(),
            estimated_load: context.load,
            num_executions: context.num_executions,
        }
    }
}

/// Timing of one task execution. Never modified once recorded.
#[derive(Debug, Clone)]
pub struct PartialExecution {
    task: TaskId,
    operator: String,
    start: Instant,
    duration: Duration,
    lineage: Vec<ExecutionLineageNode>,
}

impl PartialExecution {
    pub(crate) fn new(
        task: TaskId,
        operator: String,
        start: Instant,
        end: Instant,
        lineage: Vec<ExecutionLineageNode>,
    ) -> Self {
        Self {
            task,
            operator,
            start,
            duration: end.saturating_duration_since(start),
            lineage,
        }
    }

    pub fn task(&self) -> TaskId {
        self.task
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn lineage(&self) -> &[ExecutionLineageNode] {
        &self.lineage
    }

    pub fn to_report(&self) -> PartialExecutionReport {
        PartialExecutionReport {
            task: self.task,
            operator: self.operator.clone(),
            duration_ms: self.duration.as_secs_f64() * 1000.0,
            lineage: self.lineage.clone(),
        }
    }
}

/// Serializable form of a [`PartialExecution`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialExecutionReport {
    pub task: TaskId,
    pub operator: String,
    pub duration_ms: f64,
    pub lineage: Vec<ExecutionLineageNode>,
}
