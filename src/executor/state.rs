use std::collections::HashMap;

use crate::executor::{PartialExecution, PartialExecutionReport};
use crate::plan::{ChannelId, ChannelInstance};

/// Job-scoped store of channel instances and partial executions.
///
/// Created by the caller for each job and threaded through every stage of
/// that job.
#[derive(Debug, Default)]
pub struct ExecutionState {
    instances: HashMap<ChannelId, ChannelInstance>,
    partial_executions: Vec<PartialExecution>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_channel_instance(&self, channel: ChannelId) -> Option<&ChannelInstance> {
        self.instances.get(&channel)
    }

    /// Makes `instance` visible to later tasks and stages. A previous instance
    /// of the same channel is replaced.
    pub fn register(&mut self, instance: ChannelInstance) {
        self.instances.insert(instance.channel(), instance);
    }

    pub fn add(&mut self, partial_execution: PartialExecution) {
        self.partial_executions.push(partial_execution);
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    pub fn partial_executions(&self) -> &[PartialExecution] {
        &self.partial_executions
    }

    pub fn reports(&self) -> Vec<PartialExecutionReport> {
        self.partial_executions
            .iter()
            .map(PartialExecution::to_report)
            .collect()
    }

    /// The [`reports`](Self::reports) as a pretty-printed JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.reports())
    }
}
