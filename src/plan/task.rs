use std::sync::Arc;

use crate::operators::ExecutionOperator;
use crate::plan::{ChannelId, StageId, TaskId};

/// One operator invocation within a stage.
#[derive(Clone)]
pub struct ExecutionTask {
    pub(crate) id: TaskId,
    pub(crate) stage: StageId,
    pub(crate) operator: Arc<dyn ExecutionOperator>,
    pub(crate) inputs: Vec<ChannelId>,
    pub(crate) outputs: Vec<ChannelId>,
}

impl ExecutionTask {
    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn stage(&self) -> StageId {
        self.stage
    }

    pub fn operator(&self) -> &Arc<dyn ExecutionOperator> {
        &self.operator
    }

    pub fn input_channels(&self) -> &[ChannelId] {
        &self.inputs
    }

    pub fn output_channels(&self) -> &[ChannelId] {
        &self.outputs
    }

    pub fn num_input_channels(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_output_channels(&self) -> usize {
        self.outputs.len()
    }
}

impl std::fmt::Debug for ExecutionTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionTask")
            .field("id", &self.id)
            .field("stage", &self.stage)
            .field("operator", &self.operator.name())
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .finish()
    }
}
