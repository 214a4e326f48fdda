//! Operators executable on this platform.
mod pagerank;

pub use crate::operators::pagerank::{DEFAULT_ITERATIONS, PageRankOperator};

use crate::error::OperatorError;
use crate::executor::ExecutionLineageNode;
use crate::optimizer::OperatorContext;
use crate::plan::{ChannelInstance, ChannelKind};

/// What an operator hands back to the executor after a run.
#[derive(Debug, Default)]
pub struct OperatorOutput {
    /// Bookkeeping for the cost model.
    pub lineage: Vec<ExecutionLineageNode>,
    /// Every instance whose cardinality was measured, including ones beyond
    /// the declared outputs.
    pub produced: Vec<ChannelInstance>,
}

/// An operator implementation the executor can invoke.
///
/// The executor calls [`execute`](ExecutionOperator::execute) exactly once per
/// task and never retries it. Any parallelism must stay inside the call.
pub trait ExecutionOperator: Send + Sync {
    fn name(&self) -> &str;

    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize;

    fn supported_input_channels(&self, index: usize) -> &[ChannelKind];

    fn supported_output_channels(&self, index: usize) -> &[ChannelKind];

    /// Runs the operator. `outputs` holds one fresh instance per declared
    /// output channel; an operator may take an entry out to signal that the
    /// output was not produced.
    fn execute(
        &self,
        inputs: &[ChannelInstance],
        outputs: &mut [Option<ChannelInstance>],
        context: &OperatorContext,
    ) -> Result<OperatorOutput, OperatorError>;
}

/// Rejects instances whose kind the operator can't handle.
pub(crate) fn check_channels<'a>(
    instances: impl IntoIterator<Item = Option<&'a ChannelInstance>>,
    supported: impl Fn(usize) -> &'a [ChannelKind],
) -> Result<(), OperatorError> {
    for (index, instance) in instances.into_iter().enumerate() {
        let Some(instance) = instance else {
            return Err(OperatorError::MissingOutput(index));
        };
        if !supported(index).contains(&instance.kind()) {
            return Err(OperatorError::UnsupportedChannel {
                index,
                found: instance.kind(),
            });
        }
    }
    Ok(())
}
