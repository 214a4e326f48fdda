//! Stage-by-stage execution of [`ExecutionPlan`]s.
mod cardinality;
mod driver;
mod lineage;
mod state;

pub use crate::executor::cardinality::{CardinalityLog, CardinalitySink};
pub use crate::executor::driver::{SchedulingPolicy, ShardGraphExecutor};
pub use crate::executor::lineage::{ExecutionLineageNode, PartialExecution, PartialExecutionReport};
pub use crate::executor::state::ExecutionState;

use crate::error::ExecutionError;
use crate::optimizer::OptimizationContext;
use crate::plan::{ExecutionPlan, StageId};

/// A platform executor, as seen by the host.
///
/// The host creates one executor per job, calls
/// [`execute_stage`](Executor::execute_stage) for each stage assigned to the
/// platform, passing the same [`ExecutionState`] every time, and finally calls
/// [`dispose`](Executor::dispose).
pub trait Executor {
    fn execute_stage(
        &mut self,
        plan: &ExecutionPlan,
        stage: StageId,
        context: &OptimizationContext,
        state: &mut ExecutionState,
    ) -> Result<(), ExecutionError>;

    /// Releases job-scoped resources. Calling it again does nothing.
    fn dispose(&mut self);

    fn platform(&self) -> &str;
}
