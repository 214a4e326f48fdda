use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{SCHEDULING_PROPERTY, TEMP_DIR_PROPERTY};
use crate::error::{ConfigError, ExecutionError};
use crate::executor::{CardinalityLog, CardinalitySink, ExecutionState, Executor, PartialExecution};
use crate::fs::{FileSystem, LocalFileSystem};
use crate::optimizer::OptimizationContext;
use crate::plan::{
    ChannelInstance, ExecutionPlan, ExecutionStage, ExecutionTask, ExecutorHandle, StageId, TaskId,
};
use crate::platform::{Job, PLATFORM_NAME};

/// How the executor decides that a task of a stage may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// Breadth-first propagation: a task is enqueued whenever one of its
    /// same-stage producers finishes, and runs when popped unless it already
    /// ran. A task with several same-stage producers can be popped before
    /// all of them finished, in which case resolving its inputs fails with
    /// [`ExecutionError::MissingInput`].
    #[default]
    Propagate,
    /// A task is enqueued only once all of its same-stage producers have
    /// finished.
    ReadyCount,
}

impl FromStr for SchedulingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "propagate" => Ok(Self::Propagate),
            "ready-count" => Ok(Self::ReadyCount),
            other => Err(format!("unknown scheduling policy '{other}'")),
        }
    }
}

impl Display for SchedulingPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Propagate => f.write_str("propagate"),
            Self::ReadyCount => f.write_str("ready-count"),
        }
    }
}

/// Executes the stages of one job, one task at a time.
///
/// The executor is single-threaded and synchronous. Each task is run exactly
/// once; a failing operator aborts the stage immediately and leaves behind
/// whatever earlier tasks registered in the [`ExecutionState`].
pub struct ShardGraphExecutor<S = CardinalityLog> {
    job_id: String,
    temp_dir: Utf8PathBuf,
    policy: SchedulingPolicy,
    sink: S,
    disposed: bool,
}

impl ShardGraphExecutor {
    pub fn new(job: &Job) -> Result<Self, ConfigError> {
        let config = job.configuration();
        let policy = config
            .parse_optional::<SchedulingPolicy>(SCHEDULING_PROPERTY)?
            .unwrap_or_default();

        let base = config
            .get_optional_string_property(TEMP_DIR_PROPERTY)
            .map(Utf8PathBuf::from)
            .or_else(LocalFileSystem::find_temp_dir)
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        Ok(Self {
            job_id: job.id().to_string(),
            temp_dir: base.join(format!("shardgraph-{}", job.id())),
            policy,
            sink: CardinalityLog::default(),
            disposed: false,
        })
    }
}

impl<S: CardinalitySink> ShardGraphExecutor<S> {
    pub fn with_policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sink<T: CardinalitySink>(self, sink: T) -> ShardGraphExecutor<T> {
        ShardGraphExecutor {
            job_id: self.job_id,
            temp_dir: self.temp_dir,
            policy: self.policy,
            sink,
            disposed: self.disposed,
        }
    }

    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    fn propagate(
        &mut self,
        plan: &ExecutionPlan,
        stage: &ExecutionStage,
        context: &OptimizationContext,
        state: &mut ExecutionState,
    ) -> Result<(), ExecutionError> {
        let mut scheduled: VecDeque<TaskId> = stage.start_tasks().iter().copied().collect();
        let mut executed = HashSet::new();

        while let Some(id) = scheduled.pop_front() {
            // The same task is enqueued once per same-stage producer.
            if executed.contains(&id) {
                continue;
            }

            let task = plan.task(id);
            self.execute_task(plan, task, context, state)?;
            executed.insert(id);

            scheduled.extend(same_stage_consumers(plan, task, stage.id()));
        }

        Ok(())
    }

    fn ready_count(
        &mut self,
        plan: &ExecutionPlan,
        stage: &ExecutionStage,
        context: &OptimizationContext,
        state: &mut ExecutionState,
    ) -> Result<(), ExecutionError> {
        let mut pending: HashMap<TaskId, usize> = stage
            .tasks()
            .iter()
            .map(|&id| (id, plan.same_stage_producers(id).len()))
            .collect();
        let mut scheduled: VecDeque<TaskId> = stage.start_tasks().iter().copied().collect();

        while let Some(id) = scheduled.pop_front() {
            let task = plan.task(id);
            self.execute_task(plan, task, context, state)?;

            let mut unlocked = HashSet::new();
            for consumer in same_stage_consumers(plan, task, stage.id()) {
                if !unlocked.insert(consumer) {
                    continue;
                }
                if let Some(count) = pending.get_mut(&consumer) {
                    *count -= 1;
                    if *count == 0 {
                        scheduled.push_back(consumer);
                    }
                }
            }
        }

        Ok(())
    }

    fn execute_task(
        &mut self,
        plan: &ExecutionPlan,
        task: &ExecutionTask,
        context: &OptimizationContext,
        state: &mut ExecutionState,
    ) -> Result<(), ExecutionError> {
        let operator = task.operator();
        let span = tracing::info_span!("task", id = %task.id(), operator = operator.name());
        let _enter = span.enter();

        let mut inputs = Vec::with_capacity(task.num_input_channels());
        for &channel in task.input_channels() {
            let instance = state
                .get_channel_instance(channel)
                .ok_or(ExecutionError::MissingInput {
                    task: task.id(),
                    channel,
                })?;
            inputs.push(instance.clone());
        }

        let operator_context = context.operator_context(task);
        let mut outputs: Vec<Option<ChannelInstance>> = task
            .output_channels()
            .iter()
            .enumerate()
            .map(|(index, &channel)| {
                Some(plan.channel(channel).create_instance(&*self, &operator_context, index))
            })
            .collect();

        let start = Instant::now();
        let result = operator.execute(&inputs, &mut outputs, &operator_context);
        let end = Instant::now();

        let output = result.map_err(|source| ExecutionError::OperatorExecution {
            operator: operator.name().to_string(),
            source,
        })?;

        let mut registered = 0;
        for instance in outputs.into_iter().flatten() {
            state.register(instance);
            registered += 1;
        }

        let partial_execution = PartialExecution::new(
            task.id(),
            operator.name().to_string(),
            start,
            end,
            output.lineage,
        );
        tracing::info!(
            elapsed = ?partial_execution.duration(),
            registered,
            "Executed task"
        );
        state.add(partial_execution);

        self.sink.register_measured_cardinalities(&output.produced);

        Ok(())
    }
}

/// Consumers of `task`'s outputs that belong to `stage`, in channel order.
/// A consumer reading several outputs of `task` appears once per channel.
fn same_stage_consumers<'a>(
    plan: &'a ExecutionPlan,
    task: &'a ExecutionTask,
    stage: StageId,
) -> impl Iterator<Item = TaskId> + 'a {
    task.output_channels()
        .iter()
        .flat_map(|&channel| plan.channel(channel).consumers().iter().copied())
        .filter(move |&consumer| plan.task(consumer).stage() == stage)
}

impl<S: CardinalitySink> Executor for ShardGraphExecutor<S> {
    fn execute_stage(
        &mut self,
        plan: &ExecutionPlan,
        stage: StageId,
        context: &OptimizationContext,
        state: &mut ExecutionState,
    ) -> Result<(), ExecutionError> {
        let stage = plan.stage(stage).ok_or(ExecutionError::UnknownStage(stage))?;

        let span = tracing::info_span!("stage", id = %stage.id(), job = %self.job_id);
        let _enter = span.enter();
        tracing::info!(
            tasks = stage.tasks().len(),
            policy = %self.policy,
            "Executing stage"
        );

        let s = Instant::now();
        match self.policy {
            SchedulingPolicy::Propagate => self.propagate(plan, stage, context, state)?,
            SchedulingPolicy::ReadyCount => self.ready_count(plan, stage, context, state)?,
        }
        tracing::info!(elapsed = ?s.elapsed(), "Finished stage");

        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Err(err) = LocalFileSystem.delete(self.temp_dir.as_str()) {
            tracing::warn!("Couldn't clean up after job {}: {err}", self.job_id);
        }
    }

    fn platform(&self) -> &str {
        PLATFORM_NAME
    }
}

impl<S> ExecutorHandle for ShardGraphExecutor<S> {
    fn job_id(&self) -> &str {
        &self.job_id
    }

    fn temp_dir(&self) -> &Utf8Path {
        &self.temp_dir
    }
}
