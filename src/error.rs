pub use anyhow::Error as RuntimeError;
use thiserror::Error;

use crate::plan::{ChannelId, StageId, TaskId};
use crate::plan::ChannelKind;

/// Failure of a single stage execution. Nothing here is recovered locally,
/// the caller decides whether to abort the job or try another plan.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Task {task} has no registered instance for its input channel {channel}")]
    MissingInput { task: TaskId, channel: ChannelId },

    #[error("Operator '{operator}' failed:\n{source}")]
    OperatorExecution {
        operator: String,
        #[source]
        source: OperatorError,
    },

    #[error("Stage {0} does not belong to this plan")]
    UnknownStage(StageId),
}

#[derive(Debug, Error)]
pub enum OperatorError {
    /// Preparation before the engine runs, e.g. sharding or opening files.
    #[error("Couldn't set up resources.\n{0}")]
    ResourceSetup(RuntimeError),

    #[error("Execution failed.\n{0}")]
    Execution(RuntimeError),

    #[error("Channel {index} of kind {found:?} is not supported here")]
    UnsupportedChannel { index: usize, found: ChannelKind },

    #[error("Input channel {0} was not provided")]
    MissingInput(usize),

    #[error("Output channel {0} was not provided")]
    MissingOutput(usize),
}

impl OperatorError {
    pub fn setup(err: impl Into<anyhow::Error>) -> Self {
        Self::ResourceSetup(err.into())
    }

    pub fn execution(err: impl Into<anyhow::Error>) -> Self {
        Self::Execution(err.into())
    }
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("Cycle detected in task graph at task {0}")]
    Cycle(TaskId),

    #[error("Channel {channel} already produced by task {producer}")]
    DuplicateProducer { channel: ChannelId, producer: TaskId },

    #[error("Unknown channel {0}")]
    UnknownChannel(ChannelId),

    #[error("Unknown stage {0}")]
    UnknownStage(StageId),

    #[error("Operator '{operator}' expects {expected} {side} channels, got {found}")]
    Arity {
        operator: String,
        side: &'static str,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing configuration property '{0}'")]
    Missing(String),

    #[error("Property '{key}' has invalid value '{value}'")]
    Invalid { key: String, value: String },

    #[error("Malformed properties line {line}: '{text}'")]
    Malformed { line: usize, text: String },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't parse edge list line {line}: '{text}'")]
    Parse { line: usize, text: String },

    #[error("Couldn't decode shard metadata.\n{0}")]
    MetaDecode(#[from] ciborium::de::Error<std::io::Error>),

    #[error("Couldn't encode shard metadata.\n{0}")]
    MetaEncode(#[from] ciborium::ser::Error<std::io::Error>),

    #[error("Shard set is corrupt: {0}")]
    Corrupt(String),

    #[error("Couldn't build the engine thread pool.\n{0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("No file system can handle '{0}'")]
    Unsupported(String),

    #[error("I/O on '{path}':\n{source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
