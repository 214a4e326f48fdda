#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

pub mod config;
pub mod cost;
pub mod engine;
mod error;
pub mod executor;
pub mod fs;
pub mod mapping;
pub mod operators;
pub mod optimizer;
pub mod plan;
pub mod platform;

pub use crate::config::Configuration;
pub use crate::error::*;
pub use crate::executor::{
    CardinalityLog, CardinalitySink, ExecutionLineageNode, ExecutionState, Executor,
    PartialExecution, PartialExecutionReport, SchedulingPolicy, ShardGraphExecutor,
};
pub use crate::operators::{ExecutionOperator, OperatorOutput, PageRankOperator};
pub use crate::optimizer::{OperatorContext, OptimizationContext};
pub use crate::plan::{
    ChannelDescriptor, ChannelId, ChannelInstance, ChannelKind, ChannelPayload, ExecutionPlan,
    PlanBuilder, StageId, TaskId,
};
pub use crate::platform::{Job, Platform, Plugin, ShardGraphPlatform, ShardGraphPlugin};

/// Installs a `tracing` subscriber that prints to stderr and renders span
/// progress bars. The filter is read from `RUST_LOG` and defaults to `info`.
///
/// Does nothing if a global subscriber is already set.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_indicatif::IndicatifLayer;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let indicatif = IndicatifLayer::new();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif.get_stderr_writer()))
        .with(indicatif)
        .try_init();
}
