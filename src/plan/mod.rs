//! Execution plans as handed over by the planner.
//!
//! A plan is a graph of [`ExecutionTask`]s linked through [`Channel`]s and
//! partitioned into [`ExecutionStage`]s. Under the hood the tasks live in a
//! `petgraph` graph whose edges point from the producer of a channel to each
//! of its consumers, labelled with the channel id.

mod builder;
mod channel;
mod task;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub use crate::plan::builder::{ExecutionPlan, ExecutionStage, PlanBuilder};
pub use crate::plan::channel::{
    Channel, ChannelDescriptor, ChannelInstance, ChannelKind, ChannelPayload, Dynamic,
    ExecutorHandle,
};
pub use crate::plan::task::ExecutionTask;

macro_rules! id_type {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

id_type!(TaskId, "T");
id_type!(ChannelId, "C");
id_type!(StageId, "S");
