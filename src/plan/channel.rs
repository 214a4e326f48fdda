use std::any::Any;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::optimizer::OperatorContext;
use crate::plan::{ChannelId, TaskId};

/// A type-erased, thread-safe value carried by in-memory channels.
pub type Dynamic = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelKind {
    /// Data materialized as a file, the only kind the engine reads and writes.
    File,
    /// Data held in memory by the executor.
    Collection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    pub kind: ChannelKind,
    /// Fixed location of a file channel. Without one, instances get a
    /// temporary file in the executor's scratch directory.
    pub location: Option<Utf8PathBuf>,
}

impl ChannelDescriptor {
    pub fn file() -> Self {
        Self {
            kind: ChannelKind::File,
            location: None,
        }
    }

    pub fn file_at(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            kind: ChannelKind::File,
            location: Some(path.into()),
        }
    }

    pub fn collection() -> Self {
        Self {
            kind: ChannelKind::Collection,
            location: None,
        }
    }
}

/// What a channel needs to know about the executor materializing it.
pub trait ExecutorHandle {
    fn job_id(&self) -> &str;
    fn temp_dir(&self) -> &Utf8Path;
}

/// A data link between tasks. A channel without a producer is a stage
/// boundary: its instance has to be registered before the consuming stage
/// runs.
#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) id: ChannelId,
    pub(crate) descriptor: ChannelDescriptor,
    pub(crate) producer: Option<TaskId>,
    pub(crate) consumers: Vec<TaskId>,
}

impl Channel {
    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    pub fn producer(&self) -> Option<TaskId> {
        self.producer
    }

    pub fn consumers(&self) -> &[TaskId] {
        &self.consumers
    }

    /// Creates a fresh instance of this channel for one execution of its
    /// producer.
    pub fn create_instance(
        &self,
        executor: &dyn ExecutorHandle,
        context: &OperatorContext,
        output_index: usize,
    ) -> ChannelInstance {
        let payload = match self.descriptor.kind {
            ChannelKind::File => {
                let path = match &self.descriptor.location {
                    Some(path) => path.clone(),
                    None => executor.temp_dir().join(format!(
                        "{}-{}-{}-{}.bin",
                        executor.job_id(),
                        slug(context.operator()),
                        self.id,
                        output_index
                    )),
                };
                ChannelPayload::File { path }
            }
            ChannelKind::Collection => ChannelPayload::Collection(None),
        };

        ChannelInstance {
            channel: self.id,
            producer: self.producer,
            payload,
            measured_cardinality: None,
        }
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub enum ChannelPayload {
    File { path: Utf8PathBuf },
    Collection(Option<Dynamic>),
}

/// The runtime realization of a [`Channel`] within one job.
#[derive(Debug, Clone)]
pub struct ChannelInstance {
    channel: ChannelId,
    producer: Option<TaskId>,
    payload: ChannelPayload,
    measured_cardinality: Option<u64>,
}

impl ChannelInstance {
    /// An instance registered from outside the plan, e.g. the job's input.
    pub fn external(channel: ChannelId, payload: ChannelPayload) -> Self {
        Self {
            channel,
            producer: None,
            payload,
            measured_cardinality: None,
        }
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn producer(&self) -> Option<TaskId> {
        self.producer
    }

    pub fn kind(&self) -> ChannelKind {
        match self.payload {
            ChannelPayload::File { .. } => ChannelKind::File,
            ChannelPayload::Collection(_) => ChannelKind::Collection,
        }
    }

    pub fn payload(&self) -> &ChannelPayload {
        &self.payload
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        match &self.payload {
            ChannelPayload::File { path } => Some(path),
            ChannelPayload::Collection(_) => None,
        }
    }

    pub fn collection<T: Send + Sync + 'static>(&self) -> Option<&T> {
        match &self.payload {
            ChannelPayload::Collection(Some(value)) => value.downcast_ref(),
            _ => None,
        }
    }

    pub fn set_collection<T: Send + Sync + 'static>(&mut self, value: T) {
        self.payload = ChannelPayload::Collection(Some(Arc::new(value)));
    }

    pub fn measured_cardinality(&self) -> Option<u64> {
        self.measured_cardinality
    }

    pub fn set_measured_cardinality(&mut self, cardinality: u64) {
        self.measured_cardinality = Some(cardinality);
    }
}
