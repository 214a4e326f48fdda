use std::collections::HashMap;

use crate::plan::{ChannelId, ChannelInstance};

/// Receives the instances an operator measured, for the host's cost model.
pub trait CardinalitySink {
    fn register_measured_cardinalities(&mut self, instances: &[ChannelInstance]);
}

/// Keeps the latest measured cardinality of each channel.
#[derive(Debug, Default)]
pub struct CardinalityLog {
    measured: HashMap<ChannelId, u64>,
}

impl CardinalityLog {
    pub fn get(&self, channel: ChannelId) -> Option<u64> {
        self.measured.get(&channel).copied()
    }

    pub fn len(&self) -> usize {
        self.measured.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measured.is_empty()
    }
}

impl CardinalitySink for CardinalityLog {
    fn register_measured_cardinalities(&mut self, instances: &[ChannelInstance]) {
        for instance in instances {
            if let Some(cardinality) = instance.measured_cardinality() {
                tracing::debug!(channel = %instance.channel(), cardinality, "Measured cardinality");
                self.measured.insert(instance.channel(), cardinality);
            }
        }
    }
}
