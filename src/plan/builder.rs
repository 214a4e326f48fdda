use std::fmt::{Display, Formatter};
use std::sync::Arc;

use petgraph::Direction;
use petgraph::Graph;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::error::PlanError;
use crate::operators::ExecutionOperator;
use crate::plan::{Channel, ChannelDescriptor, ChannelId, ExecutionTask, StageId, TaskId};

/// Incrementally assembles an [`ExecutionPlan`].
///
/// Tasks and channels can be added in any order; the producer/consumer edges
/// are wired as soon as both ends are known.
///
/// # Example
///
/// ```rust
/// # use std::sync::Arc;
/// use shardgraph::{ChannelDescriptor, PageRankOperator, PlanBuilder};
///
/// let mut builder = PlanBuilder::new();
/// let stage = builder.add_stage();
/// let edges = builder.add_channel(ChannelDescriptor::file_at("edges.txt"));
/// let ranks = builder.add_channel(ChannelDescriptor::file_at("ranks.bin"));
/// builder
///     .add_task(stage, Arc::new(PageRankOperator::new(4)), &[edges], &[ranks])
///     .unwrap();
/// let plan = builder.finish().unwrap();
/// assert_eq!(plan.stage(stage).unwrap().start_tasks().len(), 1);
/// ```
#[derive(Default)]
pub struct PlanBuilder {
    graph: Graph<ExecutionTask, ChannelId>,
    channels: Vec<Channel>,
    stages: Vec<Vec<TaskId>>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stage(&mut self) -> StageId {
        self.stages.push(Vec::new());
        StageId(self.stages.len() - 1)
    }

    pub fn add_channel(&mut self, descriptor: ChannelDescriptor) -> ChannelId {
        let id = ChannelId(self.channels.len());
        self.channels.push(Channel {
            id,
            descriptor,
            producer: None,
            consumers: Vec::new(),
        });
        id
    }

    pub fn add_task(
        &mut self,
        stage: StageId,
        operator: Arc<dyn ExecutionOperator>,
        inputs: &[ChannelId],
        outputs: &[ChannelId],
    ) -> Result<TaskId, PlanError> {
        if stage.0 >= self.stages.len() {
            return Err(PlanError::UnknownStage(stage));
        }

        for &channel in inputs.iter().chain(outputs) {
            if channel.0 >= self.channels.len() {
                return Err(PlanError::UnknownChannel(channel));
            }
        }

        check_arity(operator.as_ref(), "input", operator.num_inputs(), inputs.len())?;
        check_arity(operator.as_ref(), "output", operator.num_outputs(), outputs.len())?;

        for &channel in outputs {
            if let Some(producer) = self.channels[channel.0].producer {
                return Err(PlanError::DuplicateProducer { channel, producer });
            }
        }

        let id = TaskId(self.graph.node_count());
        let index = self.graph.add_node(ExecutionTask {
            id,
            stage,
            operator,
            inputs: inputs.to_vec(),
            outputs: outputs.to_vec(),
        });
        self.stages[stage.0].push(id);

        for &channel in inputs {
            let channel = &mut self.channels[channel.0];
            if !channel.consumers.contains(&id) {
                channel.consumers.push(id);
            }
            if let Some(producer) = channel.producer {
                self.graph
                    .add_edge(NodeIndex::new(producer.0), index, channel.id);
            }
        }

        for &channel in outputs {
            let channel = &mut self.channels[channel.0];
            channel.producer = Some(id);
            for &consumer in &channel.consumers {
                self.graph
                    .add_edge(index, NodeIndex::new(consumer.0), channel.id);
            }
        }

        Ok(id)
    }

    pub fn finish(self) -> Result<ExecutionPlan, PlanError> {
        // Only used to reject cycles, execution order is up to the executor.
        petgraph::algo::toposort(&self.graph, None)
            .map_err(|cycle| PlanError::Cycle(TaskId(cycle.node_id().index())))?;

        let graph = self.graph;
        let stages = self
            .stages
            .into_iter()
            .enumerate()
            .map(|(i, tasks)| {
                let id = StageId(i);
                let start_tasks = tasks
                    .iter()
                    .copied()
                    .filter(|task| {
                        !graph
                            .edges_directed(NodeIndex::new(task.0), Direction::Incoming)
                            .any(|edge| graph[edge.source()].stage == id)
                    })
                    .collect();

                ExecutionStage {
                    id,
                    tasks,
                    start_tasks,
                }
            })
            .collect();

        Ok(ExecutionPlan {
            graph,
            channels: self.channels,
            stages,
        })
    }
}

fn check_arity(
    operator: &dyn ExecutionOperator,
    side: &'static str,
    expected: usize,
    found: usize,
) -> Result<(), PlanError> {
    if expected == found {
        return Ok(());
    }

    Err(PlanError::Arity {
        operator: operator.name().to_string(),
        side,
        expected,
        found,
    })
}

/// A subset of the plan's tasks executed together on this platform.
#[derive(Debug, Clone)]
pub struct ExecutionStage {
    id: StageId,
    tasks: Vec<TaskId>,
    start_tasks: Vec<TaskId>,
}

impl ExecutionStage {
    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn tasks(&self) -> &[TaskId] {
        &self.tasks
    }

    /// Tasks without a producer inside this stage, in insertion order.
    pub fn start_tasks(&self) -> &[TaskId] {
        &self.start_tasks
    }
}

/// A validated, immutable execution plan.
pub struct ExecutionPlan {
    graph: Graph<ExecutionTask, ChannelId>,
    channels: Vec<Channel>,
    stages: Vec<ExecutionStage>,
}

impl ExecutionPlan {
    pub fn task(&self, id: TaskId) -> &ExecutionTask {
        &self.graph[NodeIndex::new(id.0)]
    }

    pub fn tasks(&self) -> impl Iterator<Item = &ExecutionTask> {
        self.graph.node_weights()
    }

    pub fn channel(&self, id: ChannelId) -> &Channel {
        &self.channels[id.0]
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn stage(&self, id: StageId) -> Option<&ExecutionStage> {
        self.stages.get(id.0)
    }

    pub fn stages(&self) -> &[ExecutionStage] {
        &self.stages
    }

    /// Tasks of the same stage producing an input of `task`, deduplicated.
    pub fn same_stage_producers(&self, task: TaskId) -> Vec<TaskId> {
        let stage = self.task(task).stage;
        let mut producers: Vec<TaskId> = self
            .graph
            .neighbors_directed(NodeIndex::new(task.0), Direction::Incoming)
            .map(|index| self.graph[index].id)
            .filter(|producer| self.task(*producer).stage == stage)
            .collect();
        producers.sort();
        producers.dedup();
        producers
    }
}

impl Display for ExecutionPlan {
    /// Renders the plan as a Mermaid flowchart, one subgraph per stage.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "graph LR")?;

        for stage in &self.stages {
            writeln!(f, "    subgraph {}", stage.id)?;
            for &task in &stage.tasks {
                let name = self.task(task).operator.name().replace('"', "\\\"");
                writeln!(f, "        {task}[\"{task}: {name}\"]")?;
            }
            writeln!(f, "    end")?;
        }

        for edge in self.graph.edge_references() {
            let source = self.graph[edge.source()].id;
            let target = self.graph[edge.target()].id;
            writeln!(f, "    {source} -- \"{}\" --> {target}", edge.weight())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::testing::Recorder;

    #[test]
    fn test_start_tasks_per_stage() {
        let recorder = Recorder::default();
        let mut b = PlanBuilder::new();
        let s0 = b.add_stage();
        let s1 = b.add_stage();
        let c0 = b.add_channel(ChannelDescriptor::collection());
        let c1 = b.add_channel(ChannelDescriptor::collection());
        let c2 = b.add_channel(ChannelDescriptor::collection());

        let t0 = b.add_task(s0, recorder.op("a", 0, 1), &[], &[c0]).unwrap();
        let t1 = b.add_task(s0, recorder.op("b", 1, 1), &[c0], &[c1]).unwrap();
        let t2 = b.add_task(s1, recorder.op("c", 1, 1), &[c1], &[c2]).unwrap();
        let plan = b.finish().unwrap();

        assert_eq!(plan.stage(s0).unwrap().start_tasks(), &[t0]);
        assert_eq!(plan.stage(s1).unwrap().start_tasks(), &[t2]);
        assert_eq!(plan.channel(c1).producer(), Some(t1));
        assert_eq!(plan.channel(c1).consumers(), &[t2]);
        assert_eq!(plan.same_stage_producers(t1), vec![t0]);
        assert!(plan.same_stage_producers(t2).is_empty());
    }

    #[test]
    fn test_consumer_added_before_producer() {
        let recorder = Recorder::default();
        let mut b = PlanBuilder::new();
        let s = b.add_stage();
        let c = b.add_channel(ChannelDescriptor::collection());

        let consumer = b.add_task(s, recorder.op("sink", 1, 0), &[c], &[]).unwrap();
        let producer = b.add_task(s, recorder.op("source", 0, 1), &[], &[c]).unwrap();
        let plan = b.finish().unwrap();

        assert_eq!(plan.stage(s).unwrap().start_tasks(), &[producer]);
        assert_eq!(plan.same_stage_producers(consumer), vec![producer]);
    }

    #[test]
    fn test_duplicate_producer() {
        let recorder = Recorder::default();
        let mut b = PlanBuilder::new();
        let s = b.add_stage();
        let c = b.add_channel(ChannelDescriptor::collection());

        b.add_task(s, recorder.op("a", 0, 1), &[], &[c]).unwrap();
        let err = b.add_task(s, recorder.op("b", 0, 1), &[], &[c]).unwrap_err();
        assert!(matches!(err, PlanError::DuplicateProducer { .. }));
    }

    #[test]
    fn test_arity_and_unknown_ids() {
        let recorder = Recorder::default();
        let mut b = PlanBuilder::new();
        let s = b.add_stage();
        let c = b.add_channel(ChannelDescriptor::collection());

        assert!(matches!(
            b.add_task(s, recorder.op("a", 1, 1), &[c], &[]),
            Err(PlanError::Arity { side: "output", .. })
        ));
        assert!(matches!(
            b.add_task(StageId(9), recorder.op("a", 0, 0), &[], &[]),
            Err(PlanError::UnknownStage(_))
        ));
        assert!(matches!(
            b.add_task(s, recorder.op("a", 1, 0), &[ChannelId(42)], &[]),
            Err(PlanError::UnknownChannel(_))
        ));
    }

    #[test]
    fn test_cycle_rejected() {
        let recorder = Recorder::default();
        let mut b = PlanBuilder::new();
        let s = b.add_stage();
        let c0 = b.add_channel(ChannelDescriptor::collection());
        let c1 = b.add_channel(ChannelDescriptor::collection());

        b.add_task(s, recorder.op("a", 1, 1), &[c1], &[c0]).unwrap();
        b.add_task(s, recorder.op("b", 1, 1), &[c0], &[c1]).unwrap();

        assert!(matches!(b.finish(), Err(PlanError::Cycle(_))));
    }

    #[test]
    fn test_mermaid() {
        let recorder = Recorder::default();
        let mut b = PlanBuilder::new();
        let s = b.add_stage();
        let c = b.add_channel(ChannelDescriptor::collection());
        b.add_task(s, recorder.op("a", 0, 1), &[], &[c]).unwrap();
        b.add_task(s, recorder.op("b", 1, 0), &[c], &[]).unwrap();

        let text = b.finish().unwrap().to_string();
        assert!(text.starts_with("graph LR\n"));
        assert!(text.contains("subgraph S0"));
        assert!(text.contains("T0 -- \"C0\" --> T1"));
    }
}
