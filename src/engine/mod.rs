//! A small disk-based, vertex-centric graph engine.
//!
//! The graph is split into [`ShardSet`]s by the [`Sharder`]: vertices are cut
//! into intervals, and shard `i` stores every edge whose destination lies in
//! interval `i`. Each iteration streams the shards twice:
//!
//! 1. **Update**: for each interval, load its shard, group in-edge values by
//!    destination and compute the new vertex values in parallel.
//! 2. **Scatter**: for each shard, rewrite every edge value from the updated
//!    value of its source.
//!
//! Updates only ever see edge values of the previous iteration, so results
//! do not depend on how the vertices were cut into intervals.

mod shard;
mod sharder;
mod translate;

use std::sync::LazyLock;

use indicatif::ProgressStyle;
use rayon::prelude::*;
use tracing_indicatif::span_ext::IndicatifSpanExt;

pub use crate::engine::shard::{Edge, Interval, ShardSet, ShardSetMeta};
pub use crate::engine::sharder::Sharder;
pub use crate::engine::translate::VertexIdTranslate;
use crate::error::EngineError;

static ITERATION_STYLE: LazyLock<ProgressStyle> = LazyLock::new(|| {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .expect("Error setting progress bar template")
        .progress_chars("#>-")
});

#[derive(Debug, Clone, Copy)]
pub struct IterationContext {
    pub iteration: usize,
    pub num_iterations: usize,
    pub num_vertices: u32,
}

/// The view of a single vertex during the update phase.
#[derive(Debug)]
pub struct VertexState<'a> {
    pub id: u32,
    pub value: f32,
    pub in_edges: &'a [f32],
    pub num_out_edges: u32,
}

/// A vertex-centric program with float vertex and edge values.
pub trait VertexProgram: Sync {
    /// Computes the new value of a vertex.
    fn update(&self, context: &IterationContext, vertex: &VertexState<'_>) -> f32;

    /// The value written to each out-edge of a vertex after its update.
    fn scatter(&self, context: &IterationContext, value: f32, num_out_edges: u32) -> f32;
}

pub struct Engine {
    shards: ShardSet,
    threads: usize,
}

impl Engine {
    pub fn new(shards: ShardSet) -> Self {
        Self { shards, threads: 4 }
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn shards(&self) -> &ShardSet {
        &self.shards
    }

    pub fn num_vertices(&self) -> u32 {
        self.shards.num_vertices()
    }

    pub fn run(&self, program: &impl VertexProgram, num_iterations: usize) -> Result<(), EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()?;

        let meta = self.shards.meta();
        let out_degrees = &meta.out_degrees;

        let span = tracing::info_span!("engine", shards = self.shards.num_shards());
        span.pb_set_style(&ITERATION_STYLE);
        span.pb_set_length(num_iterations as u64);
        span.pb_set_message("Running iterations...");
        let _enter = span.enter();

        let mut values = self.shards.read_vertices()?;

        for iteration in 0..num_iterations {
            let context = IterationContext {
                iteration,
                num_iterations,
                num_vertices: meta.num_vertices,
            };

            let mut next = values.clone();

            for shard in 0..self.shards.num_shards() {
                let interval = self.shards.interval(shard);
                if interval.is_empty() {
                    continue;
                }

                let mut in_edges = vec![Vec::new(); interval.len()];
                for edge in self.shards.read_shard(shard)? {
                    in_edges[(edge.dst - interval.start) as usize].push(edge.value);
                }

                let updated: Vec<f32> = pool.install(|| {
                    (interval.start..interval.end)
                        .into_par_iter()
                        .zip(in_edges.par_iter())
                        .map(|(id, in_edges)| {
                            let vertex = VertexState {
                                id,
                                value: values[id as usize],
                                in_edges,
                                num_out_edges: out_degrees[id as usize],
                            };
                            program.update(&context, &vertex)
                        })
                        .collect()
                });

                next[interval.start as usize..interval.end as usize].copy_from_slice(&updated);
            }

            for shard in 0..self.shards.num_shards() {
                let mut edges = self.shards.read_shard(shard)?;
                if edges.is_empty() {
                    continue;
                }

                pool.install(|| {
                    edges.par_iter_mut().for_each(|edge| {
                        let src = edge.src as usize;
                        edge.value = program.scatter(&context, next[src], out_degrees[src]);
                    })
                });

                self.shards.write_shard(shard, &edges)?;
            }

            values = next;
            self.shards.write_vertices(&values)?;

            span.pb_inc(1);
            tracing::debug!(iteration, "Finished iteration");
        }

        Ok(())
    }

    /// Calls `f` with every `(internal id, value)` pair in internal id order.
    pub fn foreach_vertex<E>(&self, mut f: impl FnMut(u32, f32) -> Result<(), E>) -> Result<(), E>
    where
        E: From<EngineError>,
    {
        let values = self.shards.read_vertices()?;
        for (id, value) in values.into_iter().enumerate() {
            f(id as u32, value)?;
        }
        Ok(())
    }
}
