use std::io::BufRead;

use camino::Utf8Path;

use crate::engine::shard::{Edge, Interval, ShardSet};
use crate::engine::VertexIdTranslate;
use crate::error::EngineError;

/// Splits an edge list into a [`ShardSet`].
///
/// The input is a text edge list with one `src dst [weight]` edge per line.
/// Blank lines and lines starting with `#` or `%` are skipped. A missing
/// weight initializes the edge value to `0.0`.
pub struct Sharder<'a> {
    dir: &'a Utf8Path,
    num_shards: usize,
}

impl<'a> Sharder<'a> {
    pub fn new(dir: &'a Utf8Path, num_shards: usize) -> Self {
        Self {
            dir,
            num_shards: num_shards.max(1),
        }
    }

    pub fn shard(&self, input: impl BufRead) -> Result<ShardSet, EngineError> {
        let mut translate = VertexIdTranslate::new();
        let mut edges = Vec::new();

        for (i, line) in input.lines().enumerate() {
            let line = line?;
            if let Some((src, dst, value)) = parse_edge(&line, i + 1)? {
                let src = translate.intern(src);
                let dst = translate.intern(dst);
                edges.push(Edge { src, dst, value });
            }
        }

        let num_vertices = translate.len() as u32;
        let intervals = split_intervals(num_vertices, &edges, self.num_shards);

        let mut shards = vec![Vec::new(); intervals.len()];
        for edge in edges {
            let shard = intervals.partition_point(|interval| interval.end <= edge.dst);
            shards[shard].push(edge);
        }
        for shard in &mut shards {
            shard.sort_by_key(|edge| (edge.src, edge.dst));
        }

        tracing::debug!(
            vertices = num_vertices,
            shards = shards.len(),
            "Sharded edge list into {}",
            self.dir
        );

        ShardSet::create(self.dir, num_vertices, intervals, &shards, translate)
    }
}

fn parse_edge(line: &str, number: usize) -> Result<Option<(u32, u32, f32)>, EngineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with('%') {
        return Ok(None);
    }

    let error = || EngineError::Parse {
        line: number,
        text: line.to_string(),
    };

    let mut tokens = line.split_whitespace();
    let src = tokens.next().and_then(|t| t.parse().ok()).ok_or_else(error)?;
    let dst = tokens.next().and_then(|t| t.parse().ok()).ok_or_else(error)?;
    let value = match tokens.next() {
        Some(token) => token.parse().map_err(|_| error())?,
        None => 0.0,
    };

    if tokens.next().is_some() {
        return Err(error());
    }

    Ok(Some((src, dst, value)))
}

/// Cuts `0..num_vertices` into `num_shards` contiguous intervals holding
/// roughly the same number of in-edges each. Trailing intervals may be empty
/// for tiny graphs.
fn split_intervals(num_vertices: u32, edges: &[Edge], num_shards: usize) -> Vec<Interval> {
    let mut in_degrees = vec![0u64; num_vertices as usize];
    for edge in edges {
        in_degrees[edge.dst as usize] += 1;
    }

    let target = (edges.len() as u64).div_ceil(num_shards as u64).max(1);
    let mut intervals = Vec::with_capacity(num_shards);
    let mut start = 0;
    let mut acc = 0;

    for (vertex, degree) in in_degrees.iter().enumerate() {
        acc += degree;
        if acc >= target && intervals.len() + 1 < num_shards {
            let end = vertex as u32 + 1;
            intervals.push(Interval { start, end });
            start = end;
            acc = 0;
        }
    }

    intervals.push(Interval {
        start,
        end: num_vertices,
    });
    while intervals.len() < num_shards {
        intervals.push(Interval {
            start: num_vertices,
            end: num_vertices,
        });
    }

    intervals
}
