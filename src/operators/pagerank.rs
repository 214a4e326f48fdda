use std::io::{BufReader, ErrorKind, Write};
use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::{ENGINE_THREADS_PROPERTY, TEMP_DIR_PROPERTY};
use crate::engine::{Engine, IterationContext, ShardSet, Sharder, VertexProgram, VertexState};
use crate::error::{EngineError, OperatorError};
use crate::executor::ExecutionLineageNode;
use crate::fs::{FileSystems, LocalFileSystem};
use crate::operators::{ExecutionOperator, OperatorOutput, check_channels};
use crate::optimizer::OperatorContext;
use crate::plan::{ChannelInstance, ChannelKind};

pub const DEFAULT_ITERATIONS: usize = 4;

/// Roughly one shard per million edges, estimated from the file size.
const BYTES_PER_SHARD: u64 = 10 * 1_000_000;

const FILES: &[ChannelKind] = &[ChannelKind::File];

/// Computes PageRank over an edge list file with the embedded engine.
///
/// Reads one file channel holding an edge list and writes one file channel
/// of `(u32 BE vertex id, f32 BE rank)` records, one per vertex, in the
/// engine's internal vertex order.
#[derive(Clone)]
pub struct PageRankOperator {
    num_iterations: usize,
    file_systems: FileSystems,
}

impl PageRankOperator {
    pub fn new(num_iterations: usize) -> Self {
        Self {
            num_iterations,
            file_systems: FileSystems::default(),
        }
    }

    pub fn with_file_systems(mut self, file_systems: FileSystems) -> Self {
        self.file_systems = file_systems;
        self
    }

    pub fn num_iterations(&self) -> usize {
        self.num_iterations
    }

    /// Finds or builds the shared shard set of `input`.
    fn prepare(&self, input: &str, context: &OperatorContext) -> Result<ShardSet, OperatorError> {
        let fs = self
            .file_systems
            .get_file_system(input)
            .map_err(OperatorError::setup)?;
        let size = fs.file_size(input).map_err(OperatorError::setup)?;
        let num_shards = 2 + (size / BYTES_PER_SHARD) as usize;

        // Shard sets are named after the input's content, so running twice on
        // the same data reuses the shards.
        let mut hasher = blake3::Hasher::new();
        hasher
            .update_reader(fs.open(input).map_err(OperatorError::setup)?)
            .map_err(OperatorError::setup)?;
        let name = format!("shardgraph-{}", hasher.finalize().to_hex());

        let base = shard_base_dir(context);
        let dir = ShardSet::path(&base, &name, num_shards);

        if ShardSet::exists(&dir) {
            tracing::info!("Found shards in {dir} -- no need to preprocess");
            ShardSet::open(&dir).map_err(OperatorError::setup)
        } else {
            let reader = BufReader::new(fs.open(input).map_err(OperatorError::setup)?);
            Sharder::new(&dir, num_shards)
                .shard(reader)
                .map_err(OperatorError::setup)
        }
    }

    fn write_ranks(&self, engine: &Engine, output: &str) -> Result<(), OperatorError> {
        let fs = self
            .file_systems
            .get_file_system(output)
            .map_err(OperatorError::execution)?;
        let mut writer = fs.create(output).map_err(OperatorError::execution)?;
        let translate = engine.shards().translate();

        engine
            .foreach_vertex(|id, rank| -> Result<(), EngineError> {
                writer.write_all(&translate.backward(id).to_be_bytes())?;
                writer.write_all(&rank.to_be_bytes())?;
                Ok(())
            })
            .map_err(OperatorError::execution)?;

        writer.flush().map_err(OperatorError::execution)
    }
}

impl Default for PageRankOperator {
    fn default() -> Self {
        Self::new(DEFAULT_ITERATIONS)
    }
}

fn engine_threads(context: &OperatorContext) -> Result<usize, OperatorError> {
    let threads = context
        .configuration()
        .get_optional_long_property(ENGINE_THREADS_PROPERTY)
        .map_err(OperatorError::setup)?
        .unwrap_or(4)
        .max(1);
    Ok(threads as usize)
}

static WORK_DIRS: AtomicUsize = AtomicUsize::new(0);

/// Private directory an engine run rewrites values in, removed on drop.
struct WorkDir(Utf8PathBuf);

impl WorkDir {
    fn next_to(shards: &ShardSet) -> Self {
        let n = WORK_DIRS.fetch_add(1, Ordering::Relaxed);
        Self(Utf8PathBuf::from(format!(
            "{}.work-{}-{n}",
            shards.dir(),
            std::process::id()
        )))
    }

    fn path(&self) -> &Utf8Path {
        &self.0
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.0)
            && err.kind() != ErrorKind::NotFound
        {
            tracing::warn!("Couldn't remove {}: {err}", self.0);
        }
    }
}

fn shard_base_dir(context: &OperatorContext) -> Utf8PathBuf {
    context
        .configuration()
        .get_optional_string_property(TEMP_DIR_PROPERTY)
        .map(Utf8PathBuf::from)
        .or_else(LocalFileSystem::find_temp_dir)
        .unwrap_or_else(|| Utf8Path::new(".").to_owned())
}

impl ExecutionOperator for PageRankOperator {
    fn name(&self) -> &str {
        "PageRank"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn supported_input_channels(&self, _: usize) -> &[ChannelKind] {
        FILES
    }

    fn supported_output_channels(&self, _: usize) -> &[ChannelKind] {
        FILES
    }

    fn execute(
        &self,
        inputs: &[ChannelInstance],
        outputs: &mut [Option<ChannelInstance>],
        context: &OperatorContext,
    ) -> Result<OperatorOutput, OperatorError> {
        debug_assert_eq!(inputs.len(), self.num_inputs());
        debug_assert_eq!(outputs.len(), self.num_outputs());

        check_channels(inputs.iter().map(Some), |i| self.supported_input_channels(i))?;
        check_channels(outputs.iter().map(Option::as_ref), |i| {
            self.supported_output_channels(i)
        })?;

        // Both were checked to be file channels above.
        let input = inputs
            .first()
            .ok_or(OperatorError::MissingInput(0))?
            .path()
            .map(Utf8Path::as_str)
            .unwrap_or_default();
        let output = outputs
            .first_mut()
            .and_then(Option::as_mut)
            .ok_or(OperatorError::MissingOutput(0))?;
        let output_path = output.path().map(Utf8Path::to_string).unwrap_or_default();

        let shards = self.prepare(input, context)?;
        let threads = engine_threads(context)?;

        // The shared set stays read-only, the engine runs on a private copy.
        let work = WorkDir::next_to(&shards);
        let copy = shards
            .working_copy(work.path())
            .map_err(OperatorError::setup)?;
        let engine = Engine::new(copy).with_threads(threads);
        engine
            .run(&PageRankProgram, self.num_iterations)
            .map_err(OperatorError::execution)?;
        self.write_ranks(&engine, &output_path)?;

        output.set_measured_cardinality(engine.num_vertices() as u64);
        tracing::info!(
            vertices = engine.num_vertices(),
            iterations = self.num_iterations,
            "Wrote ranks to {output_path}"
        );

        Ok(OperatorOutput {
            lineage: vec![ExecutionLineageNode::new(context)],
            produced: vec![output.clone()],
        })
    }
}

/// PageRank with a damping factor of 0.85 and unnormalized ranks: every
/// vertex starts at `1.0`.
pub(crate) struct PageRankProgram;

impl VertexProgram for PageRankProgram {
    fn update(&self, context: &IterationContext, vertex: &VertexState<'_>) -> f32 {
        if context.iteration == 0 {
            return 1.0;
        }
        0.15 + 0.85 * vertex.in_edges.iter().sum::<f32>()
    }

    fn scatter(&self, _: &IterationContext, value: f32, num_out_edges: u32) -> f32 {
        if num_out_edges == 0 {
            return 0.0;
        }
        value / num_out_edges as f32
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::fs;
    use std::sync::Arc;

    use super::*;
    use crate::config::Configuration;
    use crate::fs::testing::MemoryFileSystem;
    use crate::plan::{ChannelId, ChannelPayload};

    fn read_ranks(path: &Utf8Path) -> Vec<(u32, f32)> {
        fs::read(path)
            .unwrap()
            .chunks_exact(8)
            .map(|r| {
                (
                    u32::from_be_bytes([r[0], r[1], r[2], r[3]]),
                    f32::from_be_bytes([r[4], r[5], r[6], r[7]]),
                )
            })
            .collect()
    }

    fn context(scratch: &Utf8Path) -> OperatorContext {
        let mut config = Configuration::with_defaults();
        config.set_property(TEMP_DIR_PROPERTY, scratch.as_str());
        config.set_property(ENGINE_THREADS_PROPERTY, "2");
        OperatorContext::new("PageRank", Arc::new(config))
    }

    fn file(channel: usize, path: impl Into<Utf8PathBuf>) -> ChannelInstance {
        ChannelInstance::external(ChannelId(channel), ChannelPayload::File { path: path.into() })
    }

    /// Runs PageRank on `base/edges.txt` with shards under `base/scratch`.
    fn execute(base: &Utf8Path, iterations: usize) -> (Vec<(u32, f32)>, Option<u64>) {
        let input = file(0, base.join("edges.txt"));
        let mut outputs = [Some(file(1, base.join("out/ranks.bin")))];

        let result = PageRankOperator::new(iterations)
            .execute(&[input], &mut outputs, &context(&base.join("scratch")))
            .unwrap();
        assert_eq!(result.lineage.len(), 1);
        assert_eq!(result.produced.len(), 1);

        let ranks = read_ranks(&base.join("out/ranks.bin"));
        let cardinality = outputs[0].as_ref().unwrap().measured_cardinality();
        (ranks, cardinality)
    }

    fn run(edges: &str, iterations: usize) -> (tempfile::TempDir, Vec<(u32, f32)>, Option<u64>) {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(tmp.path()).unwrap().to_owned();
        fs::write(base.join("edges.txt"), edges).unwrap();

        let (ranks, cardinality) = execute(&base, iterations);
        (tmp, ranks, cardinality)
    }

    /// Every file of every shard set under `scratch`, by relative path.
    fn snapshot(scratch: &Utf8Path) -> BTreeMap<String, Vec<u8>> {
        let mut files = BTreeMap::new();
        for dir in scratch.read_dir_utf8().unwrap() {
            let dir = dir.unwrap();
            for file in dir.path().read_dir_utf8().unwrap() {
                let file = file.unwrap();
                files.insert(
                    format!("{}/{}", dir.file_name(), file.file_name()),
                    fs::read(file.path()).unwrap(),
                );
            }
        }
        files
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn test_star() {
        // 1 -> 3, 2 -> 3
        let (_tmp, ranks, cardinality) = run("1 3\n2 3\n", 3);

        assert_eq!(cardinality, Some(3));
        // Internal order is first-seen order.
        let ids: Vec<u32> = ranks.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![1, 3, 2]);

        assert!(close(ranks[0].1, 0.15));
        assert!(close(ranks[1].1, 0.15 + 0.85 * 0.3));
        assert!(close(ranks[2].1, 0.15));
    }

    #[test]
    fn test_chain_default_iterations() {
        let (_tmp, ranks, _) = run("1 2\n2 3\n", DEFAULT_ITERATIONS);

        assert!(close(ranks[0].1, 0.15));
        assert!(close(ranks[1].1, 0.2775));
        assert!(close(ranks[2].1, 0.15 + 0.85 * 0.2775));
    }

    #[test]
    fn test_cycle_is_stationary() {
        let (_tmp, ranks, _) = run("7 8\n8 7\n", 10);
        assert!(ranks.iter().all(|(_, rank)| close(*rank, 1.0)));
    }

    #[test]
    fn test_reuses_shards() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(tmp.path()).unwrap().to_owned();
        fs::write(base.join("edges.txt"), "1 2\n").unwrap();

        let mut config = Configuration::with_defaults();
        config.set_property(TEMP_DIR_PROPERTY, base.as_str());
        let context = OperatorContext::new("PageRank", Arc::new(config));
        let op = PageRankOperator::default();

        let first = op.prepare(base.join("edges.txt").as_str(), &context).unwrap();
        let dir = first.dir().to_owned();
        assert!(dir.as_str().ends_with(".2.shards"));

        let second = op.prepare(base.join("edges.txt").as_str(), &context).unwrap();
        assert_eq!(second.dir(), dir);
    }

    #[test]
    fn test_runs_leave_shared_shards_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(tmp.path()).unwrap().to_owned();
        fs::write(base.join("edges.txt"), "1 2\n2 1\n3 2\n").unwrap();

        let (untouched, _) = execute(&base, 0);
        assert!(untouched.iter().all(|(_, rank)| *rank == 0.0));
        let shards = snapshot(&base.join("scratch"));
        assert!(shards.keys().any(|name| name.ends_with("/meta.cbor")));

        let (first, _) = execute(&base, 4);
        assert!(first.iter().any(|(_, rank)| *rank > 0.0));
        assert_eq!(snapshot(&base.join("scratch")), shards);

        // A later job sees the same shards as the first one did.
        let (after, _) = execute(&base, 0);
        assert_eq!(after, untouched);
        let (again, _) = execute(&base, 4);
        assert_eq!(again, first);

        // Working copies are gone after each run.
        assert_eq!(snapshot(&base.join("scratch")), shards);
    }

    #[test]
    fn test_reads_and_writes_through_registered_file_system() {
        let tmp = tempfile::tempdir().unwrap();
        let scratch = Utf8Path::from_path(tmp.path()).unwrap().to_owned();

        let memory = MemoryFileSystem::default();
        memory.insert("mem://graph/edges.txt", "1 3\n2 3\n");
        let mut systems = FileSystems::new();
        systems.register(Arc::new(memory.clone()));

        let input = file(0, "mem://graph/edges.txt");
        let mut outputs = [Some(file(1, "mem://graph/ranks.bin"))];
        PageRankOperator::new(3)
            .with_file_systems(systems)
            .execute(&[input], &mut outputs, &context(&scratch))
            .unwrap();

        let bytes = memory.get("mem://graph/ranks.bin").unwrap();
        assert_eq!(bytes.len(), 3 * 8);
        assert_eq!(&bytes[8..12], &3u32.to_be_bytes());
        let rank = f32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        assert!(close(rank, 0.15 + 0.85 * 0.3));
        assert!(!scratch.join("graph").exists());
    }

    #[test]
    fn test_empty_inputs_are_rejected() {
        let context = OperatorContext::detached("PageRank");
        let mut outputs = [Some(file(1, "/tmp/unused.bin"))];

        let err = PageRankOperator::default()
            .execute(&[], &mut outputs, &context)
            .unwrap_err();
        assert!(matches!(err, OperatorError::MissingInput(0)));

        let input = file(0, "/definitely/not/here.txt");
        let err = PageRankOperator::default()
            .execute(&[input], &mut [], &context)
            .unwrap_err();
        assert!(matches!(err, OperatorError::MissingOutput(0)));
    }

    #[test]
    fn test_missing_input_is_setup_failure() {
        let context = OperatorContext::detached("PageRank");
        let input = ChannelInstance::external(
            ChannelId(0),
            ChannelPayload::File {
                path: "/definitely/not/here.txt".into(),
            },
        );
        let mut outputs = [Some(ChannelInstance::external(
            ChannelId(1),
            ChannelPayload::File {
                path: "/tmp/unused.bin".into(),
            },
        ))];

        let err = PageRankOperator::default()
            .execute(&[input], &mut outputs, &context)
            .unwrap_err();
        assert!(matches!(err, OperatorError::ResourceSetup(_)));
    }

    #[test]
    fn test_rejects_collection_channels() {
        let context = OperatorContext::detached("PageRank");
        let input = ChannelInstance::external(ChannelId(0), ChannelPayload::Collection(None));
        let mut outputs = [None];

        let err = PageRankOperator::default()
            .execute(&[input], &mut outputs, &context)
            .unwrap_err();
        assert!(matches!(
            err,
            OperatorError::UnsupportedChannel {
                index: 0,
                found: ChannelKind::Collection
            }
        ));
    }
}
