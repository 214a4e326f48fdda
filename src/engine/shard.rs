//! On-disk layout of a shard set.
//!
//! ```text
//! <name>.<n>.shards/
//!   meta.cbor       ShardSetMeta, written last so that its presence marks
//!                   a complete shard set
//!   shard-<i>.bin   edges whose destination lies in interval i, sorted by
//!                   source; records of (u32 BE src, u32 BE dst, f32 BE value)
//!   vertices.bin    one f32 BE value per internal vertex id
//! ```

use std::fs;
use std::io::{BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::engine::VertexIdTranslate;
use crate::error::EngineError;

const META_FILE: &str = "meta.cbor";
const VERTICES_FILE: &str = "vertices.bin";
const FORMAT_VERSION: u32 = 1;
const EDGE_RECORD: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub src: u32,
    pub dst: u32,
    pub value: f32,
}

/// A contiguous range `start..end` of internal vertex ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn contains(&self, vertex: u32) -> bool {
        self.start <= vertex && vertex < self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardSetMeta {
    pub version: u32,
    pub num_vertices: u32,
    pub num_edges: u64,
    pub intervals: Vec<Interval>,
    pub out_degrees: Vec<u32>,
    pub translate: VertexIdTranslate,
}

/// A sharded graph on disk.
#[derive(Debug)]
pub struct ShardSet {
    dir: Utf8PathBuf,
    meta: ShardSetMeta,
}

impl ShardSet {
    /// Directory of the shard set called `name` with `num_shards` shards.
    pub fn path(base: &Utf8Path, name: &str, num_shards: usize) -> Utf8PathBuf {
        base.join(format!("{name}.{num_shards}.shards"))
    }

    pub fn exists(dir: &Utf8Path) -> bool {
        dir.join(META_FILE).is_file()
    }

    pub fn open(dir: &Utf8Path) -> Result<Self, EngineError> {
        let file = fs::File::open(dir.join(META_FILE))?;
        let meta: ShardSetMeta = ciborium::from_reader(BufReader::new(file))?;

        if meta.version != FORMAT_VERSION {
            return Err(EngineError::Corrupt(format!(
                "unsupported format version {}",
                meta.version
            )));
        }
        if meta.intervals.is_empty()
            || meta.out_degrees.len() != meta.num_vertices as usize
            || meta.translate.len() != meta.num_vertices as usize
        {
            return Err(EngineError::Corrupt(format!("inconsistent metadata in {dir}")));
        }

        Ok(Self {
            dir: dir.to_owned(),
            meta,
        })
    }

    pub(crate) fn create(
        dir: &Utf8Path,
        num_vertices: u32,
        intervals: Vec<Interval>,
        shards: &[Vec<Edge>],
        translate: VertexIdTranslate,
    ) -> Result<Self, EngineError> {
        fs::create_dir_all(dir)?;

        let mut out_degrees = vec![0u32; num_vertices as usize];
        let mut num_edges = 0;
        for (i, shard) in shards.iter().enumerate() {
            write_edges(&dir.join(shard_file(i)), shard)?;
            for edge in shard {
                out_degrees[edge.src as usize] += 1;
            }
            num_edges += shard.len() as u64;
        }

        write_values(
            &dir.join(VERTICES_FILE),
            &vec![0.0; num_vertices as usize],
        )?;

        let meta = ShardSetMeta {
            version: FORMAT_VERSION,
            num_vertices,
            num_edges,
            intervals,
            out_degrees,
            translate,
        };

        let mut writer = BufWriter::new(fs::File::create(dir.join(META_FILE))?);
        ciborium::into_writer(&meta, &mut writer)?;
        writer.flush()?;

        Ok(Self {
            dir: dir.to_owned(),
            meta,
        })
    }

    /// Copies the edge and vertex data into `dir`. Running the engine on the
    /// copy leaves this shard set as it was.
    pub fn working_copy(&self, dir: &Utf8Path) -> Result<ShardSet, EngineError> {
        fs::create_dir_all(dir)?;
        for shard in 0..self.num_shards() {
            fs::copy(self.dir.join(shard_file(shard)), dir.join(shard_file(shard)))?;
        }
        fs::copy(self.dir.join(VERTICES_FILE), dir.join(VERTICES_FILE))?;

        Ok(ShardSet {
            dir: dir.to_owned(),
            meta: self.meta.clone(),
        })
    }

    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    pub fn meta(&self) -> &ShardSetMeta {
        &self.meta
    }

    pub fn num_shards(&self) -> usize {
        self.meta.intervals.len()
    }

    pub fn num_vertices(&self) -> u32 {
        self.meta.num_vertices
    }

    pub fn translate(&self) -> &VertexIdTranslate {
        &self.meta.translate
    }

    pub fn interval(&self, shard: usize) -> Interval {
        self.meta.intervals[shard]
    }

    pub fn read_shard(&self, shard: usize) -> Result<Vec<Edge>, EngineError> {
        let bytes = fs::read(self.dir.join(shard_file(shard)))?;
        if bytes.len() % EDGE_RECORD != 0 {
            return Err(EngineError::Corrupt(format!("truncated shard {shard}")));
        }

        Ok(bytes
            .chunks_exact(EDGE_RECORD)
            .map(|r| Edge {
                src: u32::from_be_bytes([r[0], r[1], r[2], r[3]]),
                dst: u32::from_be_bytes([r[4], r[5], r[6], r[7]]),
                value: f32::from_be_bytes([r[8], r[9], r[10], r[11]]),
            })
            .collect())
    }

    pub fn write_shard(&self, shard: usize, edges: &[Edge]) -> Result<(), EngineError> {
        write_edges(&self.dir.join(shard_file(shard)), edges)
    }

    pub fn read_vertices(&self) -> Result<Vec<f32>, EngineError> {
        let bytes = fs::read(self.dir.join(VERTICES_FILE))?;
        if bytes.len() != self.meta.num_vertices as usize * 4 {
            return Err(EngineError::Corrupt("vertex data size mismatch".into()));
        }

        Ok(bytes
            .chunks_exact(4)
            .map(|r| f32::from_be_bytes([r[0], r[1], r[2], r[3]]))
            .collect())
    }

    pub fn write_vertices(&self, values: &[f32]) -> Result<(), EngineError> {
        write_values(&self.dir.join(VERTICES_FILE), values)
    }
}

fn shard_file(shard: usize) -> String {
    format!("shard-{shard}.bin")
}

fn write_edges(path: &Utf8Path, edges: &[Edge]) -> Result<(), EngineError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for edge in edges {
        writer.write_all(&edge.src.to_be_bytes())?;
        writer.write_all(&edge.dst.to_be_bytes())?;
        writer.write_all(&edge.value.to_be_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

fn write_values(path: &Utf8Path, values: &[f32]) -> Result<(), EngineError> {
    let mut writer = BufWriter::new(fs::File::create(path)?);
    for value in values {
        writer.write_all(&value.to_be_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_open() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(tmp.path()).unwrap();
        let dir = ShardSet::path(base, "g", 2);
        assert!(!ShardSet::exists(&dir));

        let shards = vec![
            vec![Edge { src: 1, dst: 0, value: 0.5 }],
            vec![
                Edge { src: 0, dst: 1, value: 1.0 },
                Edge { src: 0, dst: 2, value: 2.0 },
            ],
        ];
        let intervals = vec![Interval { start: 0, end: 1 }, Interval { start: 1, end: 3 }];
        ShardSet::create(
            &dir,
            3,
            intervals.clone(),
            &shards,
            VertexIdTranslate::from(vec![10, 20, 30]),
        )
        .unwrap();

        assert!(ShardSet::exists(&dir));
        let set = ShardSet::open(&dir).unwrap();
        assert_eq!(set.num_shards(), 2);
        assert_eq!(set.meta().num_edges, 3);
        assert_eq!(set.meta().out_degrees, vec![2, 1, 0]);
        assert_eq!(set.meta().intervals, intervals);
        assert_eq!(set.translate().backward(2), 30);
        assert_eq!(set.read_shard(1).unwrap(), shards[1]);
        assert_eq!(set.read_vertices().unwrap(), vec![0.0; 3]);
    }

    #[test]
    fn test_working_copy_is_independent() {
        let tmp = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(tmp.path()).unwrap();
        let set = ShardSet::create(
            &base.join("g.1.shards"),
            2,
            vec![Interval { start: 0, end: 2 }],
            &[vec![Edge { src: 0, dst: 1, value: 1.0 }]],
            VertexIdTranslate::from(vec![3, 4]),
        )
        .unwrap();

        let copy = set.working_copy(&base.join("work")).unwrap();
        assert_eq!(copy.dir(), base.join("work"));
        assert_eq!(copy.read_shard(0).unwrap(), set.read_shard(0).unwrap());

        copy.write_shard(0, &[Edge { src: 0, dst: 1, value: 9.0 }]).unwrap();
        copy.write_vertices(&[5.0, 6.0]).unwrap();

        assert_eq!(set.read_shard(0).unwrap()[0].value, 1.0);
        assert_eq!(set.read_vertices().unwrap(), vec![0.0, 0.0]);
        // Only the original carries the metadata marking a complete set.
        assert!(!ShardSet::exists(copy.dir()));
    }

    #[test]
    fn test_truncated_shard() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = Utf8Path::from_path(tmp.path()).unwrap().join("g.1.shards");
        let set = ShardSet::create(
            &dir,
            1,
            vec![Interval { start: 0, end: 1 }],
            &[vec![Edge { src: 0, dst: 0, value: 1.0 }]],
            VertexIdTranslate::from(vec![5]),
        )
        .unwrap();

        fs::write(dir.join("shard-0.bin"), [0u8; 7]).unwrap();
        assert!(matches!(set.read_shard(0), Err(EngineError::Corrupt(_))));
    }
}
