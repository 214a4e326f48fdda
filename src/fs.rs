//! The narrow file-system boundary used by operators.
//!
//! Only local files are supported. Paths may be given either as plain paths
//! or as `file://` URLs; other schemes are rejected so that a distributed file
//! system can be slotted in behind [`FileSystem`] without touching operators.

use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::FsError;

pub trait FileSystem: Send + Sync {
    fn can_handle(&self, url: &str) -> bool;
    fn file_size(&self, url: &str) -> Result<u64, FsError>;
    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FsError>;
    fn create(&self, url: &str) -> Result<Box<dyn Write + Send>, FsError>;
    fn delete(&self, url: &str) -> Result<(), FsError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn to_path(url: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
    }

    /// Finds a usable directory for temporary files.
    pub fn find_temp_dir() -> Option<Utf8PathBuf> {
        let dir = std::env::temp_dir();
        let dir = Utf8PathBuf::from_path_buf(dir).ok()?;
        dir.is_dir().then_some(dir)
    }
}

fn io_err(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> FsError + '_ {
    move |source| FsError::Io {
        path: path.to_string(),
        source,
    }
}

impl FileSystem for LocalFileSystem {
    fn can_handle(&self, url: &str) -> bool {
        url.starts_with("file://") || !url.contains("://")
    }

    fn file_size(&self, url: &str) -> Result<u64, FsError> {
        let path = Self::to_path(url);
        Ok(fs::metadata(&path).map_err(io_err(&path))?.len())
    }

    fn open(&self, url: &str) -> Result<Box<dyn Read + Send>, FsError> {
        let path = Self::to_path(url);
        let file = fs::File::open(&path).map_err(io_err(&path))?;
        Ok(Box::new(BufReader::new(file)))
    }

    fn create(&self, url: &str) -> Result<Box<dyn Write + Send>, FsError> {
        let path = Self::to_path(url);
        if let Some(dir) = path.parent()
            && !dir.as_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(io_err(&path))?;
        }
        let file = fs::File::create(&path).map_err(io_err(&path))?;
        Ok(Box::new(BufWriter::new(file)))
    }

    fn delete(&self, url: &str) -> Result<(), FsError> {
        let path = Self::to_path(url);
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };

        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&path)(e)),
        }
    }
}

/// Registry of the available file systems, picked by URL.
#[derive(Clone)]
pub struct FileSystems {
    systems: Vec<Arc<dyn FileSystem>>,
}

impl FileSystems {
    pub fn new() -> Self {
        Self {
            systems: vec![Arc::new(LocalFileSystem)],
        }
    }

    pub fn register(&mut self, fs: Arc<dyn FileSystem>) {
        // Later registrations take precedence.
        self.systems.insert(0, fs);
    }

    pub fn get_file_system(&self, url: &str) -> Result<Arc<dyn FileSystem>, FsError> {
        self.systems
            .iter()
            .find(|fs| fs.can_handle(url))
            .cloned()
            .ok_or_else(|| FsError::Unsupported(url.to_string()))
    }
}

impl Default for FileSystems {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryFileSystem;
    use super::*;

    #[test]
    fn test_scheme_dispatch() {
        let systems = FileSystems::new();
        assert!(systems.get_file_system("/tmp/x").is_ok());
        assert!(systems.get_file_system("file:///tmp/x").is_ok());
        assert!(matches!(
            systems.get_file_system("hdfs://namenode/x"),
            Err(FsError::Unsupported(_))
        ));
    }

    #[test]
    fn test_registered_file_system_takes_precedence() {
        let memory = MemoryFileSystem::default();
        memory.insert("mem://graph/edges.txt", "1 2\n");

        let mut systems = FileSystems::new();
        assert!(matches!(
            systems.get_file_system("mem://graph/edges.txt"),
            Err(FsError::Unsupported(_))
        ));

        systems.register(Arc::new(memory.clone()));
        let fs = systems.get_file_system("mem://graph/edges.txt").unwrap();
        assert_eq!(fs.file_size("mem://graph/edges.txt").unwrap(), 4);

        {
            let mut w = fs.create("mem://graph/out.bin").unwrap();
            w.write_all(&[1, 2, 3]).unwrap();
        }
        assert_eq!(memory.get("mem://graph/out.bin"), Some(vec![1, 2, 3]));

        // Plain paths still fall through to the local file system.
        let local = systems.get_file_system("/tmp/x").unwrap();
        assert!(!local.can_handle("mem://graph/edges.txt"));
    }

    #[test]
    fn test_roundtrip_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = format!("file://{}/nested/data.txt", dir.path().display());
        let fs = LocalFileSystem;

        {
            let mut w = fs.create(&path).unwrap();
            w.write_all(b"1 2\n").unwrap();
        }
        assert_eq!(fs.file_size(&path).unwrap(), 4);

        let mut text = String::new();
        fs.open(&path).unwrap().read_to_string(&mut text).unwrap();
        assert_eq!(text, "1 2\n");

        fs.delete(&path).unwrap();
        fs.delete(&path).unwrap();
        assert!(fs.file_size(&path).is_err());
    }
}
