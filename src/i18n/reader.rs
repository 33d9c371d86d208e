use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

/// Reads locale resource files for file-backed translators.
#[async_trait]
pub trait ResourceReader: Send + Sync {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Reads resources from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsReader;

#[async_trait]
impl ResourceReader for FsReader {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// Serves resources from a map of path to bytes, e.g. data embedded in a binary.
#[derive(Debug, Clone, Default)]
pub struct MemoryReader {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), contents.into());
        self
    }
}

#[async_trait]
impl ResourceReader for MemoryReader {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files.get(path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no resource at {}", path.display()),
            )
        })
    }
}
