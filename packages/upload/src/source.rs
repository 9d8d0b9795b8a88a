//! Local byte providers for uploads.
//!
//! A source knows its length up front and hands out byte ranges on
//! demand, so a part is only read when a worker claims it.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Random-access bytes with a known length.
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the source has no bytes.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Human-readable name (file path or label) for logs.
    fn name(&self) -> &str;

    /// Reads exactly `len` bytes starting at `offset`.
    async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>>;
}

/// A file on the local filesystem.
///
/// The length is captured when the source is opened. Each range read
/// opens the file afresh, so concurrent reads never share a cursor.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    display: String,
    len: u64,
}

impl FileSource {
    /// Opens `path` and records its current length.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be inspected or is not a
    /// regular file.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        Ok(Self {
            display: path.display().to_string(),
            len: meta.len(),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ByteSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn name(&self) -> &str {
        &self.display
    }

    async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let mut file = tokio::fs::File::open(&self.path).await?;
        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await?;
        Ok(buf)
    }
}

/// Bytes already in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Vec<u8>,
}

impl MemorySource {
    #[must_use]
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn read_range(&self, offset: u64, len: usize) -> std::io::Result<Vec<u8>> {
        let start = usize::try_from(offset).map_err(std::io::Error::other)?;
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("range {start}+{len} is past the end of {}", self.name),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_file_ranges() {
        let path = std::env::temp_dir().join(format!("bucket_browser_src_{}.bin", std::process::id()));
        std::fs::write(&path, b"0123456789").unwrap();

        let source = FileSource::open(&path).await.unwrap();
        assert_eq!(source.len(), 10);
        assert_eq!(source.read_range(3, 4).await.unwrap(), b"3456");
        assert_eq!(source.read_range(8, 2).await.unwrap(), b"89");
        assert!(source.read_range(8, 5).await.is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn rejects_directories() {
        assert!(FileSource::open(std::env::temp_dir()).await.is_err());
    }

    #[tokio::test]
    async fn reads_memory_ranges() {
        let source = MemorySource::new("mem", b"hello world".to_vec());
        assert_eq!(source.read_range(6, 5).await.unwrap(), b"world");
        assert!(source.read_range(10, 5).await.is_err());
        assert!(MemorySource::new("empty", Vec::new()).is_empty());
    }
}
