use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::TransferError;

/// Where the bytes of an upload live.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Content held in memory.
    Memory(Arc<[u8]>),
    /// Content read lazily from a file on disk.
    Disk(PathBuf),
}

/// A file submitted for upload.
#[derive(Debug, Clone)]
pub struct UploadFile {
    name: String,
    size: u64,
    source: FileSource,
}

impl UploadFile {
    /// Wraps in-memory content.
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let data = data.into();
        Self {
            name: name.into(),
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    /// Opens a file on disk. Content is read per chunk, not up front.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let meta = std::fs::metadata(path)?;
        if !meta.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidPath(path.display().to_string()))?;
        Ok(Self {
            name,
            size: meta.len(),
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn source(&self) -> &FileSource {
        &self.source
    }

    /// Text after the last `.` of the name, or empty when there is none.
    pub fn extension(&self) -> &str {
        match self.name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => ext,
            _ => "",
        }
    }

    /// Name of the merged file on the server: `{fingerprint}.{ext}`.
    pub fn merged_name(&self, fingerprint: &str) -> String {
        match self.extension() {
            "" => fingerprint.to_string(),
            ext => format!("{fingerprint}.{ext}"),
        }
    }

    /// Reads the bytes of `range`.
    pub async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
        if range.start > range.end || range.end > self.size {
            return Err(TransferError::InvalidRange {
                start: range.start,
                end: range.end,
                size: self.size,
            });
        }
        match &self.source {
            FileSource::Memory(data) => Ok(data[range.start as usize..range.end as usize].to_vec()),
            FileSource::Disk(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_file_range(&path, range))
                    .await
                    .map_err(|e| TransferError::Task(e.to_string()))?
            }
        }
    }
}

fn read_file_range(path: &Path, range: Range<u64>) -> Result<Vec<u8>, TransferError> {
    let mut file = std::fs::File::open(path)?;
    file.seek(SeekFrom::Start(range.start))?;
    let mut buf = vec![0u8; (range.end - range.start) as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn extension_and_merged_name() {
        let f = UploadFile::from_bytes("movie.final.mp4", b"x".to_vec());
        assert_eq!(f.extension(), "mp4");
        assert_eq!(f.merged_name("abc"), "abc.mp4");

        let f = UploadFile::from_bytes("README", b"x".to_vec());
        assert_eq!(f.extension(), "");
        assert_eq!(f.merged_name("abc"), "abc");

        let f = UploadFile::from_bytes(".bashrc", b"x".to_vec());
        assert_eq!(f.extension(), "");
    }

    #[tokio::test]
    async fn memory_range_read() {
        let f = UploadFile::from_bytes("a.bin", b"0123456789".to_vec());
        assert_eq!(f.size(), 10);
        assert_eq!(f.read_range(2..5).await.unwrap(), b"234");
        assert_eq!(f.read_range(10..10).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn out_of_bounds_range_rejected() {
        let f = UploadFile::from_bytes("a.bin", b"0123".to_vec());
        let err = f.read_range(2..9).await.unwrap_err();
        assert!(matches!(err, TransferError::InvalidRange { size: 4, .. }));
    }

    #[tokio::test]
    async fn disk_range_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"The quick brown fox")
            .unwrap();

        let f = UploadFile::from_path(&path).unwrap();
        assert_eq!(f.name(), "data.txt");
        assert_eq!(f.size(), 19);
        assert_eq!(f.read_range(4..9).await.unwrap(), b"quick");
        assert_eq!(f.read_range(16..19).await.unwrap(), b"fox");
    }

    #[test]
    fn from_path_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let err = UploadFile::from_path(dir.path()).unwrap_err();
        assert!(matches!(err, TransferError::InvalidPath(_)));
    }

    #[test]
    fn from_path_missing_file() {
        let err = UploadFile::from_path(Path::new("/nonexistent/bigup/file")).unwrap_err();
        assert!(matches!(err, TransferError::Io(_)));
    }
}
