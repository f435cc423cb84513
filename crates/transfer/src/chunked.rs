use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::types::{FileSource, UploadFile};
use crate::{TransferError, validate_segment};

/// Suffix of a chunk that is still being written.
const PARTIAL_SUFFIX: &str = ".part";

/// Directory under the root holding unmerged chunks, kept apart from
/// merged files so a merged name can never collide with a chunk directory.
const CHUNKS_DIR: &str = ".chunks";

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
pub fn checksum_file(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Computes the content fingerprint of an upload off the async runtime.
pub async fn fingerprint_file(file: &UploadFile) -> Result<String, TransferError> {
    let source = file.source().clone();
    tokio::task::spawn_blocking(move || match source {
        FileSource::Memory(data) => Ok(checksum_bytes(&data)),
        FileSource::Disk(path) => checksum_file(&path),
    })
    .await
    .map_err(|e| TransferError::Task(e.to_string()))?
}

// ---------------------------------------------------------------------------
// ChunkStore
// ---------------------------------------------------------------------------

/// Server-side chunk storage rooted at a directory.
///
/// Chunks of one file live in `<root>/.chunks/<dir>/<chunk name>` until
/// they are merged into `<root>/<merged name>`.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Returns the storage root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the unmerged chunks of `dir`.
    pub fn chunk_dir(&self, dir: &str) -> PathBuf {
        self.root.join(CHUNKS_DIR).join(dir)
    }

    /// Writes one chunk.
    ///
    /// The chunk is written under a temporary name and renamed into place,
    /// so a listing never reports a half-written chunk.
    pub fn write_chunk(&self, dir: &str, name: &str, data: &[u8]) -> Result<(), TransferError> {
        validate_segment(dir)?;
        validate_segment(name)?;

        let chunk_dir = self.chunk_dir(dir);
        std::fs::create_dir_all(&chunk_dir)?;

        let tmp = chunk_dir.join(format!("{name}{PARTIAL_SUFFIX}"));
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(data)?;
        file.sync_all()?;
        std::fs::rename(&tmp, chunk_dir.join(name))?;
        Ok(())
    }

    /// Lists stored chunk names of `dir`, ordered by chunk index.
    ///
    /// A directory that does not exist has no chunks.
    pub fn list_chunks(&self, dir: &str) -> Result<Vec<String>, TransferError> {
        validate_segment(dir)?;
        let chunk_dir = self.chunk_dir(dir);
        if !chunk_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut indexed = Vec::new();
        for entry in std::fs::read_dir(&chunk_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            if let Some(index) = chunk_index(&name) {
                indexed.push((index, name));
            }
        }
        indexed.sort_by_key(|(index, _)| *index);
        Ok(indexed.into_iter().map(|(_, name)| name).collect())
    }

    /// Concatenates the chunks of `dir` in index order into `merged_name`
    /// and removes the chunk directory.
    ///
    /// Fails without touching anything if a chunk index is missing.
    pub fn merge(&self, dir: &str, merged_name: &str) -> Result<PathBuf, TransferError> {
        validate_segment(merged_name)?;
        let chunks = self.list_chunks(dir)?;
        for (expected, name) in chunks.iter().enumerate() {
            if chunk_index(name) != Some(expected) {
                return Err(TransferError::MissingChunk {
                    dir: dir.to_string(),
                    index: expected,
                });
            }
        }
        if chunks.is_empty() {
            return Err(TransferError::MissingChunk {
                dir: dir.to_string(),
                index: 0,
            });
        }

        let chunk_dir = self.chunk_dir(dir);
        let target = self.root.join(merged_name);
        let tmp = self.root.join(format!("{merged_name}{PARTIAL_SUFFIX}"));
        {
            let mut out = std::fs::File::create(&tmp)?;
            for name in &chunks {
                let mut chunk = std::fs::File::open(chunk_dir.join(name))?;
                std::io::copy(&mut chunk, &mut out)?;
            }
            out.sync_all()?;
        }
        std::fs::rename(&tmp, &target)?;
        std::fs::remove_dir_all(&chunk_dir)?;
        Ok(target)
    }

    /// Returns `true` if a merged file whose stem is `fingerprint` exists.
    pub fn exists(&self, fingerprint: &str) -> Result<bool, TransferError> {
        validate_segment(fingerprint)?;
        if !self.root.is_dir() {
            return Ok(false);
        }
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(PARTIAL_SUFFIX) {
                continue;
            }
            let stem = name.split_once('.').map_or(name.as_str(), |(stem, _)| stem);
            if stem == fingerprint {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Parses the index out of a `{fingerprint}-{index}` chunk name.
fn chunk_index(name: &str) -> Option<usize> {
    name.rsplit_once('-')?.1.parse().ok()
}
