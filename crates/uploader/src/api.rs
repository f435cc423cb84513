//! Network collaborator used by the orchestrator.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use bigup_protocol::ApiResponse;
use bigup_transfer::{ChunkStore, TransferError};

use crate::error::ApiError;

/// Boxed future returned by [`UploadApi`] calls.
pub type ApiFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<ApiResponse<T>, ApiError>> + Send + 'a>>;

/// Endpoints consumed by the upload orchestrator.
///
/// An `Err` is handled exactly like a response with `success == false`.
pub trait UploadApi: Send + Sync {
    /// Stores one chunk under `dir` (the file fingerprint).
    fn upload_chunk<'a>(&'a self, dir: &'a str, chunk_name: &'a str, data: Vec<u8>)
    -> ApiFuture<'a, ()>;

    /// Concatenates the chunks of `dir` into `merged_name`.
    fn merge_chunks<'a>(&'a self, dir: &'a str, merged_name: &'a str) -> ApiFuture<'a, ()>;

    /// Succeeds when content with this fingerprint is already fully stored.
    fn verify_exists<'a>(&'a self, fingerprint: &'a str) -> ApiFuture<'a, ()>;

    /// Lists chunk names already stored under `dir`.
    fn list_uploaded_chunks<'a>(&'a self, dir: &'a str) -> ApiFuture<'a, Vec<String>>;
}

/// [`UploadApi`] backed by a local directory.
///
/// Serves the same contract as the HTTP endpoints without a server, which
/// makes it suitable for local targets and for tests.
#[derive(Debug, Clone)]
pub struct LocalDirApi {
    store: ChunkStore,
}

impl LocalDirApi {
    pub fn new(root: &Path) -> Self {
        Self {
            store: ChunkStore::new(root),
        }
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(ChunkStore) -> Result<T, TransferError> + Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| ApiError::Storage(TransferError::Task(e.to_string())))?
            .map_err(ApiError::from)
    }
}

impl UploadApi for LocalDirApi {
    fn upload_chunk<'a>(
        &'a self,
        dir: &'a str,
        chunk_name: &'a str,
        data: Vec<u8>,
    ) -> ApiFuture<'a, ()> {
        let dir = dir.to_string();
        let name = chunk_name.to_string();
        Box::pin(async move {
            self.blocking(move |store| store.write_chunk(&dir, &name, &data))
                .await?;
            Ok(ApiResponse::success())
        })
    }

    fn merge_chunks<'a>(&'a self, dir: &'a str, merged_name: &'a str) -> ApiFuture<'a, ()> {
        let dir = dir.to_string();
        let merged = merged_name.to_string();
        Box::pin(async move {
            match self.blocking(move |store| store.merge(&dir, &merged)).await {
                Ok(_) => Ok(ApiResponse::success()),
                Err(ApiError::Storage(e @ TransferError::MissingChunk { .. })) => {
                    Ok(ApiResponse::failure(409, e.to_string()))
                }
                Err(e) => Err(e),
            }
        })
    }

    fn verify_exists<'a>(&'a self, fingerprint: &'a str) -> ApiFuture<'a, ()> {
        let fingerprint = fingerprint.to_string();
        Box::pin(async move {
            let exists = self.blocking(move |store| store.exists(&fingerprint)).await?;
            Ok(if exists {
                ApiResponse::success()
            } else {
                ApiResponse::failure(404, "not found")
            })
        })
    }

    fn list_uploaded_chunks<'a>(&'a self, dir: &'a str) -> ApiFuture<'a, Vec<String>> {
        let dir = dir.to_string();
        Box::pin(async move {
            let chunks = self.blocking(move |store| store.list_chunks(&dir)).await?;
            Ok(ApiResponse::ok(chunks))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn upload_list_merge_verify() {
        let dir = TempDir::new().unwrap();
        let api = LocalDirApi::new(dir.path());

        assert!(!api.verify_exists("fp").await.unwrap().success);
        assert!(api.upload_chunk("fp", "fp-0", b"ab".to_vec()).await.unwrap().success);
        assert!(api.upload_chunk("fp", "fp-1", b"cd".to_vec()).await.unwrap().success);

        let listed = api.list_uploaded_chunks("fp").await.unwrap();
        assert_eq!(listed.data.unwrap(), ["fp-0", "fp-1"]);

        assert!(api.merge_chunks("fp", "fp.bin").await.unwrap().success);
        assert!(api.verify_exists("fp").await.unwrap().success);
        assert_eq!(std::fs::read(dir.path().join("fp.bin")).unwrap(), b"abcd");
    }

    #[tokio::test]
    async fn merge_with_missing_chunk_is_unsuccessful() {
        let dir = TempDir::new().unwrap();
        let api = LocalDirApi::new(dir.path());
        api.upload_chunk("fp", "fp-1", b"x".to_vec()).await.unwrap();

        let resp = api.merge_chunks("fp", "fp.bin").await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.code, 409);
    }

    #[tokio::test]
    async fn traversal_is_an_error() {
        let dir = TempDir::new().unwrap();
        let api = LocalDirApi::new(dir.path());
        let err = api
            .upload_chunk("..", "x-0", b"x".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Storage(TransferError::InvalidPath(_))));
    }
}
