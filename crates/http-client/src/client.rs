//! Upload endpoint client.
//!
//! Routes, relative to the base URL:
//!
//! | Call | Request |
//! |---|---|
//! | upload chunk | `POST /upload/section/{dir}/{chunk}` (multipart field `file`) |
//! | merge | `POST /upload/merge/{dir}/{name}` |
//! | verify | `GET /upload/verify/{fingerprint}` |
//! | list chunks | `GET /upload/list/{dir}` |
//!
//! Every response body is an [`ApiResponse`] envelope.

use std::time::Duration;

use bigup_protocol::ApiResponse;
use bigup_uploader::{ApiError, ApiFuture, UploadApi};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Characters escaped in a path segment (everything but unreserved ones).
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the upload endpoint client.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid base URL: {0}")]
    InvalidUrl(String),
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Http(e) => ApiError::Transport(e.to_string()),
            HttpError::Api { status, body } => ApiError::Status { status, body },
            HttpError::Json(e) => ApiError::Decode(e.to_string()),
            HttpError::InvalidUrl(url) => ApiError::Transport(format!("invalid base URL: {url}")),
        }
    }
}

/// [`UploadApi`] backed by an HTTP server.
pub struct HttpUploadApi {
    http: reqwest::Client,
    base_url: String,
}

impl HttpUploadApi {
    /// Creates a client for the server at `base_url` (`http` or `https`).
    pub fn new(base_url: &str) -> Result<Self, HttpError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Like [`new`](Self::new) with a per-request timeout.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, HttpError> {
        let parsed =
            reqwest::Url::parse(base_url).map_err(|e| HttpError::InvalidUrl(format!("{base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(HttpError::InvalidUrl(base_url.to_string()));
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds `{base}/upload/{route}/{segments...}` with each segment escaped.
    fn url(&self, route: &str, segments: &[&str]) -> String {
        let mut url = format!("{}/upload/{route}", self.base_url);
        for segment in segments {
            url.push('/');
            url.extend(utf8_percent_encode(segment, SEGMENT));
        }
        url
    }

    /// Sends a request and decodes the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<ApiResponse<T>, HttpError> {
        let resp = request.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HttpError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Uploads one chunk as multipart field `file`.
    pub async fn upload_chunk(
        &self,
        dir: &str,
        chunk_name: &str,
        data: Vec<u8>,
    ) -> Result<ApiResponse, HttpError> {
        let url = self.url("section", &[dir, chunk_name]);
        debug!(url = %url, bytes = data.len(), "uploading chunk");
        let part = Part::bytes(data).file_name(chunk_name.to_string());
        let form = Form::new().part("file", part);
        self.send(self.http.post(&url).multipart(form)).await
    }

    /// Asks the server to merge the chunks of `dir` into `merged_name`.
    pub async fn merge_chunks(&self, dir: &str, merged_name: &str) -> Result<ApiResponse, HttpError> {
        let url = self.url("merge", &[dir, merged_name]);
        debug!(url = %url, "requesting merge");
        self.send(self.http.post(&url)).await
    }

    /// Succeeds when the server already stores content with `fingerprint`.
    pub async fn verify_exists(&self, fingerprint: &str) -> Result<ApiResponse, HttpError> {
        let url = self.url("verify", &[fingerprint]);
        self.send(self.http.get(&url)).await
    }

    /// Lists the chunk names stored under `dir`.
    pub async fn list_uploaded_chunks(
        &self,
        dir: &str,
    ) -> Result<ApiResponse<Vec<String>>, HttpError> {
        let url = self.url("list", &[dir]);
        self.send(self.http.get(&url)).await
    }
}

impl UploadApi for HttpUploadApi {
    fn upload_chunk<'a>(
        &'a self,
        dir: &'a str,
        chunk_name: &'a str,
        data: Vec<u8>,
    ) -> ApiFuture<'a, ()> {
        Box::pin(async move { Ok(HttpUploadApi::upload_chunk(self, dir, chunk_name, data).await?) })
    }

    fn merge_chunks<'a>(&'a self, dir: &'a str, merged_name: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move { Ok(HttpUploadApi::merge_chunks(self, dir, merged_name).await?) })
    }

    fn verify_exists<'a>(&'a self, fingerprint: &'a str) -> ApiFuture<'a, ()> {
        Box::pin(async move { Ok(HttpUploadApi::verify_exists(self, fingerprint).await?) })
    }

    fn list_uploaded_chunks<'a>(&'a self, dir: &'a str) -> ApiFuture<'a, Vec<String>> {
        Box::pin(async move { Ok(HttpUploadApi::list_uploaded_chunks(self, dir).await?) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Returns `true` once `buf` holds the request head and its whole body.
    fn request_complete(buf: &[u8]) -> bool {
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        buf.len() >= end + 4 + len
    }

    /// Starts a mock HTTP server answering one request with `status` and
    /// `body`. The raw request is sent back through the receiver.
    async fn mock_server(status: u16, body: &str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let body = body.to_string();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut request = Vec::new();
                let mut buf = vec![0u8; 8192];
                while !request_complete(&request) {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&request).into_owned());

                let resp = format!(
                    "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (url, rx)
    }

    #[tokio::test]
    async fn upload_chunk_posts_multipart() {
        let (url, request) = mock_server(200, r#"{"success":true,"code":200}"#).await;
        let api = HttpUploadApi::new(&url).unwrap();

        let resp = api.upload_chunk("abc", "abc-0", b"chunk-bytes".to_vec()).await.unwrap();
        assert!(resp.success);

        let request = request.await.unwrap();
        assert!(request.starts_with("POST /upload/section/abc/abc-0 HTTP/1.1"));
        assert!(request.contains(r#"name="file""#));
        assert!(request.contains("chunk-bytes"));
    }

    #[tokio::test]
    async fn merge_uses_merged_name() {
        let (url, request) = mock_server(200, r#"{"success":true}"#).await;
        let api = HttpUploadApi::new(&format!("{url}/")).unwrap();

        assert!(api.merge_chunks("abc", "abc.mp4").await.unwrap().success);
        let request = request.await.unwrap();
        assert!(request.starts_with("POST /upload/merge/abc/abc.mp4 HTTP/1.1"));
    }

    #[tokio::test]
    async fn verify_reports_absent_content() {
        let (url, request) =
            mock_server(200, r#"{"success":false,"code":404,"message":"not found"}"#).await;
        let api = HttpUploadApi::new(&url).unwrap();

        let resp = api.verify_exists("abc").await.unwrap();
        assert!(!resp.success);
        assert_eq!(resp.code, 404);
        assert!(request.await.unwrap().starts_with("GET /upload/verify/abc HTTP/1.1"));
    }

    #[tokio::test]
    async fn list_returns_chunk_names() {
        let (url, _request) =
            mock_server(200, r#"{"success":true,"data":["abc-0","abc-1"]}"#).await;
        let api = HttpUploadApi::new(&url).unwrap();

        let resp = UploadApi::list_uploaded_chunks(&api, "abc").await.unwrap();
        assert_eq!(resp.data.unwrap(), ["abc-0", "abc-1"]);
    }

    #[tokio::test]
    async fn server_error_maps_to_status() {
        let (url, _request) = mock_server(503, "maintenance").await;
        let api = HttpUploadApi::new(&url).unwrap();

        let err = UploadApi::verify_exists(&api, "abc").await.unwrap_err();
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "maintenance");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let (url, _request) = mock_server(200, "<html>").await;
        let api = HttpUploadApi::new(&url).unwrap();

        let err = api.merge_chunks("abc", "abc.bin").await.unwrap_err();
        assert!(matches!(err, HttpError::Json(_)));
        assert!(matches!(ApiError::from(err), ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let api = HttpUploadApi::new(&format!("http://127.0.0.1:{port}")).unwrap();
        let err = UploadApi::verify_exists(&api, "abc").await.unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
    }

    #[test]
    fn segments_are_escaped() {
        let api = HttpUploadApi::new("https://files.example.com/api/").unwrap();
        assert_eq!(
            api.url("merge", &["abc", "my movie?.mp4"]),
            "https://files.example.com/api/upload/merge/abc/my%20movie%3F.mp4"
        );
        assert_eq!(api.base_url(), "https://files.example.com/api");
    }

    #[test]
    fn rejects_bad_base_urls() {
        assert!(matches!(
            HttpUploadApi::new("not a url"),
            Err(HttpError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpUploadApi::new("ftp://example.com"),
            Err(HttpError::InvalidUrl(_))
        ));
    }
}
