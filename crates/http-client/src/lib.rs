//! HTTP client for the chunked upload endpoints.
//!
//! Implements [`UploadApi`](bigup_uploader::UploadApi) on top of `reqwest`
//! so an [`Uploader`](bigup_uploader::Uploader) can talk to a remote server.

pub mod client;

pub use client::{HttpError, HttpUploadApi};
