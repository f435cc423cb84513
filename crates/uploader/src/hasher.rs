//! Hashing collaborator.

use std::future::Future;
use std::pin::Pin;

use bigup_transfer::{TransferError, UploadFile, fingerprint_file};

/// Boxed future returned by [`Fingerprinter::fingerprint`].
pub type FingerprintFuture<'a> =
    Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + 'a>>;

/// Computes the content fingerprint that addresses a file on the server.
///
/// Byte-identical files must yield identical fingerprints.
pub trait Fingerprinter: Send + Sync {
    fn fingerprint<'a>(&'a self, file: &'a UploadFile) -> FingerprintFuture<'a>;
}

/// Hex SHA-256 of the whole content, computed off the async runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Fingerprinter;

impl Fingerprinter for Sha256Fingerprinter {
    fn fingerprint<'a>(&'a self, file: &'a UploadFile) -> FingerprintFuture<'a> {
        Box::pin(fingerprint_file(file))
    }
}
