use std::path::{Component, Path};

use crate::TransferError;

/// Validates that `name` is a single plain path segment.
///
/// Chunk directories, chunk names and merged file names are all joined
/// onto a storage root, so each must stay directly inside it.
///
/// Rejects:
/// - Empty names
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - `.` and `..`
/// - Names containing a separator
pub fn validate_segment(name: &str) -> Result<(), TransferError> {
    if name.is_empty() {
        return Err(TransferError::InvalidPath("empty name".into()));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidPath(format!(
            "separator not allowed: {name}"
        )));
    }

    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        (Some(Component::ParentDir), _) => Err(TransferError::InvalidPath(format!(
            "parent directory traversal not allowed: {name}"
        ))),
        (Some(Component::Prefix(_) | Component::RootDir), _) => Err(
            TransferError::InvalidPath(format!("absolute path not allowed: {name}")),
        ),
        _ => Err(TransferError::InvalidPath(format!(
            "not a plain file name: {name}"
        ))),
    }
}
