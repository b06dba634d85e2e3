//! Persistence-specific error handling
//!
//! Helper functions and traits shared by the cache stores.

use std::path::Path;

use crate::persistence::{PersistenceError, PersistenceResult};

/// Helper trait for persistence-specific error contexts
pub trait PersistenceErrorContext<T> {
    fn persistence_context(self, context: &str) -> PersistenceResult<T>;
}

impl<T, E> PersistenceErrorContext<T> for Result<T, E>
where
    E: std::error::Error + 'static,
{
    fn persistence_context(self, context: &str) -> PersistenceResult<T> {
        self.map_err(|e| {
            PersistenceError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{}: {}", context, e),
            ))
        })
    }
}

/// Create a corrupted data error
pub fn corrupted_data(reason: impl Into<String>) -> PersistenceError {
    PersistenceError::CorruptedData(reason.into())
}

/// Create a version mismatch error
pub fn version_mismatch(expected: u32, found: u32) -> PersistenceError {
    PersistenceError::VersionMismatch { expected, found }
}

/// Path of the scratch file `atomic_write` stages into
pub fn temp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `data` next to `path` and rename it into place, so readers see
/// either the old file or the complete new one.
#[cfg(feature = "native")]
pub async fn atomic_write(path: &Path, data: &[u8]) -> PersistenceResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .persistence_context("create cache directory")?;
    }
    let tmp = temp_path_for(path);
    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(PersistenceError::IoError(e));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_path_stays_in_directory() {
        let tmp = temp_path_for(Path::new("/cache/textures/abc"));
        assert_eq!(tmp, Path::new("/cache/textures/abc.tmp"));
    }

    #[test]
    fn test_context_wraps_as_io() {
        let failed: Result<(), std::fmt::Error> = Err(std::fmt::Error);
        match failed.persistence_context("encode") {
            Err(PersistenceError::IoError(e)) => assert!(e.to_string().starts_with("encode")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_corruption_classification() {
        assert!(corrupted_data("bad").is_corruption());
        assert!(version_mismatch(1, 2).is_corruption());
        let io = PersistenceError::IoError(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(!io.is_corruption());
    }
}
