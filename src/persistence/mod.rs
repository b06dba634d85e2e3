//! Persistence system for the client-side asset cache

pub mod asset_cache;
pub mod error;
#[cfg(feature = "native")]
pub mod file_store;
pub mod memory_store;
pub mod record_codec;
pub mod records;

pub use asset_cache::{AssetCache, CatalogEntry};
#[cfg(feature = "native")]
pub use error::atomic_write;
pub use error::{corrupted_data, PersistenceErrorContext};
#[cfg(feature = "native")]
pub use file_store::FileAssetStore;
pub use memory_store::MemoryAssetStore;
pub use record_codec::RecordCodec;
pub use records::{
    AssetKey, AssetKind, AssetRecord, CacheTable, EffectDefinition, EffectLayer, KeyFrame,
    KeyFrameKind, ModelFaceRecord, ModelInfo, TextureInfo, TexturePixels, VertexArrayRecord,
};

/// Result type for persistence operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Errors that can occur during persistence operations
#[derive(Debug)]
pub enum PersistenceError {
    IoError(std::io::Error),
    SerializationError(String),
    DeserializationError(String),
    VersionMismatch { expected: u32, found: u32 },
    CorruptedData(String),
    KeyMismatch { expected: String, found: String },
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(e) => write!(f, "IO error: {}", e),
            PersistenceError::SerializationError(e) => write!(f, "Serialization error: {}", e),
            PersistenceError::DeserializationError(e) => write!(f, "Deserialization error: {}", e),
            PersistenceError::VersionMismatch { expected, found } => {
                write!(f, "Version mismatch: expected {}, found {}", expected, found)
            }
            PersistenceError::CorruptedData(e) => write!(f, "Corrupted data: {}", e),
            PersistenceError::KeyMismatch { expected, found } => {
                write!(f, "Key mismatch: expected {}, found {}", expected, found)
            }
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl PersistenceError {
    /// Errors that mean the stored bytes are unusable, not that the store is
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            PersistenceError::DeserializationError(_)
                | PersistenceError::VersionMismatch { .. }
                | PersistenceError::CorruptedData(_)
                | PersistenceError::KeyMismatch { .. }
        )
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(err: std::io::Error) -> Self {
        PersistenceError::IoError(err)
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(err: bincode::Error) -> Self {
        PersistenceError::SerializationError(err.to_string())
    }
}
