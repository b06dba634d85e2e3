//! Asset cache contract
//!
//! Stores previously downloaded textures, model faces, vertex arrays and
//! effect definitions. Operations may suspend; callers await each one before
//! touching the next record, so a store never sees two writers for one key.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::persistence::records::{
    AssetKey, AssetRecord, EffectDefinition, ModelFaceRecord, ModelInfo, TextureInfo,
    TexturePixels, VertexArrayRecord,
};
use crate::persistence::{PersistenceError, PersistenceResult};

/// Server-declared catalog entry for one texture path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "id")]
    pub server_id: u32,
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "count")]
    pub variant_count: u16,
}

fn unexpected(key: &AssetKey, record: &AssetRecord) -> PersistenceError {
    PersistenceError::KeyMismatch {
        expected: key.to_string(),
        found: record.table().name().to_string(),
    }
}

/// Persistent key/value store of downloaded assets
#[allow(async_fn_in_trait)]
pub trait AssetCache {
    async fn get(&self, key: &AssetKey) -> PersistenceResult<Option<AssetRecord>>;

    async fn put(&self, key: &AssetKey, record: AssetRecord) -> PersistenceResult<()>;

    async fn texture_info(&self, path: &str) -> PersistenceResult<Option<TextureInfo>> {
        let key = AssetKey::texture_info(path);
        match self.get(&key).await? {
            Some(AssetRecord::TextureInfo(info)) => Ok(Some(info)),
            Some(other) => Err(unexpected(&key, &other)),
            None => Ok(None),
        }
    }

    async fn texture_variant(&self, path: &str, variant: u32) -> PersistenceResult<Option<TexturePixels>> {
        let key = AssetKey::texture_variant(path, variant);
        match self.get(&key).await? {
            Some(AssetRecord::TexturePixels(pixels)) => Ok(Some(pixels)),
            Some(other) => Err(unexpected(&key, &other)),
            None => Ok(None),
        }
    }

    async fn model_info(&self, model_name: &str) -> PersistenceResult<Option<ModelInfo>> {
        let key = AssetKey::model_info(model_name);
        match self.get(&key).await? {
            Some(AssetRecord::ModelInfo(info)) => Ok(Some(info)),
            Some(other) => Err(unexpected(&key, &other)),
            None => Ok(None),
        }
    }

    async fn model_face(&self, model_name: &str, face_index: u32) -> PersistenceResult<Option<ModelFaceRecord>> {
        let key = AssetKey::model_face(model_name, face_index);
        match self.get(&key).await? {
            Some(AssetRecord::ModelFace(face)) => Ok(Some(face)),
            Some(other) => Err(unexpected(&key, &other)),
            None => Ok(None),
        }
    }

    async fn vertex_array(&self, name: &str) -> PersistenceResult<Option<VertexArrayRecord>> {
        let key = AssetKey::vertex_array(name);
        match self.get(&key).await? {
            Some(AssetRecord::VertexArray(array)) => Ok(Some(array)),
            Some(other) => Err(unexpected(&key, &other)),
            None => Ok(None),
        }
    }

    async fn effect(&self, name: &str) -> PersistenceResult<Option<EffectDefinition>> {
        let key = AssetKey::effect(name);
        match self.get(&key).await? {
            Some(AssetRecord::Effect(effect)) => Ok(Some(effect)),
            Some(other) => Err(unexpected(&key, &other)),
            None => Ok(None),
        }
    }

    /// Paths whose cached metadata is absent or differs from the catalog in
    /// variant count or content hash. A matching entry is trusted as is.
    async fn collect_mismatched(
        &self,
        catalog: &BTreeMap<String, CatalogEntry>,
    ) -> PersistenceResult<BTreeSet<String>> {
        let mut mismatched = BTreeSet::new();
        for (path, entry) in catalog {
            let matches = match self.texture_info(path).await? {
                Some(info) => {
                    info.variant_count == entry.variant_count && info.content_hash == entry.content_hash
                }
                None => false,
            };
            if !matches {
                mismatched.insert(path.clone());
            }
        }
        log::debug!(
            "[AssetCache::collect_mismatched] {} of {} catalog textures need a download",
            mismatched.len(),
            catalog.len()
        );
        Ok(mismatched)
    }
}

impl<T: AssetCache + ?Sized> AssetCache for &T {
    async fn get(&self, key: &AssetKey) -> PersistenceResult<Option<AssetRecord>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &AssetKey, record: AssetRecord) -> PersistenceResult<()> {
        (**self).put(key, record).await
    }
}

impl<T: AssetCache + ?Sized> AssetCache for std::sync::Arc<T> {
    async fn get(&self, key: &AssetKey) -> PersistenceResult<Option<AssetRecord>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &AssetKey, record: AssetRecord) -> PersistenceResult<()> {
        (**self).put(key, record).await
    }
}
