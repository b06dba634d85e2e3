//! Cache keys and the records stored under them

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::persistence::{PersistenceError, PersistenceResult};

/// Kind of asset a key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AssetKind {
    Texture,
    Model,
    VertexArray,
    Effect,
}

/// Logical tables of the persistent store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheTable {
    Textures,
    TextureData,
    ModelInfo,
    Models,
    VertexArrays,
    Effects,
}

impl CacheTable {
    pub const ALL: [CacheTable; 6] = [
        CacheTable::Textures,
        CacheTable::TextureData,
        CacheTable::ModelInfo,
        CacheTable::Models,
        CacheTable::VertexArrays,
        CacheTable::Effects,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CacheTable::Textures => "textures",
            CacheTable::TextureData => "texture_data",
            CacheTable::ModelInfo => "model_info",
            CacheTable::Models => "models",
            CacheTable::VertexArrays => "vertex_arrays",
            CacheTable::Effects => "effects",
        }
    }
}

/// Primary key of the cache: `(kind, path, sub_index)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetKey {
    pub kind: AssetKind,
    pub path: String,
    pub sub_index: Option<u32>,
}

impl AssetKey {
    pub fn new(kind: AssetKind, path: impl Into<String>, sub_index: Option<u32>) -> Self {
        Self {
            kind,
            path: path.into(),
            sub_index,
        }
    }

    /// Metadata record of a texture path
    pub fn texture_info(path: impl Into<String>) -> Self {
        Self::new(AssetKind::Texture, path, None)
    }

    /// Pixel data of one texture variant
    pub fn texture_variant(path: impl Into<String>, variant: u32) -> Self {
        Self::new(AssetKind::Texture, path, Some(variant))
    }

    /// Face count record of a model, written after its faces
    pub fn model_info(model_name: impl Into<String>) -> Self {
        Self::new(AssetKind::Model, model_name, None)
    }

    /// Positional face chunk of a model
    pub fn model_face(model_name: impl Into<String>, face_index: u32) -> Self {
        Self::new(AssetKind::Model, model_name, Some(face_index))
    }

    pub fn vertex_array(name: impl Into<String>) -> Self {
        Self::new(AssetKind::VertexArray, name, None)
    }

    pub fn effect(name: impl Into<String>) -> Self {
        Self::new(AssetKind::Effect, name, None)
    }

    pub fn table(&self) -> CacheTable {
        match (self.kind, self.sub_index) {
            (AssetKind::Texture, None) => CacheTable::Textures,
            (AssetKind::Texture, Some(_)) => CacheTable::TextureData,
            (AssetKind::Model, None) => CacheTable::ModelInfo,
            (AssetKind::Model, Some(_)) => CacheTable::Models,
            (AssetKind::VertexArray, _) => CacheTable::VertexArrays,
            (AssetKind::Effect, _) => CacheTable::Effects,
        }
    }

    /// Name the record is stored under inside its table
    pub fn record_name(&self) -> String {
        match self.sub_index {
            Some(index) => format!("{}_{}", self.path, index),
            None => self.path.clone(),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table().name(), self.record_name())
    }
}

/// Texture metadata compared against the server catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureInfo {
    pub path: String,
    pub content_hash: String,
    pub variant_count: u16,
}

/// One RGBA variant of a texture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TexturePixels {
    pub width: u16,
    pub height: u16,
    pub raw_pixels: Vec<u8>,
}

impl TexturePixels {
    pub fn expected_len(width: u16, height: u16) -> usize {
        width as usize * height as usize * 4
    }

    pub fn validate(&self) -> PersistenceResult<()> {
        let expected = Self::expected_len(self.width, self.height);
        if self.raw_pixels.len() != expected {
            return Err(PersistenceError::CorruptedData(format!(
                "texture {}x{} has {} bytes, expected {}",
                self.width,
                self.height,
                self.raw_pixels.len(),
                expected
            )));
        }
        Ok(())
    }
}

/// Reinterpret raw vertex bytes as floats, borrowing when aligned
fn bytes_as_f32(raw: &[u8]) -> Cow<'_, [f32]> {
    let whole = raw.len() - raw.len() % 4;
    match bytemuck::try_cast_slice::<u8, f32>(&raw[..whole]) {
        Ok(floats) => Cow::Borrowed(floats),
        Err(_) => Cow::Owned(
            raw[..whole]
                .chunks_exact(4)
                .map(bytemuck::pod_read_unaligned::<f32>)
                .collect(),
        ),
    }
}

/// One positional face chunk of a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFaceRecord {
    pub texture_name: String,
    pub vertex_count: u32,
    pub raw_vertices: Vec<u8>,
}

impl ModelFaceRecord {
    pub fn vertices(&self) -> Cow<'_, [f32]> {
        bytes_as_f32(&self.raw_vertices)
    }
}

/// Number of faces the last download of a model carried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub face_count: u32,
}

/// Raw vertex buffer, e.g. the ground mesh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexArrayRecord {
    pub vertex_count: u32,
    pub raw: Vec<u8>,
}

impl VertexArrayRecord {
    pub fn vertices(&self) -> Cow<'_, [f32]> {
        bytes_as_f32(&self.raw)
    }
}

/// Interpolation mode of an effect key frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyFrameKind {
    Fixed,
    Interpolated,
}

impl KeyFrameKind {
    pub fn from_wire(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(KeyFrameKind::Fixed),
            1 => Some(KeyFrameKind::Interpolated),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyFrame {
    pub frame: i32,
    pub kind: KeyFrameKind,
    pub pos: [f32; 2],
    /// Quad corner offsets
    pub xy: [f32; 8],
    pub color: [f32; 4],
    pub angle: f32,
    pub src_blend: i32,
    pub dst_blend: i32,
    pub texture_index: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectLayer {
    pub key_frames: Vec<KeyFrame>,
}

/// Visual effect definition. Frame numbers within a layer are
/// non-decreasing but may repeat, and frame 0 may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    pub max_key: u32,
    pub fps: u32,
    pub layers: Vec<EffectLayer>,
    pub server_texture_indices: Vec<u32>,
}

impl EffectDefinition {
    /// Last key frame at or before `frame` in each layer, with the next one when present
    pub fn key_frames_at(&self, frame: i32) -> Vec<(usize, &KeyFrame, Option<&KeyFrame>)> {
        self.layers
            .iter()
            .enumerate()
            .filter_map(|(layer_index, layer)| {
                let position = layer
                    .key_frames
                    .iter()
                    .rposition(|key| key.frame <= frame)?;
                let current = &layer.key_frames[position];
                let next = layer.key_frames.get(position + 1);
                Some((layer_index, current, next))
            })
            .collect()
    }
}

/// Anything the cache stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssetRecord {
    TextureInfo(TextureInfo),
    TexturePixels(TexturePixels),
    ModelInfo(ModelInfo),
    ModelFace(ModelFaceRecord),
    VertexArray(VertexArrayRecord),
    Effect(EffectDefinition),
}

impl AssetRecord {
    /// Table this record belongs in
    pub fn table(&self) -> CacheTable {
        match self {
            AssetRecord::TextureInfo(_) => CacheTable::Textures,
            AssetRecord::TexturePixels(_) => CacheTable::TextureData,
            AssetRecord::ModelInfo(_) => CacheTable::ModelInfo,
            AssetRecord::ModelFace(_) => CacheTable::Models,
            AssetRecord::VertexArray(_) => CacheTable::VertexArrays,
            AssetRecord::Effect(_) => CacheTable::Effects,
        }
    }

    /// Reject a record stored under a key of another table
    pub fn check_key(&self, key: &AssetKey) -> PersistenceResult<()> {
        if self.table() != key.table() {
            return Err(PersistenceError::KeyMismatch {
                expected: key.table().name().to_string(),
                found: self.table().name().to_string(),
            });
        }
        if let AssetRecord::TexturePixels(pixels) = self {
            pixels.validate()?;
        }
        Ok(())
    }
}
