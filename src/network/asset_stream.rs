//! Decoders for the asset records sent during the handshake

use crate::network::cursor::BinaryCursor;
use crate::network::error::{protocol_error, NetworkResult};
use crate::network::protocol::GROUND_BUFFER_TAG;
use crate::persistence::records::{
    EffectDefinition, EffectLayer, KeyFrame, KeyFrameKind, ModelFaceRecord, TextureInfo,
    TexturePixels, VertexArrayRecord,
};

/// A texture path with all of its variants
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDownload {
    pub info: TextureInfo,
    pub variants: Vec<TexturePixels>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EffectDownload {
    pub name: String,
    pub definition: EffectDefinition,
}

/// A model's faces, flattened across nodes in wire order
#[derive(Debug, Clone, PartialEq)]
pub struct ModelDownload {
    pub name: String,
    pub node_count: u16,
    pub faces: Vec<ModelFaceRecord>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroundDownload {
    VertexBuffer(VertexArrayRecord),
}

pub fn read_texture(cursor: &mut BinaryCursor<'_>) -> NetworkResult<TextureDownload> {
    let path = cursor.read_length_prefixed_string()?;
    let content_hash = cursor.read_length_prefixed_string()?;
    let variant_count = cursor.read_u16()?;
    let mut variants = Vec::with_capacity(variant_count as usize);
    for _ in 0..variant_count {
        let width = cursor.read_u16()?;
        let height = cursor.read_u16()?;
        let raw = cursor.read_bytes(TexturePixels::expected_len(width, height))?;
        variants.push(TexturePixels {
            width,
            height,
            raw_pixels: raw.to_vec(),
        });
    }
    Ok(TextureDownload {
        info: TextureInfo {
            path,
            content_hash,
            variant_count,
        },
        variants,
    })
}

fn read_key_frame(cursor: &mut BinaryCursor<'_>) -> NetworkResult<KeyFrame> {
    let frame = cursor.read_i32()?;
    let kind_tag = cursor.read_u8()?;
    let kind = KeyFrameKind::from_wire(kind_tag)
        .ok_or_else(|| protocol_error(format!("unknown key frame kind {}", kind_tag)))?;
    let pos = cursor.read_f32_array::<2>()?;
    let xy = cursor.read_f32_array::<8>()?;
    let color = cursor.read_color4_u8()?;
    let angle = cursor.read_f32()?;
    let src_blend = cursor.read_i32()?;
    let dst_blend = cursor.read_i32()?;
    let texture_index = cursor.read_u16()?;
    Ok(KeyFrame {
        frame,
        kind,
        pos,
        xy,
        color,
        angle,
        src_blend,
        dst_blend,
        texture_index,
    })
}

pub fn read_effect(cursor: &mut BinaryCursor<'_>) -> NetworkResult<EffectDownload> {
    let name = cursor.read_length_prefixed_string()?;
    let max_key = cursor.read_u32()?;
    let fps = cursor.read_u32()?;
    let layer_count = cursor.read_u16()?;
    let texture_count = cursor.read_u16()?;

    let server_texture_indices = (0..texture_count)
        .map(|_| cursor.read_u32())
        .collect::<NetworkResult<Vec<u32>>>()?;

    let mut layers = Vec::with_capacity(layer_count as usize);
    for _ in 0..layer_count {
        let frame_count = cursor.read_u16()?;
        let key_frames = (0..frame_count)
            .map(|_| read_key_frame(cursor))
            .collect::<NetworkResult<Vec<KeyFrame>>>()?;
        layers.push(EffectLayer { key_frames });
    }

    Ok(EffectDownload {
        name,
        definition: EffectDefinition {
            max_key,
            fps,
            layers,
            server_texture_indices,
        },
    })
}

pub fn read_ground(cursor: &mut BinaryCursor<'_>) -> NetworkResult<GroundDownload> {
    match cursor.read_u8()? {
        GROUND_BUFFER_TAG => {
            let vertex_count = cursor.read_u32()?;
            let byte_length = cursor.read_u32()? as usize;
            let raw = cursor.read_bytes(byte_length)?.to_vec();
            Ok(GroundDownload::VertexBuffer(VertexArrayRecord { vertex_count, raw }))
        }
        other => Err(protocol_error(format!("unknown ground record tag {}", other))),
    }
}

pub fn read_model(cursor: &mut BinaryCursor<'_>) -> NetworkResult<ModelDownload> {
    let name = cursor.read_length_prefixed_string()?;
    let node_count = cursor.read_u16()?;
    let mut faces = Vec::new();
    for _ in 0..node_count {
        let face_count = cursor.read_u16()?;
        for _ in 0..face_count {
            let texture_name = cursor.read_length_prefixed_string()?;
            let vertex_count = cursor.read_u32()?;
            let raw_length = cursor.read_u32()? as usize;
            let raw_vertices = cursor.read_bytes(raw_length)?.to_vec();
            faces.push(ModelFaceRecord {
                texture_name,
                vertex_count,
                raw_vertices,
            });
        }
    }
    Ok(ModelDownload {
        name,
        node_count,
        faces,
    })
}
