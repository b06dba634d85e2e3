//! Encoder for the server side of the stream
//!
//! Produces the exact byte layouts the handshake and frame decoders read.
//! Used to build capture fixtures and to drive the client without a server.

use glam::{Mat3, Mat4};

use crate::network::protocol::{GROUND_BUFFER_TAG, SECTION_END_MARKER_BYTES};
use crate::persistence::records::{EffectDefinition, KeyFrameKind};

#[derive(Debug, Default, Clone)]
pub struct ServerStreamWriter {
    bytes: Vec<u8>,
}

impl ServerStreamWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn u8(&mut self, v: u8) -> &mut Self {
        self.bytes.push(v);
        self
    }

    pub fn u16(&mut self, v: u16) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn i16(&mut self, v: i16) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn u32(&mut self, v: u32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn i32(&mut self, v: i32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    pub fn f32(&mut self, v: f32) -> &mut Self {
        self.raw(&v.to_le_bytes())
    }

    /// Color channels in `[0, 1]` as four bytes
    pub fn color(&mut self, color: [f32; 4]) -> &mut Self {
        for channel in color {
            self.u8((channel.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
        self
    }

    /// u16 length and one byte per char. Chars above U+00FF become `?`.
    pub fn string(&mut self, s: &str) -> &mut Self {
        let bytes: Vec<u8> = s
            .chars()
            .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
            .collect();
        self.u16(bytes.len() as u16);
        self.raw(&bytes)
    }

    pub fn section_end(&mut self) -> &mut Self {
        self.raw(&SECTION_END_MARKER_BYTES)
    }

    /// Texture record; each variant is `(width, height, rgba)`
    pub fn texture(&mut self, path: &str, content_hash: &str, variants: &[(u16, u16, Vec<u8>)]) -> &mut Self {
        self.string(path).string(content_hash).u16(variants.len() as u16);
        for (width, height, raw) in variants {
            self.u16(*width).u16(*height).raw(raw);
        }
        self
    }

    pub fn effect(&mut self, name: &str, effect: &EffectDefinition) -> &mut Self {
        self.string(name)
            .u32(effect.max_key)
            .u32(effect.fps)
            .u16(effect.layers.len() as u16)
            .u16(effect.server_texture_indices.len() as u16);
        for &id in &effect.server_texture_indices {
            self.u32(id);
        }
        for layer in &effect.layers {
            self.u16(layer.key_frames.len() as u16);
            for key in &layer.key_frames {
                let kind = match key.kind {
                    KeyFrameKind::Fixed => 0,
                    KeyFrameKind::Interpolated => 1,
                };
                self.i32(key.frame).u8(kind).f32(key.pos[0]).f32(key.pos[1]);
                for v in key.xy {
                    self.f32(v);
                }
                self.color(key.color)
                    .f32(key.angle)
                    .i32(key.src_blend)
                    .i32(key.dst_blend)
                    .u16(key.texture_index);
            }
        }
        self
    }

    pub fn ground_vertex_buffer(&mut self, vertex_count: u32, raw: &[u8]) -> &mut Self {
        self.u8(GROUND_BUFFER_TAG)
            .u32(vertex_count)
            .u32(raw.len() as u32)
            .raw(raw)
    }

    /// Model record; nodes hold `(texture_name, vertex_count, raw)` faces
    pub fn model(&mut self, name: &str, nodes: &[Vec<(&str, u32, Vec<u8>)>]) -> &mut Self {
        self.string(name).u16(nodes.len() as u16);
        for faces in nodes {
            self.u16(faces.len() as u16);
            for (texture_name, vertex_count, raw) in faces {
                self.string(texture_name)
                    .u32(*vertex_count)
                    .u32(raw.len() as u32)
                    .raw(raw);
            }
        }
        self
    }

    pub fn model_instance(&mut self, model_index: u32, transform: &Mat4) -> &mut Self {
        self.u32(model_index);
        for v in transform.to_cols_array() {
            self.f32(v);
        }
        self
    }

    /// View and normal matrices that open a frame
    pub fn frame_header(&mut self, view: &Mat4, normal: &Mat3) -> &mut Self {
        for v in view.to_cols_array() {
            self.f32(v);
        }
        for v in normal.to_cols_array() {
            self.f32(v);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_layout() {
        let mut writer = ServerStreamWriter::new();
        writer.string("ab\u{e9}");
        assert_eq!(writer.as_bytes(), &[3, 0, b'a', b'b', 0xE9]);
    }

    #[test]
    fn test_section_end_bytes() {
        let mut writer = ServerStreamWriter::new();
        writer.section_end();
        assert_eq!(writer.into_bytes(), vec![0xB1, 0x6B, 0x00, 0xB5]);
    }

    #[test]
    fn test_frame_header_size() {
        let mut writer = ServerStreamWriter::new();
        writer.frame_header(&Mat4::IDENTITY, &Mat3::IDENTITY);
        assert_eq!(writer.len(), (16 + 9) * 4);
    }
}
