//! Streaming frame decoder
//!
//! A frame is the view matrix, the normal matrix, then count-prefixed
//! sections in [`FrameSection::ORDER`]. The order repeats while bytes remain;
//! running out of bytes between sections ends the frame.

use glam::{Vec2, Vec3};

use crate::network::cursor::BinaryCursor;
use crate::network::error::{truncated, NetworkResult};
use crate::network::protocol::{ONE_SPRITE_PIXEL_SIZE_IN_3D, TEXTURE_SIZE_FIXED_TAG};
use crate::network::render_command::{
    Circle3D, Effect3D, HorizontalTexture3D, Model3D, Number3D, PartialCircle2D, Rectangle2D,
    Rectangle3D, RenderCommandBatch, Sprite3D, Texture2D, TextureSize, Trimesh3D, TrimeshShape,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSection {
    PartialCircle2D,
    Texture2D,
    Rectangle2D,
    Rectangle3D,
    Circle3D,
    Sprite3D,
    Number3D,
    Effect3D,
    Model3D,
    HorizontalTexture3D,
    Trimesh3D,
}

impl FrameSection {
    pub const ORDER: [FrameSection; 11] = [
        FrameSection::PartialCircle2D,
        FrameSection::Texture2D,
        FrameSection::Rectangle2D,
        FrameSection::Rectangle3D,
        FrameSection::Circle3D,
        FrameSection::Sprite3D,
        FrameSection::Number3D,
        FrameSection::Effect3D,
        FrameSection::Model3D,
        FrameSection::HorizontalTexture3D,
        FrameSection::Trimesh3D,
    ];

    /// Wire size of one record
    pub fn record_size(self) -> usize {
        match self {
            FrameSection::PartialCircle2D => 12,
            FrameSection::Texture2D => 24,
            FrameSection::Rectangle2D => 16,
            FrameSection::Rectangle3D => 28,
            FrameSection::Circle3D => 20,
            FrameSection::Sprite3D => 32,
            FrameSection::Number3D => 24,
            FrameSection::Effect3D => 12,
            FrameSection::Model3D => 4,
            FrameSection::HorizontalTexture3D => 28,
            FrameSection::Trimesh3D => 12,
        }
    }
}

fn read_vec3(cursor: &mut BinaryCursor<'_>) -> NetworkResult<Vec3> {
    Ok(Vec3::from_array(cursor.read_f32_array::<3>()?))
}

/// Fail before looping if the declared records cannot fit
fn check_section_fits(cursor: &BinaryCursor<'_>, count: usize, record_size: usize) -> NetworkResult<()> {
    let needed = count.saturating_mul(record_size);
    if needed > cursor.remaining() {
        return Err(truncated(cursor.offset(), needed, cursor.remaining()));
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    batch: RenderCommandBatch,
    frames_decoded: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Batch of the last successfully decoded frame
    pub fn batch(&self) -> &RenderCommandBatch {
        &self.batch
    }

    pub fn decode(&mut self, buffer: &[u8]) -> NetworkResult<&RenderCommandBatch> {
        let mut cursor = BinaryCursor::new(buffer);
        self.decode_from(&mut cursor)
    }

    /// Decode one frame, leaving the cursor after the last section read.
    /// On error the batch is left empty.
    pub fn decode_from(&mut self, cursor: &mut BinaryCursor<'_>) -> NetworkResult<&RenderCommandBatch> {
        self.batch.clear();
        if let Err(e) = Self::decode_into(&mut self.batch, cursor) {
            self.batch.clear();
            return Err(e);
        }
        self.frames_decoded += 1;
        log::trace!(
            "[FrameDecoder::decode_from] Frame {}: {}",
            self.frames_decoded,
            self.batch.summary()
        );
        Ok(&self.batch)
    }

    fn decode_into(batch: &mut RenderCommandBatch, cursor: &mut BinaryCursor<'_>) -> NetworkResult<()> {
        batch.view = cursor.read_mat4()?;
        batch.normal = cursor.read_mat3()?;

        'frame: while cursor.has_remaining() {
            for section in FrameSection::ORDER {
                if !cursor.has_remaining() {
                    break 'frame;
                }
                Self::decode_section(batch, cursor, section)?;
            }
        }
        Ok(())
    }

    fn decode_section(
        batch: &mut RenderCommandBatch,
        cursor: &mut BinaryCursor<'_>,
        section: FrameSection,
    ) -> NetworkResult<()> {
        if section == FrameSection::Trimesh3D {
            return Self::decode_trimeshes(batch, cursor);
        }

        let count = cursor.read_u32()? as usize;
        check_section_fits(cursor, count, section.record_size())?;

        match section {
            FrameSection::PartialCircle2D => {
                batch.partial_circles_2d.reserve(count);
                for _ in 0..count {
                    batch.partial_circles_2d.push(PartialCircle2D {
                        color: cursor.read_color4_u8()?,
                        screen_x: cursor.read_i16()?,
                        screen_y: cursor.read_i16()?,
                        layer: cursor.read_u16()?,
                        index: cursor.read_u16()?,
                    });
                }
            }
            FrameSection::Texture2D => {
                batch.textures_2d.reserve(count);
                for _ in 0..count {
                    let color = cursor.read_color4_u8()?;
                    let offset = [cursor.read_i16()?, cursor.read_i16()?];
                    let rotation_rad = cursor.read_f32()?;
                    let screen_x = cursor.read_i16()?;
                    let screen_y = cursor.read_i16()?;
                    let (layer, server_texture_id) = cursor.read_int8_int24()?;
                    let scale = cursor.read_f32()?;
                    batch.textures_2d.push(Texture2D {
                        color,
                        offset,
                        rotation_rad,
                        screen_x,
                        screen_y,
                        layer,
                        server_texture_id,
                        scale,
                    });
                }
            }
            FrameSection::Rectangle2D => {
                batch.rectangles_2d.reserve(count);
                for _ in 0..count {
                    let color = cursor.read_color4_u8()?;
                    let rotation_rad = cursor.read_f32()?;
                    let screen_x = cursor.read_i16()?;
                    let screen_y = cursor.read_i16()?;
                    let (layer, width, height) = Rectangle2D::unpack_layer_size(cursor.read_u32()?);
                    batch.rectangles_2d.push(Rectangle2D {
                        color,
                        rotation_rad,
                        screen_x,
                        screen_y,
                        layer,
                        width,
                        height,
                    });
                }
            }
            FrameSection::Rectangle3D => {
                batch.rectangles_3d.reserve(count);
                for _ in 0..count {
                    batch.rectangles_3d.push(Rectangle3D {
                        color: cursor.read_color4_u8()?,
                        pos: read_vec3(cursor)?,
                        rotation_rad: cursor.read_f32()?,
                        width: cursor.read_f32()?,
                        height: cursor.read_f32()?,
                    });
                }
            }
            FrameSection::Circle3D => {
                batch.circles_3d.reserve(count);
                for _ in 0..count {
                    batch.circles_3d.push(Circle3D {
                        color: cursor.read_color4_u8()?,
                        pos: read_vec3(cursor)?,
                        radius: cursor.read_f32()?,
                    });
                }
            }
            FrameSection::Sprite3D => {
                batch.sprites_3d.reserve(count);
                for _ in 0..count {
                    let color = cursor.read_color4_u8()?;
                    let offset = Vec2::new(cursor.read_i16()? as f32, cursor.read_i16()? as f32)
                        * ONE_SPRITE_PIXEL_SIZE_IN_3D;
                    let rotation_rad = cursor.read_f32()?;
                    let pos = read_vec3(cursor)?;
                    let scale = cursor.read_f32()?;
                    let (is_vertically_flipped, server_texture_id) = cursor.read_bool1_int31()?;
                    batch.sprites_3d.push(Sprite3D {
                        color,
                        offset,
                        rotation_rad,
                        pos,
                        scale,
                        is_vertically_flipped,
                        server_texture_id,
                    });
                }
            }
            FrameSection::Number3D => {
                batch.numbers_3d.reserve(count);
                for _ in 0..count {
                    batch.numbers_3d.push(Number3D {
                        scale: cursor.read_f32()?,
                        color: cursor.read_color4_u8()?,
                        pos: read_vec3(cursor)?,
                        value: cursor.read_u32()?,
                    });
                }
            }
            FrameSection::Effect3D => {
                batch.effects_3d.reserve(count);
                for _ in 0..count {
                    let effect_id = cursor.read_u16()?;
                    let key_index = cursor.read_u16()?;
                    let pos = Vec2::new(cursor.read_f32()?, cursor.read_f32()?);
                    batch.effects_3d.push(Effect3D {
                        effect_id,
                        key_index,
                        pos,
                    });
                }
            }
            FrameSection::Model3D => {
                batch.models_3d.reserve(count);
                for _ in 0..count {
                    let (is_transparent, model_instance_index) = cursor.read_bool1_int31()?;
                    batch.models_3d.push(Model3D {
                        is_transparent,
                        model_instance_index,
                    });
                }
            }
            FrameSection::HorizontalTexture3D => {
                batch.horizontal_textures_3d.reserve(count);
                for _ in 0..count {
                    let color = cursor.read_color4_u8()?;
                    let x = cursor.read_f32()?;
                    let z = cursor.read_f32()?;
                    let rotation_rad = cursor.read_f32()?;
                    let server_texture_id = cursor.read_u32()?;
                    let size = match cursor.read_u32()? {
                        TEXTURE_SIZE_FIXED_TAG => TextureSize::Fixed(cursor.read_f32()?),
                        _ => TextureSize::Scaled(cursor.read_f32()?),
                    };
                    batch.horizontal_textures_3d.push(HorizontalTexture3D {
                        color,
                        x,
                        z,
                        rotation_rad,
                        server_texture_id,
                        size,
                    });
                }
            }
            // split counts, read by decode_trimeshes
            FrameSection::Trimesh3D => {}
        }
        Ok(())
    }

    fn decode_trimeshes(batch: &mut RenderCommandBatch, cursor: &mut BinaryCursor<'_>) -> NetworkResult<()> {
        let (cylinders, sanctuaries) = cursor.read_int16_int16()?;
        let total = cylinders as usize + sanctuaries as usize;
        check_section_fits(cursor, total, FrameSection::Trimesh3D.record_size())?;
        batch.trimeshes_3d.reserve(total);
        for _ in 0..cylinders {
            batch.trimeshes_3d.push(Trimesh3D {
                shape: TrimeshShape::Cylinder,
                pos: read_vec3(cursor)?,
            });
        }
        for _ in 0..sanctuaries {
            batch.trimeshes_3d.push(Trimesh3D {
                shape: TrimeshShape::Sanctuary,
                pos: read_vec3(cursor)?,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;

    struct FrameWriter {
        bytes: Vec<u8>,
    }

    impl FrameWriter {
        fn new() -> Self {
            let mut bytes = Vec::new();
            for i in 0..16 {
                bytes.extend_from_slice(&(if i % 5 == 0 { 1.0f32 } else { 0.0 }).to_le_bytes());
            }
            for i in 0..9 {
                bytes.extend_from_slice(&(if i % 4 == 0 { 1.0f32 } else { 0.0 }).to_le_bytes());
            }
            Self { bytes }
        }

        fn u8s(&mut self, values: &[u8]) -> &mut Self {
            self.bytes.extend_from_slice(values);
            self
        }

        fn u16(&mut self, v: u16) -> &mut Self {
            self.u8s(&v.to_le_bytes())
        }

        fn i16(&mut self, v: i16) -> &mut Self {
            self.u8s(&v.to_le_bytes())
        }

        fn u32(&mut self, v: u32) -> &mut Self {
            self.u8s(&v.to_le_bytes())
        }

        fn f32(&mut self, v: f32) -> &mut Self {
            self.u8s(&v.to_le_bytes())
        }

        fn empty_sections(&mut self, n: usize) -> &mut Self {
            for _ in 0..n {
                self.u32(0);
            }
            self
        }

        fn sprite(&mut self, x: f32, flipped: bool, texture: u32) -> &mut Self {
            self.u8s(&[255, 0, 0, 255])
                .i16(35)
                .i16(-70)
                .f32(0.5)
                .f32(x)
                .f32(2.0)
                .f32(3.0)
                .f32(1.0)
                .u32(((flipped as u32) << 31) | texture)
        }
    }

    #[test]
    fn test_two_sprites_then_empty_numbers() {
        let mut writer = FrameWriter::new();
        // PartialCircle2D..Circle3D are empty
        writer.empty_sections(5);
        writer.u32(2).sprite(1.0, false, 10).sprite(5.0, true, 11);
        writer.u32(0);

        let mut decoder = FrameDecoder::new();
        let mut cursor = BinaryCursor::new(&writer.bytes);
        let batch = decoder.decode_from(&mut cursor).unwrap();
        assert_eq!(batch.sprites_3d.len(), 2);
        assert_eq!(batch.numbers_3d.len(), 0);
        assert_eq!(batch.sprites_3d[0].pos.x, 1.0);
        assert_eq!(batch.sprites_3d[1].pos.x, 5.0);
        assert!(batch.sprites_3d[1].is_vertically_flipped);
        assert_eq!(batch.sprites_3d[1].server_texture_id, 11);
        assert!((batch.sprites_3d[0].offset.x - 1.0).abs() < 1e-6);
        assert!((batch.sprites_3d[0].offset.y + 2.0).abs() < 1e-6);
        assert!(!cursor.has_remaining());
        assert_eq!(decoder.frames_decoded(), 1);
    }

    #[test]
    fn test_matrices_only_frame() {
        let writer = FrameWriter::new();
        let mut decoder = FrameDecoder::new();
        let batch = decoder.decode(&writer.bytes).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.view, glam::Mat4::IDENTITY);
        assert_eq!(batch.normal, glam::Mat3::IDENTITY);
    }

    #[test]
    fn test_every_section_in_order() {
        let mut w = FrameWriter::new();
        w.u32(1).u8s(&[0, 0, 0, 255]).i16(-5).i16(6).u16(2).u16(3);
        w.u32(1)
            .u8s(&[255; 4])
            .i16(1)
            .i16(2)
            .f32(0.25)
            .i16(100)
            .i16(200)
            .u32((4 << 24) | 0x00_0777)
            .f32(2.0);
        w.u32(1).u8s(&[255; 4]).f32(0.0).i16(10).i16(20).u32((3 << 24) | (50 << 12) | 8);
        w.u32(1).u8s(&[255; 4]).f32(1.0).f32(2.0).f32(3.0).f32(0.1).f32(4.0).f32(5.0);
        w.u32(1).u8s(&[255; 4]).f32(1.0).f32(0.0).f32(1.0).f32(2.5);
        w.u32(0);
        w.u32(1).f32(1.5).u8s(&[255; 4]).f32(0.0).f32(1.0).f32(0.0).u32(9999);
        w.u32(1).u16(3).u16(7).f32(10.0).f32(-10.0);
        w.u32(2).u32(5).u32((1 << 31) | 6);
        w.u32(2)
            .u8s(&[255; 4])
            .f32(1.0)
            .f32(2.0)
            .f32(0.0)
            .u32(12)
            .u32(1)
            .f32(3.0)
            .u8s(&[255; 4])
            .f32(1.0)
            .f32(2.0)
            .f32(0.0)
            .u32(13)
            .u32(0)
            .f32(0.5);
        w.u32((1 << 16) | 2)
            .f32(1.0)
            .f32(1.0)
            .f32(1.0)
            .f32(2.0)
            .f32(2.0)
            .f32(2.0)
            .f32(3.0)
            .f32(3.0)
            .f32(3.0);

        let mut decoder = FrameDecoder::new();
        let batch = decoder.decode(&w.bytes).unwrap();
        assert_eq!(batch.partial_circles_2d[0].screen_x, -5);
        assert_eq!(batch.partial_circles_2d[0].index, 3);
        assert_eq!(batch.textures_2d[0].layer, 4);
        assert_eq!(batch.textures_2d[0].server_texture_id, 0x777);
        assert_eq!(batch.rectangles_2d[0].layer, 3);
        assert_eq!(batch.rectangles_2d[0].width, 50);
        assert_eq!(batch.rectangles_2d[0].height, 8);
        assert_eq!(batch.rectangles_3d[0].height, 5.0);
        assert_eq!(batch.circles_3d[0].radius, 2.5);
        assert_eq!(batch.numbers_3d[0].value, 9999);
        assert_eq!(batch.effects_3d[0].key_index, 7);
        assert_eq!(batch.models_3d[0].model_instance_index, 5);
        assert!(!batch.models_3d[0].is_transparent);
        assert!(batch.models_3d[1].is_transparent);
        assert_eq!(batch.horizontal_textures_3d[0].size, TextureSize::Fixed(3.0));
        assert_eq!(batch.horizontal_textures_3d[1].size, TextureSize::Scaled(0.5));
        assert_eq!(batch.trimeshes(TrimeshShape::Cylinder).count(), 1);
        assert_eq!(batch.trimeshes(TrimeshShape::Sanctuary).count(), 2);
        assert_eq!(batch.trimeshes_3d[0].shape, TrimeshShape::Cylinder);
        assert_eq!(batch.command_count(), 14);
    }

    #[test]
    fn test_section_order_repeats() {
        let mut w = FrameWriter::new();
        w.empty_sections(8);
        w.u32(1).u32(1);
        w.empty_sections(2);
        // second pass
        w.empty_sections(8);
        w.u32(1).u32(2);

        let mut decoder = FrameDecoder::new();
        let batch = decoder.decode(&w.bytes).unwrap();
        let indices: Vec<u32> = batch.models_3d.iter().map(|m| m.model_instance_index).collect();
        assert_eq!(indices, vec![1, 2]);
    }

    #[test]
    fn test_truncated_record_is_fatal_and_clears_batch() {
        let mut w = FrameWriter::new();
        w.empty_sections(5);
        w.u32(2).sprite(1.0, false, 1);
        w.u8s(&[1, 2, 3]);

        let mut decoder = FrameDecoder::new();
        assert!(matches!(
            decoder.decode(&w.bytes),
            Err(ViewerError::TruncatedBuffer { .. })
        ));
        assert!(decoder.batch().is_empty());
        assert_eq!(decoder.frames_decoded(), 0);
    }

    #[test]
    fn test_short_matrix_is_truncated() {
        let mut decoder = FrameDecoder::new();
        assert!(matches!(
            decoder.decode(&[0u8; 10]),
            Err(ViewerError::TruncatedBuffer { .. })
        ));
    }

    #[test]
    fn test_new_frame_replaces_previous() {
        let mut first = FrameWriter::new();
        first.empty_sections(5);
        first.u32(1).sprite(1.0, false, 1);
        let second = FrameWriter::new();

        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(&first.bytes).unwrap().sprites_3d.len(), 1);
        assert!(decoder.decode(&second.bytes).unwrap().sprites_3d.is_empty());
    }
}
