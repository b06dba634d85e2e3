//! Per-frame draw commands
//!
//! Screen-space commands keep the server's integer pixel coordinates.
//! Record order inside each list is paint order.

use glam::{Mat3, Mat4, Vec2, Vec3};

pub type Color = [f32; 4];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartialCircle2D {
    pub color: Color,
    pub screen_x: i16,
    pub screen_y: i16,
    pub layer: u16,
    /// Which precomputed arc to draw
    pub index: u16,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Texture2D {
    pub color: Color,
    pub offset: [i16; 2],
    pub rotation_rad: f32,
    pub screen_x: i16,
    pub screen_y: i16,
    pub layer: u8,
    pub server_texture_id: u32,
    pub scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle2D {
    pub color: Color,
    pub rotation_rad: f32,
    pub screen_x: i16,
    pub screen_y: i16,
    pub layer: u8,
    pub width: u16,
    pub height: u16,
}

impl Rectangle2D {
    /// Split `layer:8 | width:12 | height:12`
    pub fn unpack_layer_size(packed: u32) -> (u8, u16, u16) {
        let height = (packed & 0xFFF) as u16;
        let width = ((packed >> 12) & 0xFFF) as u16;
        let layer = (packed >> 24) as u8;
        (layer, width, height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rectangle3D {
    pub color: Color,
    pub pos: Vec3,
    pub rotation_rad: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle3D {
    pub color: Color,
    pub pos: Vec3,
    pub radius: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sprite3D {
    pub color: Color,
    /// Offset in world units
    pub offset: Vec2,
    pub rotation_rad: f32,
    pub pos: Vec3,
    pub scale: f32,
    pub is_vertically_flipped: bool,
    pub server_texture_id: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Number3D {
    pub scale: f32,
    pub color: Color,
    pub pos: Vec3,
    pub value: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Effect3D {
    pub effect_id: u16,
    pub key_index: u16,
    pub pos: Vec2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Model3D {
    pub is_transparent: bool,
    pub model_instance_index: u32,
}

/// Size of a horizontal texture quad
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureSize {
    /// Absolute size in world units
    Fixed(f32),
    /// Multiplier of the texture's own size
    Scaled(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HorizontalTexture3D {
    pub color: Color,
    pub x: f32,
    pub z: f32,
    pub rotation_rad: f32,
    pub server_texture_id: u32,
    pub size: TextureSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrimeshShape {
    Cylinder,
    Sanctuary,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trimesh3D {
    pub shape: TrimeshShape,
    pub pos: Vec3,
}

/// Everything the server asked to draw in one frame
#[derive(Debug, Clone, PartialEq)]
pub struct RenderCommandBatch {
    pub view: Mat4,
    pub normal: Mat3,
    pub partial_circles_2d: Vec<PartialCircle2D>,
    pub textures_2d: Vec<Texture2D>,
    pub rectangles_2d: Vec<Rectangle2D>,
    pub rectangles_3d: Vec<Rectangle3D>,
    pub circles_3d: Vec<Circle3D>,
    pub sprites_3d: Vec<Sprite3D>,
    pub numbers_3d: Vec<Number3D>,
    pub effects_3d: Vec<Effect3D>,
    pub models_3d: Vec<Model3D>,
    pub horizontal_textures_3d: Vec<HorizontalTexture3D>,
    pub trimeshes_3d: Vec<Trimesh3D>,
}

impl Default for RenderCommandBatch {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            normal: Mat3::IDENTITY,
            partial_circles_2d: Vec::new(),
            textures_2d: Vec::new(),
            rectangles_2d: Vec::new(),
            rectangles_3d: Vec::new(),
            circles_3d: Vec::new(),
            sprites_3d: Vec::new(),
            numbers_3d: Vec::new(),
            effects_3d: Vec::new(),
            models_3d: Vec::new(),
            horizontal_textures_3d: Vec::new(),
            trimeshes_3d: Vec::new(),
        }
    }
}

impl RenderCommandBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every list, keeping allocations
    pub fn clear(&mut self) {
        self.view = Mat4::IDENTITY;
        self.normal = Mat3::IDENTITY;
        self.partial_circles_2d.clear();
        self.textures_2d.clear();
        self.rectangles_2d.clear();
        self.rectangles_3d.clear();
        self.circles_3d.clear();
        self.sprites_3d.clear();
        self.numbers_3d.clear();
        self.effects_3d.clear();
        self.models_3d.clear();
        self.horizontal_textures_3d.clear();
        self.trimeshes_3d.clear();
    }

    pub fn command_count(&self) -> usize {
        self.partial_circles_2d.len()
            + self.textures_2d.len()
            + self.rectangles_2d.len()
            + self.rectangles_3d.len()
            + self.circles_3d.len()
            + self.sprites_3d.len()
            + self.numbers_3d.len()
            + self.effects_3d.len()
            + self.models_3d.len()
            + self.horizontal_textures_3d.len()
            + self.trimeshes_3d.len()
    }

    pub fn is_empty(&self) -> bool {
        self.command_count() == 0
    }

    pub fn trimeshes(&self, shape: TrimeshShape) -> impl Iterator<Item = &Trimesh3D> {
        self.trimeshes_3d.iter().filter(move |t| t.shape == shape)
    }

    /// One-line count per command kind, for logs
    pub fn summary(&self) -> String {
        format!(
            "circles2d={} tex2d={} rect2d={} rect3d={} circles3d={} sprites={} numbers={} effects={} models={} htex={} trimesh={}",
            self.partial_circles_2d.len(),
            self.textures_2d.len(),
            self.rectangles_2d.len(),
            self.rectangles_3d.len(),
            self.circles_3d.len(),
            self.sprites_3d.len(),
            self.numbers_3d.len(),
            self.effects_3d.len(),
            self.models_3d.len(),
            self.horizontal_textures_3d.len(),
            self.trimeshes_3d.len(),
        )
    }
}
