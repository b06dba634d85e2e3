use std::time::Duration;

/// Section end marker emitted by the server, in wire byte order
pub const SECTION_END_MARKER: u32 = 0xB16B_00B5;
pub const SECTION_END_MARKER_BYTES: [u8; 4] = SECTION_END_MARKER.to_be_bytes();

/// Default server endpoint
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:6969";

/// Input timing constants
pub const TICK_RATE: u32 = 20; // Input flushes per second
pub const TICK_DURATION: Duration = Duration::from_millis(1000 / TICK_RATE as u64);
pub const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Protocol limits
pub const OUTBOUND_BUFFER_SIZE: usize = 2048;
pub const TEXTURE_REQUEST_CHUNK_SIZE: usize = 10;
pub const MAX_INPUT_RECORD_SIZE: usize = 5; // tag + two i16 mouse coordinates
pub const MAX_MODEL_FACES: u32 = 1000;

/// Ground mesh record tag
pub const GROUND_BUFFER_TAG: u8 = 1;
/// Name the server knows the ground vertex buffer by
pub const GROUND_VERTEX_BUFFER_NAME: &str = "3d_ground";

/// Texture paths with a fixed role in the ground pass
pub const GROUND_TEXTURE_ATLAS: &str = "ground_texture_atlas";
pub const GROUND_LIGHTMAP_TEXTURE: &str = "ground_lightmap_texture";
pub const GROUND_TILE_COLOR_TEXTURE: &str = "ground_tile_color_texture";

/// World units covered by one sprite pixel
pub const ONE_SPRITE_PIXEL_SIZE_IN_3D: f32 = 1.0 / 35.0;

/// Horizontal texture size discriminant for fixed sizing
pub const TEXTURE_SIZE_FIXED_TAG: u32 = 1;

/// Protocol helpers
pub struct Protocol;

impl Protocol {
    /// Cache key of a map's ground vertex array
    pub fn ground_vertex_array_key(map_name: &str) -> String {
        format!("{}_ground", map_name)
    }

    /// Whether `bytes` begins with the section end marker
    pub fn is_section_end(bytes: &[u8]) -> bool {
        bytes.len() >= SECTION_END_MARKER_BYTES.len()
            && bytes[..SECTION_END_MARKER_BYTES.len()] == SECTION_END_MARKER_BYTES
    }

    /// Split a list of texture paths into request-sized chunks
    pub fn chunk_texture_requests(paths: &[String], chunk_size: usize) -> Vec<Vec<String>> {
        paths
            .chunks(chunk_size.max(1))
            .map(|chunk| chunk.to_vec())
            .collect()
    }
}
