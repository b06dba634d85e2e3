//! Session-wide context derived from the welcome message
//!
//! Built once when the welcome arrives and shared read-only through an `Arc`
//! by the handshake, the frame consumers and texture residency.

use std::collections::BTreeMap;

use glam::{Mat4, Vec3};
use rustc_hash::FxHashMap;

use crate::network::error::NetworkResult;
use crate::network::packet::WelcomeMessage;
use crate::network::protocol::{
    GROUND_LIGHTMAP_TEXTURE, GROUND_TEXTURE_ATLAS, GROUND_TILE_COLOR_TEXTURE,
};
use crate::persistence::CatalogEntry;

/// Path to server texture id mapping, in both directions
#[derive(Debug, Clone, Default)]
pub struct TextureIdentityMap {
    path_to_id: FxHashMap<String, u32>,
    id_to_path: FxHashMap<u32, String>,
}

impl TextureIdentityMap {
    pub fn from_catalog(catalog: &BTreeMap<String, CatalogEntry>) -> Self {
        let mut map = Self::default();
        for (path, entry) in catalog {
            if let Some(previous) = map.id_to_path.insert(entry.server_id, path.clone()) {
                log::warn!(
                    "[TextureIdentityMap::from_catalog] Server id {} shared by {} and {}",
                    entry.server_id,
                    previous,
                    path
                );
            }
            map.path_to_id.insert(path.clone(), entry.server_id);
        }
        map
    }

    pub fn id_of(&self, path: &str) -> Option<u32> {
        self.path_to_id.get(path).copied()
    }

    pub fn path_of(&self, server_id: u32) -> Option<&str> {
        self.id_to_path.get(&server_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.path_to_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.path_to_id.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundLight {
    pub direction: Vec3,
    pub ambient: Vec3,
    pub diffuse: Vec3,
    pub opacity: f32,
}

/// Draw command for the map ground
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ground3D {
    pub light: GroundLight,
    pub texture_atlas: Option<u32>,
    pub lightmap_texture: Option<u32>,
    pub tile_color_texture: Option<u32>,
}

fn vec3(values: &[f32]) -> Vec3 {
    Vec3::from_slice(values)
}

fn mat4(values: &[f32]) -> Mat4 {
    Mat4::from_cols_slice(values)
}

#[derive(Debug, Clone)]
pub struct SessionContext {
    pub screen_width: u32,
    pub screen_height: u32,
    pub map_name: String,
    pub projection: Mat4,
    pub ortho: Mat4,
    pub ground_light: GroundLight,
    pub textures: TextureIdentityMap,
    pub catalog: BTreeMap<String, CatalogEntry>,
    pub effect_names: Vec<String>,
    pub model_name_to_index: BTreeMap<String, u32>,
}

impl SessionContext {
    pub fn from_welcome(welcome: WelcomeMessage) -> NetworkResult<Self> {
        welcome.validate()?;
        let textures = TextureIdentityMap::from_catalog(welcome.texture_catalog());
        let ground = &welcome.ground;
        let ground_light = GroundLight {
            direction: vec3(&ground.light_dir),
            ambient: vec3(&ground.light_ambient),
            diffuse: vec3(&ground.light_diffuse),
            opacity: ground.light_opacity,
        };
        Ok(Self {
            screen_width: welcome.screen_width,
            screen_height: welcome.screen_height,
            projection: mat4(&welcome.projection_mat),
            ortho: mat4(&welcome.ortho_mat),
            ground_light,
            textures,
            map_name: welcome.map_name,
            catalog: welcome.asset_db.texture_db.entries,
            effect_names: welcome.effect_names,
            model_name_to_index: welcome.asset_db.model_name_to_index,
        })
    }

    pub fn ground_command(&self) -> Ground3D {
        Ground3D {
            light: self.ground_light,
            texture_atlas: self.textures.id_of(GROUND_TEXTURE_ATLAS),
            lightmap_texture: self.textures.id_of(GROUND_LIGHTMAP_TEXTURE),
            tile_color_texture: self.textures.id_of(GROUND_TILE_COLOR_TEXTURE),
        }
    }

    pub fn model_count(&self) -> usize {
        self.model_name_to_index
            .values()
            .map(|&index| index as usize + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;
    use crate::network::packet::{AssetCatalog, GroundLightParams, TextureCatalog};

    fn entry(id: u32) -> CatalogEntry {
        CatalogEntry {
            server_id: id,
            content_hash: format!("h{}", id),
            variant_count: 1,
        }
    }

    fn welcome() -> WelcomeMessage {
        let mut entries = BTreeMap::new();
        entries.insert("a.bmp".to_string(), entry(4));
        entries.insert(GROUND_TEXTURE_ATLAS.to_string(), entry(9));
        let mut models = BTreeMap::new();
        models.insert("house".to_string(), 1);
        models.insert("tree".to_string(), 0);
        let mut projection = vec![0.0; 16];
        projection[12] = 5.0;
        WelcomeMessage {
            screen_width: 800,
            screen_height: 600,
            map_name: "geffen".to_string(),
            projection_mat: projection,
            ortho_mat: vec![1.0; 16],
            ground: GroundLightParams {
                light_dir: vec![0.0, -1.0, 0.5],
                light_ambient: vec![0.1; 3],
                light_diffuse: vec![0.9; 3],
                light_opacity: 0.5,
            },
            effect_names: vec![],
            asset_db: AssetCatalog {
                texture_db: TextureCatalog { entries },
                model_name_to_index: models,
            },
        }
    }

    #[test]
    fn test_identity_maps_both_ways() {
        let session = SessionContext::from_welcome(welcome()).unwrap();
        assert_eq!(session.textures.id_of("a.bmp"), Some(4));
        assert_eq!(session.textures.path_of(4), Some("a.bmp"));
        assert_eq!(session.textures.path_of(5), None);
        assert_eq!(session.textures.len(), 2);
    }

    #[test]
    fn test_matrices_and_ground() {
        let session = SessionContext::from_welcome(welcome()).unwrap();
        assert_eq!(session.projection.w_axis.x, 5.0);
        assert_eq!(session.ground_light.direction, Vec3::new(0.0, -1.0, 0.5));
        let ground = session.ground_command();
        assert_eq!(ground.texture_atlas, Some(9));
        assert_eq!(ground.lightmap_texture, None);
    }

    #[test]
    fn test_model_count_follows_highest_index() {
        let session = SessionContext::from_welcome(welcome()).unwrap();
        assert_eq!(session.model_count(), 2);
    }

    #[test]
    fn test_sparse_model_indices_are_rejected() {
        let mut message = welcome();
        message.asset_db.model_name_to_index.insert("house".to_string(), 2);
        assert!(matches!(
            SessionContext::from_welcome(message),
            Err(ViewerError::MalformedWelcome { .. })
        ));
    }
}
