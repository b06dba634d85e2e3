use glam::Mat4;

use crate::network::session::Ground3D;
use crate::persistence::records::{EffectDefinition, VertexArrayRecord};

/// One face of a model, with its texture resolved to a server id
#[derive(Debug, Clone, PartialEq)]
pub struct ModelFace {
    pub server_texture_id: u32,
    pub vertex_count: u32,
    pub raw_vertices: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelData {
    pub faces: Vec<ModelFace>,
}

/// Placement of a model in the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelInstance {
    pub model_index: u32,
    pub transform: Mat4,
}

/// Everything the handshake provisioned for the renderer
#[derive(Debug, Clone, Default)]
pub struct ProvisionedAssets {
    /// In the welcome's effect-name order, so an effect id indexes it
    pub effects: Vec<EffectDefinition>,
    pub ground: Option<Ground3D>,
    pub ground_vertex_array: Option<VertexArrayRecord>,
    /// Indexed by the server's model index
    pub models: Vec<ModelData>,
    pub model_instances: Vec<ModelInstance>,
}

impl ProvisionedAssets {
    pub fn effect(&self, effect_id: u16) -> Option<&EffectDefinition> {
        self.effects.get(effect_id as usize)
    }

    /// Instance and model behind a `Model3D` command
    pub fn model_for_instance(&self, instance_index: u32) -> Option<(&ModelInstance, &ModelData)> {
        let instance = self.model_instances.get(instance_index as usize)?;
        let model = self.models.get(instance.model_index as usize)?;
        Some((instance, model))
    }
}
