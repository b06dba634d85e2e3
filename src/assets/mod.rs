//! Assets handed to the renderer once the handshake finishes

pub mod provisioned;
pub mod texture_residency;

pub use provisioned::{ModelData, ModelFace, ModelInstance, ProvisionedAssets};
pub use texture_residency::{TextureResidency, TextureState};
