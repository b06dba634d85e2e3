//! Textual messages: the server welcome and the client's requests

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorContext;
use crate::network::error::{malformed_welcome, NetworkResult};
use crate::persistence::CatalogEntry;

/// Ground lighting block of the welcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundLightParams {
    pub light_dir: Vec<f32>,
    pub light_ambient: Vec<f32>,
    pub light_diffuse: Vec<f32>,
    pub light_opacity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureCatalog {
    pub entries: BTreeMap<String, CatalogEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetCatalog {
    pub texture_db: TextureCatalog,
    pub model_name_to_index: BTreeMap<String, u32>,
}

/// First message of a session, sent as JSON text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WelcomeMessage {
    pub screen_width: u32,
    pub screen_height: u32,
    pub map_name: String,
    pub projection_mat: Vec<f32>,
    pub ortho_mat: Vec<f32>,
    pub ground: GroundLightParams,
    pub effect_names: Vec<String>,
    #[serde(alias = "asset_database")]
    pub asset_db: AssetCatalog,
}

fn check_len(field: &str, values: &[f32], expected: usize) -> NetworkResult<()> {
    if values.len() != expected {
        return Err(malformed_welcome(format!(
            "{} has {} values, expected {}",
            field,
            values.len(),
            expected
        )));
    }
    Ok(())
}

impl WelcomeMessage {
    /// Parse and schema-check a welcome buffer
    pub fn parse(buffer: &[u8]) -> NetworkResult<Self> {
        let text = std::str::from_utf8(buffer)
            .map_err(|e| malformed_welcome(format!("not UTF-8: {}", e)))?;
        let welcome: WelcomeMessage =
            serde_json::from_str(text).map_err(|e| malformed_welcome(e.to_string()))?;
        welcome.validate()?;
        Ok(welcome)
    }

    pub fn validate(&self) -> NetworkResult<()> {
        if self.map_name.is_empty() {
            return Err(malformed_welcome("map_name is empty"));
        }
        check_len("projection_mat", &self.projection_mat, 16)?;
        check_len("ortho_mat", &self.ortho_mat, 16)?;
        check_len("ground.light_dir", &self.ground.light_dir, 3)?;
        check_len("ground.light_ambient", &self.ground.light_ambient, 3)?;
        check_len("ground.light_diffuse", &self.ground.light_diffuse, 3)?;
        let model_count = self.asset_db.model_name_to_index.len();
        for (name, &index) in &self.asset_db.model_name_to_index {
            if index as usize >= model_count {
                return Err(malformed_welcome(format!(
                    "model {} has index {} but only {} models are declared",
                    name, index, model_count
                )));
            }
        }
        Ok(())
    }

    pub fn texture_catalog(&self) -> &BTreeMap<String, CatalogEntry> {
        &self.asset_db.texture_db.entries
    }
}

/// Client to server JSON requests. Each serializes to an object with a
/// single key, e.g. `{"missing_models":["house"]}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientRequest {
    MismatchedTextures(Vec<String>),
    MissingEffects(Vec<String>),
    MismatchedVertexBuffers(Vec<String>),
    MissingModels(Vec<String>),
    SendMeModelInstances(bool),
    Ready(bool),
}

impl ClientRequest {
    pub fn to_json(&self) -> NetworkResult<String> {
        serde_json::to_string(self).context("encode client request")
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientRequest::MismatchedTextures(_) => "mismatched_textures",
            ClientRequest::MissingEffects(_) => "missing_effects",
            ClientRequest::MismatchedVertexBuffers(_) => "mismatched_vertex_buffers",
            ClientRequest::MissingModels(_) => "missing_models",
            ClientRequest::SendMeModelInstances(_) => "send_me_model_instances",
            ClientRequest::Ready(_) => "ready",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewerError;
    use serde_json::json;

    fn welcome_json() -> serde_json::Value {
        json!({
            "screen_width": 1024,
            "screen_height": 768,
            "map_name": "prontera",
            "projection_mat": vec![0.0; 16],
            "ortho_mat": vec![0.0; 16],
            "ground": {
                "light_dir": [0.0, -1.0, 0.0],
                "light_ambient": [0.3, 0.3, 0.3],
                "light_diffuse": [1.0, 1.0, 1.0],
                "light_opacity": 0.7
            },
            "effect_names": ["firewall"],
            "asset_database": {
                "texture_db": { "entries": { "a.bmp": { "id": 0, "hash": "h", "count": 1 } } },
                "model_name_to_index": { "house": 0 }
            }
        })
    }

    #[test]
    fn test_parse_welcome_with_server_field_name() {
        let bytes = serde_json::to_vec(&welcome_json()).unwrap();
        let welcome = WelcomeMessage::parse(&bytes).unwrap();
        assert_eq!(welcome.map_name, "prontera");
        assert_eq!(welcome.texture_catalog()["a.bmp"].server_id, 0);
        assert_eq!(welcome.asset_db.model_name_to_index["house"], 0);
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let mut value = welcome_json();
        value.as_object_mut().unwrap().remove("ground");
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(
            WelcomeMessage::parse(&bytes),
            Err(ViewerError::MalformedWelcome { .. })
        ));
    }

    #[test]
    fn test_short_matrix_is_malformed() {
        let mut value = welcome_json();
        value["ortho_mat"] = json!([1.0, 2.0]);
        let bytes = serde_json::to_vec(&value).unwrap();
        match WelcomeMessage::parse(&bytes) {
            Err(ViewerError::MalformedWelcome { reason }) => assert!(reason.contains("ortho_mat")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_model_index_beyond_declared_models_is_malformed() {
        let mut value = welcome_json();
        value["asset_database"]["model_name_to_index"] = json!({ "house": 4_000_000_000u32 });
        let bytes = serde_json::to_vec(&value).unwrap();
        match WelcomeMessage::parse(&bytes) {
            Err(ViewerError::MalformedWelcome { reason }) => assert!(reason.contains("house")),
            other => panic!("unexpected {:?}", other),
        }

        value["asset_database"]["model_name_to_index"] = json!({ "house": 1, "tree": 0 });
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(WelcomeMessage::parse(&bytes).is_ok());
    }

    #[test]
    fn test_binary_garbage_is_malformed() {
        assert!(matches!(
            WelcomeMessage::parse(&[0xFF, 0xFE, 0x00]),
            Err(ViewerError::MalformedWelcome { .. })
        ));
        assert!(WelcomeMessage::parse(b"{\"screen_width\": \"wide\"}").is_err());
    }

    #[test]
    fn test_request_json_shapes() {
        assert_eq!(
            ClientRequest::MismatchedTextures(vec!["a".into()]).to_json().unwrap(),
            r#"{"mismatched_textures":["a"]}"#
        );
        assert_eq!(
            ClientRequest::MismatchedVertexBuffers(vec![]).to_json().unwrap(),
            r#"{"mismatched_vertex_buffers":[]}"#
        );
        assert_eq!(
            ClientRequest::SendMeModelInstances(true).to_json().unwrap(),
            r#"{"send_me_model_instances":true}"#
        );
        assert_eq!(ClientRequest::Ready(true).to_json().unwrap(), r#"{"ready":true}"#);
    }
}
