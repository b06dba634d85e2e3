//! Viewer configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ViewerError, ViewerResult};
use crate::network::protocol::{
    DEFAULT_SERVER_URL, MAX_INPUT_RECORD_SIZE, MAX_MODEL_FACES, OUTBOUND_BUFFER_SIZE,
    TEXTURE_REQUEST_CHUNK_SIZE, TICK_DURATION,
};

/// Largest outbound buffer accepted by `validate`
const MAX_OUTBOUND_BUFFER_SIZE: usize = 65536;

/// Settings for a viewer session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Server address, used by transports only
    pub server_url: String,
    /// Root directory of the persistent asset cache
    pub cache_dir: PathBuf,
    /// Period of the outbound input flush in milliseconds
    pub input_tick_ms: u64,
    /// Capacity of the outbound input buffer in bytes
    pub outbound_buffer_size: usize,
    /// Max texture paths per `mismatched_textures` request
    pub texture_request_chunk_size: usize,
    /// Outbound messages queued before the client waits on the transport
    pub outbound_queue_capacity: usize,
    /// Pending texture-load jobs before new requests are deferred
    pub texture_job_capacity: usize,
    /// Upper bound on faces read back for a single model
    pub max_model_faces: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            cache_dir: PathBuf::from("cache/assets"),
            input_tick_ms: TICK_DURATION.as_millis() as u64,
            outbound_buffer_size: OUTBOUND_BUFFER_SIZE,
            texture_request_chunk_size: TEXTURE_REQUEST_CHUNK_SIZE,
            outbound_queue_capacity: 64,
            texture_job_capacity: 256,
            max_model_faces: MAX_MODEL_FACES,
        }
    }
}

impl ViewerConfig {
    /// Parse a configuration from TOML text. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> ViewerResult<Self> {
        let config: ViewerConfig = toml::from_str(text).map_err(|e| ViewerError::InvalidConfig {
            field: "<document>".to_string(),
            value: String::new(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file
    pub fn load(path: impl AsRef<Path>) -> ViewerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ViewerError::InvalidConfig {
            field: "<file>".to_string(),
            value: path.display().to_string(),
            reason: e.to_string(),
        })?;
        log::info!("[ViewerConfig::load] Loading configuration from {}", path.display());
        Self::from_toml_str(&text)
    }

    pub fn input_tick(&self) -> Duration {
        Duration::from_millis(self.input_tick_ms)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> ViewerResult<()> {
        if self.input_tick_ms == 0 {
            return Err(invalid("input_tick_ms", self.input_tick_ms, "must be positive"));
        }
        if self.outbound_buffer_size < MAX_INPUT_RECORD_SIZE {
            return Err(invalid(
                "outbound_buffer_size",
                self.outbound_buffer_size,
                &format!("must hold at least one input record ({} bytes)", MAX_INPUT_RECORD_SIZE),
            ));
        }
        if self.outbound_buffer_size > MAX_OUTBOUND_BUFFER_SIZE {
            return Err(invalid(
                "outbound_buffer_size",
                self.outbound_buffer_size,
                &format!("must not exceed {} bytes", MAX_OUTBOUND_BUFFER_SIZE),
            ));
        }
        if self.texture_request_chunk_size == 0 {
            return Err(invalid(
                "texture_request_chunk_size",
                self.texture_request_chunk_size,
                "must be positive",
            ));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(invalid("outbound_queue_capacity", self.outbound_queue_capacity, "must be positive"));
        }
        if self.texture_job_capacity == 0 {
            return Err(invalid("texture_job_capacity", self.texture_job_capacity, "must be positive"));
        }
        if self.max_model_faces == 0 {
            return Err(invalid("max_model_faces", self.max_model_faces, "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl std::fmt::Display, reason: &str) -> ViewerError {
    ViewerError::InvalidConfig {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ViewerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.input_tick_ms, 50);
        assert_eq!(config.outbound_buffer_size, 2048);
        assert_eq!(config.texture_request_chunk_size, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ViewerConfig::from_toml_str("input_tick_ms = 100\ncache_dir = \"/tmp/rl\"\n")
            .expect("valid config");
        assert_eq!(config.input_tick(), Duration::from_millis(100));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/rl"));
        assert_eq!(config.outbound_buffer_size, 2048);
    }

    #[test]
    fn test_rejects_tiny_outbound_buffer() {
        let config = ViewerConfig {
            outbound_buffer_size: 2,
            ..Default::default()
        };
        match config.validate() {
            Err(ViewerError::InvalidConfig { field, .. }) => assert_eq!(field, "outbound_buffer_size"),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let err = ViewerConfig::from_toml_str("texture_request_chunk_size = 0").unwrap_err();
        assert!(matches!(err, ViewerError::InvalidConfig { .. }));
    }

    #[test]
    fn test_rejects_zero_outbound_queue() {
        match ViewerConfig::from_toml_str("outbound_queue_capacity = 0") {
            Err(ViewerError::InvalidConfig { field, .. }) => assert_eq!(field, "outbound_queue_capacity"),
            other => panic!("expected InvalidConfig, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_garbage_toml() {
        assert!(ViewerConfig::from_toml_str("input_tick_ms = \"fast\"").is_err());
    }
}
