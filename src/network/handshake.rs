//! Asset reconciliation handshake
//!
//! Drives a fresh connection from the welcome message to frame streaming.
//! Each inbound buffer is consumed completely before the next one; cache
//! reads and writes are awaited in record order. Every downloaded record is
//! stored before it counts as downloaded, so a restart only has to redo the
//! mismatch checks.
//!
//! Any error resets the machine to [`HandshakeState::WaitingForWelcome`]. The
//! caller is expected to drop the connection and start over.

use std::fmt;
use std::sync::Arc;

use crate::assets::{ModelData, ModelFace, ModelInstance, ProvisionedAssets};
use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::network::asset_stream::{read_effect, read_ground, read_model, read_texture, GroundDownload};
use crate::network::cursor::BinaryCursor;
use crate::network::error::protocol_error;
use crate::network::packet::{ClientRequest, WelcomeMessage};
use crate::network::protocol::{Protocol, GROUND_VERTEX_BUFFER_NAME};
use crate::network::session::SessionContext;
use crate::persistence::records::{AssetKey, AssetRecord, ModelFaceRecord, ModelInfo};
use crate::persistence::AssetCache;

/// Handshake phases, in the only order they can occur
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandshakeState {
    WaitingForWelcome,
    ReconcilingTextures,
    ReconcilingEffects,
    ReconcilingGroundMesh,
    ReconcilingModels,
    ReconcilingModelInstances,
    Streaming,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        self == HandshakeState::Streaming
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Download counters, for status readouts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandshakeProgress {
    pub downloading_textures: usize,
    pub downloaded_textures: usize,
    pub downloading_effects: usize,
    pub downloaded_effects: usize,
    pub downloading_models: usize,
    pub downloaded_models: usize,
}

pub struct HandshakeStateMachine<C> {
    cache: C,
    texture_request_chunk_size: usize,
    max_model_faces: u32,
    state: HandshakeState,
    session: Option<Arc<SessionContext>>,
    progress: HandshakeProgress,
    /// Texture requests the server has not closed yet
    open_texture_requests: usize,
    assets: ProvisionedAssets,
}

impl<C: AssetCache> HandshakeStateMachine<C> {
    pub fn new(cache: C, config: &ViewerConfig) -> Self {
        Self {
            cache,
            texture_request_chunk_size: config.texture_request_chunk_size.max(1),
            max_model_faces: config.max_model_faces,
            state: HandshakeState::WaitingForWelcome,
            session: None,
            progress: HandshakeProgress::default(),
            open_texture_requests: 0,
            assets: ProvisionedAssets::default(),
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn progress(&self) -> HandshakeProgress {
        self.progress
    }

    pub fn session(&self) -> Option<&Arc<SessionContext>> {
        self.session.as_ref()
    }

    pub fn assets(&self) -> &ProvisionedAssets {
        &self.assets
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Forget everything and wait for a new welcome
    pub fn reset(&mut self) {
        if self.state != HandshakeState::WaitingForWelcome {
            log::info!("[HandshakeStateMachine::reset] Restarting handshake from {}", self.state);
        }
        self.state = HandshakeState::WaitingForWelcome;
        self.session = None;
        self.progress = HandshakeProgress::default();
        self.open_texture_requests = 0;
        self.assets = ProvisionedAssets::default();
    }

    /// Hand over the session and provisioned assets once streaming
    pub fn take_provisioned(&mut self) -> ViewerResult<(Arc<SessionContext>, ProvisionedAssets)> {
        if !self.state.is_terminal() {
            return Err(ViewerError::StateError {
                expected: HandshakeState::Streaming.to_string(),
                actual: self.state.to_string(),
            });
        }
        let session = self.session.clone().ok_or_else(|| ViewerError::StateError {
            expected: "session".to_string(),
            actual: "none".to_string(),
        })?;
        Ok((session, std::mem::take(&mut self.assets)))
    }

    /// Consume one inbound buffer. Returns the requests to send, in order.
    pub async fn process_buffer(&mut self, buffer: &[u8]) -> ViewerResult<Vec<ClientRequest>> {
        let mut requests = Vec::new();
        match self.dispatch(buffer, &mut requests).await {
            Ok(()) => Ok(requests),
            Err(e) => {
                log::error!(
                    "[HandshakeStateMachine::process_buffer] Handshake failed in {}: {}",
                    self.state,
                    e
                );
                self.reset();
                Err(e)
            }
        }
    }

    async fn dispatch(&mut self, buffer: &[u8], requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        match self.state {
            HandshakeState::WaitingForWelcome => self.on_welcome(buffer, requests).await,
            HandshakeState::ReconcilingTextures => self.on_textures(buffer, requests).await,
            HandshakeState::ReconcilingEffects => self.on_effects(buffer, requests).await,
            HandshakeState::ReconcilingGroundMesh => self.on_ground(buffer, requests).await,
            HandshakeState::ReconcilingModels => self.on_models(buffer, requests).await,
            HandshakeState::ReconcilingModelInstances => self.on_model_instances(buffer, requests),
            HandshakeState::Streaming => Err(ViewerError::StateError {
                expected: "a handshake state".to_string(),
                actual: self.state.to_string(),
            }),
        }
    }

    fn advance(&mut self, next: HandshakeState) -> ViewerResult<()> {
        if next <= self.state {
            return Err(ViewerError::StateError {
                expected: format!("a state after {}", self.state),
                actual: next.to_string(),
            });
        }
        log::info!("[HandshakeStateMachine::advance] {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    fn current_session(&self) -> ViewerResult<Arc<SessionContext>> {
        self.session.clone().ok_or_else(|| ViewerError::StateError {
            expected: "session".to_string(),
            actual: "none".to_string(),
        })
    }

    async fn on_welcome(&mut self, buffer: &[u8], requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let welcome = WelcomeMessage::parse(buffer)?;
        let session = Arc::new(SessionContext::from_welcome(welcome)?);
        log::info!(
            "[HandshakeStateMachine::on_welcome] Map {} ({}x{}), {} textures, {} effects, {} models",
            session.map_name,
            session.screen_width,
            session.screen_height,
            session.catalog.len(),
            session.effect_names.len(),
            session.model_name_to_index.len()
        );

        let mismatched: Vec<String> = self
            .cache
            .collect_mismatched(&session.catalog)
            .await?
            .into_iter()
            .collect();
        self.assets.ground = Some(session.ground_command());
        self.session = Some(session);
        self.advance(HandshakeState::ReconcilingTextures)?;
        self.progress.downloading_textures = mismatched.len();

        if mismatched.is_empty() {
            log::info!("[HandshakeStateMachine::on_welcome] Every texture is cached");
            return self.finish_textures(requests).await;
        }

        let chunks = Protocol::chunk_texture_requests(&mismatched, self.texture_request_chunk_size);
        self.open_texture_requests = chunks.len();
        log::info!(
            "[HandshakeStateMachine::on_welcome] Requesting {} textures in {} messages",
            mismatched.len(),
            chunks.len()
        );
        requests.extend(chunks.into_iter().map(ClientRequest::MismatchedTextures));
        Ok(())
    }

    async fn on_textures(&mut self, buffer: &[u8], requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let mut cursor = BinaryCursor::new(buffer);
        while cursor.has_remaining() {
            if cursor.consume_section_end()? {
                self.open_texture_requests = self.open_texture_requests.saturating_sub(1);
                if self.open_texture_requests == 0 {
                    return self.finish_textures(requests).await;
                }
                return Ok(());
            }

            let texture = read_texture(&mut cursor)?;
            let path = texture.info.path.clone();
            for (variant, pixels) in texture.variants.into_iter().enumerate() {
                self.cache
                    .put(
                        &AssetKey::texture_variant(path.as_str(), variant as u32),
                        AssetRecord::TexturePixels(pixels),
                    )
                    .await?;
            }
            // Metadata last: a partial write leaves the path mismatched
            self.cache
                .put(&AssetKey::texture_info(path.as_str()), AssetRecord::TextureInfo(texture.info))
                .await?;
            self.progress.downloaded_textures += 1;
            log::debug!(
                "[HandshakeStateMachine::on_textures] Stored {} ({}/{})",
                path,
                self.progress.downloaded_textures,
                self.progress.downloading_textures
            );
        }
        Ok(())
    }

    async fn finish_textures(&mut self, requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let session = self.current_session()?;
        let mut missing = Vec::new();
        for name in &session.effect_names {
            if self.cache.effect(name).await?.is_none() {
                missing.push(name.clone());
            }
        }
        self.advance(HandshakeState::ReconcilingEffects)?;
        self.progress.downloading_effects = missing.len();
        log::info!(
            "[HandshakeStateMachine::finish_textures] Requesting {} of {} effects",
            missing.len(),
            session.effect_names.len()
        );
        requests.push(ClientRequest::MissingEffects(missing));
        Ok(())
    }

    async fn on_effects(&mut self, buffer: &[u8], requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let mut cursor = BinaryCursor::new(buffer);
        while cursor.has_remaining() {
            if cursor.consume_section_end()? {
                return self.finish_effects(requests).await;
            }
            let effect = read_effect(&mut cursor)?;
            self.cache
                .put(&AssetKey::effect(effect.name.as_str()), AssetRecord::Effect(effect.definition))
                .await?;
            self.progress.downloaded_effects += 1;
            log::debug!("[HandshakeStateMachine::on_effects] Stored effect {}", effect.name);
        }
        Ok(())
    }

    async fn finish_effects(&mut self, requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let session = self.current_session()?;
        let mut effects = Vec::with_capacity(session.effect_names.len());
        for name in &session.effect_names {
            let effect = self
                .cache
                .effect(name)
                .await?
                .ok_or_else(|| protocol_error(format!("effect {} was not delivered", name)))?;
            effects.push(effect);
        }
        self.assets.effects = effects;

        let ground_key = Protocol::ground_vertex_array_key(&session.map_name);
        let mut mismatched = Vec::new();
        match self.cache.vertex_array(&ground_key).await? {
            Some(array) => self.assets.ground_vertex_array = Some(array),
            None => {
                log::info!("[HandshakeStateMachine::finish_effects] {} is missing", ground_key);
                mismatched.push(GROUND_VERTEX_BUFFER_NAME.to_string());
            }
        }
        self.advance(HandshakeState::ReconcilingGroundMesh)?;
        requests.push(ClientRequest::MismatchedVertexBuffers(mismatched));
        Ok(())
    }

    async fn on_ground(&mut self, buffer: &[u8], requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let session = self.current_session()?;
        let mut cursor = BinaryCursor::new(buffer);
        while cursor.has_remaining() {
            if cursor.consume_section_end()? {
                return self.finish_ground(requests).await;
            }
            match read_ground(&mut cursor)? {
                GroundDownload::VertexBuffer(array) => {
                    let key = AssetKey::vertex_array(Protocol::ground_vertex_array_key(&session.map_name));
                    self.cache.put(&key, AssetRecord::VertexArray(array.clone())).await?;
                    log::debug!(
                        "[HandshakeStateMachine::on_ground] Stored {} ({} vertices)",
                        key,
                        array.vertex_count
                    );
                    self.assets.ground_vertex_array = Some(array);
                }
            }
        }
        Ok(())
    }

    async fn finish_ground(&mut self, requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let session = self.current_session()?;
        if self.assets.ground_vertex_array.is_none() {
            log::warn!("[HandshakeStateMachine::finish_ground] Server closed the ground section without a vertex buffer");
        }
        let mut missing = Vec::new();
        for name in session.model_name_to_index.keys() {
            if self.cached_model_faces(name).await?.is_none() {
                missing.push(name.clone());
            }
        }
        self.advance(HandshakeState::ReconcilingModels)?;
        self.progress.downloading_models = missing.len();
        log::info!(
            "[HandshakeStateMachine::finish_ground] Requesting {} of {} models",
            missing.len(),
            session.model_name_to_index.len()
        );
        requests.push(ClientRequest::MissingModels(missing));
        Ok(())
    }

    async fn on_models(&mut self, buffer: &[u8], requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let mut cursor = BinaryCursor::new(buffer);
        while cursor.has_remaining() {
            if cursor.consume_section_end()? {
                return self.finish_models(requests).await;
            }
            let model = read_model(&mut cursor)?;
            let face_count = model.faces.len();
            if face_count > self.max_model_faces as usize {
                return Err(protocol_error(format!(
                    "model {} has {} faces, limit is {}",
                    model.name, face_count, self.max_model_faces
                )));
            }
            for (index, face) in model.faces.into_iter().enumerate() {
                self.cache
                    .put(
                        &AssetKey::model_face(model.name.as_str(), index as u32),
                        AssetRecord::ModelFace(face),
                    )
                    .await?;
            }
            // Written last so an interrupted download reads as missing
            self.cache
                .put(
                    &AssetKey::model_info(model.name.as_str()),
                    AssetRecord::ModelInfo(ModelInfo {
                        face_count: face_count as u32,
                    }),
                )
                .await?;
            self.progress.downloaded_models += 1;
            log::debug!(
                "[HandshakeStateMachine::on_models] Stored {} ({} nodes, {} faces)",
                model.name,
                model.node_count,
                face_count
            );
        }
        Ok(())
    }

    async fn finish_models(&mut self, requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let session = self.current_session()?;
        let mut models = vec![ModelData::default(); session.model_count()];
        for (name, &server_index) in &session.model_name_to_index {
            let Some(cached) = self.cached_model_faces(name).await? else {
                log::warn!("[HandshakeStateMachine::finish_models] Model {} has no cached faces", name);
                continue;
            };
            let mut faces = Vec::with_capacity(cached.len());
            for face in cached {
                let server_texture_id = session.textures.id_of(&face.texture_name).ok_or_else(|| {
                    protocol_error(format!(
                        "model {} uses texture {} missing from the catalog",
                        name, face.texture_name
                    ))
                })?;
                faces.push(ModelFace {
                    server_texture_id,
                    vertex_count: face.vertex_count,
                    raw_vertices: face.raw_vertices,
                });
            }
            models[server_index as usize] = ModelData { faces };
        }
        self.assets.models = models;
        self.advance(HandshakeState::ReconcilingModelInstances)?;
        requests.push(ClientRequest::SendMeModelInstances(true));
        Ok(())
    }

    /// Faces of a fully cached model, `None` when any part is absent
    async fn cached_model_faces(&self, name: &str) -> ViewerResult<Option<Vec<ModelFaceRecord>>> {
        let Some(info) = self.cache.model_info(name).await? else {
            return Ok(None);
        };
        if info.face_count > self.max_model_faces {
            log::warn!(
                "[HandshakeStateMachine::cached_model_faces] Model {} claims {} faces, treating as missing",
                name,
                info.face_count
            );
            return Ok(None);
        }
        let mut faces = Vec::with_capacity(info.face_count as usize);
        for face_index in 0..info.face_count {
            match self.cache.model_face(name, face_index).await? {
                Some(face) => faces.push(face),
                None => return Ok(None),
            }
        }
        Ok(Some(faces))
    }

    fn on_model_instances(&mut self, buffer: &[u8], requests: &mut Vec<ClientRequest>) -> ViewerResult<()> {
        let mut cursor = BinaryCursor::new(buffer);
        let mut instances = Vec::new();
        while cursor.has_remaining() {
            let model_index = cursor.read_u32()?;
            let transform = cursor.read_mat4()?;
            if model_index as usize >= self.assets.models.len() {
                return Err(protocol_error(format!(
                    "instance of unknown model {} ({} models)",
                    model_index,
                    self.assets.models.len()
                )));
            }
            instances.push(ModelInstance {
                model_index,
                transform,
            });
        }
        log::info!(
            "[HandshakeStateMachine::on_model_instances] Received {} model instances",
            instances.len()
        );
        self.assets.model_instances = instances;
        self.advance(HandshakeState::Streaming)?;
        requests.push(ClientRequest::Ready(true));
        Ok(())
    }
}
