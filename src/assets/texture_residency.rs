//! Deferred texture loading
//!
//! Renderers ask for textures by server id while drawing. The first request
//! for an id queues a load job on a bounded channel and reports `Pending`;
//! jobs are drained between frames and read the first variant from the cache.
//! When the queue is full the id is left untouched and the next request
//! tries again.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::error::ViewerResult;
use crate::network::session::SessionContext;
use crate::persistence::records::TexturePixels;
use crate::persistence::AssetCache;

#[derive(Debug, Clone, PartialEq)]
pub enum TextureState {
    Pending,
    Loaded(Arc<TexturePixels>),
    /// Unknown id, or nothing cached for it
    Missing,
}

#[derive(Debug)]
pub struct TextureResidency {
    session: Arc<SessionContext>,
    states: FxHashMap<u32, TextureState>,
    jobs_tx: flume::Sender<u32>,
    jobs_rx: flume::Receiver<u32>,
}

impl TextureResidency {
    pub fn new(session: Arc<SessionContext>, job_capacity: usize) -> Self {
        let (jobs_tx, jobs_rx) = flume::bounded(job_capacity.max(1));
        Self {
            session,
            states: FxHashMap::default(),
            jobs_tx,
            jobs_rx,
        }
    }

    /// Current state of a texture, queueing a load on first sight
    pub fn request(&mut self, server_texture_id: u32) -> TextureState {
        if let Some(state) = self.states.get(&server_texture_id) {
            return state.clone();
        }
        match self.jobs_tx.try_send(server_texture_id) {
            Ok(()) => {
                self.states.insert(server_texture_id, TextureState::Pending);
            }
            Err(flume::TrySendError::Full(_)) => {
                log::debug!(
                    "[TextureResidency::request] Job queue full, deferring texture {}",
                    server_texture_id
                );
            }
            Err(flume::TrySendError::Disconnected(_)) => {
                log::warn!("[TextureResidency::request] Job queue closed");
            }
        }
        TextureState::Pending
    }

    pub fn state(&self, server_texture_id: u32) -> Option<&TextureState> {
        self.states.get(&server_texture_id)
    }

    pub fn pending_jobs(&self) -> usize {
        self.jobs_rx.len()
    }

    /// Run one load job
    pub async fn load<C: AssetCache>(&mut self, cache: &C, server_texture_id: u32) -> ViewerResult<()> {
        let state = match self.session.textures.path_of(server_texture_id) {
            Some(path) => match cache.texture_variant(path, 0).await? {
                Some(pixels) => {
                    log::debug!(
                        "[TextureResidency::load] Loaded {} ({}x{})",
                        path,
                        pixels.width,
                        pixels.height
                    );
                    TextureState::Loaded(Arc::new(pixels))
                }
                None => {
                    log::warn!("[TextureResidency::load] {} is not cached", path);
                    TextureState::Missing
                }
            },
            None => {
                log::warn!(
                    "[TextureResidency::load] Server texture {} is not in the catalog",
                    server_texture_id
                );
                TextureState::Missing
            }
        };
        self.states.insert(server_texture_id, state);
        Ok(())
    }

    /// Drain every queued job. Returns how many ran.
    pub async fn process_pending<C: AssetCache>(&mut self, cache: &C) -> ViewerResult<usize> {
        let mut processed = 0;
        while let Ok(server_texture_id) = self.jobs_rx.try_recv() {
            self.load(cache, server_texture_id).await?;
            processed += 1;
        }
        Ok(processed)
    }
}
