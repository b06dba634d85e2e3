//! Session driver
//!
//! Routes inbound buffers to the handshake until it reaches streaming, then
//! to the frame decoder. Requests and input flushes go out on one channel so
//! the transport sees them in the order they were produced.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::assets::{ProvisionedAssets, TextureResidency};
use crate::config::ViewerConfig;
use crate::error::{ViewerError, ViewerResult};
use crate::network::frame::FrameDecoder;
use crate::network::handshake::{HandshakeState, HandshakeStateMachine};
use crate::network::input::{InputEvent, OutboundCommandQueue};
use crate::network::packet::ClientRequest;
use crate::network::protocol::STATS_INTERVAL;
use crate::network::render_command::RenderCommandBatch;
use crate::network::session::SessionContext;
use crate::persistence::AssetCache;

/// A message for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// JSON reconciliation request
    Text(String),
    /// Flushed input records
    Binary(Vec<u8>),
}

/// Consumer of decoded frames, usually a renderer
pub trait FrameSink {
    /// Called once per session when the handshake completes
    fn on_provisioned(&mut self, _session: &Arc<SessionContext>, _assets: &ProvisionedAssets) {}

    fn on_frame(&mut self, batch: &RenderCommandBatch, textures: &mut TextureResidency);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub buffers_received: u64,
    pub frames_decoded: u64,
    pub requests_sent: u64,
    pub input_messages_sent: u64,
    pub textures_loaded: u64,
    pub sessions_failed: u64,
}

pub struct Client<C, S> {
    config: ViewerConfig,
    handshake: HandshakeStateMachine<C>,
    frames: FrameDecoder,
    input: OutboundCommandQueue,
    residency: Option<TextureResidency>,
    assets: Option<ProvisionedAssets>,
    sink: S,
    outbound: mpsc::Sender<OutboundMessage>,
    stats: ClientStats,
}

impl<C: AssetCache, S: FrameSink> Client<C, S> {
    pub fn new(
        cache: C,
        config: ViewerConfig,
        sink: S,
        outbound: mpsc::Sender<OutboundMessage>,
    ) -> ViewerResult<Self> {
        config.validate()?;
        Ok(Self {
            handshake: HandshakeStateMachine::new(cache, &config),
            frames: FrameDecoder::new(),
            input: OutboundCommandQueue::with_capacity(config.outbound_buffer_size),
            residency: None,
            assets: None,
            sink,
            outbound,
            stats: ClientStats::default(),
            config,
        })
    }

    pub fn state(&self) -> HandshakeState {
        self.handshake.state()
    }

    pub fn handshake(&self) -> &HandshakeStateMachine<C> {
        &self.handshake
    }

    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Assets of the current session, once streaming
    pub fn assets(&self) -> Option<&ProvisionedAssets> {
        self.assets.as_ref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Feed one inbound buffer. On error the session is reset and the
    /// transport should reconnect.
    pub async fn handle_inbound(&mut self, buffer: &[u8]) -> ViewerResult<()> {
        self.stats.buffers_received += 1;
        match self.route(buffer).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::error!(
                    "[Client::handle_inbound] Session failed after {} buffers: {}",
                    self.stats.buffers_received,
                    e
                );
                self.stats.sessions_failed += 1;
                self.reset();
                Err(e)
            }
        }
    }

    /// Queue a local input event. Events before streaming are dropped.
    pub fn push_input(&mut self, event: InputEvent) -> ViewerResult<()> {
        if !self.handshake.state().is_terminal() {
            log::trace!("[Client::push_input] Dropping {:?} during handshake", event);
            return Ok(());
        }
        self.input.push(event)
    }

    /// Send the accumulated input records, if any
    pub async fn flush_input(&mut self) -> ViewerResult<()> {
        if let Some(message) = self.input.flush() {
            self.send(OutboundMessage::Binary(message)).await?;
            self.stats.input_messages_sent += 1;
        }
        Ok(())
    }

    /// Run queued texture loads
    pub async fn process_texture_jobs(&mut self) -> ViewerResult<usize> {
        let Some(residency) = self.residency.as_mut() else {
            return Ok(0);
        };
        let loaded = residency.process_pending(self.handshake.cache()).await?;
        self.stats.textures_loaded += loaded as u64;
        Ok(loaded)
    }

    pub fn reset(&mut self) {
        self.handshake.reset();
        self.frames = FrameDecoder::new();
        self.input.reset();
        self.residency = None;
        self.assets = None;
    }

    async fn route(&mut self, buffer: &[u8]) -> ViewerResult<()> {
        if self.handshake.state().is_terminal() {
            let batch = self.frames.decode(buffer)?;
            self.stats.frames_decoded += 1;
            if let Some(residency) = self.residency.as_mut() {
                self.sink.on_frame(batch, residency);
            }
            self.process_texture_jobs().await?;
            return Ok(());
        }

        let requests = self.handshake.process_buffer(buffer).await?;
        for request in requests {
            self.send_request(&request).await?;
        }

        if self.handshake.state().is_terminal() {
            let (session, assets) = self.handshake.take_provisioned()?;
            log::info!(
                "[Client::route] Streaming {}: {} effects, {} models, {} instances",
                session.map_name,
                assets.effects.len(),
                assets.models.len(),
                assets.model_instances.len()
            );
            self.sink.on_provisioned(&session, &assets);
            self.residency = Some(TextureResidency::new(session, self.config.texture_job_capacity));
            self.assets = Some(assets);
        }
        Ok(())
    }

    async fn send_request(&mut self, request: &ClientRequest) -> ViewerResult<()> {
        log::debug!("[Client::send_request] Sending {}", request.name());
        self.send(OutboundMessage::Text(request.to_json()?)).await?;
        self.stats.requests_sent += 1;
        Ok(())
    }

    async fn send(&self, message: OutboundMessage) -> ViewerResult<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| ViewerError::ChannelClosed {
                name: "outbound".to_string(),
            })
    }

    /// Drive the session until the inbound channel closes
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<Vec<u8>>,
        mut input_events: mpsc::Receiver<InputEvent>,
    ) -> ViewerResult<ClientStats> {
        let mut input_tick = tokio::time::interval(self.config.input_tick());
        let mut stats_tick = tokio::time::interval(STATS_INTERVAL);
        let mut input_open = true;

        log::info!(
            "[Client::run] Session loop started (input tick {:?})",
            self.config.input_tick()
        );

        loop {
            tokio::select! {
                maybe_buffer = inbound.recv() => {
                    match maybe_buffer {
                        Some(buffer) => self.handle_inbound(&buffer).await?,
                        None => break,
                    }
                }

                maybe_event = input_events.recv(), if input_open => {
                    match maybe_event {
                        Some(event) => self.push_input(event)?,
                        None => input_open = false,
                    }
                }

                _ = input_tick.tick() => {
                    self.flush_input().await?;
                    self.process_texture_jobs().await?;
                }

                _ = stats_tick.tick() => {
                    log::debug!(
                        "[Client::run] {}: {} buffers, {} frames, {} requests, {} input messages",
                        self.handshake.state(),
                        self.stats.buffers_received,
                        self.stats.frames_decoded,
                        self.stats.requests_sent,
                        self.stats.input_messages_sent
                    );
                }
            }
        }

        self.flush_input().await?;
        log::info!("[Client::run] Inbound channel closed, session loop finished");
        Ok(self.stats)
    }
}
