//! Thin-client viewer core: asset reconciliation with a remote simulation
//! server, a persistent asset cache, per-frame render-command decoding and
//! the outbound input stream.

pub mod assets;
pub mod config;
pub mod error;
pub mod network;
pub mod persistence;

pub use assets::{ModelData, ModelFace, ModelInstance, ProvisionedAssets, TextureResidency, TextureState};
pub use config::ViewerConfig;
pub use error::{ErrorContext, ViewerError, ViewerResult};
#[cfg(feature = "native")]
pub use network::{Client, ClientStats, FrameSink, OutboundMessage};
pub use network::{
    ClientRequest, FrameDecoder, HandshakeProgress, HandshakeState, HandshakeStateMachine,
    InputEvent, MouseButton, OutboundCommandQueue, RenderCommandBatch, SessionContext,
    WelcomeMessage,
};
#[cfg(feature = "native")]
pub use persistence::FileAssetStore;
pub use persistence::{AssetCache, AssetKey, AssetRecord, MemoryAssetStore, PersistenceError};
