pub mod asset_stream;
#[cfg(feature = "native")]
pub mod client;
pub mod cursor;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod input;
pub mod packet;
pub mod protocol;
pub mod render_command;
pub mod session;
pub mod stream_writer;

pub use asset_stream::{
    read_effect, read_ground, read_model, read_texture, EffectDownload, GroundDownload,
    ModelDownload, TextureDownload,
};
#[cfg(feature = "native")]
pub use client::{Client, ClientStats, FrameSink, OutboundMessage};
pub use cursor::BinaryCursor;
pub use error::{malformed_welcome, protocol_error, truncated, NetworkResult};
pub use frame::{FrameDecoder, FrameSection};
pub use handshake::{HandshakeProgress, HandshakeState, HandshakeStateMachine};
pub use input::{InputEvent, MouseButton, OutboundCommandQueue};
pub use packet::{AssetCatalog, ClientRequest, GroundLightParams, TextureCatalog, WelcomeMessage};
pub use protocol::{
    Protocol, DEFAULT_SERVER_URL, SECTION_END_MARKER, TICK_DURATION, TICK_RATE,
};
pub use render_command::{
    Circle3D, Effect3D, HorizontalTexture3D, Model3D, Number3D, PartialCircle2D, Rectangle2D,
    Rectangle3D, RenderCommandBatch, Sprite3D, Texture2D, TextureSize, Trimesh3D, TrimeshShape,
};
pub use session::{Ground3D, GroundLight, SessionContext, TextureIdentityMap};
pub use stream_writer::ServerStreamWriter;
