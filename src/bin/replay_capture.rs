//! Replay a captured server stream through the viewer pipeline
//!
//! Usage: replay_capture <capture_dir> [config.toml]
//!
//! The capture directory holds one file per inbound message, replayed in file
//! name order (000.bin, 001.bin, ...). Requests the client would send are
//! printed, as is a summary of every decoded frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::mpsc;

use render_link::network::{Client, FrameSink, OutboundMessage};
use render_link::{
    FileAssetStore, ProvisionedAssets, RenderCommandBatch, SessionContext, TextureResidency,
    ViewerConfig,
};

struct SummarySink {
    frames: u64,
}

impl FrameSink for SummarySink {
    fn on_provisioned(&mut self, session: &Arc<SessionContext>, assets: &ProvisionedAssets) {
        println!(
            "provisioned map {} ({}x{}): {} effects, {} models, {} instances",
            session.map_name,
            session.screen_width,
            session.screen_height,
            assets.effects.len(),
            assets.models.len(),
            assets.model_instances.len()
        );
    }

    fn on_frame(&mut self, batch: &RenderCommandBatch, textures: &mut TextureResidency) {
        self.frames += 1;
        for texture in &batch.textures_2d {
            textures.request(texture.server_texture_id);
        }
        println!("frame {}: {}", self.frames, batch.summary());
    }
}

fn capture_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "bin") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let Some(capture_dir) = args.next().map(PathBuf::from) else {
        bail!("usage: replay_capture <capture_dir> [config.toml]");
    };
    let config = match args.next() {
        Some(path) => ViewerConfig::load(&path).with_context(|| format!("loading {}", path))?,
        None => ViewerConfig::default(),
    };

    let files = capture_files(&capture_dir)?;
    if files.is_empty() {
        bail!("no .bin files in {}", capture_dir.display());
    }
    log::info!("Replaying {} messages from {}", files.len(), capture_dir.display());

    let store = FileAssetStore::open(config.cache_dir.clone())
        .await
        .with_context(|| format!("opening cache at {}", config.cache_dir.display()))?;

    let (outbound_tx, mut outbound_rx) = mpsc::channel(config.outbound_queue_capacity);
    let printer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            match message {
                OutboundMessage::Text(text) => println!("-> {}", text),
                OutboundMessage::Binary(bytes) => println!("-> {} input bytes", bytes.len()),
            }
        }
    });

    let mut client = Client::new(store, config, SummarySink { frames: 0 }, outbound_tx)?;
    for file in &files {
        let buffer = tokio::fs::read(file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        client
            .handle_inbound(&buffer)
            .await
            .with_context(|| format!("replaying {}", file.display()))?;
    }
    client.process_texture_jobs().await?;

    let stats = client.stats();
    let progress = client.handshake().progress();
    println!(
        "state {}: {} buffers, {} frames, {} requests, {} textures loaded",
        client.state(),
        stats.buffers_received,
        stats.frames_decoded,
        stats.requests_sent,
        stats.textures_loaded
    );
    println!(
        "downloaded {} textures, {} effects, {} models",
        progress.downloaded_textures, progress.downloaded_effects, progress.downloaded_models
    );

    drop(client);
    printer.await?;
    Ok(())
}
