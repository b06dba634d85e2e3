//! End-to-end handshake runs against an in-memory cache
//!
//! These tests verify that:
//! - a cold cache downloads every asset class and reaches streaming
//! - a warm cache reconnects without downloading anything
//! - a short buffer mid-handshake resets the session

use glam::{Mat4, Vec3};
use serde_json::json;

use render_link::network::ServerStreamWriter;
use render_link::persistence::records::{
    CacheTable, EffectDefinition, EffectLayer, KeyFrame, KeyFrameKind,
};
use render_link::{
    ClientRequest, HandshakeState, HandshakeStateMachine, MemoryAssetStore, ViewerConfig,
    ViewerError,
};

fn welcome() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "screen_width": 1280,
        "screen_height": 720,
        "map_name": "prt_fild08",
        "projection_mat": vec![0.5; 16],
        "ortho_mat": vec![0.25; 16],
        "ground": {
            "light_dir": [0.0, -1.0, 0.0],
            "light_ambient": [0.3, 0.3, 0.3],
            "light_diffuse": [1.0, 1.0, 1.0],
            "light_opacity": 0.8
        },
        "effect_names": ["firewall"],
        "asset_db": {
            "texture_db": { "entries": {
                "a.bmp": { "id": 0, "hash": "h1", "count": 1 },
                "b.bmp": { "id": 1, "hash": "h2", "count": 1 },
                "ground_texture_atlas": { "id": 2, "hash": "h3", "count": 1 }
            } },
            "model_name_to_index": { "house": 0 }
        }
    }))
    .unwrap()
}

fn firewall() -> EffectDefinition {
    EffectDefinition {
        max_key: 10,
        fps: 60,
        layers: vec![EffectLayer {
            key_frames: vec![KeyFrame {
                frame: 0,
                kind: KeyFrameKind::Fixed,
                pos: [1.0, 2.0],
                xy: [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0],
                color: [1.0, 0.0, 1.0, 1.0],
                angle: 0.5,
                src_blend: 2,
                dst_blend: 6,
                texture_index: 0,
            }],
        }],
        server_texture_indices: vec![0],
    }
}

fn section_end() -> Vec<u8> {
    ServerStreamWriter::new().section_end().as_bytes().to_vec()
}

fn texture_buffer() -> Vec<u8> {
    let mut writer = ServerStreamWriter::new();
    writer
        .texture("a.bmp", "h1", &[(1, 1, vec![1, 2, 3, 4])])
        .texture("b.bmp", "h2", &[(1, 1, vec![5, 6, 7, 8])])
        .texture("ground_texture_atlas", "h3", &[(2, 1, vec![9; 8])])
        .section_end();
    writer.into_bytes()
}

fn effect_buffer() -> Vec<u8> {
    let mut writer = ServerStreamWriter::new();
    writer.effect("firewall", &firewall()).section_end();
    writer.into_bytes()
}

fn ground_buffer() -> Vec<u8> {
    let mut writer = ServerStreamWriter::new();
    writer.ground_vertex_buffer(3, &[0; 36]).section_end();
    writer.into_bytes()
}

fn model_buffer() -> Vec<u8> {
    let mut writer = ServerStreamWriter::new();
    writer
        .model(
            "house",
            &[vec![("a.bmp", 3, vec![0; 36])], vec![("b.bmp", 3, vec![1; 36])]],
        )
        .section_end();
    writer.into_bytes()
}

fn instance_buffer() -> Vec<u8> {
    let mut writer = ServerStreamWriter::new();
    writer.model_instance(0, &Mat4::from_translation(Vec3::new(4.0, 0.0, -2.0)));
    writer.into_bytes()
}

fn feed(hs: &mut HandshakeStateMachine<&MemoryAssetStore>, buffer: &[u8]) -> Vec<ClientRequest> {
    pollster::block_on(hs.process_buffer(buffer)).unwrap()
}

#[test]
fn test_cold_cache_downloads_everything() {
    let store = MemoryAssetStore::new();
    let mut hs = HandshakeStateMachine::new(&store, &ViewerConfig::default());

    assert_eq!(
        feed(&mut hs, &welcome()),
        vec![ClientRequest::MismatchedTextures(vec![
            "a.bmp".into(),
            "b.bmp".into(),
            "ground_texture_atlas".into()
        ])]
    );
    assert_eq!(
        feed(&mut hs, &texture_buffer()),
        vec![ClientRequest::MissingEffects(vec!["firewall".into()])]
    );
    assert_eq!(
        feed(&mut hs, &effect_buffer()),
        vec![ClientRequest::MismatchedVertexBuffers(vec!["3d_ground".into()])]
    );
    assert_eq!(
        feed(&mut hs, &ground_buffer()),
        vec![ClientRequest::MissingModels(vec!["house".into()])]
    );
    assert_eq!(
        feed(&mut hs, &model_buffer()),
        vec![ClientRequest::SendMeModelInstances(true)]
    );
    assert_eq!(feed(&mut hs, &instance_buffer()), vec![ClientRequest::Ready(true)]);
    assert_eq!(hs.state(), HandshakeState::Streaming);

    let progress = hs.progress();
    assert_eq!(progress.downloaded_textures, 3);
    assert_eq!(progress.downloaded_effects, 1);
    assert_eq!(progress.downloaded_models, 1);

    assert_eq!(store.table_len(CacheTable::Textures), 3);
    assert_eq!(store.table_len(CacheTable::TextureData), 3);
    assert_eq!(store.table_len(CacheTable::ModelInfo), 1);
    assert_eq!(store.table_len(CacheTable::Models), 2);
    assert_eq!(store.table_len(CacheTable::VertexArrays), 1);
    assert_eq!(store.table_len(CacheTable::Effects), 1);

    let (session, assets) = hs.take_provisioned().unwrap();
    assert_eq!(session.map_name, "prt_fild08");
    assert_eq!(assets.effects, vec![firewall()]);
    assert_eq!(assets.ground.and_then(|g| g.texture_atlas), Some(2));
    assert_eq!(assets.ground_vertex_array.as_ref().map(|v| v.vertex_count), Some(3));
    assert_eq!(assets.models.len(), 1);
    let ids: Vec<u32> = assets.models[0].faces.iter().map(|f| f.server_texture_id).collect();
    assert_eq!(ids, vec![0, 1]);
    let (instance, model) = assets.model_for_instance(0).unwrap();
    assert_eq!(instance.transform.w_axis.x, 4.0);
    assert_eq!(model.faces.len(), 2);
}

#[test]
fn test_warm_cache_skips_downloads() {
    let store = MemoryAssetStore::new();
    {
        let mut hs = HandshakeStateMachine::new(&store, &ViewerConfig::default());
        for buffer in [
            welcome(),
            texture_buffer(),
            effect_buffer(),
            ground_buffer(),
            model_buffer(),
            instance_buffer(),
        ] {
            feed(&mut hs, &buffer);
        }
        assert_eq!(hs.state(), HandshakeState::Streaming);
    }
    let stored = store.len();

    let mut hs = HandshakeStateMachine::new(&store, &ViewerConfig::default());
    assert_eq!(feed(&mut hs, &welcome()), vec![ClientRequest::MissingEffects(vec![])]);
    assert_eq!(
        feed(&mut hs, &section_end()),
        vec![ClientRequest::MismatchedVertexBuffers(vec![])]
    );
    assert_eq!(feed(&mut hs, &section_end()), vec![ClientRequest::MissingModels(vec![])]);
    assert_eq!(
        feed(&mut hs, &section_end()),
        vec![ClientRequest::SendMeModelInstances(true)]
    );
    assert_eq!(feed(&mut hs, &instance_buffer()), vec![ClientRequest::Ready(true)]);
    assert_eq!(store.len(), stored);

    let progress = hs.progress();
    assert_eq!(progress.downloading_textures, 0);
    assert_eq!(progress.downloading_effects, 0);
    assert_eq!(progress.downloading_models, 0);

    let (_, assets) = hs.take_provisioned().unwrap();
    assert_eq!(assets.effects.len(), 1);
    assert!(assets.ground_vertex_array.is_some());
    assert_eq!(assets.models[0].faces.len(), 2);
}

#[test]
fn test_truncated_model_buffer_resets() {
    let store = MemoryAssetStore::new();
    let mut hs = HandshakeStateMachine::new(&store, &ViewerConfig::default());
    for buffer in [welcome(), texture_buffer(), effect_buffer(), ground_buffer()] {
        feed(&mut hs, &buffer);
    }
    assert_eq!(hs.state(), HandshakeState::ReconcilingModels);

    let models = model_buffer();
    let err = pollster::block_on(hs.process_buffer(&models[..20])).unwrap_err();
    assert!(matches!(err, ViewerError::TruncatedBuffer { .. }));
    assert_eq!(hs.state(), HandshakeState::WaitingForWelcome);
    assert!(hs.session().is_none());

    // Textures survive the reset, so the next attempt only asks for models
    assert_eq!(feed(&mut hs, &welcome()), vec![ClientRequest::MissingEffects(vec![])]);
}

#[test]
fn test_model_face_with_unknown_texture_is_rejected() {
    let store = MemoryAssetStore::new();
    let mut hs = HandshakeStateMachine::new(&store, &ViewerConfig::default());
    for buffer in [welcome(), texture_buffer(), effect_buffer(), ground_buffer()] {
        feed(&mut hs, &buffer);
    }
    let mut writer = ServerStreamWriter::new();
    writer
        .model("house", &[vec![("nowhere.bmp", 3, vec![0; 36])]])
        .section_end();
    let err = pollster::block_on(hs.process_buffer(writer.as_bytes())).unwrap_err();
    assert!(matches!(err, ViewerError::ProtocolError { .. }));
    assert_eq!(hs.state(), HandshakeState::WaitingForWelcome);
}
