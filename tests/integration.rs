//! End-to-end integration tests.
//!
//! These tests write a small tileset to disk, stream it through the file
//! accessor and glTF decoder on real worker threads, and check what ends
//! up selected.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use glam::{DVec2, DVec3};
use serde_json::json;

use tile_streamer::config::{CameraConfig, ViewerConfig};
use tile_streamer::externals::{
    FileAssetAccessor, GltfContent, GltfContentDecoder, RayonTaskProcessor,
};
use tile_streamer::loading::EXTERNAL_TILESET_GEOMETRIC_ERROR;
use tile_streamer::viewer::{MeshStatsRenderer, local_externals};
use tile_streamer::{
    Camera, LoadState, TileId, Tileset, TilesError, TilesetExternals, TilesetOptions, Viewer,
};

/// A single-triangle binary glTF.
fn triangle_glb() -> Vec<u8> {
    let positions: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    let bin: Vec<u8> = positions.iter().flat_map(|v| v.to_le_bytes()).collect();
    let gltf = json!({
        "asset": { "version": "2.0" },
        "buffers": [{ "byteLength": bin.len() }],
        "bufferViews": [{ "buffer": 0, "byteLength": bin.len() }],
        "accessors": [{
            "bufferView": 0,
            "componentType": 5126,
            "count": 3,
            "type": "VEC3",
            "min": [0.0, 0.0, 0.0],
            "max": [1.0, 1.0, 0.0]
        }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
        "nodes": [{ "mesh": 0 }],
        "scenes": [{ "nodes": [0] }],
        "scene": 0
    });

    let mut json = serde_json::to_vec(&gltf).unwrap();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);
    glb
}

/// Wrap a GLB in a Batched 3D Model header with empty tables.
fn b3dm(glb: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(28 + glb.len());
    out.extend_from_slice(b"b3dm");
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&((28 + glb.len()) as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(glb);
    out
}

fn sphere(x: f64, y: f64, radius: f64) -> serde_json::Value {
    json!({ "sphere": [x, y, 0.0, radius] })
}

/// Root without content over a b3dm leaf, a nested tileset whose root is a
/// GLB, and an empty tile over a leaf whose content file is missing.
fn write_tileset(dir: &Path) {
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(dir.join("near.b3dm"), b3dm(&triangle_glb())).unwrap();
    fs::write(dir.join("nested").join("leaf.glb"), triangle_glb()).unwrap();

    let nested = json!({
        "asset": { "version": "1.0" },
        "geometricError": 1.0,
        "root": {
            "boundingVolume": sphere(0.0, 3.0, 1.0),
            "geometricError": 0.0,
            "content": { "uri": "leaf.glb" },
        },
    });
    fs::write(
        dir.join("nested").join("tileset.json"),
        serde_json::to_vec_pretty(&nested).unwrap(),
    )
    .unwrap();

    let tileset = json!({
        "asset": { "version": "1.0" },
        "geometricError": 500.0,
        "root": {
            "boundingVolume": sphere(0.0, 0.0, 10.0),
            "geometricError": 100.0,
            "refine": "REPLACE",
            "children": [
                {
                    "boundingVolume": sphere(-3.0, 0.0, 2.0),
                    "geometricError": 0.0,
                    "content": { "uri": "near.b3dm" },
                },
                {
                    "boundingVolume": sphere(0.0, 3.0, 2.0),
                    "geometricError": 1.0,
                    "content": { "uri": "nested/tileset.json" },
                },
                {
                    "boundingVolume": sphere(3.0, 0.0, 2.0),
                    "geometricError": 10.0,
                    "children": [{
                        "boundingVolume": sphere(3.0, 0.0, 1.0),
                        "geometricError": 0.0,
                        "content": { "uri": "missing.glb" },
                    }],
                },
            ],
        },
    });
    fs::write(
        dir.join("tileset.json"),
        serde_json::to_vec_pretty(&tileset).unwrap(),
    )
    .unwrap();
}

fn file_externals() -> TilesetExternals {
    let workers = RayonTaskProcessor::with_threads(2).unwrap();
    TilesetExternals::new(
        Arc::new(FileAssetAccessor::with_workers(workers.clone())),
        Arc::new(workers),
        Arc::new(GltfContentDecoder),
    )
}

/// Looking at the origin from 30 units up the -Y axis.
fn camera() -> Camera {
    Camera::look_at(
        DVec3::new(0.0, -30.0, 0.0),
        DVec3::ZERO,
        DVec3::Z,
        DVec2::new(1920.0, 1080.0),
        60f64.to_radians(),
    )
}

/// Update until nothing is queued or in flight.
fn settle(tileset: &mut Tileset, camera: &Camera) -> Vec<TileId> {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        let result = tileset.update_view(camera);
        let rendered = result.tiles_to_render_this_frame.clone();
        let queued = result.tiles_loading();
        if tileset.root().is_some() && queued == 0 && tileset.loads_in_progress() == 0 {
            return rendered;
        }
        assert!(Instant::now() < deadline, "tileset did not settle");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn streams_tileset_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_tileset(dir.path());
    let url = dir.path().join("tileset.json");

    let mut tileset = Tileset::from_url(
        file_externals(),
        url.to_str().unwrap(),
        TilesetOptions::default(),
    );
    let rendered = settle(&mut tileset, &camera());

    let root = tileset.root().unwrap();
    let children: Vec<TileId> = tileset.tiles().children(root).collect();
    let [near, nested, broken] = children[..] else {
        panic!("expected three children, got {children:?}");
    };

    let nested_root = tileset.tiles().children(nested).next().unwrap();
    let missing = tileset.tiles().children(broken).next().unwrap();
    // The empty tile stands in for its failed child.
    assert_eq!(rendered.len(), 3, "rendered {rendered:?}");
    assert!(rendered.contains(&near));
    assert!(rendered.contains(&nested_root));
    assert!(rendered.contains(&broken));

    let near_tile = tileset.tile(near).unwrap();
    let content = near_tile
        .content()
        .and_then(|c| c.downcast_ref::<GltfContent>())
        .unwrap();
    assert_eq!(content.vertex_count(), 3);
    let nested_tile = tileset.tile(nested).unwrap();
    assert!(nested_tile.content().is_none());
    assert_relative_eq!(nested_tile.geometric_error(), EXTERNAL_TILESET_GEOMETRIC_ERROR);
    assert_eq!(tileset.tile(missing).unwrap().state(), LoadState::Failed);

    let errors = tileset.take_load_errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].tile, Some(missing));
    assert!(matches!(errors[0].error, TilesError::Protocol { status: 404, .. }));
}

#[test]
fn missing_tileset_document_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let url = dir.path().join("absent.json");
    let mut tileset = Tileset::from_url(
        file_externals(),
        url.to_str().unwrap(),
        TilesetOptions::default(),
    );

    let deadline = Instant::now() + Duration::from_secs(10);
    let errors = loop {
        tileset.process_completions();
        let errors = tileset.take_load_errors();
        if !errors.is_empty() {
            break errors;
        }
        assert!(Instant::now() < deadline, "no error reported");
        thread::sleep(Duration::from_millis(5));
    };
    assert!(tileset.root().is_none());
    assert_eq!(errors[0].tile, None);
    assert!(matches!(errors[0].error, TilesError::Protocol { status: 404, .. }));
}

#[test]
fn viewer_runs_to_completion() {
    let dir = tempfile::tempdir().unwrap();
    write_tileset(dir.path());

    let config = ViewerConfig {
        tileset: dir.path().join("tileset.json").to_string_lossy().into_owned(),
        camera: CameraConfig {
            position: Some(DVec3::new(0.0, -30.0, 0.0)),
            ..CameraConfig::default()
        },
        frames: 2000,
        frame_interval: Duration::from_millis(2),
        ..ViewerConfig::default()
    };
    let workers = RayonTaskProcessor::with_threads(2).unwrap();

    let result = Viewer::run(&config, local_externals(workers)).unwrap();
    assert!(result.settled);
    assert_eq!(result.tiles_rendered, 3);
    assert_eq!(result.resident_vertices, 6);
    assert_eq!(result.failures, 1);
}

#[test]
fn viewer_fails_without_tileset() {
    let dir = tempfile::tempdir().unwrap();
    let config = ViewerConfig {
        tileset: dir.path().join("nothing.json").to_string_lossy().into_owned(),
        frames: 2000,
        frame_interval: Duration::from_millis(2),
        ..ViewerConfig::default()
    };
    let externals = file_externals().with_renderer(Arc::new(MeshStatsRenderer::default()));

    let err = Viewer::run(&config, externals).unwrap_err();
    assert!(matches!(err, TilesError::Protocol { status: 404, .. }));
}
