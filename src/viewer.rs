use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::camera::Camera;
use crate::config::{CameraConfig, ViewerConfig};
use crate::error::{Result, TilesError};
use crate::externals::{
    GltfContent, LoadThreadResult, ParsedContent, PrepareRendererResources, RendererHandle,
    TileContext, TilesetExternals,
};
use crate::geometry::BoundingVolume;
use crate::tile::{Tile, TileId};
use crate::tileset::{Tileset, ViewUpdateResult};

/// Counters from a viewer run.
#[derive(Debug)]
pub struct ViewerResult {
    pub frames: u32,
    pub tiles_rendered: usize,
    pub resident_vertices: usize,
    pub failures: usize,
    pub settled: bool,
    pub duration: Duration,
}

/// Renderer stand-in: counts vertices of prepared glTF content.
#[derive(Debug, Default)]
pub struct MeshStatsRenderer {
    vertices: AtomicUsize,
}

impl MeshStatsRenderer {
    pub fn resident_vertices(&self) -> usize {
        self.vertices.load(Ordering::Acquire)
    }
}

impl PrepareRendererResources for MeshStatsRenderer {
    fn prepare_in_load_thread(
        &self,
        _context: &TileContext,
        content: &ParsedContent,
    ) -> Result<LoadThreadResult> {
        let vertices = content
            .downcast_ref::<GltfContent>()
            .map_or(0, GltfContent::vertex_count);
        Ok(Box::new(vertices))
    }

    fn prepare_in_main_thread(
        &self,
        _id: TileId,
        _tile: &Tile,
        load_thread_result: LoadThreadResult,
    ) -> Result<Option<RendererHandle>> {
        let vertices = load_thread_result
            .downcast::<usize>()
            .map(|v| *v)
            .map_err(|_| TilesError::Content("unexpected load-thread result".into()))?;
        self.vertices.fetch_add(vertices, Ordering::AcqRel);
        Ok(Some(RendererHandle::new(vertices)))
    }

    fn free(&self, _id: TileId, _tile: &Tile, handle: RendererHandle) {
        if let Some(vertices) = handle.downcast_ref::<usize>() {
            self.vertices.fetch_sub(*vertices, Ordering::AcqRel);
        }
    }
}

/// Per-frame numbers worth logging when they change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FrameCounters {
    visited: u32,
    rendered: usize,
    culled: u32,
    max_depth: u32,
    high: u32,
    medium: u32,
    low: u32,
}

impl From<&ViewUpdateResult> for FrameCounters {
    fn from(result: &ViewUpdateResult) -> Self {
        Self {
            visited: result.tiles_visited,
            rendered: result.tiles_to_render_this_frame.len(),
            culled: result.tiles_culled,
            max_depth: result.max_depth_visited,
            high: result.tiles_loading_high_priority,
            medium: result.tiles_loading_medium_priority,
            low: result.tiles_loading_low_priority,
        }
    }
}

/// Camera from the configuration, filling in what is missing from the
/// root tile's bounding volume: aim at its centre from three radii away.
pub fn camera_for(config: &CameraConfig, root_volume: &BoundingVolume) -> Camera {
    let target = config.target.unwrap_or_else(|| root_volume.center());
    let position = config.position.unwrap_or_else(|| {
        let radius = root_volume.bounding_radius().max(1.0);
        let offset = (config.up + config.up.any_orthonormal_vector()).normalize();
        target + offset * radius * 3.0
    });
    Camera::look_at(position, target, config.up, config.viewport, config.horizontal_fov)
}

/// Host loop: stream a tileset from a fixed viewpoint until loading settles.
pub struct Viewer;

impl Viewer {
    pub fn run(config: &ViewerConfig, externals: TilesetExternals) -> Result<ViewerResult> {
        let start = Instant::now();
        let options = config.tileset_options()?;
        info!(tileset = %config.tileset, ?options, "Starting viewer");

        let mut tileset = Tileset::from_url(externals, &config.tileset, options);
        let mut camera = None;
        let mut last_counters = None;
        let mut result = ViewerResult {
            frames: 0,
            tiles_rendered: 0,
            resident_vertices: 0,
            failures: 0,
            settled: false,
            duration: Duration::ZERO,
        };

        for frame in 0..config.frames {
            if camera.is_none() {
                tileset.process_completions();
                match tileset.root() {
                    Some(root) => {
                        let volume = tileset.tile(root)?.bounding_volume();
                        camera = Some(camera_for(&config.camera, volume));
                    }
                    None => {
                        if let Some(failure) = tileset.take_load_errors().into_iter().next() {
                            return Err(failure.error);
                        }
                        thread::sleep(config.frame_interval);
                        continue;
                    }
                }
            }
            let Some(camera) = &camera else {
                continue;
            };

            let view = tileset.update_view(camera);
            let counters = FrameCounters::from(view);
            let queued = view.tiles_loading();

            if last_counters != Some(counters) {
                info!(
                    frame,
                    visited = counters.visited,
                    rendered = counters.rendered,
                    culled = counters.culled,
                    max_depth = counters.max_depth,
                    loading_high = counters.high,
                    loading_medium = counters.medium,
                    loading_low = counters.low,
                    "Frame"
                );
                last_counters = Some(counters);
            }

            for failure in tileset.take_load_errors() {
                warn!(%failure, "Tile failed to load");
                result.failures += 1;
            }

            result.frames = frame + 1;
            result.tiles_rendered = counters.rendered;
            if queued == 0 && tileset.loads_in_progress() == 0 {
                result.settled = true;
                break;
            }
            thread::sleep(config.frame_interval);
        }

        result.resident_vertices = count_vertices(&tileset);
        result.duration = start.elapsed();
        info!(
            frames = result.frames,
            rendered = result.tiles_rendered,
            settled = result.settled,
            elapsed = ?result.duration,
            "Viewer complete"
        );
        Ok(result)
    }
}

fn count_vertices(tileset: &Tileset) -> usize {
    tileset
        .tiles()
        .iter()
        .filter_map(|(_, tile)| tile.renderer_resources())
        .filter_map(|handle| handle.downcast_ref::<usize>())
        .sum()
}

/// Externals for local tilesets: file reads and decoding on `workers`,
/// glTF content and the vertex-counting renderer.
pub fn local_externals(workers: crate::externals::RayonTaskProcessor) -> TilesetExternals {
    TilesetExternals::new(
        Arc::new(crate::externals::FileAssetAccessor::with_workers(workers.clone())),
        Arc::new(workers),
        Arc::new(crate::externals::GltfContentDecoder),
    )
    .with_renderer(Arc::new(MeshStatsRenderer::default()))
}
