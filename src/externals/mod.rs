//! Collaborator interfaces consumed by the tileset: asset fetching, task
//! scheduling, content decoding and renderer resource preparation.
//!
//! The crate ships one implementation of each that needs no host:
//! [`FileAssetAccessor`], [`RayonTaskProcessor`] / [`ImmediateTaskProcessor`]
//! and [`GltfContentDecoder`].

pub mod file_accessor;
pub mod gltf_decoder;
pub mod task;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use glam::DMat4;

use crate::document::TilesetDocument;
use crate::error::Result;
use crate::geometry::BoundingVolume;
use crate::tile::{Tile, TileId};

pub use file_accessor::FileAssetAccessor;
pub use gltf_decoder::{ContentFormat, GltfContent, GltfContentDecoder};
pub use task::{ImmediateTaskProcessor, RayonTaskProcessor};

/// Decoded tile content. The core stores it on the tile without looking inside.
pub type ParsedContent = Box<dyn Any + Send + Sync>;

/// Whatever the load-thread preparation phase hands to the main-thread phase.
pub type LoadThreadResult = Box<dyn Any + Send>;

/// Opaque renderer-side resources of one tile.
pub struct RendererHandle(Box<dyn Any + Send + Sync>);

impl RendererHandle {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }
}

impl fmt::Debug for RendererHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RendererHandle(..)")
    }
}

/// A completed fetch. `status` follows HTTP semantics even for local files.
#[derive(Debug, Clone)]
pub struct AssetResponse {
    pub url: String,
    pub status: u16,
    pub data: Vec<u8>,
}

impl AssetResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// `Err` carries a transport failure message: no response was received.
pub type RequestOutcome = std::result::Result<AssetResponse, String>;

pub type RequestCallback = Box<dyn FnOnce(RequestOutcome) + Send>;

/// An in-flight request. Dropping the handle does not cancel it.
pub trait AssetRequest: Send {
    fn url(&self) -> &str;

    /// Best-effort cancellation. The callback may still fire afterwards.
    fn cancel(&self);
}

/// Fetches bytes by URL.
///
/// `on_complete` must be called at most once, from any thread, unless the
/// request was cancelled, in which case it may be dropped instead.
pub trait AssetAccessor: Send + Sync {
    fn request(&self, url: &str, on_complete: RequestCallback) -> Box<dyn AssetRequest>;
}

pub type Task = Box<dyn FnOnce() + Send>;

/// Runs work off the control thread. No ordering between tasks is implied.
pub trait TaskProcessor: Send + Sync {
    fn start_task(&self, task: Task);
}

/// What a content decoder knows about the tile it is decoding.
#[derive(Debug, Clone)]
pub struct TileContext {
    pub tile: TileId,
    pub url: String,
    pub transform: DMat4,
    pub bounding_volume: BoundingVolume,
}

/// Result of looking at a tile's content bytes.
pub enum DecodeOutcome {
    /// Renderable geometry.
    Geometry(ParsedContent),
    /// The content is itself a tileset document.
    NestedDocument(TilesetDocument),
    /// Not a format this decoder handles; the bytes are retried as a
    /// tileset document.
    Unrecognized,
}

impl fmt::Debug for DecodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeOutcome::Geometry(_) => f.write_str("Geometry(..)"),
            DecodeOutcome::NestedDocument(_) => f.write_str("NestedDocument(..)"),
            DecodeOutcome::Unrecognized => f.write_str("Unrecognized"),
        }
    }
}

/// Turns fetched bytes into content. Runs on a worker task.
///
/// An `Err` means the format was recognized but the data is broken; the
/// tile fails without a nested-document retry.
pub trait ContentDecoder: Send + Sync {
    fn decode(&self, context: &TileContext, data: &[u8]) -> Result<DecodeOutcome>;
}

/// Two-phase creation of renderer resources.
///
/// `prepare_in_load_thread` runs on a worker right after decoding.
/// `prepare_in_main_thread` runs on the control thread while completions
/// are drained; returning `Ok(None)` means the renderer will finish later
/// through [`LoadNotifier::finish_prepare_renderer_resources`].
///
/// [`LoadNotifier::finish_prepare_renderer_resources`]: crate::loading::LoadNotifier::finish_prepare_renderer_resources
pub trait PrepareRendererResources: Send + Sync {
    fn prepare_in_load_thread(
        &self,
        context: &TileContext,
        content: &ParsedContent,
    ) -> Result<LoadThreadResult>;

    fn prepare_in_main_thread(
        &self,
        id: TileId,
        tile: &Tile,
        load_thread_result: LoadThreadResult,
    ) -> Result<Option<RendererHandle>>;

    fn free(&self, id: TileId, tile: &Tile, handle: RendererHandle);
}

/// The collaborator handles a tileset works with.
#[derive(Clone)]
pub struct TilesetExternals {
    pub asset_accessor: Arc<dyn AssetAccessor>,
    pub task_processor: Arc<dyn TaskProcessor>,
    pub content_decoder: Arc<dyn ContentDecoder>,
    pub prepare_renderer_resources: Option<Arc<dyn PrepareRendererResources>>,
}

impl TilesetExternals {
    pub fn new(
        asset_accessor: Arc<dyn AssetAccessor>,
        task_processor: Arc<dyn TaskProcessor>,
        content_decoder: Arc<dyn ContentDecoder>,
    ) -> Self {
        Self {
            asset_accessor,
            task_processor,
            content_decoder,
            prepare_renderer_resources: None,
        }
    }

    pub fn with_renderer(mut self, prepare: Arc<dyn PrepareRendererResources>) -> Self {
        self.prepare_renderer_resources = Some(prepare);
        self
    }
}

impl fmt::Debug for TilesetExternals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TilesetExternals")
            .field(
                "prepare_renderer_resources",
                &self.prepare_renderer_resources.is_some(),
            )
            .finish_non_exhaustive()
    }
}
