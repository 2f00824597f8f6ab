//! Tile nodes and the arena that owns them.

pub mod arena;
pub mod load_state;
pub mod selection;

use std::fmt;
use std::sync::Arc;

use glam::DMat4;

use crate::externals::{AssetRequest, ParsedContent, RendererHandle};
use crate::geometry::BoundingVolume;

pub use arena::{ArenaId, TileArena, TileId, TileRange};
pub use load_state::{LoadState, TileLoadState};
pub use selection::{SelectionResult, TileSelectionState};

/// How a tile's children relate to the tile once they are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refine {
    /// Children render together with the parent.
    Add,
    /// Children supersede the parent.
    Replace,
}

/// One node of the tile tree.
///
/// Everything read from the tileset document is fixed before the tile
/// leaves [`LoadState::Unloaded`] for the first time. Only the load state
/// is written from other threads.
pub struct Tile {
    pub(crate) parent: Option<TileId>,
    pub(crate) children: TileRange,
    pub(crate) depth: u32,

    bounding_volume: BoundingVolume,
    viewer_request_volume: Option<BoundingVolume>,
    geometric_error: f64,
    refine: Option<Refine>,
    transform: DMat4,
    content_uri: Option<String>,
    content_bounding_volume: Option<BoundingVolume>,

    load_state: Arc<TileLoadState>,
    pub(crate) content_request: Option<Box<dyn AssetRequest>>,
    pub(crate) content: Option<ParsedContent>,
    pub(crate) renderer_resources: Option<RendererHandle>,
    /// Content was an external tileset, now spliced in as the only child.
    pub(crate) has_external_tileset: bool,

    pub(crate) last_selection_state: TileSelectionState,
}

impl Tile {
    pub fn new(bounding_volume: BoundingVolume, geometric_error: f64) -> Self {
        Self {
            parent: None,
            children: TileRange::default(),
            depth: 0,
            bounding_volume,
            viewer_request_volume: None,
            geometric_error,
            refine: None,
            transform: DMat4::IDENTITY,
            content_uri: None,
            content_bounding_volume: None,
            load_state: Arc::new(TileLoadState::new()),
            content_request: None,
            content: None,
            renderer_resources: None,
            has_external_tileset: false,
            last_selection_state: TileSelectionState::default(),
        }
    }

    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Distance from the root, which is at depth 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn bounding_volume(&self) -> &BoundingVolume {
        &self.bounding_volume
    }

    pub fn viewer_request_volume(&self) -> Option<&BoundingVolume> {
        self.viewer_request_volume.as_ref()
    }

    pub fn geometric_error(&self) -> f64 {
        self.geometric_error
    }

    pub fn refine(&self) -> Option<Refine> {
        self.refine
    }

    /// Tile-to-tileset transform; the parent's transform is already applied.
    pub fn transform(&self) -> &DMat4 {
        &self.transform
    }

    pub fn content_uri(&self) -> Option<&str> {
        self.content_uri.as_deref()
    }

    pub fn content_bounding_volume(&self) -> Option<&BoundingVolume> {
        self.content_bounding_volume.as_ref()
    }

    pub fn state(&self) -> LoadState {
        self.load_state.get()
    }

    pub fn is_renderable(&self) -> bool {
        self.state() == LoadState::RendererResourcesPrepared
    }

    /// Decoded content, available once the load completes.
    pub fn content(&self) -> Option<&ParsedContent> {
        self.content.as_ref()
    }

    pub fn renderer_resources(&self) -> Option<&RendererHandle> {
        self.renderer_resources.as_ref()
    }

    pub fn last_selection_state(&self) -> &TileSelectionState {
        &self.last_selection_state
    }

    pub(crate) fn load_state(&self) -> &Arc<TileLoadState> {
        &self.load_state
    }

    pub(crate) fn set_viewer_request_volume(&mut self, value: Option<BoundingVolume>) {
        self.viewer_request_volume = value;
    }

    pub(crate) fn set_geometric_error(&mut self, value: f64) {
        self.geometric_error = value;
    }

    pub(crate) fn set_refine(&mut self, value: Option<Refine>) {
        self.refine = value;
    }

    pub(crate) fn set_transform(&mut self, value: DMat4) {
        self.transform = value;
    }

    pub(crate) fn set_content_uri(&mut self, value: Option<String>) {
        self.content_uri = value;
    }

    pub(crate) fn set_content_bounding_volume(&mut self, value: Option<BoundingVolume>) {
        self.content_bounding_volume = value;
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("depth", &self.depth)
            .field("geometric_error", &self.geometric_error)
            .field("refine", &self.refine)
            .field("content_uri", &self.content_uri)
            .field("state", &self.state())
            .field("last_selection_state", &self.last_selection_state)
            .finish_non_exhaustive()
    }
}
