pub mod camera;
pub mod config;
pub mod document;
pub mod error;
pub mod externals;
pub mod geometry;
pub mod loading;
pub mod tile;
pub mod tileset;
pub mod uri;
pub mod viewer;

pub use camera::{Camera, CullingVolume};
pub use config::{TilesetOptions, ViewerConfig};
pub use document::TilesetDocument;
pub use error::{Result, TilesError};
pub use externals::{
    AssetAccessor, AssetRequest, AssetResponse, ContentDecoder, DecodeOutcome,
    PrepareRendererResources, RendererHandle, TaskProcessor, TileContext, TilesetExternals,
};
pub use geometry::{BoundingVolume, CullingResult};
pub use loading::{LoadNotifier, TileLoadError};
pub use tile::{LoadState, Refine, SelectionResult, Tile, TileArena, TileId};
pub use tileset::{Tileset, ViewUpdateResult};
pub use viewer::{Viewer, ViewerResult};
