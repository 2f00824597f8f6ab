//! Asynchronous content loading: the per-tile pipeline, the completion
//! channel it reports through and the priority queues feeding it.

pub mod pipeline;
pub mod scheduler;

use std::fmt;

use crossbeam::channel::Sender;

use crate::document::TilesetDocument;
use crate::error::{Result, TilesError};
use crate::externals::{AssetRequest, LoadThreadResult, ParsedContent, RendererHandle};
use crate::tile::TileId;

pub(crate) use pipeline::ContentPipeline;
pub use scheduler::{LoadCounter, LoadPriority};
pub(crate) use scheduler::LoadQueues;

/// Geometric error given to a tile whose content turned out to be an
/// external tileset, so traversal always refines past it.
pub const EXTERNAL_TILESET_GEOMETRIC_ERROR: f64 = 9_999_999_999.0;

/// Messages from workers (and renderers) to the control thread.
pub(crate) enum Completion {
    ContentReady {
        tile: TileId,
        generation: u64,
        content: ParsedContent,
        load_result: Option<LoadThreadResult>,
    },
    ExternalTileset {
        tile: TileId,
        generation: u64,
        document: TilesetDocument,
        base_url: String,
    },
    RendererResourcesReady {
        tile: TileId,
        handle: RendererHandle,
    },
    Failed {
        tile: TileId,
        generation: u64,
        error: TilesError,
    },
    /// The root tileset document and the URL it was fetched from.
    RootDocument(Result<(TilesetDocument, String)>),
    /// A root document request started off the control thread, handed
    /// back so the tileset can cancel it.
    RootRequest(Box<dyn AssetRequest>),
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::ContentReady { tile, generation, .. } => f
                .debug_struct("ContentReady")
                .field("tile", tile)
                .field("generation", generation)
                .finish_non_exhaustive(),
            Completion::ExternalTileset { tile, base_url, .. } => f
                .debug_struct("ExternalTileset")
                .field("tile", tile)
                .field("base_url", base_url)
                .finish_non_exhaustive(),
            Completion::RendererResourcesReady { tile, .. } => f
                .debug_struct("RendererResourcesReady")
                .field("tile", tile)
                .finish_non_exhaustive(),
            Completion::Failed { tile, error, .. } => f
                .debug_struct("Failed")
                .field("tile", tile)
                .field("error", error)
                .finish_non_exhaustive(),
            Completion::RootDocument(result) => f
                .debug_tuple("RootDocument")
                .field(&result.as_ref().map(|(_, url)| url))
                .finish(),
            Completion::RootRequest(request) => {
                f.debug_tuple("RootRequest").field(&request.url()).finish()
            }
        }
    }
}

/// Hands finished renderer resources back to a tileset. Cheap to clone and
/// usable from any thread; the tileset applies the result the next time it
/// drains completions.
#[derive(Debug, Clone)]
pub struct LoadNotifier {
    sender: Sender<Completion>,
}

impl LoadNotifier {
    pub(crate) fn new(sender: Sender<Completion>) -> Self {
        Self { sender }
    }

    /// Complete renderer preparation for `tile`. Returns `false` if the
    /// tileset no longer exists.
    pub fn finish_prepare_renderer_resources(&self, tile: TileId, handle: RendererHandle) -> bool {
        self.sender
            .send(Completion::RendererResourcesReady { tile, handle })
            .is_ok()
    }
}

/// A failure observed while loading, kept until the host collects it with
/// [`Tileset::take_load_errors`](crate::Tileset::take_load_errors).
#[derive(Debug)]
pub struct TileLoadError {
    /// `None` for failures of the root document.
    pub tile: Option<TileId>,
    pub error: TilesError,
}

impl fmt::Display for TileLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.tile {
            Some(tile) => write!(f, "tile {}: {}", tile.index(), self.error),
            None => write!(f, "tileset: {}", self.error),
        }
    }
}
