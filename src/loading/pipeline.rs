use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::{
    Completion, EXTERNAL_TILESET_GEOMETRIC_ERROR, LoadCounter, LoadNotifier, TileLoadError,
};
use crate::document::{TileBlueprint, TilesetDocument};
use crate::error::{Result, TilesError};
use crate::externals::{
    ContentDecoder, DecodeOutcome, LoadThreadResult, ParsedContent, PrepareRendererResources,
    RendererHandle, RequestOutcome, TileContext, TilesetExternals,
};
use crate::tile::{LoadState, TileArena, TileId, TileLoadState};

/// Drives tiles from `Unloaded` to `RendererResourcesPrepared`.
///
/// Workers never touch the arena: they move the shared load state forward
/// and post a [`Completion`], which is applied on the control thread.
pub(crate) struct ContentPipeline {
    externals: TilesetExternals,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
    loads_in_progress: LoadCounter,
    errors: Vec<TileLoadError>,
}

/// Everything a worker needs to finish one content load.
struct LoadJob {
    context: TileContext,
    generation: u64,
    load_state: Arc<TileLoadState>,
    decoder: Arc<dyn ContentDecoder>,
    prepare: Option<Arc<dyn PrepareRendererResources>>,
    sender: Sender<Completion>,
}

enum Decoded {
    Content {
        content: ParsedContent,
        load_result: Option<LoadThreadResult>,
    },
    Nested {
        document: TilesetDocument,
        base_url: String,
    },
}

impl LoadJob {
    fn run(self, outcome: RequestOutcome) {
        let tile = self.context.tile;
        let generation = self.generation;

        if self.load_state.snapshot() != (LoadState::ContentLoading, generation) {
            debug!(?tile, generation, "Discarding response for a cancelled load");
            return;
        }

        let completion = match self.decode(outcome) {
            Ok(Decoded::Content {
                content,
                load_result,
            }) => self
                .load_state
                .advance(generation, LoadState::ContentLoading, LoadState::ContentLoaded)
                .then(|| Completion::ContentReady {
                    tile,
                    generation,
                    content,
                    load_result,
                }),
            Ok(Decoded::Nested { document, base_url }) => self
                .load_state
                .advance(generation, LoadState::ContentLoading, LoadState::ContentLoaded)
                .then(|| Completion::ExternalTileset {
                    tile,
                    generation,
                    document,
                    base_url,
                }),
            Err(error) => self.load_state.fail(generation).then(|| Completion::Failed {
                tile,
                generation,
                error,
            }),
        };

        match completion {
            Some(completion) => {
                // The receiver only disappears with the tileset.
                let _ = self.sender.send(completion);
            }
            None => debug!(?tile, generation, "Load was cancelled while decoding"),
        }
    }

    fn decode(&self, outcome: RequestOutcome) -> Result<Decoded> {
        let url = &self.context.url;
        let response = outcome.map_err(|message| TilesError::Transport {
            url: url.clone(),
            message,
        })?;
        if !response.is_success() {
            return Err(TilesError::Protocol {
                url: url.clone(),
                status: response.status,
            });
        }

        match self.decoder.decode(&self.context, &response.data)? {
            DecodeOutcome::Geometry(content) => {
                let load_result = match &self.prepare {
                    Some(prepare) => Some(prepare.prepare_in_load_thread(&self.context, &content)?),
                    None => None,
                };
                Ok(Decoded::Content {
                    content,
                    load_result,
                })
            }
            DecodeOutcome::NestedDocument(document) => Ok(Decoded::Nested {
                document,
                base_url: response.url,
            }),
            DecodeOutcome::Unrecognized => {
                let document = TilesetDocument::from_slice(&response.data).map_err(|e| {
                    TilesError::Document(format!("{url}: not decodable content or tileset: {e}"))
                })?;
                Ok(Decoded::Nested {
                    document,
                    base_url: response.url,
                })
            }
        }
    }
}

impl ContentPipeline {
    pub(crate) fn new(externals: TilesetExternals) -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            externals,
            sender,
            receiver,
            loads_in_progress: LoadCounter::default(),
            errors: Vec::new(),
        }
    }

    pub(crate) fn externals(&self) -> &TilesetExternals {
        &self.externals
    }

    pub(crate) fn sender(&self) -> Sender<Completion> {
        self.sender.clone()
    }

    pub(crate) fn notifier(&self) -> LoadNotifier {
        LoadNotifier::new(self.sender.clone())
    }

    pub(crate) fn loads_in_progress(&self) -> usize {
        self.loads_in_progress.get()
    }

    pub(crate) fn try_recv(&self) -> Option<Completion> {
        self.receiver.try_recv().ok()
    }

    /// Log a failure and keep it for [`take_errors`](Self::take_errors).
    pub(crate) fn report(&mut self, tile: Option<TileId>, error: TilesError) {
        if error.is_contract_violation() {
            error!(?tile, %error, "Contract violation");
        } else {
            warn!(?tile, %error, "Tile load failed");
        }
        self.errors.push(TileLoadError { tile, error });
    }

    pub(crate) fn take_errors(&mut self) -> Vec<TileLoadError> {
        std::mem::take(&mut self.errors)
    }

    /// Start loading `id` if it is `Unloaded`. Tiles without content become
    /// renderable at once. Returns whether a request was dispatched.
    pub(crate) fn load_content(&mut self, arena: &mut TileArena, id: TileId) -> bool {
        let Some(tile) = arena.get_mut(id) else {
            self.report(
                Some(id),
                TilesError::Contract(format!("{id:?} does not belong to this tileset")),
            );
            return false;
        };

        let Some(url) = tile.content_uri().map(str::to_owned) else {
            if tile.load_state().promote_without_content().is_some() {
                debug!(tile = ?id, "Tile has no content, ready to render");
            }
            return false;
        };

        let Some(generation) = tile.load_state().begin_load() else {
            return false;
        };
        self.loads_in_progress.increment();

        let job = LoadJob {
            context: TileContext {
                tile: id,
                url: url.clone(),
                transform: *tile.transform(),
                bounding_volume: *tile.bounding_volume(),
            },
            generation,
            load_state: Arc::clone(tile.load_state()),
            decoder: Arc::clone(&self.externals.content_decoder),
            prepare: self.externals.prepare_renderer_resources.clone(),
            sender: self.sender.clone(),
        };
        let tasks = Arc::clone(&self.externals.task_processor);

        debug!(tile = ?id, %url, generation, "Requesting tile content");
        let request = self.externals.asset_accessor.request(
            &url,
            Box::new(move |outcome| {
                tasks.start_task(Box::new(move || job.run(outcome)));
            }),
        );
        tile.content_request = Some(request);
        true
    }

    /// Abandon an in-flight request. Only a tile still in `ContentLoading`
    /// can be cancelled; it returns to `Unloaded` and frees its load slot.
    pub(crate) fn cancel(&mut self, arena: &mut TileArena, id: TileId) -> bool {
        let Some(tile) = arena.get_mut(id) else {
            return false;
        };
        let Some(generation) = tile.load_state().cancel() else {
            return false;
        };
        if let Some(request) = tile.content_request.take() {
            request.cancel();
        }
        self.loads_in_progress.decrement();
        debug!(tile = ?id, generation, "Cancelled content load");
        true
    }

    /// Drop a tile's content and renderer resources, returning it to
    /// `Unloaded`. Tiles whose content was an external tileset stay loaded.
    pub(crate) fn unload(&mut self, arena: &mut TileArena, id: TileId) -> Result<bool> {
        let state = arena.tile(id)?.state();
        match state {
            LoadState::Unloaded => Ok(false),
            LoadState::ContentLoading => Ok(self.cancel(arena, id)),
            LoadState::ContentLoaded | LoadState::RendererResourcesPreparing => {
                Err(TilesError::Contract(format!(
                    "{id:?} cannot be unloaded while in {state:?}"
                )))
            }
            LoadState::Failed | LoadState::RendererResourcesPrepared => {
                let tile = arena.tile_mut(id)?;
                if tile.has_external_tileset {
                    return Ok(false);
                }
                let handle = tile.renderer_resources.take();
                if let (Some(handle), Some(prepare)) =
                    (handle, &self.externals.prepare_renderer_resources)
                {
                    prepare.free(id, tile, handle);
                }
                tile.content = None;
                tile.load_state().reset();
                debug!(tile = ?id, "Unloaded tile");
                Ok(true)
            }
        }
    }

    /// Cancel every request and free every renderer handle.
    pub(crate) fn release_all(&mut self, arena: &mut TileArena) {
        let prepare = self.externals.prepare_renderer_resources.clone();
        for (id, tile) in arena.iter_mut() {
            if let Some(request) = tile.content_request.take() {
                request.cancel();
            }
            if let (Some(handle), Some(prepare)) = (tile.renderer_resources.take(), &prepare) {
                prepare.free(id, tile, handle);
            }
        }
    }

    /// Apply a worker result on the control thread.
    pub(crate) fn apply(&mut self, arena: &mut TileArena, completion: Completion) {
        match completion {
            Completion::ContentReady {
                tile,
                generation,
                content,
                load_result,
            } => self.content_ready(arena, tile, generation, content, load_result),
            Completion::ExternalTileset {
                tile,
                generation,
                document,
                base_url,
            } => self.external_tileset(arena, tile, generation, &document, &base_url),
            Completion::RendererResourcesReady { tile, handle } => {
                self.finish_renderer_resources(arena, tile, handle)
            }
            Completion::Failed {
                tile,
                generation,
                error,
            } => {
                self.loads_in_progress.decrement();
                if let Some(t) = arena.get_mut(tile) {
                    t.content_request = None;
                }
                debug!(?tile, generation, "Content load failed");
                self.report(Some(tile), error);
            }
            Completion::RootDocument(_) | Completion::RootRequest(_) => {
                debug!("Root document is handled by the tileset");
            }
        }
    }

    fn content_ready(
        &mut self,
        arena: &mut TileArena,
        id: TileId,
        generation: u64,
        content: ParsedContent,
        load_result: Option<LoadThreadResult>,
    ) {
        let Some(tile) = arena.get_mut(id) else {
            return self.report(Some(id), TilesError::Contract(format!("{id:?} is unknown")));
        };
        let state = Arc::clone(tile.load_state());
        if state.snapshot() != (LoadState::ContentLoaded, generation) {
            debug!(tile = ?id, generation, "Discarding stale content");
            return;
        }

        tile.content_request = None;
        tile.content = Some(content);
        state.advance(
            generation,
            LoadState::ContentLoaded,
            LoadState::RendererResourcesPreparing,
        );

        let Some(prepare) = self.externals.prepare_renderer_resources.clone() else {
            state.advance(
                generation,
                LoadState::RendererResourcesPreparing,
                LoadState::RendererResourcesPrepared,
            );
            self.loads_in_progress.decrement();
            debug!(tile = ?id, "Tile content ready");
            return;
        };

        let load_result = load_result.unwrap_or_else(|| Box::new(()));
        match prepare.prepare_in_main_thread(id, tile, load_result) {
            Ok(Some(handle)) => self.finish_renderer_resources(arena, id, handle),
            Ok(None) => debug!(tile = ?id, "Waiting for renderer resources"),
            Err(error) => {
                state.fail(generation);
                self.loads_in_progress.decrement();
                self.report(Some(id), error);
            }
        }
    }

    fn finish_renderer_resources(&mut self, arena: &mut TileArena, id: TileId, handle: RendererHandle) {
        let Some(tile) = arena.get_mut(id) else {
            return self.report(
                Some(id),
                TilesError::Contract(format!("renderer resources finished for unknown {id:?}")),
            );
        };

        let (state, generation) = tile.load_state().snapshot();
        if state != LoadState::RendererResourcesPreparing {
            if let Some(prepare) = &self.externals.prepare_renderer_resources {
                prepare.free(id, tile, handle);
            }
            return self.report(
                Some(id),
                TilesError::Contract(format!(
                    "renderer resources finished for {id:?} while in {state:?}"
                )),
            );
        }

        tile.renderer_resources = Some(handle);
        tile.load_state().advance(
            generation,
            LoadState::RendererResourcesPreparing,
            LoadState::RendererResourcesPrepared,
        );
        self.loads_in_progress.decrement();
        debug!(tile = ?id, "Renderer resources ready");
    }

    fn external_tileset(
        &mut self,
        arena: &mut TileArena,
        id: TileId,
        generation: u64,
        document: &TilesetDocument,
        base_url: &str,
    ) {
        let Some(tile) = arena.get(id) else {
            return self.report(Some(id), TilesError::Contract(format!("{id:?} is unknown")));
        };
        let state = Arc::clone(tile.load_state());
        if state.snapshot() != (LoadState::ContentLoaded, generation) {
            debug!(tile = ?id, generation, "Discarding stale external tileset");
            return;
        }

        let spliced = if tile.has_children() {
            Err(TilesError::Contract(format!(
                "{id:?} already has children, cannot attach external tileset {base_url}"
            )))
        } else {
            let transform = *tile.transform();
            let refine = tile.refine();
            TileBlueprint::build(&document.root, base_url, &transform, refine).and_then(|blueprint| {
                let count = blueprint.len();
                blueprint.insert_under(arena, id).map(|_| count)
            })
        };

        self.loads_in_progress.decrement();
        let Some(tile) = arena.get_mut(id) else {
            return;
        };
        tile.content_request = None;

        match spliced {
            Ok(count) => {
                tile.set_geometric_error(EXTERNAL_TILESET_GEOMETRIC_ERROR);
                tile.has_external_tileset = true;
                state.advance(
                    generation,
                    LoadState::ContentLoaded,
                    LoadState::RendererResourcesPreparing,
                );
                state.advance(
                    generation,
                    LoadState::RendererResourcesPreparing,
                    LoadState::RendererResourcesPrepared,
                );
                info!(tile = ?id, url = %base_url, tiles = count, "Attached external tileset");
            }
            Err(error) => {
                state.fail(generation);
                self.report(Some(id), error);
            }
        }
    }
}
