//! The tileset: tile tree, load scheduling and per-frame view updates.

mod traversal;
pub mod view;

use std::collections::HashSet;
use std::sync::Arc;

use crossbeam::channel::Sender;
use glam::DMat4;
use tracing::{debug, info};

use crate::camera::Camera;
use crate::config::TilesetOptions;
use crate::document::{IonEndpoint, TileBlueprint, TilesetDocument};
use crate::error::{Result, TilesError};
use crate::externals::{AssetAccessor, AssetRequest, RequestOutcome, TaskProcessor, TilesetExternals};
use crate::loading::{
    Completion, ContentPipeline, LoadNotifier, LoadPriority, LoadQueues, TileLoadError,
};
use crate::tile::{Tile, TileArena, TileId};
use crate::uri;

use traversal::Traversal;
pub use view::ViewUpdateResult;

/// Base URL of the asset catalog used by [`Tileset::from_ion`].
pub const ION_API_URL: &str = "https://api.cesium.com";

/// A streamed 3D Tiles tileset.
///
/// All methods run on the control thread. Loads progress on workers and
/// are applied when completions are drained, which happens at the start
/// of every [`update_view`](Self::update_view).
pub struct Tileset {
    options: TilesetOptions,
    url: Option<String>,
    ion_asset_id: Option<u32>,
    ion_access_token: Option<String>,

    arena: TileArena,
    root: Option<TileId>,
    root_request: Option<Box<dyn AssetRequest>>,

    pipeline: ContentPipeline,
    queues: LoadQueues,
    previous_frame_number: u32,
    update_result: ViewUpdateResult,
}

fn parse_root_response(url: &str, outcome: RequestOutcome) -> Result<(TilesetDocument, String)> {
    let response = outcome.map_err(|message| TilesError::Transport {
        url: url.to_string(),
        message,
    })?;
    if !response.is_success() {
        return Err(TilesError::Protocol {
            url: url.to_string(),
            status: response.status,
        });
    }
    let document = TilesetDocument::from_slice(&response.data)
        .map_err(|e| TilesError::Document(format!("{url}: {e}")))?;
    Ok((document, response.url))
}

/// Fetch and parse a tileset document, posting the result as a completion.
fn request_document(
    accessor: &Arc<dyn AssetAccessor>,
    tasks: Arc<dyn TaskProcessor>,
    sender: Sender<Completion>,
    url: &str,
) -> Box<dyn AssetRequest> {
    let document_url = url.to_string();
    accessor.request(
        url,
        Box::new(move |outcome| {
            tasks.start_task(Box::new(move || {
                let result = parse_root_response(&document_url, outcome);
                let _ = sender.send(Completion::RootDocument(result));
            }));
        }),
    )
}

impl Tileset {
    fn empty(externals: TilesetExternals, options: TilesetOptions) -> Self {
        Self {
            options,
            url: None,
            ion_asset_id: None,
            ion_access_token: None,
            arena: TileArena::new(),
            root: None,
            root_request: None,
            pipeline: ContentPipeline::new(externals),
            queues: LoadQueues::default(),
            previous_frame_number: 0,
            update_result: ViewUpdateResult::default(),
        }
    }

    /// Start loading the tileset document at `url`. The tileset has no root
    /// until the document arrives.
    pub fn from_url(externals: TilesetExternals, url: &str, options: TilesetOptions) -> Self {
        let mut tileset = Self::empty(externals, options);
        tileset.url = Some(url.to_string());

        info!(%url, "Requesting tileset");
        let externals = tileset.pipeline.externals();
        let request = request_document(
            &externals.asset_accessor,
            Arc::clone(&externals.task_processor),
            tileset.pipeline.sender(),
            url,
        );
        tileset.root_request = Some(request);
        tileset
    }

    /// Start loading an asset from the catalog: resolve its endpoint, then
    /// fetch the tileset document it points to with the returned token.
    pub fn from_ion(
        externals: TilesetExternals,
        asset_id: u32,
        access_token: &str,
        options: TilesetOptions,
    ) -> Self {
        let mut tileset = Self::empty(externals, options);
        tileset.ion_asset_id = Some(asset_id);
        tileset.ion_access_token = Some(access_token.to_string());

        let mut endpoint_url = format!("{ION_API_URL}/v1/assets/{asset_id}/endpoint");
        if !access_token.is_empty() {
            endpoint_url = uri::add_query(&endpoint_url, "access_token", access_token);
        }
        info!(asset_id, "Requesting asset endpoint");

        let externals = tileset.pipeline.externals();
        let accessor = Arc::clone(&externals.asset_accessor);
        let tasks = Arc::clone(&externals.task_processor);
        let sender = tileset.pipeline.sender();
        let endpoint_for_errors = endpoint_url.clone();

        let request = externals.asset_accessor.request(
            &endpoint_url,
            Box::new(move |outcome| {
                let endpoint = outcome
                    .map_err(|message| TilesError::Transport {
                        url: endpoint_for_errors.clone(),
                        message,
                    })
                    .and_then(|response| {
                        if response.is_success() {
                            IonEndpoint::from_slice(&response.data)
                        } else {
                            Err(TilesError::Protocol {
                                url: endpoint_for_errors.clone(),
                                status: response.status,
                            })
                        }
                    });

                match endpoint {
                    Ok(endpoint) => {
                        let url = endpoint.tileset_url();
                        debug!(%url, "Resolved asset endpoint");
                        let request = request_document(&accessor, tasks, sender.clone(), &url);
                        let _ = sender.send(Completion::RootRequest(request));
                    }
                    Err(error) => {
                        let _ = sender.send(Completion::RootDocument(Err(error)));
                    }
                }
            }),
        );
        tileset.root_request = Some(request);
        tileset
    }

    /// Build a tileset from a document that is already in memory. Content
    /// URIs resolve against `base_url`.
    pub fn from_document(
        externals: TilesetExternals,
        document: &TilesetDocument,
        base_url: &str,
        options: TilesetOptions,
    ) -> Result<Self> {
        let mut tileset = Self::empty(externals, options);
        tileset.url = Some(base_url.to_string());
        tileset.install_root(document, base_url)?;
        Ok(tileset)
    }

    fn install_root(&mut self, document: &TilesetDocument, url: &str) -> Result<()> {
        if self.root.is_some() {
            return Err(TilesError::Contract("tileset already has a root".into()));
        }
        let blueprint = TileBlueprint::build(&document.root, url, &DMat4::IDENTITY, None)?;
        let count = blueprint.len();
        self.root = Some(blueprint.insert_as_root(&mut self.arena)?);
        info!(%url, tiles = count, "Loaded tileset");
        Ok(())
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn ion_asset_id(&self) -> Option<u32> {
        self.ion_asset_id
    }

    pub fn ion_access_token(&self) -> Option<&str> {
        self.ion_access_token.as_deref()
    }

    pub fn externals(&self) -> &TilesetExternals {
        self.pipeline.externals()
    }

    pub fn options(&self) -> &TilesetOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut TilesetOptions {
        &mut self.options
    }

    /// The root tile, once the tileset document has been loaded.
    pub fn root(&self) -> Option<TileId> {
        self.root
    }

    pub fn tiles(&self) -> &TileArena {
        &self.arena
    }

    pub fn tile(&self, id: TileId) -> Result<&Tile> {
        self.arena.tile(id)
    }

    /// Handle for renderers that finish preparing resources asynchronously.
    pub fn notifier(&self) -> LoadNotifier {
        self.pipeline.notifier()
    }

    /// Loads dispatched and not yet finished or failed.
    pub fn loads_in_progress(&self) -> usize {
        self.pipeline.loads_in_progress()
    }

    /// Number of the most recent [`update_view`](Self::update_view) call.
    pub fn frame_number(&self) -> u32 {
        self.previous_frame_number
    }

    /// Failures reported since the last call.
    pub fn take_load_errors(&mut self) -> Vec<TileLoadError> {
        self.pipeline.take_errors()
    }

    /// Apply every completion posted so far. Returns how many were applied.
    pub fn process_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Some(completion) = self.pipeline.try_recv() {
            applied += 1;
            match completion {
                Completion::RootDocument(Ok((document, url))) => {
                    self.root_request = None;
                    if let Err(error) = self.install_root(&document, &url) {
                        self.pipeline.report(None, error);
                    }
                }
                Completion::RootDocument(Err(error)) => {
                    self.root_request = None;
                    self.pipeline.report(None, error);
                }
                Completion::RootRequest(request) => {
                    // The document may already have arrived.
                    if self.root.is_none() {
                        self.root_request = Some(request);
                    }
                }
                other => self.pipeline.apply(&mut self.arena, other),
            }
        }
        applied
    }

    /// Load one tile outside of view updates. Returns `false` if the tile
    /// is not `Unloaded`, has no content, or all load slots are taken.
    pub fn load_tile(&mut self, id: TileId) -> Result<bool> {
        self.arena.tile(id)?;
        if self.loads_in_progress() >= self.options.maximum_simultaneous_tile_loads as usize {
            return Ok(false);
        }
        Ok(self.pipeline.load_content(&mut self.arena, id))
    }

    /// Best-effort cancellation of a tile's in-flight content request.
    pub fn cancel_load(&mut self, id: TileId) -> Result<bool> {
        self.arena.tile(id)?;
        Ok(self.pipeline.cancel(&mut self.arena, id))
    }

    /// Free a tile's content and renderer resources so it can be loaded
    /// again later. Fails for tiles in the middle of preparing resources.
    pub fn unload_tile(&mut self, id: TileId) -> Result<bool> {
        self.pipeline.unload(&mut self.arena, id)
    }

    /// Select the tiles to render for `camera` and schedule loads.
    pub fn update_view(&mut self, camera: &Camera) -> &ViewUpdateResult {
        self.process_completions();

        let previous = std::mem::take(&mut self.update_result.tiles_to_render_this_frame);
        self.update_result = ViewUpdateResult::default();

        let Some(root) = self.root else {
            return &self.update_result;
        };

        let last_frame = self.previous_frame_number;
        let current_frame = last_frame.wrapping_add(1);
        self.queues.clear();

        Traversal {
            arena: &mut self.arena,
            camera,
            options: &self.options,
            queues: &mut self.queues,
            result: &mut self.update_result,
            last_frame,
            current_frame,
        }
        .run(root);

        let result = &mut self.update_result;
        let rendered: HashSet<TileId> = result.tiles_to_render_this_frame.iter().copied().collect();
        result.tiles_to_no_longer_render_this_frame = previous
            .into_iter()
            .filter(|id| !rendered.contains(id))
            .collect();
        result.tiles_loading_high_priority = self.queues.len(LoadPriority::High) as u32;
        result.tiles_loading_medium_priority = self.queues.len(LoadPriority::Medium) as u32;
        result.tiles_loading_low_priority = self.queues.len(LoadPriority::Low) as u32;

        self.dispatch_loads();
        self.previous_frame_number = current_frame;

        debug!(
            frame = current_frame,
            rendered = self.update_result.tiles_to_render_this_frame.len(),
            visited = self.update_result.tiles_visited,
            culled = self.update_result.tiles_culled,
            in_flight = self.loads_in_progress(),
            "View updated"
        );
        &self.update_result
    }

    /// Drain the queues, high first, until the load cap is reached. The
    /// rest waits for a later frame.
    fn dispatch_loads(&mut self) {
        let maximum = self.options.maximum_simultaneous_tile_loads as usize;
        for id in self.queues.in_priority_order() {
            if self.pipeline.loads_in_progress() >= maximum {
                break;
            }
            self.pipeline.load_content(&mut self.arena, id);
        }
    }
}

impl Drop for Tileset {
    fn drop(&mut self) {
        if let Some(request) = self.root_request.take() {
            request.cancel();
        }
        self.pipeline.release_all(&mut self.arena);
    }
}

impl std::fmt::Debug for Tileset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tileset")
            .field("url", &self.url)
            .field("ion_asset_id", &self.ion_asset_id)
            .field("root", &self.root)
            .field("tiles", &self.arena.len())
            .field("loads_in_progress", &self.loads_in_progress())
            .finish_non_exhaustive()
    }
}
