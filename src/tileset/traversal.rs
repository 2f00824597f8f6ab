//! Per-frame level-of-detail selection.
//!
//! Depth-first walk from the root: cull, compare screen-space error
//! against the budget, then either render the tile or refine into its
//! children nearest first. A replace-refined parent whose selected
//! descendants are not all renderable, and none of which were on screen
//! last frame, is rendered in their place so coverage never has holes.
//! Additive parents are drawn alongside their children instead.

use tracing::trace;

use crate::camera::Camera;
use crate::config::TilesetOptions;
use crate::loading::{LoadPriority, LoadQueues};
use crate::tile::{LoadState, Refine, SelectionResult, Tile, TileArena, TileId, TileSelectionState};

use super::view::ViewUpdateResult;

/// Summary a visit hands back to its parent. Lives only on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TraversalDetails {
    /// Every tile selected in the subtree is renderable.
    pub all_are_renderable: bool,
    /// Some tile selected in the subtree was rendered last frame.
    pub any_were_rendered_last_frame: bool,
    /// Selected tiles in the subtree still waiting on content. Only reset
    /// when the loading descendant limit drops the subtree's loads.
    pub not_yet_renderable_count: u32,
}

impl Default for TraversalDetails {
    fn default() -> Self {
        Self {
            all_are_renderable: true,
            any_were_rendered_last_frame: false,
            not_yet_renderable_count: 0,
        }
    }
}

impl TraversalDetails {
    fn merge(&mut self, child: TraversalDetails) {
        self.all_are_renderable &= child.all_are_renderable;
        self.any_were_rendered_last_frame |= child.any_were_rendered_last_frame;
        self.not_yet_renderable_count += child.not_yet_renderable_count;
    }
}

pub(crate) struct Traversal<'a> {
    pub arena: &'a mut TileArena,
    pub camera: &'a Camera,
    pub options: &'a TilesetOptions,
    pub queues: &'a mut LoadQueues,
    pub result: &'a mut ViewUpdateResult,
    pub last_frame: u32,
    pub current_frame: u32,
}

impl Traversal<'_> {
    pub(crate) fn run(&mut self, root: TileId) -> TraversalDetails {
        self.visit_tile_if_visible(root, false)
    }

    fn is_renderable(&self, id: TileId) -> bool {
        self.arena.get(id).is_some_and(Tile::is_renderable)
    }

    fn select(&mut self, id: TileId, result: SelectionResult) {
        if let Some(tile) = self.arena.get_mut(id) {
            tile.last_selection_state = TileSelectionState::new(self.current_frame, result);
        }
    }

    /// Queue `id` if it is `Unloaded` and the camera is inside its viewer
    /// request volume. Tiles without content are made renderable here
    /// instead of taking a queue slot. Returns whether the tile was handled.
    fn queue_load(&mut self, priority: LoadPriority, id: TileId) -> bool {
        let Some(tile) = self.arena.get(id) else {
            return false;
        };
        if tile.state() != LoadState::Unloaded {
            return false;
        }
        if tile
            .viewer_request_volume()
            .is_some_and(|volume| !volume.contains(self.camera.position()))
        {
            return false;
        }
        if tile.content_uri().is_none() {
            tile.load_state().promote_without_content();
            return true;
        }
        self.queues.push(priority, id);
        true
    }

    fn visit_tile_if_visible(&mut self, id: TileId, ancestor_meets_sse: bool) -> TraversalDetails {
        let Some(tile) = self.arena.get(id) else {
            return TraversalDetails::default();
        };

        if !self.camera.is_bounding_volume_visible(tile.bounding_volume()) {
            self.result.tiles_culled += 1;
            self.select(id, SelectionResult::Culled);
            if self.options.preload_siblings {
                self.queue_load(LoadPriority::Medium, id);
            }
            return TraversalDetails::default();
        }

        self.visit_tile(id, ancestor_meets_sse)
    }

    /// Put `id` in the render set as a selection leaf.
    fn render(&mut self, id: TileId, last_result: SelectionResult, load: bool) -> TraversalDetails {
        if load {
            self.queue_load(LoadPriority::High, id);
        }
        self.select(id, SelectionResult::Rendered);
        self.result.tiles_to_render_this_frame.push(id);

        let renderable = self.is_renderable(id);
        TraversalDetails {
            all_are_renderable: renderable,
            any_were_rendered_last_frame: last_result == SelectionResult::Rendered,
            not_yet_renderable_count: u32::from(!renderable),
        }
    }

    fn visit_tile(&mut self, id: TileId, mut ancestor_meets_sse: bool) -> TraversalDetails {
        let Some(tile) = self.arena.get(id) else {
            return TraversalDetails::default();
        };

        self.result.tiles_visited += 1;
        self.result.max_depth_visited = self.result.max_depth_visited.max(tile.depth());

        let last_state = tile.last_selection_state;
        let last_result = last_state.result(self.last_frame);
        let original_last_result = last_state.original_result(self.last_frame);
        let refine = tile.refine().unwrap_or(Refine::Replace);

        // Never drawn and never refined into; the parent keeps covering.
        if tile.state() == LoadState::Failed {
            self.select(id, SelectionResult::None);
            return TraversalDetails {
                all_are_renderable: false,
                any_were_rendered_last_frame: false,
                not_yet_renderable_count: 0,
            };
        }

        let distance = self.camera.distance_squared_to(tile.bounding_volume()).sqrt();
        let sse = self.camera.screen_space_error(tile.geometric_error(), distance);
        let meets_sse = sse <= self.options.maximum_screen_space_error;
        trace!(tile = ?id, sse, meets_sse, "Visiting tile");

        if !tile.has_children() {
            return self.render(id, last_result, true);
        }

        let mut queued_for_load = false;

        if meets_sse || ancestor_meets_sse {
            // Rendering this tile is fine unless it would make detail that
            // was on screen last frame vanish before this tile can replace it.
            let render_this_tile = matches!(
                original_last_result,
                SelectionResult::Rendered | SelectionResult::Culled | SelectionResult::None
            ) || tile.is_renderable();

            if render_this_tile {
                return self.render(id, last_result, meets_sse);
            }

            // Keep drawing last frame's descendants; load this tile quickly.
            ancestor_meets_sse = true;
            if meets_sse {
                queued_for_load = self.queue_load(LoadPriority::High, id);
            }
        }

        let first_rendered_descendant = self.result.tiles_to_render_this_frame.len();
        let queue_mark = self.queues.mark();

        let mut details = self.visit_visible_children_near_to_far(id, ancestor_meets_sse);

        if refine == Refine::Replace
            && !details.all_are_renderable
            && !details.any_were_rendered_last_frame
        {
            self.kick_descendants(id, first_rendered_descendant);
            self.result.tiles_to_render_this_frame.push(id);
            self.select(id, SelectionResult::Rendered);

            let was_rendered_last_frame = last_result == SelectionResult::Rendered;
            let was_really_rendered_last_frame = was_rendered_last_frame && self.is_renderable(id);

            if !was_really_rendered_last_frame
                && details.not_yet_renderable_count > self.options.loading_descendant_limit
            {
                // Too many descendants to wait for: load this tile first.
                self.queues.truncate(queue_mark);
                if !queued_for_load {
                    self.queue_load(LoadPriority::High, id);
                }
                queued_for_load = true;
                details.not_yet_renderable_count = u32::from(!self.is_renderable(id));
                trace!(tile = ?id, "Loading descendant limit exceeded");
            } else if !queued_for_load {
                queued_for_load = self.queue_load(LoadPriority::High, id);
            }

            details.all_are_renderable = self.is_renderable(id);
            details.any_were_rendered_last_frame = was_rendered_last_frame;
        } else if refine == Refine::Add {
            // Additive refinement draws the parent under whichever children
            // are ready; they add detail and are never replaced by it.
            if !queued_for_load {
                queued_for_load = self.queue_load(LoadPriority::High, id);
            }
            self.result
                .tiles_to_render_this_frame
                .insert(first_rendered_descendant, id);
            self.select(id, SelectionResult::Rendered);

            let renderable = self.is_renderable(id);
            details.all_are_renderable &= renderable;
            details.any_were_rendered_last_frame |= last_result == SelectionResult::Rendered;
            details.not_yet_renderable_count += u32::from(!renderable);
        } else {
            self.select(id, SelectionResult::Refined);
        }

        if self.options.preload_ancestors && !queued_for_load {
            self.queue_load(LoadPriority::Low, id);
        }

        details
    }

    /// Take every tile rendered since `first` out of the render set, marking
    /// it and its ancestors up to `id` as kicked.
    fn kick_descendants(&mut self, id: TileId, first: usize) {
        for index in first..self.result.tiles_to_render_this_frame.len() {
            let mut work = Some(self.result.tiles_to_render_this_frame[index]);
            while let Some(work_id) = work {
                if work_id == id {
                    break;
                }
                let Some(tile) = self.arena.get_mut(work_id) else {
                    break;
                };
                if tile.last_selection_state.was_kicked(self.current_frame) {
                    break;
                }
                tile.last_selection_state.kick();
                work = tile.parent();
            }
        }
        self.result.tiles_to_render_this_frame.truncate(first);
    }

    fn visit_visible_children_near_to_far(
        &mut self,
        id: TileId,
        ancestor_meets_sse: bool,
    ) -> TraversalDetails {
        let mut children: Vec<(TileId, f64)> = self
            .arena
            .children(id)
            .filter_map(|child| {
                self.arena
                    .get(child)
                    .map(|tile| (child, self.camera.distance_squared_to(tile.bounding_volume())))
            })
            .collect();
        children.sort_by(|a, b| a.1.total_cmp(&b.1));

        let mut details = TraversalDetails::default();
        for (child, _) in children {
            details.merge(self.visit_tile_if_visible(child, ancestor_meets_sse));
        }
        details
    }
}
