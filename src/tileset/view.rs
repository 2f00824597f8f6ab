use crate::tile::TileId;

/// Outcome of one [`Tileset::update_view`](crate::Tileset::update_view) call,
/// valid until the next call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewUpdateResult {
    /// Every tile selected this frame, in traversal order.
    pub tiles_to_render_this_frame: Vec<TileId>,
    /// Tiles selected last frame that are not selected this frame.
    pub tiles_to_no_longer_render_this_frame: Vec<TileId>,

    /// Tiles that passed the cull test and were evaluated.
    pub tiles_visited: u32,
    pub tiles_culled: u32,
    pub max_depth_visited: u32,

    pub tiles_loading_high_priority: u32,
    pub tiles_loading_medium_priority: u32,
    pub tiles_loading_low_priority: u32,
}

impl ViewUpdateResult {
    /// Tiles queued for loading this frame across all priorities.
    pub fn tiles_loading(&self) -> u32 {
        self.tiles_loading_high_priority
            + self.tiles_loading_medium_priority
            + self.tiles_loading_low_priority
    }
}
