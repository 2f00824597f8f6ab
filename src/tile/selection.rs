/// What the traversal decided for a tile in a given frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionResult {
    /// Not visited in that frame, or visited while `Failed`.
    #[default]
    None,
    /// Visited but outside the view frustum.
    Culled,
    /// Selected for rendering.
    Rendered,
    /// Descendants were traversed instead.
    Refined,
    /// Selected, then replaced by an ancestor because descendants were not ready.
    RenderedAndKicked,
    /// Refined, then replaced by an ancestor because descendants were not ready.
    RefinedAndKicked,
}

/// The selection outcome of the most recent frame a tile was visited in.
///
/// Keeping only the latest frame makes "rendered last frame" an O(1) check:
/// a stale frame number reads back as [`SelectionResult::None`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileSelectionState {
    frame_number: u32,
    result: SelectionResult,
}

impl TileSelectionState {
    pub fn new(frame_number: u32, result: SelectionResult) -> Self {
        Self {
            frame_number,
            result,
        }
    }

    pub fn frame_number(&self) -> u32 {
        self.frame_number
    }

    /// The result recorded for `frame_number`, or `None` if the tile was not
    /// visited in that frame.
    pub fn result(&self, frame_number: u32) -> SelectionResult {
        if self.frame_number == frame_number {
            self.result
        } else {
            SelectionResult::None
        }
    }

    /// Like [`result`](Self::result) but with kicks undone.
    pub fn original_result(&self, frame_number: u32) -> SelectionResult {
        match self.result(frame_number) {
            SelectionResult::RenderedAndKicked => SelectionResult::Rendered,
            SelectionResult::RefinedAndKicked => SelectionResult::Refined,
            other => other,
        }
    }

    pub fn was_kicked(&self, frame_number: u32) -> bool {
        matches!(
            self.result(frame_number),
            SelectionResult::RenderedAndKicked | SelectionResult::RefinedAndKicked
        )
    }

    /// Record that an ancestor took this tile's place in the render set.
    pub fn kick(&mut self) {
        self.result = match self.result {
            SelectionResult::Rendered => SelectionResult::RenderedAndKicked,
            SelectionResult::Refined => SelectionResult::RefinedAndKicked,
            other => other,
        };
    }
}
