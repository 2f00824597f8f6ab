use std::sync::atomic::{AtomicU64, Ordering};

/// Where a tile is in its content-readiness pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadState {
    /// Something went wrong while loading; the tile is not retried.
    Failed,
    /// Nothing beyond the tileset document metadata is loaded.
    Unloaded,
    /// The content request is in flight.
    ContentLoading,
    /// Content bytes are decoded.
    ContentLoaded,
    /// Renderer resources are being prepared.
    RendererResourcesPreparing,
    /// Ready to render.
    RendererResourcesPrepared,
}

impl LoadState {
    /// Position in the forward order of the pipeline; `Failed` sorts first.
    pub fn rank(self) -> i8 {
        match self {
            LoadState::Failed => -1,
            LoadState::Unloaded => 0,
            LoadState::ContentLoading => 1,
            LoadState::ContentLoaded => 2,
            LoadState::RendererResourcesPreparing => 3,
            LoadState::RendererResourcesPrepared => 4,
        }
    }

    /// Whether a load is underway (between dispatch and completion).
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            LoadState::ContentLoading
                | LoadState::ContentLoaded
                | LoadState::RendererResourcesPreparing
        )
    }

    fn to_bits(self) -> u64 {
        match self {
            LoadState::Failed => 0,
            LoadState::Unloaded => 1,
            LoadState::ContentLoading => 2,
            LoadState::ContentLoaded => 3,
            LoadState::RendererResourcesPreparing => 4,
            LoadState::RendererResourcesPrepared => 5,
        }
    }

    fn from_bits(bits: u64) -> Self {
        match bits & STATE_MASK {
            0 => LoadState::Failed,
            2 => LoadState::ContentLoading,
            3 => LoadState::ContentLoaded,
            4 => LoadState::RendererResourcesPreparing,
            5 => LoadState::RendererResourcesPrepared,
            _ => LoadState::Unloaded,
        }
    }
}

const STATE_BITS: u32 = 8;
const STATE_MASK: u64 = (1 << STATE_BITS) - 1;

fn pack(state: LoadState, generation: u64) -> u64 {
    (generation << STATE_BITS) | state.to_bits()
}

/// Load state shared between the control thread and load workers.
///
/// The state and a load generation live in one atomic word. Every new
/// load bumps the generation, so a completion from a cancelled request
/// can never be applied to a later load of the same tile.
#[derive(Debug)]
pub struct TileLoadState {
    word: AtomicU64,
}

impl Default for TileLoadState {
    fn default() -> Self {
        Self::new()
    }
}

impl TileLoadState {
    pub fn new() -> Self {
        Self {
            word: AtomicU64::new(pack(LoadState::Unloaded, 0)),
        }
    }

    pub fn get(&self) -> LoadState {
        LoadState::from_bits(self.word.load(Ordering::Acquire))
    }

    /// Current state together with the generation of the load it belongs to.
    pub fn snapshot(&self) -> (LoadState, u64) {
        let word = self.word.load(Ordering::Acquire);
        (LoadState::from_bits(word), word >> STATE_BITS)
    }

    fn compare_exchange(&self, current: u64, new: u64) -> bool {
        self.word
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Unloaded -> to` under a fresh generation, which is returned.
    fn start(&self, to: LoadState) -> Option<u64> {
        let (state, generation) = self.snapshot();
        if state != LoadState::Unloaded {
            return None;
        }
        let next = generation + 1;
        self.compare_exchange(pack(state, generation), pack(to, next))
            .then_some(next)
    }

    /// `Unloaded -> ContentLoading`.
    pub(crate) fn begin_load(&self) -> Option<u64> {
        self.start(LoadState::ContentLoading)
    }

    /// `Unloaded -> RendererResourcesPrepared`, for tiles with no content.
    pub(crate) fn promote_without_content(&self) -> Option<u64> {
        self.start(LoadState::RendererResourcesPrepared)
    }

    /// Move `from -> to` if the tile is still on load `generation`.
    pub(crate) fn advance(&self, generation: u64, from: LoadState, to: LoadState) -> bool {
        self.compare_exchange(pack(from, generation), pack(to, generation))
    }

    /// Mark load `generation` as failed, from whichever loading state it is in.
    pub(crate) fn fail(&self, generation: u64) -> bool {
        let (state, current) = self.snapshot();
        current == generation
            && state.is_loading()
            && self.compare_exchange(pack(state, generation), pack(LoadState::Failed, generation))
    }

    /// `ContentLoading -> Unloaded`. Returns the generation that was abandoned.
    pub(crate) fn cancel(&self) -> Option<u64> {
        let (state, generation) = self.snapshot();
        (state == LoadState::ContentLoading
            && self.compare_exchange(
                pack(state, generation),
                pack(LoadState::Unloaded, generation),
            ))
        .then_some(generation)
    }

    /// Unconditionally return to `Unloaded`, keeping the generation.
    pub(crate) fn reset(&self) {
        let (_, generation) = self.snapshot();
        self.word
            .store(pack(LoadState::Unloaded, generation), Ordering::Release);
    }
}
