use std::ops::Range;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::{Result, TilesError};

use super::Tile;

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Identity of one [`TileArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(u32);

/// Stable, non-owning reference to a tile: its slot plus the arena that
/// owns it. A `TileId` from another arena never resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileId {
    arena: ArenaId,
    index: u32,
}

impl TileId {
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    pub fn index(&self) -> usize {
        self.index as usize
    }
}

/// A contiguous run of sibling tiles in an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileRange {
    start: u32,
    len: u32,
}

impl TileRange {
    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn indices(&self) -> Range<u32> {
        self.start..self.start + self.len
    }
}

/// Owns every tile of one tileset. Tiles are never removed individually;
/// children of a tile always occupy consecutive slots.
#[derive(Debug)]
pub struct TileArena {
    id: ArenaId,
    tiles: Vec<Tile>,
}

impl Default for TileArena {
    fn default() -> Self {
        Self::new()
    }
}

impl TileArena {
    pub fn new() -> Self {
        Self {
            id: ArenaId(NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed)),
            tiles: Vec::new(),
        }
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    fn make_id(&self, index: u32) -> TileId {
        TileId {
            arena: self.id,
            index,
        }
    }

    pub fn contains(&self, id: TileId) -> bool {
        id.arena == self.id && id.index() < self.tiles.len()
    }

    pub fn get(&self, id: TileId) -> Option<&Tile> {
        if id.arena != self.id {
            return None;
        }
        self.tiles.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        if id.arena != self.id {
            return None;
        }
        self.tiles.get_mut(id.index())
    }

    /// Like [`get`](Self::get) but reports a foreign or dangling id as a
    /// contract violation.
    pub fn tile(&self, id: TileId) -> Result<&Tile> {
        self.get(id)
            .ok_or_else(|| TilesError::Contract(format!("{id:?} does not belong to this tileset")))
    }

    pub(crate) fn tile_mut(&mut self, id: TileId) -> Result<&mut Tile> {
        self.get_mut(id)
            .ok_or_else(|| TilesError::Contract(format!("{id:?} does not belong to this tileset")))
    }

    /// Add a tile with no parent.
    pub(crate) fn push_root(&mut self, mut tile: Tile) -> TileId {
        let id = self.make_id(self.tiles.len() as u32);
        tile.parent = None;
        tile.children = TileRange::default();
        self.tiles.push(tile);
        id
    }

    /// Append `children` as one contiguous run under `parent`.
    ///
    /// Fails with a contract violation if `parent` already has children.
    pub(crate) fn create_children(&mut self, parent: TileId, children: Vec<Tile>) -> Result<TileRange> {
        let start = self.tiles.len() as u32;
        let parent_tile = self.tile_mut(parent)?;
        if !parent_tile.children.is_empty() {
            return Err(TilesError::Contract(format!(
                "{parent:?} already has {} children",
                parent_tile.children.len()
            )));
        }
        let depth = parent_tile.depth + 1;
        let range = TileRange {
            start,
            len: children.len() as u32,
        };
        parent_tile.children = range;

        for mut child in children {
            child.parent = Some(parent);
            child.depth = depth;
            child.children = TileRange::default();
            self.tiles.push(child);
        }

        Ok(range)
    }

    pub fn children(&self, id: TileId) -> impl ExactSizeIterator<Item = TileId> + '_ {
        let range = self.get(id).map(|t| t.children).unwrap_or_default();
        range.indices().map(move |index| self.make_id(index))
    }

    pub fn parent(&self, id: TileId) -> Option<TileId> {
        self.get(id).and_then(|t| t.parent)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TileId, &Tile)> + '_ {
        self.tiles
            .iter()
            .enumerate()
            .map(move |(index, tile)| (self.make_id(index as u32), tile))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (TileId, &mut Tile)> + '_ {
        let arena = self.id;
        self.tiles.iter_mut().enumerate().map(move |(index, tile)| {
            (
                TileId {
                    arena,
                    index: index as u32,
                },
                tile,
            )
        })
    }
}
