use std::sync::atomic::{AtomicUsize, Ordering};

use crate::tile::TileId;

/// Urgency class of a queued load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadPriority {
    /// The tile is about to be rendered.
    High,
    /// Sibling preloading.
    Medium,
    /// Ancestor preloading.
    Low,
}

/// Queue lengths at some point during traversal, used to drop every load
/// a subtree queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueMark {
    high: usize,
    medium: usize,
    low: usize,
}

/// Tiles the current frame wants loaded, by priority. Rebuilt every frame.
#[derive(Debug, Default)]
pub(crate) struct LoadQueues {
    high: Vec<TileId>,
    medium: Vec<TileId>,
    low: Vec<TileId>,
}

impl LoadQueues {
    pub(crate) fn clear(&mut self) {
        self.high.clear();
        self.medium.clear();
        self.low.clear();
    }

    pub(crate) fn push(&mut self, priority: LoadPriority, tile: TileId) {
        match priority {
            LoadPriority::High => self.high.push(tile),
            LoadPriority::Medium => self.medium.push(tile),
            LoadPriority::Low => self.low.push(tile),
        }
    }

    pub(crate) fn mark(&self) -> QueueMark {
        QueueMark {
            high: self.high.len(),
            medium: self.medium.len(),
            low: self.low.len(),
        }
    }

    /// Forget everything queued since `mark`.
    pub(crate) fn truncate(&mut self, mark: QueueMark) {
        self.high.truncate(mark.high);
        self.medium.truncate(mark.medium);
        self.low.truncate(mark.low);
    }

    pub(crate) fn len(&self, priority: LoadPriority) -> usize {
        match priority {
            LoadPriority::High => self.high.len(),
            LoadPriority::Medium => self.medium.len(),
            LoadPriority::Low => self.low.len(),
        }
    }

    /// High first, then medium, then low.
    pub(crate) fn in_priority_order(&self) -> impl Iterator<Item = TileId> + '_ {
        self.high
            .iter()
            .chain(&self.medium)
            .chain(&self.low)
            .copied()
    }
}

/// Number of loads between dispatch and their terminal completion.
#[derive(Debug, Default)]
pub struct LoadCounter(AtomicUsize);

impl LoadCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn increment(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Saturates at zero.
    pub(crate) fn decrement(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::geometry::BoundingSphere;
    use crate::tile::{Tile, TileArena};

    fn ids(n: usize) -> Vec<TileId> {
        let mut arena = TileArena::new();
        (0..n)
            .map(|_| arena.push_root(Tile::new(BoundingSphere::new(DVec3::ZERO, 1.0).into(), 1.0)))
            .collect()
    }

    #[test]
    fn drains_in_priority_order() {
        let t = ids(3);
        let mut queues = LoadQueues::default();
        queues.push(LoadPriority::Low, t[0]);
        queues.push(LoadPriority::High, t[1]);
        queues.push(LoadPriority::Medium, t[2]);
        assert_eq!(queues.in_priority_order().collect::<Vec<_>>(), vec![t[1], t[2], t[0]]);
        assert_eq!(queues.len(LoadPriority::High), 1);
    }

    #[test]
    fn truncate_to_mark() {
        let t = ids(4);
        let mut queues = LoadQueues::default();
        queues.push(LoadPriority::High, t[0]);
        let mark = queues.mark();
        queues.push(LoadPriority::High, t[1]);
        queues.push(LoadPriority::Medium, t[2]);
        queues.push(LoadPriority::Low, t[3]);
        queues.truncate(mark);
        assert_eq!(queues.in_priority_order().collect::<Vec<_>>(), vec![t[0]]);
    }

    #[test]
    fn counter_saturates() {
        let counter = LoadCounter::default();
        counter.decrement();
        assert_eq!(counter.get(), 0);
        counter.increment();
        counter.increment();
        counter.decrement();
        assert_eq!(counter.get(), 1);
    }
}
