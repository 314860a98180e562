use std::collections::VecDeque;

use crate::grid::GridCell;

/// Maximum number of cells kept in the pointer trail.
pub const TRAIL_LIMIT: usize = 5;

/// Observable state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailState {
    /// No trail, pointer not over the grid.
    Idle,
    /// Trail populated; pointer present (possibly resting).
    Tracking,
}

/// Bounded, time-decaying history of cells under the pointer.
///
/// The tracker only holds state. Scheduling the idle decay belongs to the
/// owner, which calls [`PointerTrail::decay`] once the pointer has rested for
/// the idle timeout.
pub struct PointerTrail {
    /// Oldest first, newest last. Never two equal neighbours.
    cells: VecDeque<GridCell>,
    /// Pointer moved recently; trailing cells animate while set.
    active: bool,
    /// Last cell the pointer was seen over.
    last_cell: Option<GridCell>,
}

impl PointerTrail {
    pub fn new() -> Self {
        Self {
            cells: VecDeque::with_capacity(TRAIL_LIMIT + 1),
            active: false,
            last_cell: None,
        }
    }

    /// Record pointer movement. `cell` is `None` when the pointer is over no
    /// grid cell; that still counts as movement. Returns true if anything
    /// observable changed.
    pub fn pointer_move(&mut self, cell: Option<GridCell>) -> bool {
        let mut changed = !self.active;
        self.active = true;

        if let Some(cell) = cell {
            self.last_cell = Some(cell);
            if self.cells.back() != Some(&cell) {
                self.cells.push_back(cell);
                if self.cells.len() > TRAIL_LIMIT {
                    self.cells.pop_front();
                }
                changed = true;
            }
        }
        changed
    }

    /// Pointer rested for the idle timeout: stop animating the trail and keep
    /// only the newest cell.
    pub fn decay(&mut self) -> bool {
        let had_tail = self.cells.len() > 1;
        let was_active = self.active;
        if had_tail {
            let newest = self.cells.len() - 1;
            self.cells.drain(..newest);
        }
        self.active = false;
        had_tail || was_active
    }

    /// Pointer left the tracked area.
    pub fn leave(&mut self) -> bool {
        let changed = self.active || !self.cells.is_empty() || self.last_cell.is_some();
        self.cells.clear();
        self.last_cell = None;
        self.active = false;
        changed
    }

    /// Forget recorded cells after the grid changed shape. The pointer flag
    /// is left alone.
    pub fn reset_cells(&mut self) -> bool {
        let changed = !self.cells.is_empty() || self.last_cell.is_some();
        self.cells.clear();
        self.last_cell = None;
        changed
    }

    pub fn state(&self) -> TrailState {
        if self.cells.is_empty() {
            TrailState::Idle
        } else {
            TrailState::Tracking
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn last_cell(&self) -> Option<GridCell> {
        self.last_cell
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Snapshot of the trail, oldest first.
    pub fn snapshot(&self) -> Vec<GridCell> {
        self.cells.iter().copied().collect()
    }
}
