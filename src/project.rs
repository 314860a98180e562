use crate::grid::{GridCell, GridGeometry};
use crate::highlight::{HighlightBatch, HighlightCell};
use crate::trail::TRAIL_LIMIT;

/// How the base layer should draw a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellClass {
    None,
    /// Cell currently (or last) under the pointer.
    Active,
    /// Older trail entry; rank 1 is the most recent after the active cell.
    Trailing(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRenderDescriptor {
    pub cell: GridCell,
    pub class: CellClass,
}

/// Everything the renderer needs for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub geometry: GridGeometry,
    /// One entry per cell, row-major.
    pub cells: Vec<CellRenderDescriptor>,
    /// Colored highlight layer, drawn over the base layer.
    pub overlay: Vec<HighlightCell>,
}

impl Frame {
    pub fn empty(geometry: GridGeometry) -> Self {
        Self {
            geometry,
            cells: Vec::new(),
            overlay: Vec::new(),
        }
    }

    #[cfg(test)]
    pub fn descriptor(&self, cell: GridCell) -> Option<&CellRenderDescriptor> {
        if !self.geometry.contains(cell) {
            return None;
        }
        let idx = cell.row as usize * self.geometry.cols as usize + cell.col as usize;
        self.cells.get(idx)
    }
}

/// Combine geometry, trail and highlight state into per-cell descriptors.
///
/// `trail` is oldest first. The newest entry is always `Active`; older
/// entries are `Trailing(rank)` only while the pointer is active. A cell that
/// appears in the trail more than once takes its most recent rank. Overlay
/// cells outside the grid are dropped.
pub fn project(
    geometry: &GridGeometry,
    trail: &[GridCell],
    active_pointer: bool,
    batch: &HighlightBatch,
) -> Frame {
    if geometry.is_degenerate() {
        return Frame::empty(*geometry);
    }

    let cells = geometry
        .cells()
        .map(|cell| CellRenderDescriptor {
            cell,
            class: classify(cell, trail, active_pointer),
        })
        .collect();

    let overlay = batch
        .iter()
        .filter(|h| geometry.contains(h.cell))
        .cloned()
        .collect();

    Frame {
        geometry: *geometry,
        cells,
        overlay,
    }
}

fn classify(cell: GridCell, trail: &[GridCell], active_pointer: bool) -> CellClass {
    let Some(rank) = trail.iter().rev().position(|&c| c == cell) else {
        return CellClass::None;
    };
    match rank {
        0 => CellClass::Active,
        r if active_pointer && r < TRAIL_LIMIT => CellClass::Trailing(r as u8),
        _ => CellClass::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::{IdAllocator, Tone};
    use std::time::Duration;

    fn geometry(rows: u32, cols: u32) -> GridGeometry {
        GridGeometry {
            rows,
            cols,
            cell_size: 10.0,
        }
    }

    fn class_of(frame: &Frame, row: u32, col: u32) -> CellClass {
        frame.descriptor(GridCell::new(row, col)).expect("in grid").class
    }

    #[test]
    fn degenerate_grid_projects_nothing() {
        let trail = [GridCell::new(0, 0)];
        let frame = project(&geometry(0, 0), &trail, true, &HighlightBatch::default());
        assert!(frame.cells.is_empty());
        assert!(frame.overlay.is_empty());
    }

    #[test]
    fn one_descriptor_per_cell_in_row_major_order() {
        let g = geometry(3, 4);
        let frame = project(&g, &[], false, &HighlightBatch::default());
        assert_eq!(frame.cells.len(), 12);
        assert_eq!(frame.cells[5].cell, GridCell::new(1, 1));
        assert!(frame.cells.iter().all(|d| d.class == CellClass::None));
    }

    #[test]
    fn trail_ranks_by_recency() {
        let g = geometry(1, 6);
        let trail: Vec<_> = (0..5).map(|c| GridCell::new(0, c)).collect();
        let frame = project(&g, &trail, true, &HighlightBatch::default());

        assert_eq!(class_of(&frame, 0, 4), CellClass::Active);
        assert_eq!(class_of(&frame, 0, 3), CellClass::Trailing(1));
        assert_eq!(class_of(&frame, 0, 0), CellClass::Trailing(4));
        assert_eq!(class_of(&frame, 0, 5), CellClass::None);
    }

    #[test]
    fn inactive_pointer_keeps_only_active_cell() {
        let g = geometry(1, 3);
        let trail = [GridCell::new(0, 0), GridCell::new(0, 1)];
        let frame = project(&g, &trail, false, &HighlightBatch::default());
        assert_eq!(class_of(&frame, 0, 1), CellClass::Active);
        assert_eq!(class_of(&frame, 0, 0), CellClass::None);
    }

    #[test]
    fn repeated_cell_uses_most_recent_rank() {
        let g = geometry(1, 3);
        let a = GridCell::new(0, 0);
        let b = GridCell::new(0, 1);
        let frame = project(&g, &[a, b, a], true, &HighlightBatch::default());
        assert_eq!(class_of(&frame, 0, 0), CellClass::Active);
        assert_eq!(class_of(&frame, 0, 1), CellClass::Trailing(1));
    }

    #[test]
    fn overlay_is_independent_of_base_layer() {
        let g = geometry(2, 2);
        let batch = HighlightBatch {
            cells: vec![HighlightCell {
                cell: GridCell::new(0, 0),
                tone: Tone::Coral,
                id: IdAllocator::default().next_id(),
                delay: Duration::from_millis(100),
            }],
        };
        let trail = [GridCell::new(0, 0), GridCell::new(1, 1)];
        let frame = project(&g, &trail, true, &batch);
        assert_eq!(class_of(&frame, 0, 0), CellClass::Trailing(1));
        assert_eq!(frame.overlay.len(), 1);
        assert_eq!(frame.overlay[0].tone, Tone::Coral);
    }

    #[test]
    fn overlay_outside_grid_is_dropped() {
        let batch = HighlightBatch {
            cells: vec![HighlightCell {
                cell: GridCell::new(5, 5),
                tone: Tone::Mint,
                id: IdAllocator::default().next_id(),
                delay: Duration::ZERO,
            }],
        };
        let frame = project(&geometry(2, 2), &[], false, &batch);
        assert!(frame.overlay.is_empty());
    }
}
