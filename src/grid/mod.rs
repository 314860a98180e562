//! Grid geometry derived from the viewport.
//! Cells are square; the grid always covers the whole viewport, so the last
//! row and column may be partially visible.

/// Cell size used when no usable value is configured.
pub const DEFAULT_CELL_SIZE: f32 = 48.0;
/// Smallest configured cell size accepted, in pixels.
pub const MIN_CELL_SIZE: f32 = 4.0;
/// Grids above this many cells are treated as degenerate.
pub const MAX_CELLS: u64 = 1 << 20;

/// A cell addressed by its position in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub row: u32,
    pub col: u32,
}

impl GridCell {
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }
}

/// Rows, columns and cell size, always replaced together.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub rows: u32,
    pub cols: u32,
    pub cell_size: f32,
}

impl GridGeometry {
    /// A grid with no cells.
    pub const fn empty(cell_size: f32) -> Self {
        Self {
            rows: 0,
            cols: 0,
            cell_size,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// True when the grid has no cells at all.
    pub fn is_degenerate(&self) -> bool {
        self.cell_count() == 0
    }

    pub fn contains(&self, cell: GridCell) -> bool {
        cell.row < self.rows && cell.col < self.cols
    }

    /// Map a viewport position to the cell under it.
    /// Returns `None` for positions outside the grid.
    pub fn cell_at(&self, x: f32, y: f32) -> Option<GridCell> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let row = (y / self.cell_size).floor();
        let col = (x / self.cell_size).floor();
        if row >= self.rows as f32 || col >= self.cols as f32 {
            return None;
        }
        let cell = GridCell::new(row as u32, col as u32);
        self.contains(cell).then_some(cell)
    }

    /// Top-left corner of a cell in viewport pixels.
    pub fn cell_origin(&self, cell: GridCell) -> (f32, f32) {
        (
            cell.col as f32 * self.cell_size,
            cell.row as f32 * self.cell_size,
        )
    }

    /// Every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = GridCell> {
        let cols = self.cols;
        (0..self.rows).flat_map(move |row| (0..cols).map(move |col| GridCell::new(row, col)))
    }
}

/// Compute the grid covering a viewport. Non-finite or non-positive viewport
/// sides produce zero rows/columns on that axis; a grid of more than
/// `MAX_CELLS` cells comes back empty.
pub fn compute_geometry(viewport_height: f32, viewport_width: f32, cell_size: f32) -> GridGeometry {
    let cell_size = sanitize_cell_size(Some(cell_size));
    let rows = span(viewport_height, cell_size);
    let cols = span(viewport_width, cell_size);
    if rows as u64 * cols as u64 > MAX_CELLS {
        return GridGeometry::empty(cell_size);
    }
    GridGeometry {
        rows,
        cols,
        cell_size,
    }
}

fn span(extent: f32, cell_size: f32) -> u32 {
    if !extent.is_finite() || extent <= 0.0 {
        return 0;
    }
    (extent / cell_size).ceil().min(u32::MAX as f32) as u32
}

/// Anything that can report the preferred cell size (theme value, env var, ...).
pub trait CellSizeSource {
    /// Current configured size in pixels, or `None` when unset.
    fn cell_size(&self) -> Option<f32>;
}

/// Constant cell size source.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub struct FixedCellSize(pub Option<f32>);

#[cfg(test)]
impl CellSizeSource for FixedCellSize {
    fn cell_size(&self) -> Option<f32> {
        self.0
    }
}

/// Resolve a configured cell size, falling back to the default when it is
/// missing, non-finite or below `MIN_CELL_SIZE`.
pub fn resolve_cell_size(raw: Option<f32>) -> f32 {
    sanitize_cell_size(raw)
}

fn sanitize_cell_size(raw: Option<f32>) -> f32 {
    match raw {
        Some(v) if v.is_finite() && v >= MIN_CELL_SIZE => v,
        _ => DEFAULT_CELL_SIZE,
    }
}

/// Polls a [`CellSizeSource`] and warns about an unusable value once per
/// distinct value rather than on every poll.
#[derive(Debug, Default)]
pub struct CellSizeWatch {
    /// Bit pattern of the last raw value seen; `Some(None)` means unset.
    last_raw: Option<Option<u32>>,
    warnings: u32,
}

impl CellSizeWatch {
    pub fn poll(&mut self, source: &dyn CellSizeSource) -> f32 {
        let raw = source.cell_size();
        let size = resolve_cell_size(raw);
        let key = Some(raw.map(f32::to_bits));
        if key != self.last_raw {
            self.last_raw = key;
            if let Some(v) = raw.filter(|&v| v != size) {
                self.warnings += 1;
                log::warn!(
                    "Unusable cell size {v}px (minimum {MIN_CELL_SIZE}px), falling back to {DEFAULT_CELL_SIZE}px"
                );
            }
        }
        size
    }

    /// Number of fallback warnings logged so far.
    pub fn warnings(&self) -> u32 {
        self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_and_cols_round_up() {
        let g = compute_geometry(100.0, 250.0, 48.0);
        assert_eq!(g.rows, 3); // 100 / 48 = 2.08
        assert_eq!(g.cols, 6); // 250 / 48 = 5.2
        assert_eq!(g.cell_size, 48.0);

        let exact = compute_geometry(96.0, 48.0, 48.0);
        assert_eq!((exact.rows, exact.cols), (2, 1));
    }

    #[test]
    fn ceil_property_holds_across_sizes() {
        for h in [0.0f32, 1.0, 47.9, 48.0, 480.5, 1080.0] {
            for w in [0.0f32, 3.0, 64.0, 1919.0, 1920.0] {
                for size in [4.0f32, 7.5, 32.0, 48.0] {
                    let g = compute_geometry(h, w, size);
                    assert_eq!(g.rows, (h / size).ceil() as u32, "h={h} size={size}");
                    assert_eq!(g.cols, (w / size).ceil() as u32, "w={w} size={size}");
                }
            }
        }
    }

    #[test]
    fn zero_viewport_is_degenerate() {
        let g = compute_geometry(0.0, 0.0, 48.0);
        assert_eq!((g.rows, g.cols), (0, 0));
        assert!(g.is_degenerate());
        assert_eq!(g.cells().count(), 0);
    }

    #[test]
    fn bad_cell_size_uses_default() {
        assert_eq!(compute_geometry(10.0, 10.0, f32::NAN).cell_size, DEFAULT_CELL_SIZE);
        assert_eq!(compute_geometry(10.0, 10.0, 0.0).cell_size, DEFAULT_CELL_SIZE);
        assert_eq!(resolve_cell_size(None), DEFAULT_CELL_SIZE);
        assert_eq!(resolve_cell_size(Some(f32::INFINITY)), DEFAULT_CELL_SIZE);
        assert_eq!(resolve_cell_size(Some(-4.0)), DEFAULT_CELL_SIZE);
        assert_eq!(resolve_cell_size(Some(32.0)), 32.0);
    }

    #[test]
    fn tiny_cell_size_keeps_grid_bounded() {
        assert_eq!(resolve_cell_size(Some(0.01)), DEFAULT_CELL_SIZE);
        assert_eq!(resolve_cell_size(Some(MIN_CELL_SIZE)), MIN_CELL_SIZE);

        let g = compute_geometry(1080.0, 1920.0, 0.01);
        assert_eq!(g.cell_size, DEFAULT_CELL_SIZE);
        assert!((g.cell_count() as u64) < 1_000_000);

        let smallest = compute_geometry(1080.0, 1920.0, MIN_CELL_SIZE);
        assert_eq!((smallest.rows, smallest.cols), (270, 480));
    }

    #[test]
    fn oversized_viewport_is_degenerate() {
        let g = compute_geometry(1.0e6, 1.0e6, MIN_CELL_SIZE);
        assert!(g.is_degenerate());
        assert_eq!(g.cells().count(), 0);
    }

    #[test]
    fn watch_warns_once_per_distinct_value() {
        let mut watch = CellSizeWatch::default();
        for _ in 0..5 {
            assert_eq!(watch.poll(&FixedCellSize(Some(0.5))), DEFAULT_CELL_SIZE);
        }
        assert_eq!(watch.warnings(), 1);

        assert_eq!(watch.poll(&FixedCellSize(Some(f32::NAN))), DEFAULT_CELL_SIZE);
        assert_eq!(watch.poll(&FixedCellSize(Some(f32::NAN))), DEFAULT_CELL_SIZE);
        assert_eq!(watch.warnings(), 2);

        assert_eq!(watch.poll(&FixedCellSize(Some(24.0))), 24.0);
        assert_eq!(watch.poll(&FixedCellSize(None)), DEFAULT_CELL_SIZE);
        assert_eq!(watch.warnings(), 2);

        watch.poll(&FixedCellSize(Some(0.5)));
        assert_eq!(watch.warnings(), 3);
    }

    #[test]
    fn cell_at_floors_and_bounds() {
        let g = compute_geometry(100.0, 100.0, 50.0);
        assert_eq!(g.cell_at(0.0, 0.0), Some(GridCell::new(0, 0)));
        assert_eq!(g.cell_at(49.9, 50.0), Some(GridCell::new(1, 0)));
        assert_eq!(g.cell_at(99.0, 10.0), Some(GridCell::new(0, 1)));
        assert_eq!(g.cell_at(100.0, 10.0), None);
        assert_eq!(g.cell_at(-1.0, 10.0), None);
        assert_eq!(g.cell_at(f32::NAN, 10.0), None);
    }

    #[test]
    fn cells_are_row_major() {
        let g = compute_geometry(20.0, 30.0, 10.0);
        let cells: Vec<_> = g.cells().collect();
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0], GridCell::new(0, 0));
        assert_eq!(cells[1], GridCell::new(0, 1));
        assert_eq!(cells[3], GridCell::new(1, 0));
    }
}
