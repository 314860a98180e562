use instant::Instant;

use crate::config::BackdropConfig;
use crate::grid::{compute_geometry, CellSizeSource, CellSizeWatch, GridCell, GridGeometry};
use crate::highlight::{HighlightBatch, HighlightScheduler};
use crate::project::{project, Frame};
use crate::trail::{PointerTrail, TrailState};
use crate::util::timers::{TimerHandle, TimerQueue};

/// Deferred work driven by the timer queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Pointer rested long enough; decay the trail.
    IdleDecay,
    /// Fixed-interval highlight refresh.
    RefreshTick,
    /// Jittered commit of a batch chosen on the last refresh tick.
    CommitBatch,
}

/// Read-only numbers for the debug overlay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackdropStats {
    pub rows: u32,
    pub cols: u32,
    pub cell_size: f32,
    pub trail_len: usize,
    pub pointer_cell: Option<GridCell>,
    pub trail_state: TrailState,
    pub pointer_active: bool,
    pub highlight_count: usize,
    pub highlight_target: usize,
    pub pending_commit: bool,
    pub paused: bool,
    pub commits: u64,
    pub timers_pending: usize,
}

/// The whole grid animation state behind one update API.
///
/// Hosts feed it viewport, pointer and clock events and read back a
/// [`Frame`]. All timers live in one queue owned here, so dropping or
/// shutting down the backdrop leaves nothing behind.
pub struct Backdrop {
    config: BackdropConfig,
    source: Box<dyn CellSizeSource>,
    cell_size_watch: CellSizeWatch,
    /// Last viewport (height, width) in pixels.
    viewport: (f32, f32),
    geometry: GridGeometry,
    trail: PointerTrail,
    scheduler: HighlightScheduler,
    timers: TimerQueue<Task>,
    /// The single pending idle decay, replaced on every pointer move.
    idle_timer: Option<TimerHandle>,
    rng: fastrand::Rng,
    /// Projection cache, cleared on every state change.
    frame: Option<Frame>,
    dirty: bool,
}

impl Backdrop {
    pub fn new(config: BackdropConfig, source: Box<dyn CellSizeSource>) -> Self {
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let mut cell_size_watch = CellSizeWatch::default();
        let cell_size = cell_size_watch.poll(source.as_ref());
        let scheduler = HighlightScheduler::new(config.highlight.clone());
        Self {
            config,
            source,
            cell_size_watch,
            viewport: (0.0, 0.0),
            geometry: GridGeometry::empty(cell_size),
            trail: PointerTrail::new(),
            scheduler,
            timers: TimerQueue::new(),
            idle_timer: None,
            rng,
            frame: None,
            dirty: true,
        }
    }

    /// Viewport changed size. Re-polls the cell size source.
    pub fn resize(&mut self, height: f32, width: f32, now: Instant) -> bool {
        self.viewport = (height, width);
        self.recompute_geometry(now)
    }

    /// Re-read the cell size source without a resize (e.g. theme change).
    pub fn refresh_cell_size(&mut self, now: Instant) -> bool {
        self.recompute_geometry(now)
    }

    pub fn pointer_move(&mut self, x: f32, y: f32, now: Instant) -> bool {
        let cell = self.geometry.cell_at(x, y);
        let changed = self.trail.pointer_move(cell);

        if let Some(handle) = self.idle_timer.take() {
            self.timers.cancel(handle);
        }
        self.idle_timer = Some(
            self.timers
                .schedule(now + self.config.idle_timeout, Task::IdleDecay),
        );

        if changed {
            log::trace!("Pointer at {cell:?}, trail length {}", self.trail.len());
            self.mark_dirty();
        }
        changed
    }

    pub fn pointer_leave(&mut self) -> bool {
        if let Some(handle) = self.idle_timer.take() {
            self.timers.cancel(handle);
        }
        let changed = self.trail.leave();
        if changed {
            log::debug!("Pointer left, trail cleared");
            self.mark_dirty();
        }
        changed
    }

    /// Run every timer due at `now`. Returns true if visible state changed.
    pub fn advance(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Some((handle, task)) = self.timers.pop_due(now) {
            match task {
                Task::IdleDecay => {
                    if self.idle_timer != Some(handle) {
                        continue;
                    }
                    self.idle_timer = None;
                    if self.trail.decay() {
                        log::trace!("Pointer idle, trail decayed");
                        changed = true;
                    }
                }
                Task::RefreshTick => {
                    self.scheduler.on_refresh_tick(
                        &self.geometry,
                        now,
                        &mut self.rng,
                        &mut self.timers,
                    );
                }
                Task::CommitBatch => {
                    changed |= self
                        .scheduler
                        .on_commit(handle, &self.geometry, now, &mut self.rng);
                }
            }
        }
        if changed {
            self.mark_dirty();
        }
        changed
    }

    /// When the host should call [`Backdrop::advance`] next.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Cancel every pending timer. The last frame stays readable.
    pub fn shutdown(&mut self) {
        self.idle_timer = None;
        self.scheduler.cancel_all(&mut self.timers);
        self.timers.clear();
        log::info!("Backdrop timers cancelled");
    }

    /// Force a new highlight batch now.
    pub fn reroll(&mut self, now: Instant) -> bool {
        let changed = self
            .scheduler
            .reroll(&self.geometry, now, &mut self.rng, &mut self.timers);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn set_highlight_count(&mut self, count: usize, now: Instant) -> bool {
        let changed = self.scheduler.set_target_count(
            count,
            &self.geometry,
            now,
            &mut self.rng,
            &mut self.timers,
        );
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn set_paused(&mut self, paused: bool, now: Instant) {
        self.scheduler
            .set_paused(paused, &self.geometry, now, &mut self.timers);
    }

    /// Projected cell state, recomputed only after a change.
    pub fn frame(&mut self) -> &Frame {
        let geometry = &self.geometry;
        let trail = &self.trail;
        let batch = self.scheduler.batch();
        self.frame
            .get_or_insert_with(|| project(geometry, &trail.snapshot(), trail.is_active(), batch))
    }

    /// True once per batch of changes since the last call.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    #[cfg(test)]
    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    #[cfg(test)]
    pub fn trail(&self) -> &PointerTrail {
        &self.trail
    }

    pub fn batch(&self) -> &HighlightBatch {
        self.scheduler.batch()
    }

    /// Moment the current highlight batch went live.
    pub fn batch_committed_at(&self) -> Option<Instant> {
        self.scheduler.committed_at()
    }

    pub fn stats(&self) -> BackdropStats {
        BackdropStats {
            rows: self.geometry.rows,
            cols: self.geometry.cols,
            cell_size: self.geometry.cell_size,
            trail_len: self.trail.len(),
            pointer_cell: self.trail.last_cell(),
            trail_state: self.trail.state(),
            pointer_active: self.trail.is_active(),
            highlight_count: self.scheduler.batch().len(),
            highlight_target: self.scheduler.settings().target_count,
            pending_commit: self.scheduler.has_pending_commit(),
            paused: self.scheduler.is_paused(),
            commits: self.scheduler.commit_count(),
            timers_pending: self.timers.len(),
        }
    }

    fn recompute_geometry(&mut self, now: Instant) -> bool {
        let cell_size = self.cell_size_watch.poll(self.source.as_ref());
        let (height, width) = self.viewport;
        let geometry = compute_geometry(height, width, cell_size);
        if geometry == self.geometry {
            return false;
        }

        log::debug!(
            "Grid {}x{} @ {}px -> {}x{} @ {}px",
            self.geometry.rows,
            self.geometry.cols,
            self.geometry.cell_size,
            geometry.rows,
            geometry.cols,
            geometry.cell_size,
        );
        self.geometry = geometry;
        self.trail.reset_cells();
        self.scheduler
            .reroll(&self.geometry, now, &mut self.rng, &mut self.timers);
        self.mark_dirty();
        true
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
        self.frame = None;
    }
}
