pub mod tone;

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use instant::Instant;

use crate::backdrop::Task;
use crate::grid::{GridCell, GridGeometry};
use crate::util::timers::{TimerHandle, TimerQueue};

pub use self::tone::Tone;

/// Draw attempts allowed per requested cell before the sampler stops
/// rejecting and sweeps the remaining free cells instead.
const ATTEMPTS_PER_CELL: usize = 32;

/// Identity of one highlighted cell, stable for as long as the batch lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HighlightId(u64);

impl fmt::Display for HighlightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hl-{}", self.0)
    }
}

/// Hands out ids that never repeat for the lifetime of the allocator.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn next_id(&mut self) -> HighlightId {
        let id = HighlightId(self.next);
        self.next += 1;
        id
    }
}

/// One randomly highlighted cell.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightCell {
    pub cell: GridCell,
    pub tone: Tone,
    pub id: HighlightId,
    /// Animation start offset from the moment the batch is committed.
    pub delay: Duration,
}

/// The set of highlighted cells shown together. Replaced whole, never edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HighlightBatch {
    pub cells: Vec<HighlightCell>,
}

impl HighlightBatch {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HighlightCell> {
        self.cells.iter()
    }
}

/// Pick `min(target_count, rows * cols)` distinct cells at random.
///
/// Cells are drawn by rejection sampling. If the draw budget runs out (very
/// dense batches) the remaining cells come from a shuffled sweep of the cells
/// not yet chosen, so the call always terminates with the full count.
/// Tones follow the palette in selection order; an empty palette gives an
/// empty batch.
pub fn select_batch(
    geometry: &GridGeometry,
    target_count: usize,
    palette: &[Tone],
    max_delay: Duration,
    rng: &mut fastrand::Rng,
    ids: &mut IdAllocator,
) -> HighlightBatch {
    let target = target_count.min(geometry.cell_count());
    if target == 0 || palette.is_empty() {
        return HighlightBatch::default();
    }

    let mut chosen: Vec<GridCell> = Vec::with_capacity(target);
    let mut seen: HashSet<GridCell> = HashSet::with_capacity(target);
    let mut attempts = target * ATTEMPTS_PER_CELL;

    while chosen.len() < target && attempts > 0 {
        attempts -= 1;
        let cell = GridCell::new(rng.u32(0..geometry.rows), rng.u32(0..geometry.cols));
        if seen.insert(cell) {
            chosen.push(cell);
        }
    }

    if chosen.len() < target {
        log::trace!(
            "Sampler budget spent at {}/{} cells, sweeping the rest",
            chosen.len(),
            target
        );
        let mut free: Vec<GridCell> = geometry.cells().filter(|c| !seen.contains(c)).collect();
        rng.shuffle(&mut free);
        chosen.extend(free.into_iter().take(target - chosen.len()));
    }

    let cells = chosen
        .into_iter()
        .enumerate()
        .map(|(i, cell)| HighlightCell {
            cell,
            tone: palette[i % palette.len()],
            id: ids.next_id(),
            delay: random_duration(rng, max_delay),
        })
        .collect();

    HighlightBatch { cells }
}

/// Uniform duration in `[0, max)`.
fn random_duration(rng: &mut fastrand::Rng, max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    max.mul_f64(rng.f64())
}

/// Tunables for the highlight cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct HighlightSettings {
    pub target_count: usize,
    pub palette: Vec<Tone>,
    /// Fixed period between refresh ticks.
    pub refresh_interval: Duration,
    /// Upper bound of the random wait between a tick and its commit.
    pub refresh_jitter: Duration,
    /// Upper bound of the per-cell animation delay.
    pub max_delay: Duration,
}

/// A batch chosen on a refresh tick, waiting for its jittered commit.
struct PendingCommit {
    timer: TimerHandle,
    batch: HighlightBatch,
    geometry: GridGeometry,
}

/// Keeps a refreshing set of decorative highlighted cells, independent of
/// the pointer.
///
/// Cadence: every `refresh_interval` a tick pre-selects a batch and schedules
/// its commit after a random jitter. A tick that fires while a commit is
/// still pending cancels that commit and replaces it. Geometry changes commit
/// a fresh batch immediately and drop any pending commit.
pub struct HighlightScheduler {
    settings: HighlightSettings,
    batch: HighlightBatch,
    committed_at: Option<Instant>,
    ids: IdAllocator,
    refresh_timer: Option<TimerHandle>,
    pending: Option<PendingCommit>,
    paused: bool,
    commits: u64,
}

impl HighlightScheduler {
    pub fn new(settings: HighlightSettings) -> Self {
        Self {
            settings,
            batch: HighlightBatch::default(),
            committed_at: None,
            ids: IdAllocator::default(),
            refresh_timer: None,
            pending: None,
            paused: false,
            commits: 0,
        }
    }

    pub fn batch(&self) -> &HighlightBatch {
        &self.batch
    }

    /// When the current batch was committed; animation delays count from here.
    pub fn committed_at(&self) -> Option<Instant> {
        self.committed_at
    }

    pub fn settings(&self) -> &HighlightSettings {
        &self.settings
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_pending_commit(&self) -> bool {
        self.pending.is_some()
    }

    pub fn commit_count(&self) -> u64 {
        self.commits
    }

    /// Replace the batch right away and restart the cadence. Used on
    /// geometry changes, target changes and manual re-rolls.
    pub fn reroll(
        &mut self,
        geometry: &GridGeometry,
        now: Instant,
        rng: &mut fastrand::Rng,
        timers: &mut TimerQueue<Task>,
    ) -> bool {
        self.cancel_pending(timers);
        let batch = self.select(geometry, rng);
        let changed = self.commit(batch, now);
        self.arm_refresh(geometry, now, timers);
        changed
    }

    /// Fixed-interval tick fired.
    pub fn on_refresh_tick(
        &mut self,
        geometry: &GridGeometry,
        now: Instant,
        rng: &mut fastrand::Rng,
        timers: &mut TimerQueue<Task>,
    ) {
        // No-op when the tick's own timer already popped.
        if let Some(handle) = self.refresh_timer.take() {
            timers.cancel(handle);
        }
        if self.paused || geometry.is_degenerate() {
            return;
        }

        if self.cancel_pending(timers) {
            log::debug!("Refresh tick replaced a pending commit");
        }

        let batch = self.select(geometry, rng);
        let jitter = random_duration(rng, self.settings.refresh_jitter);
        let timer = timers.schedule(now + jitter, Task::CommitBatch);
        log::trace!("Batch of {} queued, commit in {:?}", batch.len(), jitter);
        self.pending = Some(PendingCommit {
            timer,
            batch,
            geometry: *geometry,
        });

        self.arm_refresh(geometry, now, timers);
    }

    /// Jittered commit fired. A batch chosen for a different geometry is
    /// re-selected before committing.
    pub fn on_commit(
        &mut self,
        timer: TimerHandle,
        geometry: &GridGeometry,
        now: Instant,
        rng: &mut fastrand::Rng,
    ) -> bool {
        let pending = match self.pending.take() {
            Some(p) if p.timer == timer => p,
            other => {
                // Stale handle; keep whatever is pending.
                self.pending = other;
                return false;
            }
        };
        let batch = if pending.geometry == *geometry {
            pending.batch
        } else {
            self.select(geometry, rng)
        };
        self.commit(batch, now)
    }

    /// Change how many cells are highlighted. Takes effect immediately.
    pub fn set_target_count(
        &mut self,
        count: usize,
        geometry: &GridGeometry,
        now: Instant,
        rng: &mut fastrand::Rng,
        timers: &mut TimerQueue<Task>,
    ) -> bool {
        if count == self.settings.target_count {
            return false;
        }
        log::info!("Highlight count {} -> {}", self.settings.target_count, count);
        self.settings.target_count = count;
        self.reroll(geometry, now, rng, timers)
    }

    /// Pausing stops the cadence but keeps the current batch on screen.
    pub fn set_paused(
        &mut self,
        paused: bool,
        geometry: &GridGeometry,
        now: Instant,
        timers: &mut TimerQueue<Task>,
    ) {
        if paused == self.paused {
            return;
        }
        self.paused = paused;
        if paused {
            self.cancel_all(timers);
            log::info!("Highlight refresh paused");
        } else {
            self.arm_refresh(geometry, now, timers);
            log::info!("Highlight refresh resumed");
        }
    }

    /// Cancel every timer owned by the scheduler.
    pub fn cancel_all(&mut self, timers: &mut TimerQueue<Task>) {
        self.cancel_pending(timers);
        if let Some(handle) = self.refresh_timer.take() {
            timers.cancel(handle);
        }
    }

    fn select(&mut self, geometry: &GridGeometry, rng: &mut fastrand::Rng) -> HighlightBatch {
        select_batch(
            geometry,
            self.settings.target_count,
            &self.settings.palette,
            self.settings.max_delay,
            rng,
            &mut self.ids,
        )
    }

    fn commit(&mut self, batch: HighlightBatch, now: Instant) -> bool {
        let changed = !(batch.is_empty() && self.batch.is_empty());
        self.batch = batch;
        self.committed_at = Some(now);
        self.commits += 1;
        log::debug!("Committed highlight batch of {} cells", self.batch.len());
        changed
    }

    fn cancel_pending(&mut self, timers: &mut TimerQueue<Task>) -> bool {
        match self.pending.take() {
            Some(p) => {
                timers.cancel(p.timer);
                true
            }
            None => false,
        }
    }

    /// (Re)start the fixed tick. Not armed while paused or without a grid.
    fn arm_refresh(&mut self, geometry: &GridGeometry, now: Instant, timers: &mut TimerQueue<Task>) {
        if let Some(handle) = self.refresh_timer.take() {
            timers.cancel(handle);
        }
        if self.paused || geometry.is_degenerate() {
            return;
        }
        self.refresh_timer =
            Some(timers.schedule(now + self.settings.refresh_interval, Task::RefreshTick));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::compute_geometry;

    fn geometry(rows: u32, cols: u32) -> GridGeometry {
        GridGeometry {
            rows,
            cols,
            cell_size: 10.0,
        }
    }

    fn settings() -> HighlightSettings {
        HighlightSettings {
            target_count: 4,
            palette: Tone::ALL.to_vec(),
            refresh_interval: Duration::from_millis(1000),
            refresh_jitter: Duration::from_millis(300),
            max_delay: Duration::from_millis(500),
        }
    }

    fn pick(g: &GridGeometry, target: usize, seed: u64) -> HighlightBatch {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut ids = IdAllocator::default();
        select_batch(g, target, &Tone::ALL, Duration::from_millis(500), &mut rng, &mut ids)
    }

    fn assert_unique(batch: &HighlightBatch) {
        let cells: HashSet<_> = batch.iter().map(|h| h.cell).collect();
        assert_eq!(cells.len(), batch.len(), "duplicate cell in batch");
        let ids: HashSet<_> = batch.iter().map(|h| h.id).collect();
        assert_eq!(ids.len(), batch.len(), "duplicate id in batch");
    }

    #[test]
    fn target_above_cell_count_takes_every_cell() {
        let g = geometry(3, 3);
        let batch = pick(&g, 10, 7);
        assert_eq!(batch.len(), 9);
        assert_unique(&batch);
        for cell in g.cells() {
            assert_eq!(batch.iter().filter(|h| h.cell == cell).count(), 1);
        }
    }

    #[test]
    fn batches_never_repeat_cells() {
        let g = compute_geometry(480.0, 640.0, 48.0);
        for seed in 0..50 {
            let batch = pick(&g, 12, seed);
            assert_eq!(batch.len(), 12);
            assert_unique(&batch);
            assert!(batch.iter().all(|h| g.contains(h.cell)));
        }
    }

    #[test]
    fn tones_cycle_in_selection_order() {
        let g = geometry(10, 10);
        let batch = pick(&g, 12, 3);
        for (i, h) in batch.iter().enumerate() {
            assert_eq!(h.tone, Tone::ALL[i % Tone::ALL.len()]);
        }
    }

    #[test]
    fn delays_stay_in_range() {
        let g = geometry(10, 10);
        let batch = pick(&g, 30, 11);
        assert!(batch.iter().all(|h| h.delay < Duration::from_millis(500)));
    }

    #[test]
    fn degenerate_grid_or_palette_gives_empty_batch() {
        assert!(pick(&geometry(0, 0), 5, 1).is_empty());
        assert!(pick(&geometry(4, 0), 5, 1).is_empty());

        let mut rng = fastrand::Rng::with_seed(1);
        let mut ids = IdAllocator::default();
        let batch = select_batch(&geometry(4, 4), 5, &[], Duration::ZERO, &mut rng, &mut ids);
        assert!(batch.is_empty());
    }

    #[test]
    fn ids_stay_unique_across_batches() {
        let g = geometry(5, 5);
        let mut rng = fastrand::Rng::with_seed(9);
        let mut ids = IdAllocator::default();
        let a = select_batch(&g, 5, &Tone::ALL, Duration::ZERO, &mut rng, &mut ids);
        let b = select_batch(&g, 5, &Tone::ALL, Duration::ZERO, &mut rng, &mut ids);
        let all: HashSet<_> = a.iter().chain(b.iter()).map(|h| h.id).collect();
        assert_eq!(all.len(), 10);
        assert_eq!(a.cells[0].id.to_string(), "hl-0");
    }

    #[test]
    fn tick_commits_after_jitter() {
        let g = geometry(6, 6);
        let t0 = Instant::now();
        let mut rng = fastrand::Rng::with_seed(5);
        let mut timers = TimerQueue::new();
        let mut s = HighlightScheduler::new(settings());

        assert!(s.reroll(&g, t0, &mut rng, &mut timers));
        let first = s.batch().clone();
        assert_eq!(first.len(), 4);
        assert_eq!(timers.len(), 1); // refresh tick

        let tick_at = t0 + Duration::from_millis(1000);
        let (_, task) = timers.pop_due(tick_at).expect("refresh due");
        assert_eq!(task, Task::RefreshTick);
        s.on_refresh_tick(&g, tick_at, &mut rng, &mut timers);
        assert!(s.has_pending_commit());
        assert_eq!(s.batch(), &first);

        let (handle, task) = timers
            .pop_due(tick_at + Duration::from_millis(300))
            .expect("commit due within jitter");
        assert_eq!(task, Task::CommitBatch);
        assert!(s.on_commit(handle, &g, tick_at, &mut rng));
        assert!(!s.has_pending_commit());
        assert_ne!(s.batch(), &first);
        assert_eq!(s.commit_count(), 2);
    }

    #[test]
    fn overlapping_tick_replaces_pending_commit() {
        let g = geometry(6, 6);
        let t0 = Instant::now();
        let mut rng = fastrand::Rng::with_seed(2);
        let mut timers = TimerQueue::new();
        let mut s = HighlightScheduler::new(settings());

        s.on_refresh_tick(&g, t0, &mut rng, &mut timers);
        assert_eq!(timers.len(), 2); // commit + next tick
        s.on_refresh_tick(&g, t0, &mut rng, &mut timers);
        assert_eq!(timers.len(), 2); // both replaced, nothing orphaned

        let (mut commits, mut ticks) = (0, 0);
        while let Some((handle, task)) = timers.pop_due(t0 + Duration::from_millis(1000)) {
            match task {
                Task::CommitBatch => {
                    assert!(s.on_commit(handle, &g, t0, &mut rng));
                    commits += 1;
                }
                Task::RefreshTick => ticks += 1,
                Task::IdleDecay => unreachable!(),
            }
        }
        assert_eq!((commits, ticks), (1, 1));
    }

    #[test]
    fn early_tick_leaves_one_cadence() {
        let g = geometry(4, 4);
        let t0 = Instant::now();
        let mut rng = fastrand::Rng::with_seed(6);
        let mut timers = TimerQueue::new();
        let mut s = HighlightScheduler::new(settings());

        s.reroll(&g, t0, &mut rng, &mut timers);
        // Tick delivered while its own timer is still queued.
        s.on_refresh_tick(&g, t0, &mut rng, &mut timers);
        s.cancel_all(&mut timers);
        assert!(timers.is_empty());
    }

    #[test]
    fn commit_reselects_after_geometry_change() {
        let small = geometry(2, 2);
        let big = geometry(8, 8);
        let t0 = Instant::now();
        let mut rng = fastrand::Rng::with_seed(4);
        let mut timers = TimerQueue::new();
        let mut s = HighlightScheduler::new(settings());

        s.on_refresh_tick(&big, t0, &mut rng, &mut timers);
        let (handle, _) = std::iter::from_fn(|| timers.pop_due(t0 + Duration::from_secs(1)))
            .find(|(_, t)| *t == Task::CommitBatch)
            .expect("commit queued");
        s.on_commit(handle, &small, t0, &mut rng);
        assert_eq!(s.batch().len(), 4);
        assert!(s.batch().iter().all(|h| small.contains(h.cell)));
    }

    #[test]
    fn degenerate_geometry_pauses_cadence() {
        let t0 = Instant::now();
        let mut rng = fastrand::Rng::with_seed(1);
        let mut timers = TimerQueue::new();
        let mut s = HighlightScheduler::new(settings());

        s.reroll(&geometry(0, 0), t0, &mut rng, &mut timers);
        assert!(s.batch().is_empty());
        assert!(timers.is_empty());
    }

    #[test]
    fn pause_keeps_batch_and_drops_timers() {
        let g = geometry(4, 4);
        let t0 = Instant::now();
        let mut rng = fastrand::Rng::with_seed(8);
        let mut timers = TimerQueue::new();
        let mut s = HighlightScheduler::new(settings());

        s.reroll(&g, t0, &mut rng, &mut timers);
        s.on_refresh_tick(&g, t0, &mut rng, &mut timers);
        s.set_paused(true, &g, t0, &mut timers);
        assert!(timers.is_empty());
        assert_eq!(s.batch().len(), 4);

        s.set_paused(false, &g, t0, &mut timers);
        assert_eq!(timers.len(), 1);
    }
}
