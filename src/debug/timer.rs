use instant::Instant;

/// Stage of a redraw being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Timers = 0,
    Projection = 1,
    BuildInstances = 2,
    GpuUpload = 3,
    Render = 4,
}

impl Phase {
    pub const ALL: [Phase; 5] = [
        Self::Timers,
        Self::Projection,
        Self::BuildInstances,
        Self::GpuUpload,
        Self::Render,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Timers => "Timers",
            Self::Projection => "Projection",
            Self::BuildInstances => "Build Inst.",
            Self::GpuUpload => "GPU Upload",
            Self::Render => "Render",
        }
    }
}

const PHASE_COUNT: usize = Phase::ALL.len();
const EMA_ALPHA: f64 = 0.1;

/// Per-phase durations smoothed with an exponential moving average.
pub struct PhaseTimers {
    /// Smoothed duration in microseconds per phase.
    pub durations_us: [f64; PHASE_COUNT],
}

impl PhaseTimers {
    pub fn new() -> Self {
        Self {
            durations_us: [0.0; PHASE_COUNT],
        }
    }

    /// Run `f` and fold its wall time into `phase`.
    pub fn measure<R>(&mut self, phase: Phase, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(phase, start.elapsed().as_secs_f64() * 1_000_000.0);
        result
    }

    pub fn record(&mut self, phase: Phase, elapsed_us: f64) {
        let slot = &mut self.durations_us[phase as usize];
        *slot = *slot * (1.0 - EMA_ALPHA) + elapsed_us * EMA_ALPHA;
    }

    /// Sum of all phase durations (microseconds).
    pub fn total_us(&self) -> f64 {
        self.durations_us.iter().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_moves_toward_samples() {
        let mut t = PhaseTimers::new();
        t.record(Phase::Render, 100.0);
        assert!((t.durations_us[Phase::Render as usize] - 10.0).abs() < 1e-9);
        for _ in 0..200 {
            t.record(Phase::Render, 100.0);
        }
        assert!((t.durations_us[Phase::Render as usize] - 100.0).abs() < 0.01);
        assert_eq!(t.durations_us[Phase::Timers as usize], 0.0);
        assert!((t.total_us() - t.durations_us[Phase::Render as usize]).abs() < 1e-9);
    }

    #[test]
    fn measure_returns_closure_value() {
        let mut t = PhaseTimers::new();
        assert_eq!(t.measure(Phase::Projection, || 7), 7);
    }
}
