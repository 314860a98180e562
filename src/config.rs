//! Runtime configuration, read from `GRIDGLOW_*` environment variables.
//! Anything missing or malformed keeps its default (malformed values are
//! logged).

use std::cell::RefCell;
use std::str::FromStr;
use std::time::Duration;

use crate::grid::CellSizeSource;
use crate::highlight::{HighlightSettings, Tone};

/// Pointer rest time before the trail decays.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(220);
/// Period between highlight refresh ticks.
const REFRESH_INTERVAL: Duration = Duration::from_millis(3000);
/// Max extra wait between a refresh tick and its commit.
const REFRESH_JITTER: Duration = Duration::from_millis(1200);
/// Max per-cell animation delay.
const MAX_HIGHLIGHT_DELAY: Duration = Duration::from_millis(1600);
/// How many cells are highlighted at once.
const HIGHLIGHT_COUNT: usize = 14;

const ENV_CELL_SIZE: &str = "GRIDGLOW_CELL_SIZE";
const ENV_IDLE_MS: &str = "GRIDGLOW_IDLE_MS";
const ENV_REFRESH_MS: &str = "GRIDGLOW_REFRESH_MS";
const ENV_JITTER_MS: &str = "GRIDGLOW_JITTER_MS";
const ENV_DELAY_MS: &str = "GRIDGLOW_DELAY_MS";
const ENV_HIGHLIGHTS: &str = "GRIDGLOW_HIGHLIGHTS";
const ENV_PALETTE: &str = "GRIDGLOW_PALETTE";
const ENV_SEED: &str = "GRIDGLOW_SEED";

#[derive(Debug, Clone, PartialEq)]
pub struct BackdropConfig {
    pub idle_timeout: Duration,
    pub highlight: HighlightSettings,
    /// Fixed RNG seed; random per session when unset.
    pub seed: Option<u64>,
}

impl Default for BackdropConfig {
    fn default() -> Self {
        Self {
            idle_timeout: IDLE_TIMEOUT,
            highlight: HighlightSettings {
                target_count: HIGHLIGHT_COUNT,
                palette: Tone::ALL.to_vec(),
                refresh_interval: REFRESH_INTERVAL,
                refresh_jitter: REFRESH_JITTER,
                max_delay: MAX_HIGHLIGHT_DELAY,
            },
            seed: None,
        }
    }
}

impl BackdropConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(ms) = parse_var::<u64>(&lookup, ENV_IDLE_MS) {
            cfg.idle_timeout = Duration::from_millis(ms);
        }
        match parse_var::<u64>(&lookup, ENV_REFRESH_MS) {
            Some(0) => log::warn!("{ENV_REFRESH_MS} must be positive, keeping default"),
            Some(ms) => cfg.highlight.refresh_interval = Duration::from_millis(ms),
            None => {}
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_JITTER_MS) {
            cfg.highlight.refresh_jitter = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_DELAY_MS) {
            cfg.highlight.max_delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_var::<usize>(&lookup, ENV_HIGHLIGHTS) {
            cfg.highlight.target_count = n;
        }
        if let Some(raw) = lookup(ENV_PALETTE) {
            match parse_palette(&raw) {
                Some(palette) => cfg.highlight.palette = palette,
                None => log::warn!("Ignoring {ENV_PALETTE}={raw:?}: unknown tone"),
            }
        }
        cfg.seed = parse_var::<u64>(&lookup, ENV_SEED);

        cfg
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("Ignoring {key}={raw:?}: not a valid number");
            None
        }
    }
}

/// Comma-separated tone labels, e.g. `azure,coral,mint`.
fn parse_palette(raw: &str) -> Option<Vec<Tone>> {
    let palette: Option<Vec<Tone>> = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(Tone::from_label)
        .collect();
    palette.filter(|p| !p.is_empty())
}

/// Cell size from `GRIDGLOW_CELL_SIZE`, re-read on every poll so it can be
/// changed while running (takes effect on the next resize or refresh).
pub struct EnvCellSize {
    lookup: Box<dyn Fn(&str) -> Option<String>>,
    /// Last unparsable value, so a bad setting warns once and not per resize.
    rejected: RefCell<Option<String>>,
}

impl EnvCellSize {
    pub fn new() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String> + 'static) -> Self {
        Self {
            lookup: Box::new(lookup),
            rejected: RefCell::new(None),
        }
    }
}

impl Default for EnvCellSize {
    fn default() -> Self {
        Self::new()
    }
}

impl CellSizeSource for EnvCellSize {
    fn cell_size(&self) -> Option<f32> {
        let Some(raw) = (self.lookup)(ENV_CELL_SIZE) else {
            self.rejected.replace(None);
            return None;
        };
        match raw.trim().parse() {
            Ok(v) => {
                self.rejected.replace(None);
                Some(v)
            }
            Err(_) => {
                let mut rejected = self.rejected.borrow_mut();
                if rejected.as_deref() != Some(raw.as_str()) {
                    log::warn!("Ignoring {ENV_CELL_SIZE}={raw:?}: not a valid number");
                    *rejected = Some(raw);
                }
                None
            }
        }
    }
}
