use std::time::Duration;

use bytemuck::{Pod, Zeroable};
use instant::Instant;

use crate::highlight::HighlightCell;
use crate::project::{CellClass, Frame};
use crate::trail::TRAIL_LIMIT;

/// Per-instance data uploaded to GPU each frame.
/// Stride = 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct CellInstance {
    /// Top-left corner in pixels.
    pub origin: [f32; 2],
    /// Cell side in pixels.
    pub size: f32,
    /// Pixels shaved off each side (leaves the grid lines visible).
    pub inset: f32,
    /// Premultiplied RGBA.
    pub color: [f32; 4],
}

impl CellInstance {
    const ATTRIBS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
        1 => Float32x2,  // origin
        2 => Float32,    // size
        3 => Float32,    // inset
        4 => Float32x4,  // color
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<CellInstance>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBS,
        }
    }
}

/// Resting cell fill.
const BASE_COLOR: [f32; 4] = [0.055, 0.062, 0.078, 1.0];
/// Pointer highlight tint (unpremultiplied).
const POINTER_RGB: [f32; 3] = [0.86, 0.90, 1.0];
const ACTIVE_ALPHA: f32 = 0.32;
/// Alpha of the freshest trailing cell; older ranks fade linearly.
const TRAIL_ALPHA: f32 = 0.22;
/// Fade-in time for a highlighted cell once its delay has passed.
const HIGHLIGHT_FADE_IN: Duration = Duration::from_millis(700);
/// Period of the highlight pulse after fading in.
const HIGHLIGHT_PULSE_SECS: f32 = 2.4;
const HIGHLIGHT_ALPHA: f32 = 0.55;
const GRID_LINE: f32 = 1.0;

fn premultiply(rgb: [f32; 3], alpha: f32) -> [f32; 4] {
    [rgb[0] * alpha, rgb[1] * alpha, rgb[2] * alpha, alpha]
}

fn base_instance(origin: (f32, f32), size: f32, color: [f32; 4]) -> CellInstance {
    CellInstance {
        origin: [origin.0, origin.1],
        size,
        inset: GRID_LINE * 0.5,
        color,
    }
}

/// Pointer layer color for a classification, `None` for untouched cells.
fn pointer_color(class: CellClass) -> Option<[f32; 4]> {
    match class {
        CellClass::None => None,
        CellClass::Active => Some(premultiply(POINTER_RGB, ACTIVE_ALPHA)),
        CellClass::Trailing(rank) => {
            let fade = 1.0 - rank as f32 / TRAIL_LIMIT as f32;
            Some(premultiply(POINTER_RGB, TRAIL_ALPHA * fade))
        }
    }
}

/// Highlight opacity `since_commit` after the batch went live: hidden during
/// the cell's delay, then a fade-in followed by a slow pulse.
pub fn highlight_alpha(highlight: &HighlightCell, since_commit: Duration) -> f32 {
    let Some(t) = since_commit.checked_sub(highlight.delay) else {
        return 0.0;
    };
    if t < HIGHLIGHT_FADE_IN {
        return HIGHLIGHT_ALPHA * (t.as_secs_f32() / HIGHLIGHT_FADE_IN.as_secs_f32());
    }
    let phase = (t - HIGHLIGHT_FADE_IN).as_secs_f32() / HIGHLIGHT_PULSE_SECS;
    let pulse = 0.5 + 0.5 * (phase * std::f32::consts::TAU).cos();
    HIGHLIGHT_ALPHA * (0.6 + 0.4 * pulse)
}

/// Build every instance for a frame: base cells, then pointer cells, then
/// the highlight overlay.
pub fn build_instances(
    frame: &Frame,
    committed_at: Option<Instant>,
    now: Instant,
    out: &mut Vec<CellInstance>,
) {
    out.clear();
    let geometry = &frame.geometry;
    let size = geometry.cell_size;

    for desc in &frame.cells {
        out.push(base_instance(geometry.cell_origin(desc.cell), size, BASE_COLOR));
    }

    for desc in &frame.cells {
        if let Some(color) = pointer_color(desc.class) {
            out.push(base_instance(geometry.cell_origin(desc.cell), size, color));
        }
    }

    let since_commit = committed_at
        .map(|t| now.saturating_duration_since(t))
        .unwrap_or_default();
    for highlight in &frame.overlay {
        let alpha = highlight_alpha(highlight, since_commit);
        if alpha <= 0.0 {
            continue;
        }
        out.push(base_instance(
            geometry.cell_origin(highlight.cell),
            size,
            premultiply(highlight.tone.rgb(), alpha),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridCell, GridGeometry};
    use crate::highlight::{HighlightBatch, IdAllocator, Tone};
    use crate::project::project;

    fn highlight(delay_ms: u64) -> HighlightCell {
        HighlightCell {
            cell: GridCell::new(0, 1),
            tone: Tone::Azure,
            id: IdAllocator::default().next_id(),
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[test]
    fn highlight_waits_for_delay_then_fades_in() {
        let h = highlight(300);
        assert_eq!(highlight_alpha(&h, Duration::from_millis(100)), 0.0);
        let early = highlight_alpha(&h, Duration::from_millis(400));
        let later = highlight_alpha(&h, Duration::from_millis(900));
        assert!(early > 0.0 && early < later);
        let settled = highlight_alpha(&h, Duration::from_secs(10));
        assert!(settled > 0.0 && settled <= HIGHLIGHT_ALPHA);
    }

    #[test]
    fn layers_are_stacked_in_order() {
        let g = GridGeometry {
            rows: 2,
            cols: 2,
            cell_size: 20.0,
        };
        let batch = HighlightBatch {
            cells: vec![highlight(0)],
        };
        let trail = [GridCell::new(1, 0), GridCell::new(1, 1)];
        let frame = project(&g, &trail, true, &batch);

        let t0 = Instant::now();
        let mut out = Vec::new();
        build_instances(&frame, Some(t0), t0 + Duration::from_secs(1), &mut out);

        // 4 base + active + trailing + highlight
        assert_eq!(out.len(), 7);
        assert_eq!(out[0].color, BASE_COLOR);
        assert_eq!(out[3].origin, [20.0, 20.0]);
        assert_eq!(out[6].origin, [20.0, 0.0]);
    }

    #[test]
    fn instance_stride_matches_shader() {
        assert_eq!(std::mem::size_of::<CellInstance>(), 32);
        assert_eq!(CellInstance::layout().attributes[3].offset, 16);
    }

    #[test]
    fn empty_frame_builds_nothing() {
        let frame = Frame::empty(GridGeometry::empty(10.0));
        let mut out = vec![base_instance((0.0, 0.0), 1.0, BASE_COLOR)];
        build_instances(&frame, None, Instant::now(), &mut out);
        assert!(out.is_empty());
    }
}
