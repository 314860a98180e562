//! F12 panel: frame timing, grid state and a few live controls.

pub mod timer;

use std::collections::VecDeque;
use std::time::Duration;

use glam::Vec2;
use winit::window::Window;

use self::timer::{Phase, PhaseTimers};
use crate::backdrop::BackdropStats;
use crate::render::GpuState;

/// Frames kept for the history plot.
const HISTORY_LEN: usize = 240;
/// Seconds of frames folded into each log line.
const LOG_INTERVAL: f64 = 5.0;
/// 60 Hz frame budget, drawn as a reference line.
const FRAME_BUDGET: f64 = 1.0 / 60.0;
const MAX_HIGHLIGHT_SLIDER: usize = 64;

/// Changes requested from the panel, applied by the app after the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OverlayRequests {
    pub highlight_count: Option<usize>,
    pub paused: Option<bool>,
    pub reroll: bool,
}

/// Min/avg/max over a set of frame times, in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameSummary {
    pub frames: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl FrameSummary {
    fn of(times: impl IntoIterator<Item = f64>) -> Self {
        let mut s = Self {
            min: f64::MAX,
            ..Self::default()
        };
        let mut sum = 0.0;
        for t in times {
            s.frames += 1;
            sum += t;
            s.min = s.min.min(t);
            s.max = s.max.max(t);
        }
        if s.frames == 0 {
            return Self::default();
        }
        s.avg = sum / s.frames as f64;
        s
    }

    pub fn fps(&self) -> f64 {
        if self.avg > 0.0 {
            1.0 / self.avg
        } else {
            0.0
        }
    }
}

/// Bounded frame-time history plus the window for periodic logging.
#[derive(Debug, Default)]
pub struct FrameHistory {
    recent: VecDeque<f64>,
    window: Vec<f64>,
    window_secs: f64,
    total_frames: u64,
}

impl FrameHistory {
    pub fn new() -> Self {
        Self {
            recent: VecDeque::with_capacity(HISTORY_LEN),
            ..Self::default()
        }
    }

    /// Push one frame time. Returns the log window summary once every
    /// `LOG_INTERVAL` seconds of frames.
    pub fn push(&mut self, dt: f64) -> Option<FrameSummary> {
        self.total_frames += 1;
        if self.recent.len() == HISTORY_LEN {
            self.recent.pop_front();
        }
        self.recent.push_back(dt);

        self.window.push(dt);
        self.window_secs += dt;
        if self.window_secs < LOG_INTERVAL {
            return None;
        }
        let summary = FrameSummary::of(self.window.drain(..));
        self.window_secs = 0.0;
        Some(summary)
    }

    pub fn summary(&self) -> FrameSummary {
        FrameSummary::of(self.recent.iter().copied())
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }
}

/// egui-based debug panel. Frame timing is collected and logged even while
/// the panel is hidden.
pub struct DebugOverlay {
    ctx: egui::Context,
    winit_state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    pub visible: bool,
    history: FrameHistory,
    /// Engine numbers, refreshed by the app before each frame.
    pub stats: Option<BackdropStats>,
    pub pointer: Option<Vec2>,
    /// Time until the engine's next timer fires.
    pub next_timer: Option<Duration>,
}

impl DebugOverlay {
    pub fn new(window: &Window, gpu: &GpuState) -> Self {
        let ctx = egui::Context::default();
        let winit_state = egui_winit::State::new(
            ctx.clone(),
            egui::ViewportId::ROOT,
            window,
            Some(window.scale_factor() as f32),
            None,
            Some(gpu.device.limits().max_texture_dimension_2d as usize),
        );
        let renderer = egui_wgpu::Renderer::new(
            &gpu.device,
            gpu.surface_config.format,
            egui_wgpu::RendererOptions {
                depth_stencil_format: None,
                msaa_samples: 1,
                dithering: true,
                predictable_texture_filtering: false,
            },
        );
        Self {
            ctx,
            winit_state,
            renderer,
            visible: false,
            history: FrameHistory::new(),
            stats: None,
            pointer: None,
            next_timer: None,
        }
    }

    pub fn record_frame(&mut self, dt: f64) {
        let Some(window) = self.history.push(dt) else {
            return;
        };
        log::info!(
            "FPS: {:.0} | avg: {:.2}ms | min: {:.2}ms | max: {:.2}ms | total frames: {}",
            window.fps(),
            window.avg * 1000.0,
            window.min * 1000.0,
            window.max * 1000.0,
            self.history.total_frames(),
        );
        if let Some(s) = &self.stats {
            log::info!(
                "Grid {}x{} @ {}px | trail {} | highlights {}/{} | commits {}",
                s.rows,
                s.cols,
                s.cell_size,
                s.trail_len,
                s.highlight_count,
                s.highlight_target,
                s.commits,
            );
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        log::debug!("Debug overlay {}", if self.visible { "shown" } else { "hidden" });
    }

    /// Forward a winit event to egui. Returns true if egui consumed it.
    pub fn on_window_event(&mut self, window: &Window, event: &winit::event::WindowEvent) -> bool {
        self.winit_state.on_window_event(window, event).consumed
    }

    /// Run one egui frame; returns paint output and any control changes.
    pub fn run_frame(
        &mut self,
        window: &Window,
        phases: &PhaseTimers,
        screen_w: u32,
        screen_h: u32,
    ) -> (
        Vec<egui::epaint::ClippedPrimitive>,
        egui::TexturesDelta,
        egui_wgpu::ScreenDescriptor,
        OverlayRequests,
    ) {
        let input = self.winit_state.take_egui_input(window);
        let view = PanelView {
            visible: self.visible,
            summary: self.history.summary(),
            history: self.history.recent.iter().copied().collect(),
            phases: Phase::ALL.map(|p| (p, phases.durations_us[p as usize])),
            phase_total: phases.total_us(),
            stats: self.stats,
            pointer: self.pointer,
            next_timer: self.next_timer,
        };

        let mut requests = OverlayRequests::default();
        let output = self.ctx.run(input, |ctx| view.show(ctx, &mut requests));
        self.winit_state
            .handle_platform_output(window, output.platform_output);

        let primitives = self.ctx.tessellate(output.shapes, output.pixels_per_point);
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [screen_w, screen_h],
            pixels_per_point: output.pixels_per_point,
        };
        (primitives, output.textures_delta, screen, requests)
    }

    /// Upload egui textures and buffers before the egui pass.
    pub fn prepare_egui(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        primitives: &[egui::epaint::ClippedPrimitive],
        textures: &egui::TexturesDelta,
        screen: &egui_wgpu::ScreenDescriptor,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, delta) in &textures.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        self.renderer
            .update_buffers(device, queue, encoder, primitives, screen)
    }

    pub fn render_egui(
        &self,
        render_pass: &mut wgpu::RenderPass<'static>,
        primitives: &[egui::epaint::ClippedPrimitive],
        screen: &egui_wgpu::ScreenDescriptor,
    ) {
        self.renderer.render(render_pass, primitives, screen);
    }

    /// Release textures egui no longer needs. Call after present.
    pub fn free_textures(&mut self, textures: &egui::TexturesDelta) {
        for id in &textures.free {
            self.renderer.free_texture(id);
        }
    }
}

/// Everything the panel shows, copied out so drawing doesn't borrow the overlay.
struct PanelView {
    visible: bool,
    summary: FrameSummary,
    history: Vec<f64>,
    phases: [(Phase, f64); Phase::ALL.len()],
    phase_total: f64,
    stats: Option<BackdropStats>,
    pointer: Option<Vec2>,
    next_timer: Option<Duration>,
}

impl PanelView {
    fn show(&self, ctx: &egui::Context, requests: &mut OverlayRequests) {
        if !self.visible {
            return;
        }
        let frame = egui::Frame::NONE
            .fill(egui::Color32::from_rgba_unmultiplied(14, 16, 22, 230))
            .corner_radius(4.0)
            .inner_margin(8.0);

        egui::Window::new("gridglow")
            .default_pos([12.0, 12.0])
            .default_width(300.0)
            .frame(frame)
            .show(ctx, |ui| {
                ui.collapsing("Timing", |ui| self.timing(ui));
                if let Some(stats) = &self.stats {
                    ui.collapsing("Grid", |ui| self.grid(ui, stats));
                    ui.separator();
                    controls(ui, stats, requests);
                }
                ui.separator();
                ui.small("F5 re-roll | F12 hide | Esc quit");
            });
    }

    fn timing(&self, ui: &mut egui::Ui) {
        let s = &self.summary;
        ui.label(format!(
            "{:.0} fps | {:.2} / {:.2} / {:.2} ms",
            s.fps(),
            s.min * 1000.0,
            s.avg * 1000.0,
            s.max * 1000.0,
        ));
        plot_history(ui, &self.history);

        egui::Grid::new("phases").striped(true).show(ui, |ui| {
            let total = self.phase_total.max(1.0);
            for (phase, us) in self.phases {
                ui.label(phase.label());
                ui.monospace(format!("{us:>7.0} us"));
                ui.monospace(format!("{:>3.0}%", us / total * 100.0));
                ui.end_row();
            }
        });
    }

    fn grid(&self, ui: &mut egui::Ui, s: &BackdropStats) {
        egui::Grid::new("grid_stats").num_columns(2).show(ui, |ui| {
            ui.label("Cells");
            ui.label(format!("{} x {} @ {:.0}px", s.rows, s.cols, s.cell_size));
            ui.end_row();

            ui.label("Pointer");
            ui.label(match self.pointer {
                Some(p) => format!("{:.0}, {:.0}", p.x, p.y),
                None => "outside".to_owned(),
            });
            ui.end_row();

            ui.label("Cell");
            ui.label(match s.pointer_cell {
                Some(c) => format!("r{} c{}", c.row, c.col),
                None => "-".to_owned(),
            });
            ui.end_row();

            ui.label("Trail");
            ui.label(format!(
                "{} ({:?}{})",
                s.trail_len,
                s.trail_state,
                if s.pointer_active { ", moving" } else { "" },
            ));
            ui.end_row();

            ui.label("Highlights");
            ui.label(format!("{} of {}", s.highlight_count, s.highlight_target));
            ui.end_row();

            ui.label("Commits");
            ui.label(format!(
                "{}{}",
                s.commits,
                if s.pending_commit { " (one pending)" } else { "" },
            ));
            ui.end_row();

            ui.label("Timers");
            ui.label(match self.next_timer {
                Some(d) => format!("{} pending, next in {} ms", s.timers_pending, d.as_millis()),
                None => format!("{} pending", s.timers_pending),
            });
            ui.end_row();
        });
    }
}

fn controls(ui: &mut egui::Ui, s: &BackdropStats, requests: &mut OverlayRequests) {
    let mut paused = s.paused;
    if ui.checkbox(&mut paused, "Pause refresh").changed() {
        requests.paused = Some(paused);
    }
    let mut count = s.highlight_target;
    if ui
        .add(egui::Slider::new(&mut count, 0..=MAX_HIGHLIGHT_SLIDER).text("highlights"))
        .changed()
    {
        requests.highlight_count = Some(count);
    }
    if ui.button("Re-roll").clicked() {
        requests.reroll = true;
    }
}

/// Bar plot of recent frame times with the 60 Hz budget marked.
fn plot_history(ui: &mut egui::Ui, history: &[f64]) {
    let (response, painter) = ui.allocate_painter(egui::vec2(280.0, 48.0), egui::Sense::hover());
    let rect = response.rect;
    painter.rect_filled(rect, 2.0, egui::Color32::from_gray(24));
    if history.is_empty() {
        return;
    }

    let ceiling = history.iter().copied().fold(2.0 * FRAME_BUDGET, f64::max);
    let to_y = |t: f64| rect.bottom() - (t / ceiling) as f32 * rect.height();
    let step = rect.width() / HISTORY_LEN as f32;
    let left = rect.right() - step * history.len() as f32;

    for (i, &t) in history.iter().enumerate() {
        let x = left + i as f32 * step;
        let color = if t > FRAME_BUDGET {
            egui::Color32::from_rgb(230, 110, 90)
        } else {
            egui::Color32::from_rgb(110, 170, 230)
        };
        painter.line_segment(
            [egui::pos2(x, rect.bottom()), egui::pos2(x, to_y(t))],
            egui::Stroke::new(step.max(1.0), color),
        );
    }

    painter.hline(
        rect.x_range(),
        to_y(FRAME_BUDGET),
        egui::Stroke::new(1.0, egui::Color32::from_rgb(220, 200, 90)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_of_nothing_is_zero() {
        let s = FrameSummary::of([]);
        assert_eq!(s, FrameSummary::default());
        assert_eq!(s.fps(), 0.0);
    }

    #[test]
    fn summary_tracks_extremes() {
        let s = FrameSummary::of([0.010, 0.020, 0.030]);
        assert_eq!(s.frames, 3);
        assert!((s.avg - 0.020).abs() < 1e-12);
        assert_eq!(s.min, 0.010);
        assert_eq!(s.max, 0.030);
        assert!((s.fps() - 50.0).abs() < 1e-9);
    }

    #[test]
    fn history_is_bounded() {
        let mut h = FrameHistory::new();
        for _ in 0..HISTORY_LEN + 10 {
            h.push(0.001);
        }
        assert_eq!(h.summary().frames, HISTORY_LEN);
        assert_eq!(h.total_frames(), HISTORY_LEN as u64 + 10);
    }

    #[test]
    fn log_window_closes_after_interval() {
        let mut h = FrameHistory::new();
        let mut emitted = Vec::new();
        // 0.5s frames: the window closes on the 10th.
        for _ in 0..25 {
            if let Some(s) = h.push(0.5) {
                emitted.push(s);
            }
        }
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0].frames, 10);
        assert!((emitted[0].fps() - 2.0).abs() < 1e-9);
    }
}
