use std::error::Error;
use std::sync::Arc;

use glam::Vec2;
use instant::Instant;
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowAttributes, WindowId};

use crate::backdrop::Backdrop;
use crate::config::{BackdropConfig, EnvCellSize};
use crate::debug::timer::{Phase, PhaseTimers};
use crate::debug::{DebugOverlay, OverlayRequests};
use crate::render::instance::{build_instances, CellInstance};
use crate::render::{FrameContext, GpuState};

/// Initial window size in logical pixels.
const INITIAL_SIZE: (f64, f64) = (1280.0, 800.0);
/// Initial capacity of the per-frame instance buffer.
const INSTANCE_CAPACITY: usize = 2048;

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Top-level application state.
struct App {
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    debug: Option<DebugOverlay>,

    backdrop: Backdrop,

    // Reusable instance buffer (avoid per-frame allocation)
    instance_buf: Vec<CellInstance>,

    // Frame timing
    last_frame_time: Option<Instant>,
    phase_timers: PhaseTimers,

    // Last pointer position in physical pixels, None when outside the window
    pointer: Option<Vec2>,

    // Window or GPU setup failure, reported by `run` after the loop exits
    init_error: Option<Box<dyn Error>>,
}

impl App {
    fn new(backdrop: Backdrop) -> Self {
        Self {
            window: None,
            gpu: None,
            debug: None,
            backdrop,
            instance_buf: Vec::with_capacity(INSTANCE_CAPACITY),
            last_frame_time: None,
            phase_timers: PhaseTimers::new(),
            pointer: None,
            init_error: None,
        }
    }

    fn init_window(&mut self, event_loop: &ActiveEventLoop) -> Result<(), Box<dyn Error>> {
        let attrs = WindowAttributes::default()
            .with_title("gridglow")
            .with_visible(false)
            .with_inner_size(winit::dpi::LogicalSize::new(INITIAL_SIZE.0, INITIAL_SIZE.1));

        let window = Arc::new(event_loop.create_window(attrs)?);
        let size = window.inner_size();
        log::info!("Window created: {}x{}", size.width, size.height);

        let gpu = GpuState::new(window.clone())?;
        log::info!("wgpu + cell pipeline initialized");

        self.debug = Some(DebugOverlay::new(&window, &gpu));
        self.gpu = Some(gpu);

        let now = Instant::now();
        self.backdrop
            .resize(size.height as f32, size.width as f32, now);

        // Cells animate continuously (highlight fade and pulse)
        event_loop.set_control_flow(ControlFlow::Poll);

        window.set_visible(true);
        self.window = Some(window);
        Ok(())
    }

    fn on_key(&mut self, event_loop: &ActiveEventLoop, event: &KeyEvent) {
        if event.state != ElementState::Pressed || event.repeat {
            return;
        }
        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => {
                log::info!("ESC pressed, exiting");
                event_loop.exit();
            }
            PhysicalKey::Code(KeyCode::F12) => {
                if let Some(debug) = &mut self.debug {
                    debug.toggle();
                }
            }
            PhysicalKey::Code(KeyCode::F5) => {
                self.backdrop.reroll(Instant::now());
                log::info!("Re-rolled {} highlights", self.backdrop.batch().len());
            }
            _ => {}
        }
    }

    fn apply_requests(&mut self, requests: OverlayRequests, now: Instant) {
        if let Some(paused) = requests.paused {
            self.backdrop.set_paused(paused, now);
        }
        if let Some(count) = requests.highlight_count {
            self.backdrop.set_highlight_count(count, now);
        }
        if requests.reroll {
            self.backdrop.reroll(now);
        }
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        if let Some(last) = self.last_frame_time {
            let dt = now.duration_since(last).as_secs_f64();
            if let Some(debug) = &mut self.debug {
                debug.record_frame(dt);
            }
        }
        self.last_frame_time = Some(now);

        // --- Timers ---
        let backdrop = &mut self.backdrop;
        self.phase_timers.measure(Phase::Timers, || backdrop.advance(now));

        // --- Projection (cached until something changes) ---
        let committed_at = self.backdrop.batch_committed_at();
        let projection_start = Instant::now();
        if self.backdrop.take_dirty() {
            log::trace!("Backdrop changed, re-projecting");
        }
        let frame = self.backdrop.frame();
        self.phase_timers.record(
            Phase::Projection,
            projection_start.elapsed().as_secs_f64() * 1_000_000.0,
        );

        // --- Build instance buffer ---
        let instance_buf = &mut self.instance_buf;
        self.phase_timers.measure(Phase::BuildInstances, || {
            build_instances(frame, committed_at, now, instance_buf)
        });

        let (Some(gpu), Some(window)) = (&mut self.gpu, &self.window) else {
            return;
        };

        // --- Upload ---
        let upload_start = Instant::now();
        gpu.update_instances(&self.instance_buf);
        self.phase_timers.record(
            Phase::GpuUpload,
            upload_start.elapsed().as_secs_f64() * 1_000_000.0,
        );

        // --- Render ---
        let render_start = Instant::now();
        let Some(FrameContext {
            output,
            view,
            mut encoder,
        }) = gpu.begin_frame()
        else {
            return;
        };
        gpu.draw_cells(&mut encoder, &view);

        let mut requests = OverlayRequests::default();
        match &mut self.debug {
            Some(debug) => {
                debug.stats = Some(self.backdrop.stats());
                debug.pointer = self.pointer;
                debug.next_timer = self
                    .backdrop
                    .next_deadline()
                    .map(|d| d.saturating_duration_since(now));

                let (w, h) = (gpu.surface_config.width, gpu.surface_config.height);
                let (primitives, textures_delta, screen_descriptor, reqs) =
                    debug.run_frame(window, &self.phase_timers, w, h);
                requests = reqs;

                let extra = debug.prepare_egui(
                    &gpu.device,
                    &gpu.queue,
                    &mut encoder,
                    &primitives,
                    &textures_delta,
                    &screen_descriptor,
                );
                {
                    let mut pass = GpuState::begin_egui_pass(&mut encoder, &view);
                    debug.render_egui(&mut pass, &primitives, &screen_descriptor);
                }
                gpu.finish_frame(encoder, output, extra);
                debug.free_textures(&textures_delta);
            }
            None => gpu.finish_frame(encoder, output, Vec::new()),
        }
        self.phase_timers.record(
            Phase::Render,
            render_start.elapsed().as_secs_f64() * 1_000_000.0,
        );

        if requests != OverlayRequests::default() {
            self.apply_requests(requests, now);
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init_window(event_loop) {
            log::error!("Initialization failed: {e}");
            self.init_error = Some(e);
            event_loop.exit();
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(w) = &self.window {
            w.request_redraw();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        // egui sees every event; it only swallows input while the panel is shown.
        let consumed = match (&mut self.debug, &self.window) {
            (Some(debug), Some(window)) => {
                debug.on_window_event(window, &event) && debug.visible
            }
            _ => false,
        };

        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, exiting");
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                if let Some(gpu) = &mut self.gpu {
                    gpu.resize(new_size.width, new_size.height);
                }
                self.backdrop.resize(
                    new_size.height as f32,
                    new_size.width as f32,
                    Instant::now(),
                );
            }
            WindowEvent::ScaleFactorChanged { .. } => {
                self.backdrop.refresh_cell_size(Instant::now());
            }
            WindowEvent::CursorMoved { position, .. } => {
                let p = Vec2::new(position.x as f32, position.y as f32);
                self.pointer = Some(p);
                if !consumed {
                    self.backdrop.pointer_move(p.x, p.y, Instant::now());
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.pointer = None;
                self.backdrop.pointer_leave();
            }
            WindowEvent::KeyboardInput { event, .. } if !consumed => {
                self.on_key(event_loop, &event);
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.backdrop.shutdown();
    }
}

/// Entry point: build the engine from the environment and run the event loop.
pub fn run() -> Result<(), Box<dyn Error>> {
    let config = BackdropConfig::from_env();
    log::info!(
        "Config: {} highlights every {:?} (+{:?} jitter), idle after {:?}",
        config.highlight.target_count,
        config.highlight.refresh_interval,
        config.highlight.refresh_jitter,
        config.idle_timeout,
    );
    let backdrop = Backdrop::new(config, Box::new(EnvCellSize::new()));

    let event_loop = EventLoop::new()?;
    let mut app = App::new(backdrop);
    event_loop.run_app(&mut app)?;

    match app.init_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
