// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
mod config;
mod demo;
mod input;
mod primitives;

use anyhow::{Context, Result};
use clap::Parser;
use config::{load_cfg, AppCfg};
use demo::Demo;
use input::CameraController;
use prism_core::init_tracing;
use prism_render::{FrameOutcome, RenderSize, Renderer, TextureData};
use prism_render_vk::{InitProgress, PendingRenderer, RendererConfig, ShaderSet, VkRenderer};
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, warn};

use prism_platform::winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{DeviceEvent, DeviceId, ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};
use prism_platform::{classify_resize, drawable_size, ResizeKind};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[arg(long, default_value = "prism.toml")]
    config: PathBuf,
    /// Override the number of demo cubes
    #[arg(long)]
    cubes: Option<u32>,
    /// Disable the Khronos validation layer
    #[arg(long)]
    no_validation: bool,
}

fn renderer_config(cfg: &AppCfg) -> Result<RendererConfig> {
    let shaders = match (&cfg.render.vertex_shader, &cfg.render.fragment_shader) {
        (Some(vs), Some(fs_path)) => {
            let vs_bytes = fs::read(vs).with_context(|| format!("reading {}", vs.display()))?;
            let fs_bytes =
                fs::read(fs_path).with_context(|| format!("reading {}", fs_path.display()))?;
            Some(ShaderSet::from_spirv(&vs_bytes, &fs_bytes)?)
        }
        (None, None) => None,
        _ => {
            warn!("only one shader stage configured; using built-in shaders");
            None
        }
    };

    let texture = match &cfg.render.texture {
        Some(path) => {
            let img = image::open(path)
                .with_context(|| format!("decoding {}", path.display()))?
                .to_rgba8();
            let (w, h) = img.dimensions();
            info!("texture {} ({w}x{h})", path.display());
            TextureData::new(w, h, img.into_raw())?
        }
        None => TextureData::white(),
    };

    Ok(RendererConfig {
        app_name: cfg.window.title.clone(),
        validation: cfg.render.validation,
        clear_color: cfg.render.clear_color,
        shaders,
        texture,
    })
}

enum RenderState {
    None,
    Pending(PendingRenderer),
    Ready(Box<VkRenderer>),
}

struct App {
    cfg: AppCfg,
    cfg_path: PathBuf,
    window: Option<Window>,
    renderer: RenderState,
    render_size: RenderSize,
    demo: Demo,
    controller: CameraController,

    exiting: bool,
    last_frame: Instant,
    frames: u32,
    last_fps_instant: Instant,
}

impl App {
    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.exiting = true;
        match std::mem::replace(&mut self.renderer, RenderState::None) {
            RenderState::Pending(pending) => {
                pending.cancel();
                drop(pending);
            }
            RenderState::Ready(mut r) => r.dispose(),
            RenderState::None => {}
        }
        self.window = None;
        event_loop.exit();
    }

    /// Waits for a nonzero drawable size; a minimised window has no swapchain.
    fn start_renderer(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting || !matches!(self.renderer, RenderState::None) {
            return;
        }
        if self.render_size.is_empty() {
            info!("window has no drawable area yet; renderer start deferred");
            return;
        }
        let Some(window) = &self.window else {
            return;
        };
        let started = renderer_config(&self.cfg).and_then(|rcfg| {
            PendingRenderer::start(&rcfg, window, window, self.render_size, &self.demo.scene)
                .map_err(anyhow::Error::from)
        });
        match started {
            Ok(pending) => {
                self.renderer = RenderState::Pending(pending);
                event_loop.set_control_flow(ControlFlow::Poll);
            }
            Err(e) => {
                error!("vk init failed: {e:#}");
                self.shutdown(event_loop);
            }
        }
    }

    fn reload_clear_color(&mut self, event_loop: &ActiveEventLoop) {
        let color = load_cfg(&self.cfg_path).render.clear_color;
        self.cfg.render.clear_color = color;
        if let RenderState::Ready(r) = &mut self.renderer {
            match r.set_clear_color(color) {
                Ok(()) => info!("clear color {color:?}"),
                Err(e) => {
                    error!("clear color update failed: {e}");
                    self.shutdown(event_loop);
                }
            }
        }
    }

    fn poll_renderer(&mut self, event_loop: &ActiveEventLoop) {
        if !matches!(self.renderer, RenderState::Pending(_)) {
            return;
        }
        let RenderState::Pending(pending) = std::mem::replace(&mut self.renderer, RenderState::None)
        else {
            return;
        };
        match pending.poll() {
            Ok(InitProgress::Pending(p)) => self.renderer = RenderState::Pending(p),
            Ok(InitProgress::Ready(mut r)) => {
                info!("renderer ready");
                // The window may have changed while the pipeline was building.
                if r.frames().size() != self.render_size {
                    if let Err(e) = r.on_window_resized(self.render_size) {
                        error!("resize failed: {e}");
                        self.shutdown(event_loop);
                        return;
                    }
                }
                self.last_frame = Instant::now();
                self.renderer = RenderState::Ready(Box::new(r));
            }
            Ok(InitProgress::Cancelled) => {
                info!("initialisation cancelled");
                self.shutdown(event_loop);
            }
            Err(e) => {
                error!("renderer init failed: {e}");
                self.shutdown(event_loop);
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let RenderState::Ready(r) = &mut self.renderer else {
            return;
        };
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.controller
            .update(&mut self.demo.scene.camera.transform, dt);
        self.demo.update(dt);

        match r.draw_frame(&self.demo.scene) {
            Ok(FrameOutcome::Presented) => self.frames = self.frames.saturating_add(1),
            Ok(FrameOutcome::Recreated) => info!("swapchain recreated"),
            Ok(FrameOutcome::Skipped) => {}
            Err(e) => {
                error!("render error: {e}");
                self.shutdown(event_loop);
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.cfg.window.title.clone())
            .with_inner_size(LogicalSize::new(self.cfg.window.width, self.cfg.window.height));
        let window = match event_loop.create_window(attrs) {
            Ok(w) => w,
            Err(e) => {
                error!("create_window: {e}");
                event_loop.exit();
                return;
            }
        };
        self.render_size = drawable_size(&window);
        info!(
            "window {}x{}, {} objects",
            self.render_size.width,
            self.render_size.height,
            self.demo.scene.objects.len()
        );
        self.window = Some(window);
        self.start_renderer(event_loop);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("CloseRequested");
                self.shutdown(event_loop);
            }

            WindowEvent::Resized(new_size) => {
                let next = prism_platform::render_size(new_size);
                let kind = classify_resize(self.render_size, next);
                self.render_size = next;
                if kind == ResizeKind::Unchanged {
                    return;
                }
                match &mut self.renderer {
                    RenderState::Ready(r) => match r.on_window_resized(next) {
                        Ok(outcome) => info!("Resized → {}x{} ({outcome:?})", next.width, next.height),
                        Err(e) => {
                            error!("resize failed: {e}");
                            self.shutdown(event_loop);
                        }
                    },
                    RenderState::None => self.start_renderer(event_loop),
                    RenderState::Pending(_) => {}
                }
            }

            WindowEvent::Focused(false) => self.controller.release_all(),

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state,
                        ..
                    },
                ..
            } => {
                if state == ElementState::Pressed {
                    match code {
                        KeyCode::Escape => {
                            self.shutdown(event_loop);
                            return;
                        }
                        KeyCode::KeyR => {
                            self.reload_clear_color(event_loop);
                            return;
                        }
                        _ => {}
                    }
                }
                self.controller.key(code, state == ElementState::Pressed);
            }

            WindowEvent::RedrawRequested => {
                if !self.exiting {
                    self.redraw(event_loop);
                }
            }

            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = event {
            self.controller.mouse_motion(dx, dy);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exiting {
            return;
        }
        self.poll_renderer(event_loop);

        match &self.renderer {
            RenderState::Ready(_) if !self.render_size.is_empty() => {
                event_loop.set_control_flow(ControlFlow::Poll);
                if let Some(w) = &self.window {
                    w.request_redraw();
                }
            }
            RenderState::Pending(_) => event_loop.set_control_flow(ControlFlow::Poll),
            _ => {
                // minimised: sleep until the next event
                event_loop.set_control_flow(ControlFlow::Wait);
                self.frames = 0;
            }
        }

        let now = Instant::now();
        if now.duration_since(self.last_fps_instant).as_secs_f32() >= 1.0 {
            if self.frames > 0 {
                info!("fps ~ {}", self.frames);
            }
            self.frames = 0;
            self.last_fps_instant = now;
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut cfg = load_cfg(&args.config);
    if let Some(n) = args.cubes {
        cfg.scene.cubes = n;
    }
    if args.no_validation {
        cfg.render.validation = false;
    }

    let event_loop: EventLoop<()> = EventLoop::new()?;
    let demo = Demo::new(&cfg.scene, &cfg.camera);

    let mut app = App {
        cfg,
        cfg_path: args.config,
        window: None,
        renderer: RenderState::None,
        render_size: RenderSize::new(1, 1),
        demo,
        controller: CameraController::default(),
        exiting: false,
        last_frame: Instant::now(),
        frames: 0,
        last_fps_instant: Instant::now(),
    };

    event_loop.run_app(&mut app)?;
    Ok(())
}
