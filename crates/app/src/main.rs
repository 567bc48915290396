//! Application entry point.
//!
//! Creates the window and renderer once the event loop is live, then drives
//! one frame per redraw. Resize events update the window's drawable size
//! and set its sticky resize flag; the renderer picks the flag up at the
//! end of the next frame and rebuilds the presentation surface.

use std::path::PathBuf;

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use orrery_core::Timer;
use orrery_platform::{InputState, KeyCode, Window};
use orrery_render::Renderer;

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    input: InputState,
    timer: Timer,
    model_path: PathBuf,
}

impl App {
    fn new(model_path: PathBuf) -> Self {
        Self {
            window: None,
            renderer: None,
            input: InputState::new(),
            timer: Timer::new(),
            model_path,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, 1280, 720, "orrery") {
                Ok(window) => match Renderer::new(&window, &self.model_path) {
                    Ok(renderer) => {
                        info!("Initialization complete, entering main loop");
                        self.renderer = Some(renderer);
                        self.window = Some(window);
                    }
                    Err(e) => {
                        error!("Failed to create renderer: {}", e);
                        event_loop.exit();
                    }
                },
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let dt = self.timer.delta_secs();

                if self.input.just_pressed(KeyCode::Escape) {
                    event_loop.exit();
                    return;
                }

                if let (Some(renderer), Some(window)) = (&mut self.renderer, &self.window) {
                    renderer.update(dt);
                    if let Err(e) = renderer.render_frame(window) {
                        // Fatal device or configuration error; abort the run
                        error!("Render error: {}", e);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.input.begin_frame();
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    orrery_core::init_logging();
    info!("Starting orrery");

    let model_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("assets/models/cube.obj"));

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(model_path);
    event_loop.run_app(&mut app)?;

    Ok(())
}
